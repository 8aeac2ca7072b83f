/// Background persistence loop — one thread per store that flushes dirty
/// state to disk.
///
/// # Lifecycle
///
/// ```text
/// Stopped → Loading → Idle ⇄ Saving … → Stopping → Stopped
///                             ⇅
///                           Dirty
/// ```
///
/// `Dirty` marks a save that finished with new changes already pending.
///
/// On start the loop loads the target. While running it checks the
/// target's dirty flag; when set it saves immediately and checks again,
/// otherwise it waits one poll interval. A stop request is observed at
/// the next check (so within one poll interval) and is followed by one
/// final, unconditional save.
///
/// # Usage
///
/// ```ignore
/// let handle = PersistenceLoop::new(store).spawn()?;
/// // ... mutate the store ...
/// handle.stop(); // blocks until the final save has been written
/// ```
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// How often an idle loop re-checks the dirty flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Something the loop can load, save, and poll for changes.
///
/// `load` and `save` must not fail; implementations report their own
/// errors and keep going.
pub trait Persistent: Send + Sync + 'static {
    /// Short name used for the thread name and log lines.
    fn name(&self) -> &str;

    fn load(&self);

    fn save(&self);

    fn has_pending_changes(&self) -> bool;
}

/// Observable state of a persistence loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Stopped = 0,
    Loading = 1,
    Idle = 2,
    Dirty = 3,
    Saving = 4,
    Stopping = 5,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Loading,
            2 => Self::Idle,
            3 => Self::Dirty,
            4 => Self::Saving,
            5 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

#[derive(Default)]
struct SharedState(AtomicU8);

impl SharedState {
    fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Configuration for a loop that has not been started yet.
pub struct PersistenceLoop {
    target: Arc<dyn Persistent>,
    poll_interval: Duration,
    load_on_start: bool,
}

impl PersistenceLoop {
    pub fn new(target: Arc<dyn Persistent>) -> Self {
        Self {
            target,
            poll_interval: DEFAULT_POLL_INTERVAL,
            load_on_start: true,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Skip the initial load for a target the caller has already loaded.
    pub fn load_on_start(mut self, load: bool) -> Self {
        self.load_on_start = load;
        self
    }

    /// Start the loop on a named background thread.
    pub fn spawn(self) -> io::Result<PersistenceHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let state = Arc::new(SharedState::default());
        let state_clone = Arc::clone(&state);
        let name = self.target.name().to_owned();

        // Set before spawn returns so callers never observe a freshly
        // started loop as Stopped.
        state.set(if self.load_on_start {
            LoopState::Loading
        } else {
            LoopState::Idle
        });

        let thread = thread::Builder::new()
            .name(format!("tabex-persist-{name}"))
            .spawn(move || run_loop(self, stop_rx, state_clone));

        match thread {
            Ok(thread) => Ok(PersistenceHandle {
                name,
                stop_tx: Some(stop_tx),
                state,
                thread: Some(thread),
            }),
            Err(err) => {
                state.set(LoopState::Stopped);
                Err(err)
            }
        }
    }
}

/// Handle to a running persistence loop.
///
/// Dropping the handle stops the loop and waits for its final save.
pub struct PersistenceHandle {
    name: String,
    stop_tx: Option<Sender<()>>,
    state: Arc<SharedState>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PersistenceHandle {
    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Signal the loop to stop and wait for its final save. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // A full channel means a stop is already queued.
            let _ = tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Persistence loop '{}' panicked", self.name);
                self.state.set(LoopState::Stopped);
            }
        }
    }
}

impl Drop for PersistenceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(config: PersistenceLoop, stop_rx: Receiver<()>, state: Arc<SharedState>) {
    let PersistenceLoop {
        target,
        poll_interval,
        load_on_start,
    } = config;
    info!("Persistence loop '{}' starting", target.name());

    if load_on_start {
        state.set(LoopState::Loading);
        target.load();
    }
    state.set(LoopState::Idle);

    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        if target.has_pending_changes() {
            state.set(LoopState::Saving);
            target.save();
            state.set(if target.has_pending_changes() {
                LoopState::Dirty
            } else {
                LoopState::Idle
            });
            continue;
        }

        state.set(LoopState::Idle);
        match stop_rx.recv_timeout(poll_interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    state.set(LoopState::Stopping);
    debug!("Persistence loop '{}' writing final save", target.name());
    target.save();
    state.set(LoopState::Stopped);
    info!("Persistence loop '{}' stopped", target.name());
}
