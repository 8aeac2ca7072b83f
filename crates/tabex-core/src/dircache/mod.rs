/// Directory size cache — recursive folder sizes with a time-to-live.
///
/// A size is computed by summing the directory's own files and, in
/// parallel on a bounded rayon pool, the sizes of its subdirectories.
/// Every directory visited gets its own entry, so sizing a parent also
/// warms the cache for all of its descendants.
///
/// Entries stay valid for the invalidation interval (15 minutes by
/// default) and are never invalidated by filesystem changes. Stale
/// entries remain in memory until recomputed but are not persisted.
///
/// Links to directories (symlinks, junctions) are listed but contribute
/// nothing, which also keeps link cycles from recursing forever.
pub mod key;
pub mod reader;
pub mod snapshot;

pub use key::DirectoryKey;
pub use reader::{ChildDirectory, DirectoryReader, FsDirectoryReader};

use crate::clock::{Clock, SystemClock};
use crate::diagnostics::{default_observer, Failure, Operation, SharedObserver};
use crate::error::{StoreError, StoreResult};
use crate::persist::{PersistenceHandle, PersistenceLoop, Persistent, DEFAULT_POLL_INTERVAL};
use crate::settings::app::DEFAULT_INVALIDATION_INTERVAL;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use snapshot::SnapshotRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A cached cumulative size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCacheEntry {
    pub size_bytes: u64,
    pub computed_at: DateTime<Utc>,
}

impl SizeCacheEntry {
    /// An expiry past the end of representable time never arrives; one
    /// before its start has always passed.
    pub fn is_fresh(&self, interval: TimeDelta, now: DateTime<Utc>) -> bool {
        match self.computed_at.checked_add_signed(interval) {
            Some(expires) => expires > now,
            None => interval > TimeDelta::zero(),
        }
    }
}

/// Builder for [`DirectorySizeCache`].
pub struct SizeCacheBuilder {
    worker_threads: usize,
    poll_interval: Duration,
    invalidation_interval: TimeDelta,
    reader: Arc<dyn DirectoryReader>,
    clock: Arc<dyn Clock>,
    observer: SharedObserver,
}

impl Default for SizeCacheBuilder {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            invalidation_interval: DEFAULT_INVALIDATION_INTERVAL,
            reader: Arc::new(FsDirectoryReader),
            clock: Arc::new(SystemClock),
            observer: default_observer(),
        }
    }
}

impl SizeCacheBuilder {
    /// Upper bound on concurrently sized subdirectories. Zero means one.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// How often the persistence loop checks for unsaved entries.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn invalidation_interval(mut self, interval: TimeDelta) -> Self {
        self.invalidation_interval = interval;
        self
    }

    pub fn reader(mut self, reader: Arc<dyn DirectoryReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> StoreResult<DirectorySizeCache> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads)
            .thread_name(|i| format!("tabex-sizer-{i}"))
            .build()?;

        Ok(DirectorySizeCache {
            entries: RwLock::new(HashMap::new()),
            interval: RwLock::new(self.invalidation_interval),
            dirty: AtomicBool::new(false),
            pool,
            poll_interval: self.poll_interval,
            reader: self.reader,
            clock: self.clock,
            observer: self.observer,
            caching: Mutex::new(None),
        })
    }
}

/// Thread-safe cache of recursive directory sizes.
pub struct DirectorySizeCache {
    entries: RwLock<HashMap<DirectoryKey, SizeCacheEntry>>,
    interval: RwLock<TimeDelta>,
    dirty: AtomicBool,
    pool: rayon::ThreadPool,
    poll_interval: Duration,
    reader: Arc<dyn DirectoryReader>,
    clock: Arc<dyn Clock>,
    observer: SharedObserver,
    /// Running persistence loop, if caching was started.
    caching: Mutex<Option<PersistenceHandle>>,
}

impl DirectorySizeCache {
    pub fn builder() -> SizeCacheBuilder {
        SizeCacheBuilder::default()
    }

    /// Cache with default settings: hardware-parallel pool, real filesystem,
    /// wall clock, 15-minute freshness.
    pub fn new() -> StoreResult<Self> {
        Self::builder().build()
    }

    pub fn invalidation_interval(&self) -> TimeDelta {
        *self.interval.read()
    }

    pub fn set_invalidation_interval(&self, interval: TimeDelta) {
        *self.interval.write() = interval;
    }

    /// `true` while computed sizes exist that no save has started on.
    pub fn has_pending_changes(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Number of entries in memory, fresh or stale.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// The entry for `dir`, fresh or stale.
    pub fn entry(&self, dir: &Path) -> Option<SizeCacheEntry> {
        self.entries.read().get(&DirectoryKey::for_path(dir)).copied()
    }

    /// Cumulative size of `dir` in bytes.
    ///
    /// Served from the cache when a fresh entry exists; otherwise the
    /// directory is walked and the result (and every subdirectory's) is
    /// stored. Unreadable directories count as empty.
    pub fn size_in_bytes(&self, dir: &Path) -> u64 {
        self.pool.install(|| self.size_of(dir))
    }

    fn fresh_entry(&self, key: DirectoryKey) -> Option<SizeCacheEntry> {
        let entry = self.entries.read().get(&key).copied()?;
        entry
            .is_fresh(self.invalidation_interval(), self.clock.now())
            .then_some(entry)
    }

    fn size_of(&self, dir: &Path) -> u64 {
        let key = DirectoryKey::for_path(dir);
        if let Some(entry) = self.fresh_entry(key) {
            return entry.size_bytes;
        }

        let start = Instant::now();

        // Both listings finish before any recursion so the directory
        // handles are released early.
        let files = self
            .reader
            .list_file_sizes(dir)
            .unwrap_or_else(|err| self.report_listing(Operation::ListFiles, dir, err));
        let subdirs = self
            .reader
            .list_subdirectories(dir)
            .unwrap_or_else(|err| self.report_listing(Operation::ListSubdirectories, dir, err));

        let total = AtomicU64::new(files.iter().sum());
        subdirs
            .par_iter()
            .filter(|child| !child.is_link)
            .for_each(|child| {
                total.fetch_add(self.size_of(&child.path), Ordering::Relaxed);
            });
        let size = total.into_inner();

        self.entries.write().insert(
            key,
            SizeCacheEntry {
                size_bytes: size,
                computed_at: self.clock.now(),
            },
        );
        self.dirty.store(true, Ordering::Release);

        debug!(
            "Sized {} = {size} bytes in {:?}",
            dir.display(),
            start.elapsed()
        );
        size
    }

    fn report_listing<T>(&self, operation: Operation, dir: &Path, err: io::Error) -> Vec<T> {
        let error = StoreError::from(err);
        self.observer.observe(&Failure {
            operation,
            path: dir,
            error: &error,
        });
        Vec::new()
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Write fresh entries to `path`; failures are reported, not returned.
    pub fn save(&self, path: &Path) {
        if let Err(error) = self.try_save(path) {
            self.observer.observe(&Failure {
                operation: Operation::SaveSizeCache,
                path,
                error: &error,
            });
        }
    }

    /// Merge fresh entries from `path`; failures are reported, not returned.
    pub fn load(&self, path: &Path) {
        if let Err(error) = self.try_load(path) {
            self.observer.observe(&Failure {
                operation: Operation::LoadSizeCache,
                path,
                error: &error,
            });
        }
    }

    /// Save returning the error. Returns the number of entries written.
    ///
    /// The dirty flag is cleared before the snapshot is taken. Stale
    /// entries are skipped.
    pub fn try_save(&self, path: &Path) -> StoreResult<usize> {
        self.dirty.store(false, Ordering::Release);

        let interval = self.invalidation_interval();
        let now = self.clock.now();
        let records: Vec<SnapshotRecord> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_fresh(interval, now))
            .map(|(&key, entry)| SnapshotRecord {
                key,
                size: entry.size_bytes,
                computed_at: entry.computed_at,
            })
            .collect();

        let mut buf = Vec::new();
        snapshot::write_snapshot(&mut buf, &records)?;
        // Truncate only after every record has been encoded.
        let mut file = File::create(path)?;
        file.write_all(&buf)?;
        file.flush()?;
        debug!("Saved {} folder sizes to {}", records.len(), path.display());
        Ok(records.len())
    }

    /// Load returning the error. Returns the number of fresh entries merged.
    ///
    /// Nothing is merged unless the whole file reads cleanly. A missing
    /// file merges nothing.
    pub fn try_load(&self, path: &Path) -> StoreResult<usize> {
        let records = match File::open(path) {
            Ok(file) => snapshot::read_snapshot(&mut BufReader::new(file))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let interval = self.invalidation_interval();
        let now = self.clock.now();
        let mut merged = 0;
        {
            let mut entries = self.entries.write();
            for record in records {
                let entry = SizeCacheEntry {
                    size_bytes: record.size,
                    computed_at: record.computed_at,
                };
                if entry.is_fresh(interval, now) {
                    entries.insert(record.key, entry);
                    merged += 1;
                }
            }
            self.dirty.store(false, Ordering::Release);
        }
        debug!("Loaded {merged} folder sizes from {}", path.display());
        Ok(merged)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Set the freshness window and start persisting to `path`.
    ///
    /// The background loop loads `path` first, then saves whenever new
    /// sizes were computed. A loop already running is stopped (with its
    /// final save) before the new one starts.
    pub fn start_caching(self: &Arc<Self>, interval: TimeDelta, path: impl Into<PathBuf>) -> io::Result<()> {
        self.stop_caching();
        self.set_invalidation_interval(interval);

        let path = path.into();
        info!(
            "Folder size caching to {} (valid for {}s)",
            path.display(),
            interval.num_seconds()
        );
        let target = Arc::new(CacheSnapshot {
            cache: Arc::clone(self),
            path,
        });
        let handle = PersistenceLoop::new(target)
            .poll_interval(self.poll_interval)
            .spawn()?;
        *self.caching.lock() = Some(handle);
        Ok(())
    }

    /// Stop the persistence loop and wait for its final save. No-op when
    /// caching is not running.
    pub fn stop_caching(&self) {
        let handle = self.caching.lock().take();
        if let Some(mut handle) = handle {
            handle.stop();
        }
    }

    pub fn is_caching(&self) -> bool {
        self.caching.lock().is_some()
    }
}

/// Binds the cache to its snapshot file for the persistence loop.
///
/// Holds a strong reference to the cache, so the cache lives at least
/// until [`DirectorySizeCache::stop_caching`] is called.
struct CacheSnapshot {
    cache: Arc<DirectorySizeCache>,
    path: PathBuf,
}

impl Persistent for CacheSnapshot {
    fn name(&self) -> &str {
        "folder-cache"
    }

    fn load(&self) {
        self.cache.load(&self.path);
    }

    fn save(&self) {
        self.cache.save(&self.path);
    }

    fn has_pending_changes(&self) -> bool {
        self.cache.has_pending_changes()
    }
}
