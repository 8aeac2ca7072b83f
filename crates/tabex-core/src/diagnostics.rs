/// Failure reporting for operations that never fail from the caller's view.
///
/// Loads, saves, and directory listings swallow their errors so the
/// application keeps running against whatever state it already has. The
/// swallowed error is still handed to a [`FailureObserver`]; the default
/// [`LogObserver`] writes it to the `tracing` log.
use crate::error::StoreError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// The operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LoadSettings,
    SaveSettings,
    LoadSizeCache,
    SaveSizeCache,
    /// Listing the immediate child files of a directory.
    ListFiles,
    /// Listing the immediate child directories of a directory.
    ListSubdirectories,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Self::LoadSettings => "load settings",
            Self::SaveSettings => "save settings",
            Self::LoadSizeCache => "load size cache",
            Self::SaveSizeCache => "save size cache",
            Self::ListFiles => "list files",
            Self::ListSubdirectories => "list subdirectories",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single swallowed failure.
#[derive(Debug)]
pub struct Failure<'a> {
    pub operation: Operation,
    pub path: &'a Path,
    pub error: &'a StoreError,
}

/// Receives every failure the stores swallow.
///
/// Called synchronously on the thread where the failure happened, which
/// may be a sizing worker or a persistence loop thread.
pub trait FailureObserver: Send + Sync {
    fn observe(&self, failure: &Failure<'_>);
}

/// Shared observer handle, cloned into each store.
pub type SharedObserver = Arc<dyn FailureObserver>;

/// Default observer: logs at WARN.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl FailureObserver for LogObserver {
    fn observe(&self, failure: &Failure<'_>) {
        warn!(
            "{} failed for {}: {}",
            failure.operation,
            failure.path.display(),
            failure.error
        );
    }
}

/// The observer used when none is injected.
pub fn default_observer() -> SharedObserver {
    Arc::new(LogObserver)
}

/// Adapter so closures can be used as observers.
impl<F> FailureObserver for F
where
    F: Fn(&Failure<'_>) + Send + Sync,
{
    fn observe(&self, failure: &Failure<'_>) {
        self(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn closure_observer_receives_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: SharedObserver = Arc::new(move |f: &Failure<'_>| {
            sink.lock().push((f.operation, f.path.to_path_buf()));
        });

        let err = StoreError::NegativeCount(-1);
        observer.observe(&Failure {
            operation: Operation::LoadSettings,
            path: Path::new("settings.bin"),
            error: &err,
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Operation::LoadSettings);
        assert_eq!(seen[0].1, Path::new("settings.bin"));
    }

    #[test]
    fn log_observer_does_not_panic() {
        let err = StoreError::VarintTooLong;
        LogObserver.observe(&Failure {
            operation: Operation::SaveSizeCache,
            path: Path::new("foldercache.bin"),
            error: &err,
        });
    }
}
