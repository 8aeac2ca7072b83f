/// Application composition point — owns both stores and their loops.
///
/// Startup order: settings are loaded first because they name the
/// folder-cache file and its freshness window; the cache is then started
/// and loads its snapshot in the background. Shutdown runs in reverse:
/// the cache writes its final snapshot, then the settings loop writes
/// its final save.
use crate::diagnostics::{default_observer, SharedObserver};
use crate::dircache::DirectorySizeCache;
use crate::error::StoreResult;
use crate::persist::{LoopState, PersistenceHandle, PersistenceLoop, DEFAULT_POLL_INTERVAL};
use crate::settings::{AppSettings, KeyedBinaryStore, SETTINGS_FILE_NAME};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Where the services keep their files and how they run.
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    /// Directory holding the settings file and the folder-size snapshot.
    pub settings_dir: PathBuf,
    /// How often each persistence loop checks for unsaved changes.
    pub poll_interval: Duration,
    /// Upper bound on concurrently sized subdirectories.
    pub worker_threads: usize,
}

impl ServicesConfig {
    pub fn new(settings_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings_dir: settings_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker_threads: num_cpus::get(),
        }
    }
}

/// The running settings store and folder-size cache.
pub struct Services {
    config: ServicesConfig,
    settings: Arc<KeyedBinaryStore>,
    folder_cache: Arc<DirectorySizeCache>,
    settings_loop: Option<PersistenceHandle>,
}

impl Services {
    pub fn start(config: ServicesConfig) -> StoreResult<Self> {
        Self::start_with_observer(config, default_observer())
    }

    /// Start with a failure observer shared by both stores.
    pub fn start_with_observer(config: ServicesConfig, observer: SharedObserver) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.settings_dir)?;

        let settings = Arc::new(KeyedBinaryStore::with_observer(
            config.settings_dir.join(SETTINGS_FILE_NAME),
            Arc::clone(&observer),
        ));
        // Read now so the cache below sees the stored name and interval.
        settings.load();
        let app = AppSettings::new(Arc::clone(&settings));
        let interval = app.folder_cache_invalidation_interval();
        let cache_path = config.settings_dir.join(app.folder_cache_name());

        let settings_loop = PersistenceLoop::new(settings.clone())
            .poll_interval(config.poll_interval)
            .load_on_start(false)
            .spawn()?;

        let folder_cache = Arc::new(
            DirectorySizeCache::builder()
                .worker_threads(config.worker_threads)
                .poll_interval(config.poll_interval)
                .observer(observer)
                .build()?,
        );
        folder_cache.start_caching(interval, cache_path)?;

        info!("Services started in {}", config.settings_dir.display());
        Ok(Self {
            config,
            settings,
            folder_cache,
            settings_loop: Some(settings_loop),
        })
    }

    pub fn settings_dir(&self) -> &Path {
        &self.config.settings_dir
    }

    pub fn settings(&self) -> &Arc<KeyedBinaryStore> {
        &self.settings
    }

    pub fn app_settings(&self) -> AppSettings {
        AppSettings::new(Arc::clone(&self.settings))
    }

    pub fn folder_cache(&self) -> &Arc<DirectorySizeCache> {
        &self.folder_cache
    }

    /// Size of `dir` through the folder cache.
    pub fn size_in_bytes(&self, dir: &Path) -> u64 {
        self.folder_cache.size_in_bytes(dir)
    }

    pub fn settings_loop_state(&self) -> LoopState {
        self.settings_loop
            .as_ref()
            .map_or(LoopState::Stopped, PersistenceHandle::state)
    }

    /// Stop both loops, writing final saves. Also runs on drop.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(mut settings_loop) = self.settings_loop.take() else {
            return;
        };
        self.folder_cache.stop_caching();
        settings_loop.stop();
        info!("Services stopped");
    }
}

impl Drop for Services {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_config(dir: &Path) -> ServicesConfig {
        ServicesConfig {
            poll_interval: Duration::from_millis(10),
            worker_threads: 2,
            ..ServicesConfig::new(dir)
        }
    }

    #[test]
    fn start_creates_settings_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("settings");
        let services = Services::start(fast_config(&dir)).unwrap();
        assert!(dir.is_dir());
        assert_eq!(services.settings_dir(), dir);
        assert!(services.folder_cache().is_caching());
        services.shutdown();
    }

    #[test]
    fn shutdown_writes_both_files() {
        let tmp = TempDir::new().unwrap();
        let services = Services::start(fast_config(tmp.path())).unwrap();
        services.size_in_bytes(tmp.path());
        services.shutdown();

        assert!(tmp.path().join(SETTINGS_FILE_NAME).is_file());
        assert!(tmp.path().join("foldercache.bin").is_file());
    }

    #[test]
    fn cache_file_name_comes_from_settings() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(KeyedBinaryStore::new(tmp.path().join(SETTINGS_FILE_NAME)));
        AppSettings::new(Arc::clone(&store))
            .set_folder_cache_name("sizes.dat")
            .unwrap();
        store.save();

        let services = Services::start(fast_config(tmp.path())).unwrap();
        services.shutdown();
        assert!(tmp.path().join("sizes.dat").is_file());
        assert!(!tmp.path().join("foldercache.bin").exists());
    }

    #[test]
    fn loop_state_is_stopped_after_shutdown_path() {
        let tmp = TempDir::new().unwrap();
        let mut services = Services::start(fast_config(tmp.path())).unwrap();
        assert_ne!(services.settings_loop_state(), LoopState::Stopped);
        services.stop();
        assert_eq!(services.settings_loop_state(), LoopState::Stopped);
        assert!(!services.folder_cache().is_caching());
    }
}
