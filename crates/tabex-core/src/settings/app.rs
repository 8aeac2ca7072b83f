/// Named application settings on top of the raw store.
use super::KeyedBinaryStore;
use crate::error::StoreResult;
use chrono::TimeDelta;
use std::sync::Arc;

pub const DEFAULT_FOLDER_CACHE_NAME: &str = "foldercache.bin";

/// Folder sizes stay valid for this long after they were computed.
pub const DEFAULT_INVALIDATION_INTERVAL: TimeDelta = TimeDelta::minutes(15);

const FOLDER_CACHE_NAME: &str = "FolderCacheName";
const FOLDER_CACHE_INVALIDATION_INTERVAL: &str = "FolderCacheInvalidationInterval";

/// Typed accessors for the settings the rest of the core reads.
///
/// Reading a setting that was never written stores its default, so the
/// next save writes it out and users can find it in the file.
#[derive(Clone)]
pub struct AppSettings {
    store: Arc<KeyedBinaryStore>,
}

impl AppSettings {
    pub fn new(store: Arc<KeyedBinaryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<KeyedBinaryStore> {
        &self.store
    }

    /// File name of the folder-size snapshot inside the settings directory.
    pub fn folder_cache_name(&self) -> String {
        self.store
            .get(FOLDER_CACHE_NAME, DEFAULT_FOLDER_CACHE_NAME.to_string())
    }

    pub fn set_folder_cache_name(&self, name: impl Into<String>) -> StoreResult<String> {
        self.store.set(FOLDER_CACHE_NAME, name.into())
    }

    pub fn folder_cache_invalidation_interval(&self) -> TimeDelta {
        self.store
            .get(FOLDER_CACHE_INVALIDATION_INTERVAL, DEFAULT_INVALIDATION_INTERVAL)
    }

    /// Rejects intervals too long to be written to the settings file.
    pub fn set_folder_cache_invalidation_interval(
        &self,
        interval: TimeDelta,
    ) -> StoreResult<TimeDelta> {
        self.store.set(FOLDER_CACHE_INVALIDATION_INTERVAL, interval)
    }
}
