/// Typed key/value settings store with a custom binary file format.
///
/// Values are read with [`KeyedBinaryStore::get`], which fills in and
/// persists the caller's default on a miss, and written with
/// [`KeyedBinaryStore::set`]. Every mutation sets a dirty flag that the
/// background persistence loop polls. A value that could not be written
/// back (see [`SettingValue::validate`]) is refused by `set` and never
/// enters the store.
///
/// # File format
///
/// ```text
/// file  := entry_count:i32 entry*
/// entry := key:string type_tag:string payload
/// ```
///
/// See [`value`] for the tags and payload layouts.
///
/// # Failure behaviour
///
/// `load` and `save` never fail from the caller's point of view. A failed
/// load leaves the in-memory entries untouched; a failed save leaves the
/// dirty flag cleared, so it is not retried until the next mutation.
/// The file is only replaced once the whole store has been encoded.
/// Both report to the store's [`FailureObserver`](crate::diagnostics::FailureObserver).
pub mod app;
pub mod value;

pub use app::AppSettings;
pub use value::{SettingType, SettingValue, ValueKind};

use crate::codec;
use crate::diagnostics::{default_observer, Failure, Operation, SharedObserver};
use crate::error::StoreResult;
use crate::persist::Persistent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// File name of the settings store inside the settings directory.
pub const SETTINGS_FILE_NAME: &str = "settings.bin";

/// Thread-safe, dirty-tracked map from key to [`SettingValue`].
pub struct KeyedBinaryStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, SettingValue>>,
    dirty: AtomicBool,
    observer: SharedObserver,
}

impl KeyedBinaryStore {
    /// Create an empty store backed by `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_observer(path, default_observer())
    }

    pub fn with_observer(path: impl Into<PathBuf>, observer: SharedObserver) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            observer,
        }
    }

    /// Create a store and load its file immediately.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self::new(path);
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` while mutations exist that no save has started on.
    pub fn has_pending_changes(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Stored value for `key` if it is a `T`; otherwise store `default`
    /// under `key` and return it. A default that fails validation is
    /// returned without being stored.
    pub fn get<T>(&self, key: &str, default: T) -> T
    where
        T: SettingType + Clone,
    {
        if let Some(found) = self.entries.read().get(key).and_then(T::from_value) {
            return found;
        }

        let value = default.clone().into_value();
        if let Err(err) = value.validate() {
            warn!("Default for setting '{key}' not stored: {err}");
            return default;
        }

        let mut entries = self.entries.write();
        // Another caller may have filled the key between the two locks.
        if let Some(found) = entries.get(key).and_then(T::from_value) {
            return found;
        }
        entries.insert(key.to_owned(), value);
        self.dirty.store(true, Ordering::Release);
        default
    }

    /// Overwrite `key` with `value` and return `value`. Values that fail
    /// [`SettingValue::validate`] are rejected and the store is unchanged.
    pub fn set<T>(&self, key: &str, value: T) -> StoreResult<T>
    where
        T: SettingType + Clone,
    {
        self.set_value(key, value.clone().into_value())?;
        Ok(value)
    }

    /// Untyped read, including the `Null` marker.
    pub fn get_value(&self, key: &str) -> Option<SettingValue> {
        self.entries.read().get(key).cloned()
    }

    /// Untyped write; the only way to store [`SettingValue::Null`].
    pub fn set_value(&self, key: &str, value: SettingValue) -> StoreResult<()> {
        value.validate()?;
        self.entries.write().insert(key.to_owned(), value);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Snapshot of all keys, unordered.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Read the backing file and merge it in; failures are reported, not returned.
    pub fn load(&self) {
        if let Err(error) = self.try_load() {
            self.observer.observe(&Failure {
                operation: Operation::LoadSettings,
                path: &self.path,
                error: &error,
            });
        }
    }

    /// Write all entries to the backing file; failures are reported, not returned.
    pub fn save(&self) {
        if let Err(error) = self.try_save() {
            self.observer.observe(&Failure {
                operation: Operation::SaveSettings,
                path: &self.path,
                error: &error,
            });
        }
    }

    /// Load returning the error. On success returns the number of entries
    /// read; on error the in-memory entries are untouched.
    ///
    /// A missing or empty file reads as zero entries.
    pub fn try_load(&self) -> StoreResult<usize> {
        let staged = match File::open(&self.path) {
            Ok(file) => read_entries(&mut BufReader::new(file))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        let count = staged.len();
        {
            let mut entries = self.entries.write();
            entries.extend(staged);
            self.dirty.store(false, Ordering::Release);
        }
        debug!("Loaded {count} settings from {}", self.path.display());
        Ok(count)
    }

    /// Save returning the error. Returns the number of entries written.
    ///
    /// The dirty flag is cleared before the snapshot is taken, so a
    /// mutation racing with the write re-dirties the store.
    pub fn try_save(&self) -> StoreResult<usize> {
        self.dirty.store(false, Ordering::Release);
        let snapshot: Vec<(String, SettingValue)> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut buf = Vec::new();
        write_entries(&mut buf, &snapshot)?;
        // Truncate only after the whole store has been encoded.
        let mut file = File::create(&self.path)?;
        file.write_all(&buf)?;
        file.flush()?;
        debug!(
            "Saved {} settings to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot.len())
    }
}

impl Persistent for KeyedBinaryStore {
    fn name(&self) -> &str {
        "settings"
    }

    fn load(&self) {
        KeyedBinaryStore::load(self);
    }

    fn save(&self) {
        KeyedBinaryStore::save(self);
    }

    fn has_pending_changes(&self) -> bool {
        KeyedBinaryStore::has_pending_changes(self)
    }
}

/// Decode a whole settings file. An empty input is an empty store.
fn read_entries<R: io::BufRead>(rd: &mut R) -> StoreResult<HashMap<String, SettingValue>> {
    if rd.fill_buf()?.is_empty() {
        return Ok(HashMap::new());
    }

    let count = codec::read_count(rd)?;
    let mut staged = HashMap::with_capacity(count.min(4_096));
    for _ in 0..count {
        let key = codec::read_string(rd)?;
        let value = SettingValue::decode(rd)?;
        staged.insert(key, value);
    }
    Ok(staged)
}

fn write_entries<W: Write>(wr: &mut W, entries: &[(String, SettingValue)]) -> StoreResult<()> {
    codec::write_count(wr, entries.len())?;
    for (key, value) in entries {
        codec::write_string(wr, key)?;
        value.encode(wr)?;
    }
    Ok(())
}
