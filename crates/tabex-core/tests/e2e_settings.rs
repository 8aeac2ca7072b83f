/// End-to-end settings store tests.
///
/// These tests drive `KeyedBinaryStore` and `AppSettings` against real
/// files in a temporary directory: every value kind is written by one
/// store and read back by a fresh one, and damaged files are checked to
/// leave the in-memory state alone.
use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use half::f16;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::fs;
use std::sync::Arc;
use tabex_core::codec;
use tabex_core::diagnostics::{Failure, Operation, SharedObserver};
use tabex_core::settings::{
    AppSettings, KeyedBinaryStore, SettingValue, ValueKind, SETTINGS_FILE_NAME,
};
use tempfile::TempDir;
use uuid::Uuid;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Observer that remembers which operations failed.
fn recording_observer() -> (SharedObserver, Arc<Mutex<Vec<Operation>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: SharedObserver = Arc::new(move |failure: &Failure<'_>| {
        sink.lock().push(failure.operation);
    });
    (observer, seen)
}

/// Boundary values for every kind: zero, min, max and -1 where the kind
/// has them, empty string and byte sequence, and the first and last
/// instants and widest durations the file format can hold.
fn boundary_values() -> Vec<(String, SettingValue)> {
    let first = codec::ticks_to_datetime(0).unwrap();
    let last = codec::ticks_to_datetime(codec::MAX_INSTANT_TICKS).unwrap();
    let east = FixedOffset::east_opt(14 * 3600).unwrap();
    let west = FixedOffset::west_opt(14 * 3600).unwrap();
    let unix = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();

    let values = vec![
        ("null", SettingValue::Null),
        ("bool/false", SettingValue::Bool(false)),
        ("bool/true", SettingValue::Bool(true)),
        ("u8/zero", SettingValue::U8(0)),
        ("u8/max", SettingValue::U8(u8::MAX)),
        ("i8/zero", SettingValue::I8(0)),
        ("i8/min", SettingValue::I8(i8::MIN)),
        ("i8/max", SettingValue::I8(i8::MAX)),
        ("i8/neg", SettingValue::I8(-1)),
        ("i16/zero", SettingValue::I16(0)),
        ("i16/min", SettingValue::I16(i16::MIN)),
        ("i16/max", SettingValue::I16(i16::MAX)),
        ("i16/neg", SettingValue::I16(-1)),
        ("u16/zero", SettingValue::U16(0)),
        ("u16/max", SettingValue::U16(u16::MAX)),
        ("i32/zero", SettingValue::I32(0)),
        ("i32/min", SettingValue::I32(i32::MIN)),
        ("i32/max", SettingValue::I32(i32::MAX)),
        ("i32/neg", SettingValue::I32(-1)),
        ("u32/zero", SettingValue::U32(0)),
        ("u32/max", SettingValue::U32(u32::MAX)),
        ("i64/zero", SettingValue::I64(0)),
        ("i64/min", SettingValue::I64(i64::MIN)),
        ("i64/max", SettingValue::I64(i64::MAX)),
        ("i64/neg", SettingValue::I64(-1)),
        ("u64/zero", SettingValue::U64(0)),
        ("u64/max", SettingValue::U64(u64::MAX)),
        ("isize/zero", SettingValue::ISize(0)),
        ("isize/min", SettingValue::ISize(isize::MIN)),
        ("isize/max", SettingValue::ISize(isize::MAX)),
        ("isize/neg", SettingValue::ISize(-1)),
        ("usize/zero", SettingValue::USize(0)),
        ("usize/max", SettingValue::USize(usize::MAX)),
        ("f16/zero", SettingValue::F16(f16::ZERO)),
        ("f16/min", SettingValue::F16(f16::MIN)),
        ("f16/max", SettingValue::F16(f16::MAX)),
        ("f16/neg", SettingValue::F16(f16::NEG_ONE)),
        ("f32/zero", SettingValue::F32(0.0)),
        ("f32/min", SettingValue::F32(f32::MIN)),
        ("f32/max", SettingValue::F32(f32::MAX)),
        ("f32/neg", SettingValue::F32(-1.0)),
        ("f32/tiny", SettingValue::F32(f32::MIN_POSITIVE)),
        ("f64/zero", SettingValue::F64(0.0)),
        ("f64/min", SettingValue::F64(f64::MIN)),
        ("f64/max", SettingValue::F64(f64::MAX)),
        ("f64/neg", SettingValue::F64(-1.0)),
        ("decimal/zero", SettingValue::Decimal(Decimal::ZERO)),
        ("decimal/min", SettingValue::Decimal(Decimal::MIN)),
        ("decimal/max", SettingValue::Decimal(Decimal::MAX)),
        ("decimal/neg", SettingValue::Decimal(Decimal::NEGATIVE_ONE)),
        ("string/empty", SettingValue::String(String::new())),
        ("string/text", SettingValue::String("ünïcødé ✓ path\\to\\x".to_owned())),
        ("string/long", SettingValue::String("x".repeat(70_000))),
        ("datetime/min", SettingValue::DateTime(first)),
        ("datetime/max", SettingValue::DateTime(last)),
        ("datetime/unix", SettingValue::DateTime(unix)),
        (
            "datetime_offset/min",
            SettingValue::DateTimeOffset(east.from_local_datetime(&first.naive_utc()).unwrap()),
        ),
        (
            "datetime_offset/max",
            SettingValue::DateTimeOffset(west.from_local_datetime(&last.naive_utc()).unwrap()),
        ),
        ("duration/zero", SettingValue::Duration(TimeDelta::zero())),
        ("duration/min", SettingValue::Duration(codec::ticks_to_duration(i64::MIN).unwrap())),
        ("duration/max", SettingValue::Duration(codec::ticks_to_duration(i64::MAX).unwrap())),
        ("duration/neg", SettingValue::Duration(TimeDelta::nanoseconds(-100))),
        ("uuid/nil", SettingValue::Uuid(Uuid::nil())),
        ("uuid/max", SettingValue::Uuid(Uuid::from_u128(u128::MAX))),
        ("bytes/empty", SettingValue::Bytes(Vec::new())),
        ("bytes/some", SettingValue::Bytes(vec![0, 1, 0xfe, 0xff])),
    ];
    values
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

// ── Round trips ──────────────────────────────────────────────────────────────

/// Every boundary value survives save and a load into a separate store.
#[test]
fn every_kind_survives_a_file_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SETTINGS_FILE_NAME);
    let values = boundary_values();
    for kind in ValueKind::ALL {
        assert!(
            values.iter().any(|(_, value)| value.kind() == kind),
            "no boundary value for {kind:?}"
        );
    }

    let writer = KeyedBinaryStore::new(&path);
    for (key, value) in &values {
        writer.set_value(key, value.clone()).unwrap();
    }
    assert_eq!(writer.try_save().unwrap(), values.len());

    let reader = KeyedBinaryStore::new(&path);
    assert_eq!(reader.try_load().unwrap(), values.len());
    for (key, value) in &values {
        assert_eq!(reader.get_value(key).as_ref(), Some(value), "key {key}");
    }
}

/// The basic set, save, reopen, get cycle.
#[test]
fn typed_value_is_read_back_by_new_store() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SETTINGS_FILE_NAME);

    let store = KeyedBinaryStore::new(&path);
    store.set("x", 42i32).unwrap();
    store.save();

    let reopened = KeyedBinaryStore::open(&path);
    assert_eq!(reopened.get("x", 0i32), 42);
    assert!(!reopened.has_pending_changes());
}

/// A default supplied on a miss is stored and written on the next save.
#[test]
fn default_on_miss_is_persisted() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SETTINGS_FILE_NAME);

    let store = KeyedBinaryStore::new(&path);
    assert_eq!(store.get("Greeting", "hello".to_owned()), "hello");
    assert!(store.has_pending_changes());
    store.save();
    assert!(!store.has_pending_changes());

    let reopened = KeyedBinaryStore::open(&path);
    assert_eq!(reopened.get("Greeting", String::new()), "hello");
}

/// Saving rewrites the file, so a shorter store leaves no trailing bytes.
#[test]
fn save_replaces_longer_previous_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SETTINGS_FILE_NAME);

    let store = KeyedBinaryStore::new(&path);
    store.set("blob", vec![7u8; 4096]).unwrap();
    store.save();
    let long_len = fs::metadata(&path).unwrap().len();

    let small = KeyedBinaryStore::new(&path);
    small.set("flag", true).unwrap();
    small.save();
    assert!(fs::metadata(&path).unwrap().len() < long_len);

    let reopened = KeyedBinaryStore::open(&path);
    assert_eq!(reopened.keys(), vec!["flag".to_owned()]);
}

/// A value the file cannot hold is refused up front, so the settings
/// already on disk stay readable.
#[test]
fn unwritable_value_does_not_damage_saved_settings() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SETTINGS_FILE_NAME);

    let store = KeyedBinaryStore::new(&path);
    store.set("keep", 7i32).unwrap();
    store.set("name", "hello".to_owned()).unwrap();
    store.save();

    assert!(store.set("ttl", TimeDelta::MAX).is_err());
    assert!(store
        .set("when", Utc.with_ymd_and_hms(30_000, 1, 1, 0, 0, 0).unwrap())
        .is_err());
    assert_eq!(store.try_save().unwrap(), 2);

    let reopened = KeyedBinaryStore::new(&path);
    assert_eq!(reopened.try_load().unwrap(), 2);
    assert_eq!(reopened.get("keep", 0i32), 7);
    assert_eq!(reopened.get("name", String::new()), "hello");
    assert!(reopened.get_value("ttl").is_none());
}

// ── Damaged files ────────────────────────────────────────────────────────────

/// A file cut off right after its entry count leaves memory untouched and
/// reports the failure.
#[test]
fn truncated_file_keeps_prior_contents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SETTINGS_FILE_NAME);
    fs::write(&path, 3i32.to_le_bytes()).unwrap();

    let (observer, seen) = recording_observer();
    let store = KeyedBinaryStore::with_observer(&path, observer);
    store.set("kept", 1u16).unwrap();
    store.load();

    assert_eq!(store.get("kept", 0u16), 1);
    assert_eq!(store.len(), 1);
    assert_eq!(*seen.lock(), vec![Operation::LoadSettings]);
}

/// A missing file is an empty store, not a failure.
#[test]
fn missing_file_loads_as_empty() {
    let tmp = TempDir::new().unwrap();
    let (observer, seen) = recording_observer();
    let store = KeyedBinaryStore::with_observer(tmp.path().join("absent.bin"), observer);
    store.load();
    assert!(store.is_empty());
    assert!(seen.lock().is_empty());
}

/// Saving into a directory that does not exist is reported, not raised.
#[test]
fn unwritable_path_reports_save_failure() {
    let tmp = TempDir::new().unwrap();
    let (observer, seen) = recording_observer();
    let store = KeyedBinaryStore::with_observer(tmp.path().join("nope").join("s.bin"), observer);
    store.set("a", 1u8).unwrap();
    store.save();
    assert_eq!(*seen.lock(), vec![Operation::SaveSettings]);
    // The failed save is not retried until the next change.
    assert!(!store.has_pending_changes());
}

// ── Application settings ─────────────────────────────────────────────────────

/// Application settings read their defaults and persist overrides.
#[test]
fn app_settings_persist_overrides() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SETTINGS_FILE_NAME);

    let store = Arc::new(KeyedBinaryStore::new(&path));
    let app = AppSettings::new(Arc::clone(&store));
    assert_eq!(app.folder_cache_name(), "foldercache.bin");
    assert_eq!(app.folder_cache_invalidation_interval(), TimeDelta::minutes(15));

    app.set_folder_cache_invalidation_interval(TimeDelta::minutes(2))
        .unwrap();
    store.save();

    let reopened = AppSettings::new(Arc::new(KeyedBinaryStore::open(&path)));
    assert_eq!(reopened.folder_cache_invalidation_interval(), TimeDelta::minutes(2));
    assert_eq!(reopened.folder_cache_name(), "foldercache.bin");
}

/// Timestamps keep their instant and offset through the file.
#[test]
fn offset_timestamp_keeps_offset() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SETTINGS_FILE_NAME);
    let offset = FixedOffset::east_opt(5 * 3600 + 45 * 60).unwrap();
    let stamp: DateTime<FixedOffset> = offset.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();

    let store = KeyedBinaryStore::new(&path);
    store.set("LastOpened", stamp).unwrap();
    store.save();

    let read = KeyedBinaryStore::open(&path).get("LastOpened", DateTime::<FixedOffset>::default());
    assert_eq!(read, stamp);
    assert_eq!(read.offset(), stamp.offset());
}
