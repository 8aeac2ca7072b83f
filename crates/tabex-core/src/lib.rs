/// tabex core — folder-size cache and typed settings store.
///
/// This crate contains all of the explorer's non-UI state with zero UI
/// dependencies. A frontend queries folder sizes and reads/writes settings
/// through a [`services::Services`] instance it owns.
///
/// # Modules
///
/// - [`settings`] — Typed key/value store with a binary file format.
/// - [`dircache`] — Recursive directory sizes with a time-to-live.
/// - [`persist`] — Background loop that flushes dirty stores to disk.
/// - [`services`] — Startup/shutdown composition of the above.
/// - [`size`] — Human-readable byte counts.
/// - [`codec`] — Binary primitives shared by both file formats.
/// - [`diagnostics`] — Reporting for failures the stores swallow.
pub mod clock;
pub mod codec;
pub mod diagnostics;
pub mod dircache;
pub mod error;
pub mod persist;
pub mod services;
pub mod settings;
pub mod size;

pub use dircache::DirectorySizeCache;
pub use error::{StoreError, StoreResult};
pub use services::{Services, ServicesConfig};
pub use settings::{AppSettings, KeyedBinaryStore, SettingValue};
