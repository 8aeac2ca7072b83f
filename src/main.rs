//! tabex — headless host for the explorer's folder-size cache and settings.
//!
//! Thin binary entry point. All logic lives in the `tabex-core` crate.
//! Sizes every directory given on the command line through the cache,
//! then shuts the services down so both stores are written to disk.

use std::path::{Path, PathBuf};
use tabex_core::size::format_size;
use tabex_core::{Services, ServicesConfig};

/// Settings live in this directory next to the executable.
const SETTINGS_DIR_NAME: &str = "settings";

fn main() -> anyhow::Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("tabex starting");

    let settings_dir = settings_dir_for(&std::env::current_exe()?)?;
    let services = Services::start(ServicesConfig::new(settings_dir))
        .map_err(|e| anyhow::anyhow!("failed to start services: {e}"))?;

    for dir in std::env::args_os().skip(1).map(PathBuf::from) {
        let bytes = services.size_in_bytes(&dir);
        tracing::info!("{}: {} ({bytes} bytes)", dir.display(), format_size(bytes));
    }

    services.shutdown();
    Ok(())
}

fn settings_dir_for(exe: &Path) -> anyhow::Result<PathBuf> {
    let app_dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("executable path has no parent: {}", exe.display()))?;
    Ok(app_dir.join(SETTINGS_DIR_NAME))
}
