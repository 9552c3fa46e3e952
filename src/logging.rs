//! Log output setup shared by both binaries.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install a subscriber that appends plain-text logs to `file`.
///
/// `RUST_LOG` overrides `level` when set.
pub fn init(level: &str, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let log_file = OpenOptions::new().create(true).append(true).open(file)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init()
        .map_err(|e| -> Box<dyn std::error::Error> { e })
}
