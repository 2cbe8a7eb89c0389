mod config;
pub mod database;
mod snapshot_store;

pub use config::{AudioConfig, Config, ManifestConfig, TimingConfig};
pub use database::{Database, SessionRecord, Stats};
pub use snapshot_store::{
    MemoryPersistence, PersistencePort, SnapshotStore, SqlitePersistence, SNAPSHOT_KEY,
};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/stillwater[-dev]/` based on STILLWATER_ENV.
///
/// Set STILLWATER_ENV=dev to use the development data directory, or
/// STILLWATER_DATA_DIR to use an explicit directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("STILLWATER_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env =
                std::env::var("STILLWATER_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("stillwater-dev")
            } else {
                base_dir.join("stillwater")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
