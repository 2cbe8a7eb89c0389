pub mod config;
pub mod history;
pub mod manifest;
pub mod recover;
pub mod run;
pub mod schedule;

use std::path::PathBuf;
use std::sync::Arc;

use stillwater_core::storage::data_dir;
use stillwater_core::{
    CachedManifestProvider, Config, FileManifestProvider, ManifestProvider, SessionManifest,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Catalog paths given on the command line.
pub struct Catalogs {
    pub meditation: Option<PathBuf>,
    pub stretching: Option<PathBuf>,
}

/// Flag, then config, then `<data dir>/<file>` if it exists.
fn resolve(flag: &Option<PathBuf>, configured: &Option<String>, file: &str) -> Option<PathBuf> {
    flag.clone()
        .or_else(|| configured.as_ref().map(PathBuf::from))
        .or_else(|| {
            data_dir()
                .ok()
                .map(|dir| dir.join(file))
                .filter(|path| path.is_file())
        })
}

impl Catalogs {
    pub fn provider(&self, config: &Config) -> CachedManifestProvider<FileManifestProvider> {
        let meditation = resolve(
            &self.meditation,
            &config.manifest.meditation_path,
            "meditation.json",
        );
        let stretching = resolve(
            &self.stretching,
            &config.manifest.stretching_path,
            "stretching.json",
        );
        CachedManifestProvider::new(FileManifestProvider::new(meditation, stretching))
    }

    pub fn load(&self, config: &Config) -> Result<Arc<SessionManifest>, Box<dyn std::error::Error>> {
        let manifest = self.provider(config).load_manifest()?;
        if manifest.meditation.is_none() && manifest.stretching.is_none() {
            return Err("no catalogs found; pass --meditation/--stretching or set manifest.meditation_path".into());
        }
        Ok(manifest)
    }
}

pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}
