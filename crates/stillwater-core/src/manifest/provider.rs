use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{MeditationManifest, SessionManifest, StretchManifest};
use crate::error::ManifestError;

/// Supplies session definitions to the controller.
pub trait ManifestProvider: Send + Sync {
    fn load_manifest(&self) -> Result<Arc<SessionManifest>, ManifestError>;
}

/// Reads the meditation and stretching catalogs from JSON files.
///
/// A catalog whose path is `None` is simply absent from the manifest.
#[derive(Debug, Clone, Default)]
pub struct FileManifestProvider {
    meditation_path: Option<PathBuf>,
    stretching_path: Option<PathBuf>,
}

impl FileManifestProvider {
    pub fn new(meditation_path: Option<PathBuf>, stretching_path: Option<PathBuf>) -> Self {
        Self {
            meditation_path,
            stretching_path,
        }
    }
}

fn read_catalog<T: DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Unavailable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content)
        .map_err(|e| ManifestError::ParseFailed(format!("{}: {e}", path.display())))
}

impl ManifestProvider for FileManifestProvider {
    fn load_manifest(&self) -> Result<Arc<SessionManifest>, ManifestError> {
        let meditation = self
            .meditation_path
            .as_deref()
            .map(read_catalog::<MeditationManifest>)
            .transpose()?;
        let stretching = self
            .stretching_path
            .as_deref()
            .map(read_catalog::<StretchManifest>)
            .transpose()?;

        let manifest = SessionManifest {
            meditation,
            stretching,
        };
        manifest.validate()?;
        info!(
            meditation_sessions = manifest.meditation.as_ref().map_or(0, |m| m.sessions.len()),
            stretch_regions = manifest.stretching.as_ref().map_or(0, |s| s.regions.len()),
            "manifest loaded"
        );
        Ok(Arc::new(manifest))
    }
}

/// Serves a manifest that is already in memory.
#[derive(Debug, Clone)]
pub struct StaticManifestProvider {
    manifest: Arc<SessionManifest>,
}

impl StaticManifestProvider {
    pub fn new(manifest: SessionManifest) -> Self {
        Self {
            manifest: Arc::new(manifest),
        }
    }
}

impl ManifestProvider for StaticManifestProvider {
    fn load_manifest(&self) -> Result<Arc<SessionManifest>, ManifestError> {
        Ok(self.manifest.clone())
    }
}

/// Caches the first successful load of an inner provider.
///
/// Failures are returned to the caller and not cached, so the next call
/// tries again; nothing retries on its own.
pub struct CachedManifestProvider<P> {
    inner: P,
    cached: Mutex<Option<Arc<SessionManifest>>>,
}

impl<P: ManifestProvider> CachedManifestProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cached.lock().map(|c| c.is_some()).unwrap_or(false)
    }
}

impl<P: ManifestProvider> ManifestProvider for CachedManifestProvider<P> {
    fn load_manifest(&self) -> Result<Arc<SessionManifest>, ManifestError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| ManifestError::Invalid("manifest cache poisoned".into()))?;
        if let Some(manifest) = cached.as_ref() {
            return Ok(manifest.clone());
        }
        let manifest = self.inner.load_manifest()?;
        debug!("manifest cached");
        *cached = Some(manifest.clone());
        Ok(manifest)
    }
}
