//! Core error types for stillwater-core.
//!
//! Only audio failures ever reach the user; everything else is logged and
//! degraded at the boundary where it happens.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for stillwater-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Manifest loading or resolution errors
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot persistence errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Audio playback errors
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Manifest-specific errors.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("Manifest unavailable at {path}: {message}")]
    Unavailable { path: PathBuf, message: String },

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {0}")]
    ParseFailed(String),

    /// The manifest parsed but violates a structural rule.
    #[error("Invalid manifest: {0}")]
    Invalid(String),

    /// No catalog of the requested kind was loaded.
    #[error("No {0} catalog loaded")]
    MissingCatalog(&'static str),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session '{session_id}' has no {duration_minutes}-minute variant")]
    UnknownVariant {
        session_id: String,
        duration_minutes: u32,
    },

    #[error("Unknown stretch region: {0}")]
    UnknownRegion(String),

    #[error("Stretch region '{0}' has no stretches")]
    EmptyRegion(String),

    /// The selection names nothing to play.
    #[error("Selection is empty")]
    EmptySelection,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not determine where configuration lives
    #[error("Cannot determine data directory: {0}")]
    DataDir(String),
}

/// Snapshot persistence errors.
///
/// These never interrupt a running session; the snapshot store logs them and
/// treats the snapshot as absent.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage backend failed: {0}")]
    Backend(String),

    #[error("Snapshot could not be encoded: {0}")]
    Encode(String),

    #[error("Snapshot could not be decoded: {0}")]
    Decode(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Out of bounds
    #[error("Index {index} out of bounds for {collection} (length: {len})")]
    OutOfBounds {
        collection: String,
        index: usize,
        len: usize,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// A narration or bell that failed to load or play.
///
/// Carries the audio reference so the UI can offer a retry of the same clip.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[error("Failed to play '{audio_ref}': {message}")]
pub struct AudioError {
    pub audio_ref: String,
    pub message: String,
}

impl AudioError {
    pub fn new(audio_ref: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            audio_ref: audio_ref.into(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::Backend(err.to_string())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Persistence(err.into())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::InvalidValue {
            key: "<file>".into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
