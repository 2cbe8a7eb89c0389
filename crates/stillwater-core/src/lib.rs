//! # Stillwater Core Library
//!
//! Core logic for Stillwater, a guided session timer for narrated meditation
//! and timed stretching routines. The CLI is one front end over this
//! library; any other shell supplies its own audio and persistence ports.
//!
//! ## Architecture
//!
//! - **Manifest**: meditation sessions and stretch regions loaded from JSON
//! - **Timer**: a wall-clock session clock, a randomized cue scheduler and a
//!   pure state machine that returns effects instead of performing them
//! - **Controller**: async wrapper that owns the ticker, the pause watchdog
//!   and the audio port
//! - **Storage**: TOML configuration, SQLite history and the saved-session
//!   snapshot
//! - **Recovery**: decides at startup whether a saved session can resume
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: core session state machine
//! - [`SessionController`]: async driver for the engine
//! - [`CueScheduler`]: narration timeline generation
//! - [`RecoveryController`]: saved-session classification
//! - [`Config`]: application configuration management

pub mod audio;
pub mod controller;
pub mod error;
pub mod events;
pub mod manifest;
pub mod recovery;
pub mod storage;
pub mod timer;

pub use audio::{AudioOrchestrator, AudioPort, PlaybackState, RemoteCommand, RemoteControls};
pub use controller::{ControllerSettings, SessionController};
pub use error::{
    AudioError, ConfigError, CoreError, ManifestError, PersistenceError, Result, ValidationError,
};
pub use events::{CompletedItem, SessionEvent, SessionSummary};
pub use manifest::{
    CachedManifestProvider, FileManifestProvider, ManifestProvider, SessionManifest,
    StaticManifestProvider,
};
pub use recovery::{DiscardReason, RecoveryAssessment, RecoveryController, SavedSession};
pub use storage::{
    Config, Database, MemoryPersistence, PersistencePort, SnapshotStore, SqlitePersistence,
};
pub use timer::{
    CueScheduler, ManualClock, RegionSelection, ScheduledCue, SessionEngine, SessionPlan,
    SessionSelection, SessionSnapshot, SessionStatus, SessionView, SystemClock, TimeSource,
};
