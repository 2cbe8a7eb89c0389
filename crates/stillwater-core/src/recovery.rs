//! Startup recovery of a saved session.
//!
//! On launch the saved snapshot is classified once: resumable snapshots are
//! offered to the user, everything else is cleared without a prompt.

use serde::Serialize;
use tracing::info;

use crate::storage::SnapshotStore;
use crate::timer::{SessionSnapshot, SessionStatus};

/// Why a saved snapshot was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Older than the staleness threshold, or missing its timestamp.
    Stale,
    /// Saved in a state that cannot be resumed.
    NotRunning,
    /// Position does not address an item of its own plan.
    InvalidPosition,
}

/// A snapshot that may be resumed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedSession {
    pub snapshot: SessionSnapshot,
    pub title: String,
    pub age_secs: u64,
    /// Elapsed time the session would resume at.
    pub elapsed_secs: u64,
}

/// Outcome of inspecting the store at startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryAssessment {
    Nothing,
    Discarded {
        session_id: String,
        reason: DiscardReason,
    },
    Resumable(Box<SavedSession>),
}

impl RecoveryAssessment {
    pub fn saved(&self) -> Option<&SavedSession> {
        match self {
            RecoveryAssessment::Resumable(saved) => Some(saved),
            _ => None,
        }
    }
}

/// Classifies the saved snapshot against a staleness threshold.
#[derive(Clone)]
pub struct RecoveryController {
    store: SnapshotStore,
    stale_after_secs: u64,
}

impl RecoveryController {
    pub fn new(store: SnapshotStore, stale_after_secs: u64) -> Self {
        Self {
            store,
            stale_after_secs,
        }
    }

    /// Inspect the store. Anything not resumable is cleared.
    pub fn assess(&self, now_ms: u64) -> RecoveryAssessment {
        let Some(snapshot) = self.store.load() else {
            return RecoveryAssessment::Nothing;
        };

        let reason = if !matches!(snapshot.status, SessionStatus::Active | SessionStatus::Paused) {
            Some(DiscardReason::NotRunning)
        } else if !snapshot.position_in_bounds() {
            Some(DiscardReason::InvalidPosition)
        } else if SnapshotStore::is_stale(&snapshot, now_ms, self.stale_after_secs) {
            Some(DiscardReason::Stale)
        } else {
            None
        };

        if let Some(reason) = reason {
            info!(session_id = %snapshot.session_id, ?reason, "discarding saved session");
            self.store.clear();
            return RecoveryAssessment::Discarded {
                session_id: snapshot.session_id,
                reason,
            };
        }

        let age_secs = snapshot
            .authoritative_timestamp_ms()
            .map(|at| now_ms.saturating_sub(at) / 1000)
            .unwrap_or(0);
        let elapsed_secs = match snapshot.status {
            SessionStatus::Paused => snapshot.clock.paused_elapsed_seconds,
            _ => snapshot.elapsed_seconds(now_ms),
        };
        info!(session_id = %snapshot.session_id, age_secs, elapsed_secs, "saved session can be resumed");
        RecoveryAssessment::Resumable(Box::new(SavedSession {
            title: snapshot.plan.title(),
            snapshot,
            age_secs,
            elapsed_secs,
        }))
    }

    /// Drop the saved snapshot.
    pub fn discard(&self) {
        info!("saved session discarded");
        self.store.clear();
    }
}
