use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AudioError;
use crate::timer::SessionStatus;

/// Every state change in a session produces an Event.
/// The UI subscribes to them; the CLI records history from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    Started {
        session_id: String,
        title: String,
        total_secs: u64,
        at: DateTime<Utc>,
    },
    Paused {
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    Resumed {
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// A meditation crossed into a new phase.
    PhaseChanged {
        phase_index: usize,
        phase: String,
        at: DateTime<Utc>,
    },
    /// A stretch moved to a new segment (possibly of the next item).
    SegmentAdvanced {
        item_index: usize,
        segment: u8,
        skipped: bool,
        at: DateTime<Utc>,
    },
    ItemCompleted {
        item: CompletedItem,
        at: DateTime<Utc>,
    },
    CueDispatched {
        at_seconds: u64,
        audio_ref: String,
        at: DateTime<Utc>,
    },
    /// Narration failed; cue dispatch is held until retry or skip.
    AudioFailed {
        error: AudioError,
        at: DateTime<Utc>,
    },
    /// A pending audio error was cleared by retry or skip.
    AudioRecovered {
        audio_ref: String,
        retried: bool,
        at: DateTime<Utc>,
    },
    Completed {
        summary: SessionSummary,
        at: DateTime<Utc>,
    },
    /// Explicit end, or the end of a discarded session.
    Ended {
        from: SessionStatus,
        at: DateTime<Utc>,
    },
    /// Paused for longer than the pause timeout.
    PauseTimedOut {
        paused_secs: u64,
        at: DateTime<Utc>,
    },
    /// A saved session was picked back up after a restart.
    Restored {
        session_id: String,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
}

/// One finished stretch or meditation phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedItem {
    /// Stretch region, or "meditation".
    pub region: String,
    /// Stretch name or phase kind.
    pub name: String,
    pub actual_secs: u64,
    pub skipped_segments: u32,
}

/// What the session-complete screen shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub kind: String,
    pub title: String,
    pub planned_secs: u64,
    pub actual_secs: u64,
    pub started_at: DateTime<Utc>,
    pub items: Vec<CompletedItem>,
}

impl SessionSummary {
    pub fn skipped_segments(&self) -> u32 {
        self.items.iter().map(|i| i.skipped_segments).sum()
    }
}
