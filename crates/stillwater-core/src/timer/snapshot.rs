use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::{self, ClockState};
use super::plan::{SessionPlan, StretchItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Active,
    Paused,
    Complete,
}

/// Where the session currently is.
///
/// For meditation `index` is the phase and `segment` is always 1. For
/// stretching `index` is the item and `segment` is 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub index: usize,
    pub segment: u8,
}

impl Position {
    pub const START: Position = Position {
        index: 0,
        segment: 1,
    };
}

/// The persisted unit of an in-progress session.
///
/// Written after every transition and cleared on end, on completion, and
/// when found stale at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(flatten)]
    pub clock: ClockState,
    pub position: Position,
    /// Seconds already spent on the current stretch before this segment.
    #[serde(default)]
    pub item_elapsed_secs: u64,
    pub plan: SessionPlan,
    pub started_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Length of the current clock window: the whole session for
    /// meditation, the current segment for stretching.
    pub fn window_seconds(&self) -> u64 {
        match &self.plan {
            SessionPlan::Meditation(plan) => plan.variant.total_seconds(),
            SessionPlan::Stretch(plan) => plan
                .items
                .get(self.position.index)
                .map(|item| item.segment_seconds(self.position.segment))
                .unwrap_or(0),
        }
    }

    pub fn elapsed_seconds(&self, now_ms: u64) -> u64 {
        clock::elapsed_seconds(self.status, &self.clock, now_ms, self.window_seconds())
    }

    pub fn remaining_seconds(&self, now_ms: u64) -> u64 {
        clock::remaining_seconds(self.status, &self.clock, now_ms, self.window_seconds())
    }

    /// The timestamp recovery ages the snapshot by.
    pub fn authoritative_timestamp_ms(&self) -> Option<u64> {
        match self.status {
            SessionStatus::Paused => self.clock.paused_timestamp_ms,
            _ => self.clock.start_timestamp_ms,
        }
    }

    pub fn current_item(&self) -> Option<&StretchItem> {
        match &self.plan {
            SessionPlan::Stretch(plan) => plan.items.get(self.position.index),
            SessionPlan::Meditation(_) => None,
        }
    }

    /// Phase kind or stretch name for display.
    pub fn position_label(&self) -> Option<String> {
        match &self.plan {
            SessionPlan::Meditation(plan) => plan
                .variant
                .phases
                .get(self.position.index)
                .map(|p| p.kind.clone()),
            SessionPlan::Stretch(plan) => plan
                .items
                .get(self.position.index)
                .map(|item| item.name.clone()),
        }
    }

    /// Whether `position` addresses an existing phase or item.
    pub fn position_in_bounds(&self) -> bool {
        self.position.index < self.plan.len()
            && (1..=2).contains(&self.position.segment)
    }
}
