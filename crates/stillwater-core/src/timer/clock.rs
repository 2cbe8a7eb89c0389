//! Session clock.
//!
//! Elapsed time is always recomputed from a wall-clock anchor, never
//! accumulated per tick. A tick that arrives late, or not at all while the
//! process was suspended, costs nothing: the next evaluation (periodic or
//! out-of-band) sees the true elapsed time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::snapshot::SessionStatus;

/// The timestamps that make up the clock portion of a snapshot.
///
/// While `Active`, `start_timestamp_ms` is authoritative. While `Paused`
/// (or `Idle` with prior progress), `paused_elapsed_seconds` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockState {
    pub start_timestamp_ms: Option<u64>,
    pub paused_timestamp_ms: Option<u64>,
    pub paused_elapsed_seconds: u64,
}

impl ClockState {
    /// Clock running from `now_ms` with nothing elapsed.
    pub fn armed_at(now_ms: u64) -> Self {
        Self {
            start_timestamp_ms: Some(now_ms),
            paused_timestamp_ms: None,
            paused_elapsed_seconds: 0,
        }
    }

    /// Freeze at the current elapsed value.
    pub fn freeze(&mut self, status: SessionStatus, now_ms: u64, total_seconds: u64) {
        self.paused_elapsed_seconds = elapsed_seconds(status, self, now_ms, total_seconds);
        self.paused_timestamp_ms = Some(now_ms);
        self.start_timestamp_ms = None;
    }

    /// Start running again so that elapsed continues from the frozen value.
    pub fn thaw(&mut self, now_ms: u64) {
        self.start_timestamp_ms =
            Some(now_ms.saturating_sub(self.paused_elapsed_seconds.saturating_mul(1000)));
        self.paused_timestamp_ms = None;
    }
}

/// Whole seconds elapsed in the current clock window, clamped to `total_seconds`.
pub fn elapsed_seconds(
    status: SessionStatus,
    clock: &ClockState,
    now_ms: u64,
    total_seconds: u64,
) -> u64 {
    let elapsed = match (status, clock.start_timestamp_ms) {
        (SessionStatus::Active, Some(start)) => now_ms.saturating_sub(start) / 1000,
        _ => clock.paused_elapsed_seconds,
    };
    elapsed.min(total_seconds)
}

pub fn remaining_seconds(
    status: SessionStatus,
    clock: &ClockState,
    now_ms: u64,
    total_seconds: u64,
) -> u64 {
    total_seconds - elapsed_seconds(status, clock, now_ms, total_seconds)
}

/// Source of wall-clock time in epoch milliseconds.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_ms(&self) -> u64 {
        now_ms()
    }
}

/// Hand-driven time, for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance_secs(&self, secs: u64) {
        self.now.fetch_add(secs * 1000, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn active_elapsed_floors_to_seconds() {
        let clock = ClockState::armed_at(T0);
        assert_eq!(elapsed_seconds(SessionStatus::Active, &clock, T0 + 999, 300), 0);
        assert_eq!(elapsed_seconds(SessionStatus::Active, &clock, T0 + 1_000, 300), 1);
        assert_eq!(elapsed_seconds(SessionStatus::Active, &clock, T0 + 31_500, 300), 31);
    }

    #[test]
    fn elapsed_is_clamped_to_total() {
        let clock = ClockState::armed_at(T0);
        assert_eq!(elapsed_seconds(SessionStatus::Active, &clock, T0 + 900_000, 300), 300);
        assert_eq!(remaining_seconds(SessionStatus::Active, &clock, T0 + 900_000, 300), 0);
    }

    #[test]
    fn clock_behind_start_reads_zero() {
        let clock = ClockState::armed_at(T0);
        assert_eq!(elapsed_seconds(SessionStatus::Active, &clock, T0 - 5_000, 300), 0);
    }

    #[test]
    fn paused_reads_frozen_value() {
        let mut clock = ClockState::armed_at(T0);
        clock.freeze(SessionStatus::Active, T0 + 42_000, 300);
        assert_eq!(clock.start_timestamp_ms, None);
        assert_eq!(clock.paused_timestamp_ms, Some(T0 + 42_000));
        assert_eq!(elapsed_seconds(SessionStatus::Paused, &clock, T0 + 999_000, 300), 42);
    }

    #[test]
    fn manual_time_advances() {
        let time = ManualClock::new(T0);
        time.advance_secs(2);
        time.advance_ms(500);
        assert_eq!(time.now_ms(), T0 + 2_500);
    }

    proptest! {
        #[test]
        fn pause_resume_is_continuous(
            run_ms in 0u64..600_000,
            paused_ms in 0u64..86_400_000,
        ) {
            let total = 900;
            let mut clock = ClockState::armed_at(T0);
            let pause_at = T0 + run_ms;
            let before = elapsed_seconds(SessionStatus::Active, &clock, pause_at, total);

            clock.freeze(SessionStatus::Active, pause_at, total);
            clock.thaw(pause_at + paused_ms);
            let after = elapsed_seconds(SessionStatus::Active, &clock, pause_at + paused_ms, total);

            prop_assert!(before.abs_diff(after) <= 1);
        }

        #[test]
        fn active_elapsed_is_monotonic_and_bounded(
            steps in prop::collection::vec(0u64..120_000, 1..50),
        ) {
            let total = 300;
            let clock = ClockState::armed_at(T0);
            let mut now = T0;
            let mut last = 0;
            for step in steps {
                now += step;
                let elapsed = elapsed_seconds(SessionStatus::Active, &clock, now, total);
                prop_assert!(elapsed >= last);
                prop_assert!(elapsed <= total);
                last = elapsed;
            }
        }
    }
}
