//! Session engine.
//!
//! The engine is a wall-clock-based state machine with no threads and no
//! I/O. Every command takes the current time and returns the [`Effect`]s the
//! caller must carry out (play audio, persist the snapshot, emit events).
//! The async [`SessionController`](crate::controller::SessionController)
//! owns the ticker and executes effects.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Active <-> Paused -> Complete
//! Active | Paused -> Idle       (end, pause timeout)
//! ```
//!
//! Narration never blocks a transition: the engine asks for a clip to be
//! played and later learns the outcome through [`SessionEngine::narration_finished`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::ClockState;
use super::plan::SessionPlan;
use super::snapshot::{Position, SessionSnapshot, SessionStatus};
use crate::audio::PlaybackState;
use crate::error::AudioError;
use crate::events::{CompletedItem, SessionEvent, SessionSummary};

/// Work the engine asks its caller to perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Play a narration clip. Report the outcome with the same `seq`.
    Narrate { seq: u64, audio_ref: String },
    StopNarration,
    PlayBell { audio_ref: String },
    PlayCompletion { audio_ref: String },
    StartKeepalive,
    StopKeepalive,
    NowPlaying { title: String, subtitle: String },
    Playback(PlaybackState),
    Persist(Box<SessionSnapshot>),
    ClearPersisted,
    Emit(SessionEvent),
}

/// What the UI reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub kind: Option<&'static str>,
    pub title: Option<String>,
    /// Phase kind or stretch name.
    pub current: Option<String>,
    pub position_index: Option<usize>,
    pub segment: Option<u8>,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    /// Length of the current clock window.
    pub total_seconds: u64,
    pub session_total_seconds: u64,
    pub audio_error: Option<AudioError>,
    pub narration_in_flight: bool,
    pub has_saved_session: bool,
    pub completed_items: Vec<CompletedItem>,
}

/// Core session state machine.
#[derive(Debug, Default)]
pub struct SessionEngine {
    snapshot: Option<SessionSnapshot>,
    narration_seq: u64,
    narration_in_flight: Option<u64>,
    pending_error: Option<AudioError>,
    completed_items: Vec<CompletedItem>,
    /// Stretch prompt waiting for the narration channel to clear.
    held_narration: Option<String>,
    summary: Option<SessionSummary>,
}

impl SessionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        self.snapshot
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn pending_error(&self) -> Option<&AudioError> {
        self.pending_error.as_ref()
    }

    pub fn narration_in_flight(&self) -> bool {
        self.narration_in_flight.is_some()
    }

    pub fn completed_items(&self) -> &[CompletedItem] {
        &self.completed_items
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn elapsed_seconds(&self, now_ms: u64) -> u64 {
        self.snapshot
            .as_ref()
            .map(|s| s.elapsed_seconds(now_ms))
            .unwrap_or(0)
    }

    pub fn view(&self, now_ms: u64) -> SessionView {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return SessionView {
                status: SessionStatus::Idle,
                kind: None,
                title: None,
                current: None,
                position_index: None,
                segment: None,
                elapsed_seconds: 0,
                remaining_seconds: 0,
                total_seconds: 0,
                session_total_seconds: 0,
                audio_error: self.pending_error.clone(),
                narration_in_flight: self.narration_in_flight.is_some(),
                has_saved_session: false,
                completed_items: self.completed_items.clone(),
            };
        };

        let (kind, segment) = match &snapshot.plan {
            SessionPlan::Meditation(_) => ("meditation", None),
            SessionPlan::Stretch(_) => ("stretch", Some(snapshot.position.segment)),
        };
        SessionView {
            status: snapshot.status,
            kind: Some(kind),
            title: Some(snapshot.plan.title()),
            current: snapshot.position_label(),
            position_index: Some(snapshot.position.index),
            segment,
            elapsed_seconds: snapshot.elapsed_seconds(now_ms),
            remaining_seconds: snapshot.remaining_seconds(now_ms),
            total_seconds: snapshot.window_seconds(),
            session_total_seconds: snapshot.plan.total_seconds(),
            audio_error: self.pending_error.clone(),
            narration_in_flight: self.narration_in_flight.is_some(),
            has_saved_session: false,
            completed_items: self.completed_items.clone(),
        }
    }

    fn is_running(&self) -> bool {
        matches!(self.status(), SessionStatus::Active | SessionStatus::Paused)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a resolved session. Ignored while another session is running.
    pub fn start(&mut self, plan: SessionPlan, now_ms: u64) -> Vec<Effect> {
        if self.is_running() {
            warn!(status = ?self.status(), "start ignored: a session is already running");
            return Vec::new();
        }
        if plan.is_empty() {
            warn!("start ignored: plan has nothing to play");
            return Vec::new();
        }

        let snapshot = SessionSnapshot {
            session_id: Uuid::new_v4().to_string(),
            status: SessionStatus::Active,
            clock: ClockState::armed_at(now_ms),
            position: Position::START,
            item_elapsed_secs: 0,
            plan,
            started_at: timestamp(now_ms),
        };
        *self = Self {
            narration_seq: self.narration_seq,
            ..Self::default()
        };

        let title = snapshot.plan.title();
        let total_secs = snapshot.plan.total_seconds();
        info!(session_id = %snapshot.session_id, %title, total_secs, "session started");

        let intro = match &snapshot.plan {
            SessionPlan::Meditation(plan) => Effect::PlayBell {
                audio_ref: plan.bell.clone(),
            },
            SessionPlan::Stretch(plan) => self.narrate(plan.items[0].opening_audio.clone()),
        };
        let session_id = snapshot.session_id.clone();
        self.snapshot = Some(snapshot);

        let mut effects = vec![
            self.persist(),
            Effect::StartKeepalive,
            self.now_playing(),
            Effect::Playback(PlaybackState::Playing),
            Effect::Emit(SessionEvent::Started {
                session_id,
                title,
                total_secs,
                at: timestamp(now_ms),
            }),
        ];
        effects.push(intro);
        effects.extend(self.tick(now_ms));
        effects
    }

    pub fn pause(&mut self, now_ms: u64) -> Vec<Effect> {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return Vec::new();
        };
        if snapshot.status != SessionStatus::Active {
            return Vec::new();
        }

        let window = snapshot.window_seconds();
        snapshot.clock.freeze(snapshot.status, now_ms, window);
        snapshot.status = SessionStatus::Paused;
        let elapsed_secs = snapshot.clock.paused_elapsed_seconds;
        debug!(elapsed_secs, "session paused");

        vec![
            Effect::StopNarration,
            self.persist(),
            Effect::Playback(PlaybackState::Paused),
            Effect::Emit(SessionEvent::Paused {
                elapsed_secs,
                at: timestamp(now_ms),
            }),
        ]
    }

    pub fn resume(&mut self, now_ms: u64) -> Vec<Effect> {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return Vec::new();
        };
        if snapshot.status != SessionStatus::Paused {
            return Vec::new();
        }

        snapshot.clock.thaw(now_ms);
        snapshot.status = SessionStatus::Active;
        let elapsed_secs = snapshot.elapsed_seconds(now_ms);
        debug!(elapsed_secs, "session resumed");

        vec![
            self.persist(),
            Effect::Playback(PlaybackState::Playing),
            Effect::Emit(SessionEvent::Resumed {
                elapsed_secs,
                at: timestamp(now_ms),
            }),
        ]
    }

    /// Recompute elapsed time and act on any boundary that has passed.
    ///
    /// Called by the periodic ticker and by the became-visible signal alike.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.status() != SessionStatus::Active {
            return Vec::new();
        }
        let is_meditation = matches!(
            self.snapshot.as_ref().map(|s| &s.plan),
            Some(SessionPlan::Meditation(_))
        );
        if is_meditation {
            self.tick_meditation(now_ms)
        } else {
            self.tick_stretch(now_ms)
        }
    }

    fn tick_meditation(&mut self, now_ms: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(snapshot) = self.snapshot.as_mut() else {
            return effects;
        };
        let SessionPlan::Meditation(plan) = &snapshot.plan else {
            return effects;
        };

        let total = plan.variant.total_seconds();
        let elapsed = snapshot.elapsed_seconds(now_ms);
        if elapsed >= total {
            return self.complete(now_ms, None);
        }

        let phase = plan.variant.phase_at(elapsed);
        if phase > snapshot.position.index {
            for passed in snapshot.position.index..phase {
                let kind = plan.variant.phases[passed].kind.clone();
                let actual_secs = plan.variant.phases[passed].duration_seconds;
                self.completed_items.push(CompletedItem {
                    region: "meditation".into(),
                    name: kind,
                    actual_secs,
                    skipped_segments: 0,
                });
            }
            let phase_kind = plan.variant.phases[phase].kind.clone();
            snapshot.position.index = phase;
            debug!(phase = %phase_kind, elapsed, "phase changed");
            effects.push(self.persist());
            effects.push(self.now_playing());
            effects.push(Effect::Emit(SessionEvent::PhaseChanged {
                phase_index: phase,
                phase: phase_kind,
                at: timestamp(now_ms),
            }));
        }

        effects.extend(self.dispatch_due_cue(elapsed, now_ms));
        effects
    }

    /// Play the earliest due cue, one at a time.
    ///
    /// A cue is marked played as soon as its playback is requested, so a
    /// slow or failing clip is never retriggered by the next tick.
    fn dispatch_due_cue(&mut self, elapsed: u64, now_ms: u64) -> Vec<Effect> {
        if self.pending_error.is_some() || self.narration_in_flight.is_some() {
            return Vec::new();
        }
        let Some(SessionPlan::Meditation(plan)) = self.snapshot.as_mut().map(|s| &mut s.plan)
        else {
            return Vec::new();
        };
        let Some(cue) = plan
            .cues
            .iter_mut()
            .find(|c| !c.played && c.at_seconds <= elapsed)
        else {
            return Vec::new();
        };

        cue.played = true;
        let audio_ref = cue.audio_ref.clone();
        let at_seconds = cue.at_seconds;
        debug!(at_seconds, %audio_ref, elapsed, "cue dispatched");

        vec![
            self.narrate(audio_ref.clone()),
            self.persist(),
            Effect::Emit(SessionEvent::CueDispatched {
                at_seconds,
                audio_ref,
                at: timestamp(now_ms),
            }),
        ]
    }

    fn tick_stretch(&mut self, now_ms: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut narration = None;

        // Catch up across every boundary that passed while ticks were
        // starved; each segment is re-armed at the instant its predecessor
        // ended.
        loop {
            let Some(snapshot) = self.snapshot.as_ref() else {
                break;
            };
            if snapshot.status != SessionStatus::Active {
                break;
            }
            let window = snapshot.window_seconds();
            if snapshot.elapsed_seconds(now_ms) < window {
                break;
            }
            let boundary_ms = snapshot
                .clock
                .start_timestamp_ms
                .map(|start| start + window * 1000)
                .unwrap_or(now_ms)
                .min(now_ms);
            let (advanced, next) = self.advance_stretch(boundary_ms, now_ms, false);
            effects.extend(advanced);
            narration = next;
        }

        if narration.is_some() {
            self.held_narration = narration;
        }
        effects.extend(self.release_held_narration());
        effects
    }

    /// Play the held stretch prompt once nothing is playing and no audio
    /// error is pending. A newer prompt replaces an older one.
    fn release_held_narration(&mut self) -> Option<Effect> {
        if self.status() != SessionStatus::Active
            || self.pending_error.is_some()
            || self.narration_in_flight.is_some()
        {
            return None;
        }
        let audio_ref = self.held_narration.take()?;
        Some(self.narrate(audio_ref))
    }

    /// Move a stretch session one segment forward.
    ///
    /// Returns the effects and the clip to narrate for the new position
    /// (none when the session completed).
    fn advance_stretch(
        &mut self,
        rearm_ms: u64,
        now_ms: u64,
        skipped: bool,
    ) -> (Vec<Effect>, Option<String>) {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return (Vec::new(), None);
        };
        let elapsed = snapshot.elapsed_seconds(now_ms);
        let status = snapshot.status;
        let item_elapsed = snapshot.item_elapsed_secs;
        let Position { index, segment } = snapshot.position;
        let SessionPlan::Stretch(plan) = &snapshot.plan else {
            return (Vec::new(), None);
        };
        let item_count = plan.items.len();
        let item = plan.items[index].clone();

        let mut effects = Vec::new();
        if segment == 1 {
            snapshot.item_elapsed_secs = item_elapsed + elapsed;
            snapshot.position.segment = 2;
            snapshot.clock = rearmed_clock(&snapshot.clock, status, rearm_ms);
            effects.push(Effect::Emit(SessionEvent::SegmentAdvanced {
                item_index: index,
                segment: 2,
                skipped,
                at: timestamp(now_ms),
            }));
            effects.push(self.persist());
            return (effects, Some(item.transition_audio));
        }

        let finished = CompletedItem {
            region: item.region.clone(),
            name: item.name.clone(),
            actual_secs: item_elapsed + elapsed,
            skipped_segments: item.skipped_segments,
        };
        self.completed_items.push(finished.clone());
        effects.push(Effect::Emit(SessionEvent::ItemCompleted {
            item: finished,
            at: timestamp(now_ms),
        }));

        if index + 1 >= item_count {
            effects.extend(self.complete(now_ms, None));
            return (effects, None);
        }

        let (next_opening, next_index) = {
            let Some(snapshot) = self.snapshot.as_mut() else {
                return (effects, None);
            };
            snapshot.position = Position {
                index: index + 1,
                segment: 1,
            };
            snapshot.item_elapsed_secs = 0;
            snapshot.clock = rearmed_clock(&snapshot.clock, status, rearm_ms);
            let opening = snapshot
                .current_item()
                .map(|i| i.opening_audio.clone());
            (opening, index + 1)
        };
        effects.push(Effect::Emit(SessionEvent::SegmentAdvanced {
            item_index: next_index,
            segment: 1,
            skipped,
            at: timestamp(now_ms),
        }));
        effects.push(self.persist());
        effects.push(self.now_playing());
        (effects, next_opening)
    }

    /// Cut the current segment (stretch) or phase (meditation) short.
    pub fn skip_segment(&mut self, now_ms: u64) -> Vec<Effect> {
        if !self.is_running() {
            return Vec::new();
        }
        let mut effects = self.interrupt_narration();

        let is_meditation = matches!(
            self.snapshot.as_ref().map(|s| &s.plan),
            Some(SessionPlan::Meditation(_))
        );
        if is_meditation {
            effects.extend(self.skip_phase(now_ms));
            return effects;
        }

        if let Some(snapshot) = self.snapshot.as_mut() {
            let index = snapshot.position.index;
            if let SessionPlan::Stretch(plan) = &mut snapshot.plan {
                plan.items[index].skipped_segments += 1;
            }
        }
        let (advanced, narration) = self.advance_stretch(now_ms, now_ms, true);
        effects.extend(advanced);
        if narration.is_some() {
            self.held_narration = narration;
        }
        effects.extend(self.release_held_narration());
        effects
    }

    fn skip_phase(&mut self, now_ms: u64) -> Vec<Effect> {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return Vec::new();
        };
        let elapsed = snapshot.elapsed_seconds(now_ms);
        let status = snapshot.status;
        let index = snapshot.position.index;
        let SessionPlan::Meditation(plan) = &mut snapshot.plan else {
            return Vec::new();
        };

        let phase_start = plan.variant.phase_start(index);
        let next_start = plan.variant.phase_start(index + 1);
        let skipped = CompletedItem {
            region: "meditation".into(),
            name: plan.variant.phases[index].kind.clone(),
            actual_secs: elapsed.saturating_sub(phase_start),
            skipped_segments: 1,
        };
        if index + 1 >= plan.variant.phases.len() {
            return self.complete(now_ms, Some(skipped));
        }
        self.completed_items.push(skipped);

        for cue in plan.cues.iter_mut().filter(|c| c.at_seconds < next_start) {
            cue.played = true;
        }
        let phase_kind = plan.variant.phases[index + 1].kind.clone();
        snapshot.position.index = index + 1;
        match status {
            SessionStatus::Paused => {
                snapshot.clock.paused_elapsed_seconds = next_start;
            }
            _ => {
                snapshot.clock.start_timestamp_ms =
                    Some(now_ms.saturating_sub(next_start * 1000));
            }
        }
        debug!(phase = %phase_kind, "phase skipped");

        vec![
            self.persist(),
            self.now_playing(),
            Effect::Emit(SessionEvent::PhaseChanged {
                phase_index: index + 1,
                phase: phase_kind,
                at: timestamp(now_ms),
            }),
        ]
    }

    /// Abandon the current stretch entirely and move to the next one.
    pub fn skip_stretch(&mut self, now_ms: u64) -> Vec<Effect> {
        if !self.is_running() {
            return Vec::new();
        }
        let Some(snapshot) = self.snapshot.as_mut() else {
            return Vec::new();
        };
        let index = snapshot.position.index;
        let SessionPlan::Stretch(plan) = &mut snapshot.plan else {
            debug!("skip_stretch ignored for meditation");
            return Vec::new();
        };
        plan.items[index].skipped_segments = 2;

        let mut effects = self.interrupt_narration();
        // Finishing segment 1 first lands on segment 2, whose finish then
        // records the item and moves on.
        if self.snapshot.as_ref().map(|s| s.position.segment) == Some(1) {
            let (advanced, _) = self.advance_stretch(now_ms, now_ms, true);
            effects.extend(advanced.into_iter().filter(|e| !matches!(e, Effect::Persist(_))));
        }
        let (advanced, narration) = self.advance_stretch(now_ms, now_ms, true);
        effects.extend(advanced);
        if narration.is_some() {
            self.held_narration = narration;
        }
        effects.extend(self.release_held_narration());
        effects
    }

    /// Stop everything and return to `Idle`. Always succeeds.
    pub fn end(&mut self, now_ms: u64) -> Vec<Effect> {
        let from = self.status();
        let mut effects = vec![
            Effect::StopNarration,
            Effect::StopKeepalive,
            Effect::ClearPersisted,
            Effect::Playback(PlaybackState::None),
        ];
        if matches!(from, SessionStatus::Active | SessionStatus::Paused) {
            info!(?from, "session ended");
            effects.push(Effect::Emit(SessionEvent::Ended {
                from,
                at: timestamp(now_ms),
            }));
        }
        *self = Self {
            narration_seq: self.narration_seq,
            ..Self::default()
        };
        effects
    }

    /// Reached the end of the last phase or item. Fires at most once.
    ///
    /// For meditation, phases from the current one onward are recorded as
    /// played in full unless `current_phase` overrides the current one.
    fn complete(&mut self, now_ms: u64, current_phase: Option<CompletedItem>) -> Vec<Effect> {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return Vec::new();
        };
        if snapshot.status == SessionStatus::Complete {
            return Vec::new();
        }

        let window = snapshot.window_seconds();
        let closing = match &snapshot.plan {
            SessionPlan::Meditation(plan) => {
                let mut current_phase = current_phase;
                for phase in plan.variant.phases.iter().skip(snapshot.position.index) {
                    let record = current_phase.take().unwrap_or_else(|| CompletedItem {
                        region: "meditation".into(),
                        name: phase.kind.clone(),
                        actual_secs: phase.duration_seconds,
                        skipped_segments: 0,
                    });
                    self.completed_items.push(record);
                }
                snapshot.position.index = plan.variant.phases.len() - 1;
                Effect::PlayBell {
                    audio_ref: plan.bell.clone(),
                }
            }
            SessionPlan::Stretch(plan) => Effect::PlayCompletion {
                audio_ref: plan.completion_audio.clone(),
            },
        };

        snapshot.clock = ClockState {
            start_timestamp_ms: None,
            paused_timestamp_ms: None,
            paused_elapsed_seconds: window,
        };
        snapshot.status = SessionStatus::Complete;

        let summary = SessionSummary {
            session_id: snapshot.session_id.clone(),
            kind: match snapshot.plan {
                SessionPlan::Meditation(_) => "meditation".into(),
                SessionPlan::Stretch(_) => "stretch".into(),
            },
            title: snapshot.plan.title(),
            planned_secs: snapshot.plan.total_seconds(),
            actual_secs: self.completed_items.iter().map(|i| i.actual_secs).sum(),
            started_at: snapshot.started_at,
            items: self.completed_items.clone(),
        };
        info!(
            session_id = %summary.session_id,
            actual_secs = summary.actual_secs,
            skipped = summary.skipped_segments(),
            "session complete"
        );
        self.summary = Some(summary.clone());

        vec![
            closing,
            Effect::StopKeepalive,
            Effect::ClearPersisted,
            Effect::Playback(PlaybackState::None),
            Effect::Emit(SessionEvent::Completed {
                summary,
                at: timestamp(now_ms),
            }),
        ]
    }

    // ── Audio outcomes ───────────────────────────────────────────────

    /// Outcome of a [`Effect::Narrate`] request.
    ///
    /// Results for narrations that were interrupted or belong to an ended
    /// session are ignored.
    pub fn narration_finished(
        &mut self,
        seq: u64,
        result: Result<(), AudioError>,
        now_ms: u64,
    ) -> Vec<Effect> {
        if self.narration_in_flight != Some(seq) {
            debug!(seq, "ignoring outcome of superseded narration");
            return Vec::new();
        }
        self.narration_in_flight = None;

        let Err(error) = result else {
            return Vec::new();
        };
        if !self.is_running() {
            warn!(%error, "narration failed after session stopped");
            return Vec::new();
        }
        warn!(audio_ref = %error.audio_ref, message = %error.message, "narration failed; holding cues");
        self.pending_error = Some(error.clone());
        vec![Effect::Emit(SessionEvent::AudioFailed {
            error,
            at: timestamp(now_ms),
        })]
    }

    /// Replay the clip that failed.
    ///
    /// Only while Active: a paused session keeps the error pending until it
    /// resumes. A held stretch prompt is dropped in favor of the retried clip.
    pub fn retry_audio(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.status() != SessionStatus::Active {
            if self.pending_error.is_some() {
                debug!(status = ?self.status(), "retry ignored until the session is active");
            }
            return Vec::new();
        }
        let Some(error) = self.pending_error.take() else {
            return Vec::new();
        };
        self.held_narration = None;
        info!(audio_ref = %error.audio_ref, "retrying narration");
        vec![
            Effect::Emit(SessionEvent::AudioRecovered {
                audio_ref: error.audio_ref.clone(),
                retried: true,
                at: timestamp(now_ms),
            }),
            self.narrate(error.audio_ref),
        ]
    }

    /// Give up on the clip that failed and let cue dispatch continue.
    ///
    /// A stretch prompt held behind the error counts as missed.
    pub fn skip_audio(&mut self, now_ms: u64) -> Vec<Effect> {
        let Some(error) = self.pending_error.take() else {
            return Vec::new();
        };
        self.held_narration = None;
        info!(audio_ref = %error.audio_ref, "skipping failed narration");
        vec![Effect::Emit(SessionEvent::AudioRecovered {
            audio_ref: error.audio_ref,
            retried: false,
            at: timestamp(now_ms),
        })]
    }

    // ── Timeouts & recovery ──────────────────────────────────────────

    /// End the session if it has been paused for at least `timeout_secs`.
    pub fn check_pause_timeout(&mut self, now_ms: u64, timeout_secs: u64) -> Vec<Effect> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Vec::new();
        };
        if snapshot.status != SessionStatus::Paused {
            return Vec::new();
        }
        let Some(paused_at) = snapshot.clock.paused_timestamp_ms else {
            return Vec::new();
        };
        let paused_secs = now_ms.saturating_sub(paused_at) / 1000;
        if paused_secs < timeout_secs {
            return Vec::new();
        }

        info!(paused_secs, timeout_secs, "pause timeout reached");
        let mut effects = vec![Effect::Emit(SessionEvent::PauseTimedOut {
            paused_secs,
            at: timestamp(now_ms),
        })];
        effects.extend(self.end(now_ms));
        effects
    }

    /// Pick a saved session back up.
    ///
    /// A paused snapshot continues from its frozen elapsed time; an active
    /// one keeps its start anchor, so time spent away counts. Cues that fell
    /// due while away are not replayed.
    pub fn restore(&mut self, mut snapshot: SessionSnapshot, now_ms: u64) -> Vec<Effect> {
        if self.is_running() {
            warn!("restore ignored: a session is already running");
            return Vec::new();
        }
        if !snapshot.position_in_bounds() {
            warn!(position = ?snapshot.position, "saved session has an invalid position; discarding");
            return vec![Effect::ClearPersisted];
        }

        if snapshot.status == SessionStatus::Paused || snapshot.clock.start_timestamp_ms.is_none() {
            snapshot.clock.thaw(now_ms);
        }
        snapshot.status = SessionStatus::Active;
        let elapsed_secs = snapshot.elapsed_seconds(now_ms);
        if let SessionPlan::Meditation(plan) = &mut snapshot.plan {
            for cue in plan.cues.iter_mut().filter(|c| c.at_seconds < elapsed_secs) {
                cue.played = true;
            }
        }

        *self = Self {
            narration_seq: self.narration_seq,
            ..Self::default()
        };
        let session_id = snapshot.session_id.clone();
        info!(%session_id, elapsed_secs, "saved session restored");
        self.snapshot = Some(snapshot);

        let mut effects = vec![
            self.persist(),
            Effect::StartKeepalive,
            self.now_playing(),
            Effect::Playback(PlaybackState::Playing),
            Effect::Emit(SessionEvent::Restored {
                session_id,
                elapsed_secs,
                at: timestamp(now_ms),
            }),
        ];
        effects.extend(self.tick(now_ms));
        effects
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn narrate(&mut self, audio_ref: String) -> Effect {
        self.narration_seq += 1;
        self.narration_in_flight = Some(self.narration_seq);
        Effect::Narrate {
            seq: self.narration_seq,
            audio_ref,
        }
    }

    /// Stop whatever is playing and stop caring about its outcome.
    fn interrupt_narration(&mut self) -> Vec<Effect> {
        self.narration_in_flight = None;
        vec![Effect::StopNarration]
    }

    fn persist(&self) -> Effect {
        match &self.snapshot {
            Some(snapshot) => Effect::Persist(Box::new(snapshot.clone())),
            None => Effect::ClearPersisted,
        }
    }

    fn now_playing(&self) -> Effect {
        let (title, subtitle) = self
            .snapshot
            .as_ref()
            .map(|s| (s.plan.title(), s.position_label().unwrap_or_default()))
            .unwrap_or_default();
        Effect::NowPlaying { title, subtitle }
    }
}

/// A fresh segment clock in the given status.
///
/// A paused session keeps the instant it was paused at, which the pause
/// timeout and staleness both measure from.
fn rearmed_clock(previous: &ClockState, status: SessionStatus, rearm_ms: u64) -> ClockState {
    match status {
        SessionStatus::Paused => ClockState {
            start_timestamp_ms: None,
            paused_timestamp_ms: previous.paused_timestamp_ms.or(Some(rearm_ms)),
            paused_elapsed_seconds: 0,
        },
        _ => ClockState::armed_at(rearm_ms),
    }
}

fn timestamp(now_ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp((now_ms / 1000) as i64, ((now_ms % 1000) * 1_000_000) as u32)
        .unwrap_or_else(Utc::now)
}
