//! End-to-end session behavior through the async controller.

mod common;

use common::{settle, AudioCall, Harness};
use stillwater_core::audio::{PlaybackState, RemoteCommand};
use stillwater_core::storage::{PersistencePort, SNAPSHOT_KEY};
use stillwater_core::{RegionSelection, SessionEvent, SessionSelection, SessionStatus};
use tokio::sync::broadcast;

fn meditation(session_id: &str, minutes: u32) -> SessionSelection {
    SessionSelection::Meditation {
        session_id: session_id.into(),
        duration_minutes: minutes,
    }
}

fn stretch(regions: &[(&str, u64)]) -> SessionSelection {
    SessionSelection::Stretch {
        regions: regions
            .iter()
            .map(|(region, duration_seconds)| RegionSelection {
                region: region.to_string(),
                duration_seconds: *duration_seconds,
            })
            .collect(),
    }
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn completed_count(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Completed { .. }))
        .count()
}

#[tokio::test]
async fn five_minute_meditation_runs_to_completion() {
    let h = Harness::new();
    let mut events = h.controller.subscribe();

    assert!(h.controller.start(meditation("basic-breathing", 5)).await);
    settle().await;

    let view = h.controller.view().await;
    assert_eq!(view.status, SessionStatus::Active);
    assert_eq!(view.total_seconds, 300);
    assert_eq!(view.current.as_deref(), Some("intro"));
    assert_eq!(h.audio.count(&AudioCall::StartKeepalive), 1);

    h.advance(31).await;
    let view = h.controller.view().await;
    assert_eq!(view.current.as_deref(), Some("main"));
    assert_eq!(view.elapsed_seconds, 31);
    assert_eq!(
        h.audio.narrations()[..2],
        [
            "basic-breathing/intro-welcome.wav".to_string(),
            "basic-breathing/breathing-settle.wav".to_string(),
        ]
    );

    h.advance(269).await;
    assert_eq!(h.controller.status().await, SessionStatus::Complete);
    h.advance(5).await;

    let events = drain(&mut events);
    assert_eq!(completed_count(&events), 1);
    assert_eq!(h.audio.count(&AudioCall::Bell("shared/bell.wav".into())), 2);
    assert_eq!(h.audio.count(&AudioCall::StopKeepalive), 1);
    assert!(h.persistence.load(SNAPSHOT_KEY).unwrap().is_none());

    let summary = h.controller.summary().await.unwrap();
    assert_eq!(summary.planned_secs, 300);
    assert_eq!(summary.items.len(), 3);
}

#[tokio::test]
async fn backgrounded_session_completes_once_on_visibility() {
    let h = Harness::new();
    let mut events = h.controller.subscribe();
    assert!(h.controller.start(meditation("short-rest", 1)).await);
    settle().await;
    assert_eq!(h.controller.view().await.total_seconds, 10);

    // No ticks reach the engine while backgrounded; only the wall clock moves.
    h.clock.advance_secs(15);
    h.controller.on_visible().await;
    h.controller.on_visible().await;
    settle().await;

    let view = h.controller.view().await;
    assert_eq!(view.status, SessionStatus::Complete);
    assert_eq!(view.elapsed_seconds, 10);
    assert_eq!(completed_count(&drain(&mut events)), 1);
}

#[tokio::test(start_paused = true)]
async fn ticker_completes_session_without_visibility_signal() {
    let h = Harness::new();
    let mut events = h.controller.subscribe();
    assert!(h.controller.start(meditation("short-rest", 1)).await);
    settle().await;

    h.run_for(9).await;
    let view = h.controller.view().await;
    assert_eq!(view.status, SessionStatus::Active);
    assert_eq!(view.elapsed_seconds, 9);

    h.run_for(2).await;
    assert_eq!(h.controller.status().await, SessionStatus::Complete);
    assert_eq!(completed_count(&drain(&mut events)), 1);
    assert!(h.persistence.load(SNAPSHOT_KEY).unwrap().is_none());

    // The ticker has stopped itself; nothing more happens.
    h.run_for(5).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(h.audio.count(&AudioCall::StopKeepalive), 1);
}

#[tokio::test(start_paused = true)]
async fn watchdog_ends_a_forgotten_pause() {
    let h = Harness::new();
    let mut events = h.controller.subscribe();
    h.controller.start(meditation("basic-breathing", 5)).await;
    settle().await;
    h.run_for(20).await;

    h.controller.pause().await;
    settle().await;
    h.run_for(29 * 60).await;
    assert_eq!(h.controller.status().await, SessionStatus::Paused);
    assert_eq!(h.controller.view().await.elapsed_seconds, 20);

    h.run_for(2 * 60).await;
    assert_eq!(h.controller.status().await, SessionStatus::Idle);
    assert!(h.persistence.load(SNAPSHOT_KEY).unwrap().is_none());

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::PauseTimedOut { paused_secs, .. } if *paused_secs >= 1_800)));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Ended {
            from: SessionStatus::Paused,
            ..
        }
    )));
}

#[tokio::test]
async fn audio_failure_holds_cues_until_retry() {
    let h = Harness::new();
    h.audio.fail_on("basic-breathing/intro-welcome.wav");

    h.controller.start(meditation("basic-breathing", 5)).await;
    settle().await;
    let error = h.controller.audio_error().await.unwrap();
    assert_eq!(error.audio_ref, "basic-breathing/intro-welcome.wav");

    // The clock keeps running while cues are held.
    h.advance(31).await;
    let view = h.controller.view().await;
    assert_eq!(view.current.as_deref(), Some("main"));
    assert!(view.audio_error.is_some());
    assert_eq!(h.audio.narrations().len(), 1);

    h.audio.heal("basic-breathing/intro-welcome.wav");
    h.controller.retry_audio().await;
    settle().await;

    assert!(h.controller.audio_error().await.is_none());
    assert_eq!(
        h.audio.narrations(),
        vec![
            "basic-breathing/intro-welcome.wav".to_string(),
            "basic-breathing/intro-welcome.wav".to_string(),
            "basic-breathing/breathing-settle.wav".to_string(),
        ]
    );
}

#[tokio::test]
async fn skip_audio_accepts_the_missed_cue() {
    let h = Harness::new();
    h.audio.fail_on("basic-breathing/intro-welcome.wav");
    h.controller.start(meditation("basic-breathing", 5)).await;
    settle().await;

    h.clock.advance_secs(31);
    h.controller.skip_audio().await;
    settle().await;

    assert!(h.controller.audio_error().await.is_none());
    assert_eq!(
        h.audio.narrations().last().map(String::as_str),
        Some("basic-breathing/breathing-settle.wav")
    );
    assert_eq!(h.audio.count(&AudioCall::Narration("basic-breathing/intro-welcome.wav".into())), 1);
}

#[tokio::test]
async fn stretch_routine_with_skip() {
    let h = Harness::new();
    let mut events = h.controller.subscribe();
    assert!(h.controller.start(stretch(&[("neck", 60), ("back", 40)])).await);
    settle().await;
    assert_eq!(h.audio.narrations(), vec!["stretching/neck-side-tilt-begin.wav".to_string()]);

    h.advance(30).await;
    let view = h.controller.view().await;
    assert_eq!(view.segment, Some(2));
    assert_eq!(h.audio.narrations().last().unwrap(), "shared/switch-sides.wav");

    h.controller.skip_stretch().await;
    settle().await;
    let view = h.controller.view().await;
    assert_eq!(view.position_index, Some(1));
    assert_eq!(view.current.as_deref(), Some("Child's Pose"));
    assert_eq!(h.audio.narrations().last().unwrap(), "stretching/childs-pose-begin.wav");

    h.advance(20).await;
    assert_eq!(h.audio.narrations().last().unwrap(), "shared/halfway.wav");
    h.advance(20).await;

    assert_eq!(h.controller.status().await, SessionStatus::Complete);
    assert_eq!(
        h.audio.count(&AudioCall::Completion("shared/session-complete.wav".into())),
        1
    );
    assert_eq!(completed_count(&drain(&mut events)), 1);

    let summary = h.controller.summary().await.unwrap();
    assert_eq!(summary.kind, "stretch");
    assert_eq!(summary.items.len(), 2);
    assert_eq!(summary.skipped_segments(), 2);
}

#[tokio::test]
async fn pause_survives_long_absence() {
    let h = Harness::new();
    h.controller.start(meditation("basic-breathing", 5)).await;
    settle().await;
    h.advance(40).await;

    h.controller.pause().await;
    assert_eq!(h.controller.status().await, SessionStatus::Paused);
    assert!(h.audio.calls().contains(&AudioCall::Playback(PlaybackState::Paused)));
    let saved = h.persistence.load(SNAPSHOT_KEY).unwrap().unwrap();
    assert!(saved.contains("\"status\":\"paused\""));

    h.clock.advance_secs(600);
    assert_eq!(h.controller.view().await.elapsed_seconds, 40);

    h.controller.resume().await;
    h.advance(5).await;
    assert_eq!(h.controller.view().await.elapsed_seconds, 45);
}

#[tokio::test]
async fn remote_controls_pause_and_resume() {
    let h = Harness::new();
    h.controller.init_audio().await.unwrap();
    h.controller.start(meditation("basic-breathing", 5)).await;
    settle().await;

    h.audio.press(RemoteCommand::Pause);
    settle().await;
    assert_eq!(h.controller.status().await, SessionStatus::Paused);

    // Skip is stretch-only.
    h.audio.press(RemoteCommand::SkipSegment);
    settle().await;
    assert_eq!(h.controller.view().await.current.as_deref(), Some("intro"));

    h.audio.press(RemoteCommand::Resume);
    settle().await;
    assert_eq!(h.controller.status().await, SessionStatus::Active);
}

#[tokio::test]
async fn unresolvable_selection_stays_idle() {
    let h = Harness::new();
    assert!(!h.controller.start(meditation("does-not-exist", 5)).await);
    assert!(!h.controller.start(meditation("basic-breathing", 45)).await);
    assert!(!h.controller.start(stretch(&[])).await);

    assert_eq!(h.controller.status().await, SessionStatus::Idle);
    assert!(h.persistence.load(SNAPSHOT_KEY).unwrap().is_none());
    assert!(h.audio.calls().is_empty());
}

#[tokio::test]
async fn end_is_idempotent_and_clears_snapshot() {
    let h = Harness::new();
    h.controller.start(meditation("basic-breathing", 5)).await;
    settle().await;
    assert!(h.persistence.load(SNAPSHOT_KEY).unwrap().is_some());

    h.controller.end().await;
    h.controller.end().await;

    assert_eq!(h.controller.status().await, SessionStatus::Idle);
    assert!(h.persistence.load(SNAPSHOT_KEY).unwrap().is_none());
    assert!(h.audio.count(&AudioCall::StopKeepalive) >= 1);

    // A fresh session can start afterwards.
    assert!(h.controller.start(stretch(&[("back", 30)])).await);
}
