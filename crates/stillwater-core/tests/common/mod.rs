//! Shared test harness: a recording audio port and a controller wired to
//! in-memory storage, a manual clock and the JSON fixtures.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stillwater_core::audio::{AudioPort, PlaybackState, RemoteCommand, RemoteControls};
use stillwater_core::storage::{MemoryPersistence, PersistencePort};
use stillwater_core::{
    AudioError, CachedManifestProvider, ControllerSettings, FileManifestProvider, ManualClock,
    SessionController,
};

pub const T0: u64 = 1_700_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCall {
    Init,
    Narration(String),
    Bell(String),
    Completion(String),
    StopNarration,
    StartKeepalive,
    StopKeepalive,
    NowPlaying(String, String),
    Playback(PlaybackState),
    Teardown,
}

/// Audio port that records every call and fails on demand.
#[derive(Default)]
pub struct RecordingAudio {
    calls: Mutex<Vec<AudioCall>>,
    failing: Mutex<HashSet<String>>,
    controls: Mutex<Option<RemoteControls>>,
}

impl RecordingAudio {
    pub fn calls(&self) -> Vec<AudioCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn narrations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AudioCall::Narration(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &AudioCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn fail_on(&self, audio_ref: &str) {
        self.failing.lock().unwrap().insert(audio_ref.to_string());
    }

    pub fn heal(&self, audio_ref: &str) {
        self.failing.lock().unwrap().remove(audio_ref);
    }

    /// Simulate a lock-screen button.
    pub fn press(&self, command: RemoteCommand) {
        if let Some(controls) = self.controls.lock().unwrap().as_ref() {
            controls.send(command);
        }
    }

    fn record(&self, call: AudioCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn outcome(&self, audio_ref: &str) -> Result<(), AudioError> {
        if self.failing.lock().unwrap().contains(audio_ref) {
            Err(AudioError::new(audio_ref, "file could not be decoded"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AudioPort for RecordingAudio {
    async fn init(&self) -> Result<(), AudioError> {
        self.record(AudioCall::Init);
        Ok(())
    }

    async fn play_narration(&self, audio_ref: &str) -> Result<(), AudioError> {
        self.record(AudioCall::Narration(audio_ref.to_string()));
        self.outcome(audio_ref)
    }

    async fn play_bell(&self, audio_ref: &str) -> Result<(), AudioError> {
        self.record(AudioCall::Bell(audio_ref.to_string()));
        self.outcome(audio_ref)
    }

    async fn play_completion_sound(&self, audio_ref: &str) -> Result<(), AudioError> {
        self.record(AudioCall::Completion(audio_ref.to_string()));
        self.outcome(audio_ref)
    }

    async fn stop_narration(&self) {
        self.record(AudioCall::StopNarration);
    }

    async fn start_keepalive(&self) {
        self.record(AudioCall::StartKeepalive);
    }

    async fn stop_keepalive(&self) {
        self.record(AudioCall::StopKeepalive);
    }

    fn set_now_playing(&self, title: &str, subtitle: &str) {
        self.record(AudioCall::NowPlaying(title.to_string(), subtitle.to_string()));
    }

    fn set_playback_state(&self, state: PlaybackState) {
        self.record(AudioCall::Playback(state));
    }

    fn register_controls(&self, controls: RemoteControls) {
        *self.controls.lock().unwrap() = Some(controls);
    }

    async fn teardown(&self) {
        self.record(AudioCall::Teardown);
    }
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub struct Harness {
    pub controller: SessionController,
    pub audio: Arc<RecordingAudio>,
    pub persistence: Arc<dyn PersistencePort>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_persistence(Arc::new(MemoryPersistence::new()), ManualClock::new(T0))
    }

    /// A controller over existing storage, as after an app restart.
    pub fn with_persistence(persistence: Arc<dyn PersistencePort>, clock: ManualClock) -> Self {
        let audio = Arc::new(RecordingAudio::default());
        let manifests = CachedManifestProvider::new(FileManifestProvider::new(
            Some(fixture("meditation.json")),
            Some(fixture("stretching.json")),
        ));
        let settings = ControllerSettings {
            seed: Some(11),
            ..ControllerSettings::default()
        };
        let controller = SessionController::new(
            audio.clone(),
            persistence.clone(),
            Arc::new(manifests),
            Arc::new(clock.clone()),
            settings,
        );
        Self {
            controller,
            audio,
            persistence,
            clock,
        }
    }

    /// Move the wall clock and deliver the became-visible signal.
    pub async fn advance(&self, secs: u64) {
        self.clock.advance_secs(secs);
        self.controller.on_visible().await;
        settle().await;
    }

    /// Run both clocks forward a second at a time and let the ticker and
    /// the pause watchdog do the work. Needs a paused tokio clock.
    pub async fn run_for(&self, secs: u64) {
        for _ in 0..secs {
            self.clock.advance_secs(1);
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
    }
}

/// Let spawned narration and chime tasks run to completion.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
