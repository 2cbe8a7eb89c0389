//! Async session controller.
//!
//! Wraps the [`SessionEngine`] in a tokio mutex, runs the periodic ticker
//! and the pause watchdog, and carries out the engine's effects against the
//! audio port, the snapshot store and event subscribers.
//!
//! Background tasks hold only a weak reference, and the ticker and watchdog
//! handles live under the same lock as the engine, so a task is never
//! cancelled halfway through applying effects.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::audio::{AudioOrchestrator, AudioPort, RemoteCommand, RemoteControls};
use crate::error::AudioError;
use crate::events::{SessionEvent, SessionSummary};
use crate::manifest::ManifestProvider;
use crate::recovery::{RecoveryAssessment, RecoveryController};
use crate::storage::{Config, PersistencePort, SnapshotStore};
use crate::timer::{
    CueScheduler, Effect, SessionEngine, SessionPlan, SessionSelection, SessionSnapshot,
    SessionStatus, SessionView, TimeSource,
};

const EVENT_CAPACITY: usize = 256;

/// Runtime knobs, usually taken from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub tick_interval: Duration,
    pub pause_timeout_secs: u64,
    pub pause_check_interval: Duration,
    pub stale_after_secs: u64,
    pub keepalive: bool,
    /// Fixed seed for cue timing and stretch choice.
    pub seed: Option<u64>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.timing.tick_interval_ms.max(1)),
            pause_timeout_secs: config.timing.pause_timeout_secs,
            pause_check_interval: Duration::from_secs(
                config.timing.pause_check_interval_secs.max(1),
            ),
            stale_after_secs: config.timing.stale_after_secs,
            keepalive: config.audio.keepalive,
            seed: None,
        }
    }
}

/// Everything guarded by the session lock.
struct SessionState {
    engine: SessionEngine,
    ticker: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
    remote: Option<JoinHandle<()>>,
    /// A resumable snapshot found at startup, not yet resumed or discarded.
    saved: Option<SessionSnapshot>,
}

struct Inner {
    state: Mutex<SessionState>,
    audio: AudioOrchestrator,
    store: SnapshotStore,
    recovery: RecoveryController,
    manifests: Arc<dyn ManifestProvider>,
    time: Arc<dyn TimeSource>,
    scheduler: CueScheduler,
    settings: ControllerSettings,
    events: broadcast::Sender<SessionEvent>,
}

/// Owns the running session. Cheap to clone.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(
        audio: Arc<dyn AudioPort>,
        persistence: Arc<dyn PersistencePort>,
        manifests: Arc<dyn ManifestProvider>,
        time: Arc<dyn TimeSource>,
        settings: ControllerSettings,
    ) -> Self {
        let store = SnapshotStore::new(persistence);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let scheduler = match settings.seed {
            Some(seed) => CueScheduler::with_seed(seed),
            None => CueScheduler::new(),
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState {
                    engine: SessionEngine::new(),
                    ticker: None,
                    watchdog: None,
                    remote: None,
                    saved: None,
                }),
                audio: AudioOrchestrator::new(audio, settings.keepalive),
                recovery: RecoveryController::new(store.clone(), settings.stale_after_secs),
                store,
                manifests,
                time,
                scheduler,
                settings,
                events,
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn now_ms(&self) -> u64 {
        self.inner.time.now_ms()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Unlock platform audio and register remote controls.
    ///
    /// Must run from a direct user interaction before the first session.
    pub async fn init_audio(&self) -> Result<(), AudioError> {
        self.inner.audio.init().await?;

        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.inner.audio.register_controls(RemoteControls {
            sender,
            skip_enabled: true,
        });

        let weak = Arc::downgrade(&self.inner);
        let listener = tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                let Some(controller) = Self::from_weak(&weak) else {
                    break;
                };
                controller.handle_remote(command).await;
            }
        });

        let mut state = self.inner.state.lock().await;
        if let Some(previous) = state.remote.replace(listener) {
            previous.abort();
        }
        Ok(())
    }

    async fn handle_remote(&self, command: RemoteCommand) {
        debug!(?command, "remote command");
        match command {
            RemoteCommand::Pause => self.pause().await,
            RemoteCommand::Resume => self.resume().await,
            RemoteCommand::SkipSegment => {
                let is_stretch = {
                    let state = self.inner.state.lock().await;
                    matches!(
                        state.engine.snapshot().map(|s| &s.plan),
                        Some(SessionPlan::Stretch(_))
                    )
                };
                if is_stretch {
                    self.skip_segment().await;
                }
            }
        }
    }

    /// Classify any saved session. Stale ones are discarded here.
    pub async fn initialize(&self) -> RecoveryAssessment {
        let assessment = self.inner.recovery.assess(self.now_ms());
        let mut state = self.inner.state.lock().await;
        state.saved = assessment.saved().map(|saved| saved.snapshot.clone());
        assessment
    }

    /// Stop background tasks and release the audio port.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().await;
            for handle in [state.ticker.take(), state.watchdog.take(), state.remote.take()]
                .into_iter()
                .flatten()
            {
                handle.abort();
            }
        }
        self.inner.audio.teardown().await;
        info!("controller shut down");
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn view(&self) -> SessionView {
        let state = self.inner.state.lock().await;
        let mut view = state.engine.view(self.now_ms());
        view.has_saved_session = state.saved.is_some();
        view
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.state.lock().await.engine.status()
    }

    pub async fn has_saved_session(&self) -> bool {
        self.inner.state.lock().await.saved.is_some()
    }

    pub async fn audio_error(&self) -> Option<AudioError> {
        self.inner.state.lock().await.engine.pending_error().cloned()
    }

    pub async fn summary(&self) -> Option<SessionSummary> {
        self.inner.state.lock().await.engine.summary().cloned()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Resolve `selection` and begin the session.
    ///
    /// Returns false, leaving the controller as it was, if the manifest is
    /// unavailable or the selection cannot be resolved.
    pub async fn start(&self, selection: SessionSelection) -> bool {
        let plan = match self
            .inner
            .manifests
            .load_manifest()
            .and_then(|manifest| SessionPlan::resolve(&manifest, &selection, &self.inner.scheduler))
        {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, ?selection, "session not started");
                return false;
            }
        };

        let mut state = self.inner.state.lock().await;
        let before = state.engine.status();
        let effects = state.engine.start(plan, self.now_ms());
        if effects.is_empty() {
            return false;
        }
        if matches!(before, SessionStatus::Idle | SessionStatus::Complete) {
            state.saved = None;
        }
        self.commit(&mut state, effects).await;
        true
    }

    pub async fn pause(&self) {
        self.run(|engine, now| engine.pause(now)).await;
    }

    pub async fn resume(&self) {
        self.run(|engine, now| engine.resume(now)).await;
    }

    pub async fn skip_segment(&self) {
        self.run(|engine, now| engine.skip_segment(now)).await;
    }

    pub async fn skip_stretch(&self) {
        self.run(|engine, now| engine.skip_stretch(now)).await;
    }

    pub async fn end(&self) {
        self.run(|engine, now| engine.end(now)).await;
    }

    pub async fn retry_audio(&self) {
        self.run(|engine, now| engine.retry_audio(now)).await;
    }

    pub async fn skip_audio(&self) {
        self.run(|engine, now| {
            let mut effects = engine.skip_audio(now);
            effects.extend(engine.tick(now));
            effects
        })
        .await;
    }

    /// The app came back to the foreground: reconcile immediately.
    pub async fn on_visible(&self) {
        self.run(|engine, now| engine.tick(now)).await;
    }

    /// Pick up the session offered by [`initialize`](Self::initialize).
    pub async fn resume_saved_session(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(saved) = state.saved.take() else {
            return false;
        };
        let effects = state.engine.restore(saved, self.now_ms());
        let restored = effects
            .iter()
            .any(|e| matches!(e, Effect::Emit(SessionEvent::Restored { .. })));
        self.commit(&mut state, effects).await;
        restored
    }

    pub async fn discard_saved_session(&self) {
        let mut state = self.inner.state.lock().await;
        if state.saved.take().is_some() {
            self.inner.recovery.discard();
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn run(&self, command: impl FnOnce(&mut SessionEngine, u64) -> Vec<Effect>) {
        let mut state = self.inner.state.lock().await;
        let effects = command(&mut state.engine, self.now_ms());
        self.commit(&mut state, effects).await;
    }

    /// Apply effects, then bring background tasks in line with the status.
    async fn commit(&self, state: &mut SessionState, effects: Vec<Effect>) {
        self.apply(effects).await;
        self.sync_tasks(state);
    }

    async fn apply(&self, effects: Vec<Effect>) {
        let audio = &self.inner.audio;
        for effect in effects {
            match effect {
                Effect::Narrate { seq, audio_ref } => self.spawn_narration(seq, audio_ref),
                Effect::StopNarration => audio.stop_narration().await,
                Effect::PlayBell { audio_ref } => {
                    let audio = audio.clone();
                    tokio::spawn(async move { audio.bell(&audio_ref).await });
                }
                Effect::PlayCompletion { audio_ref } => {
                    let audio = audio.clone();
                    tokio::spawn(async move { audio.completion(&audio_ref).await });
                }
                Effect::StartKeepalive => audio.start_keepalive().await,
                Effect::StopKeepalive => audio.stop_keepalive().await,
                Effect::NowPlaying { title, subtitle } => audio.now_playing(&title, &subtitle),
                Effect::Playback(playback) => audio.playback(playback),
                Effect::Persist(snapshot) => self.inner.store.save(&snapshot),
                Effect::ClearPersisted => self.inner.store.clear(),
                Effect::Emit(event) => {
                    // No subscribers is fine.
                    let _ = self.inner.events.send(event);
                }
            }
        }
    }

    /// Play a narration without holding the session lock, then report back.
    fn spawn_narration(&self, seq: u64, audio_ref: String) {
        let audio = self.inner.audio.clone();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let result = audio.narrate(&audio_ref).await;
            if let Some(controller) = Self::from_weak(&weak) {
                controller.narration_finished(seq, result).await;
            }
        });
    }

    async fn narration_finished(&self, seq: u64, result: Result<(), AudioError>) {
        let succeeded = result.is_ok();
        self.run(|engine, now| {
            let mut effects = engine.narration_finished(seq, result, now);
            if succeeded {
                effects.extend(engine.tick(now));
            }
            effects
        })
        .await;
    }

    /// Ticker runs while Active, watchdog while Paused.
    fn sync_tasks(&self, state: &mut SessionState) {
        match state.engine.status() {
            SessionStatus::Active => {
                if state.ticker.is_none() {
                    state.ticker = Some(self.spawn_ticker());
                }
                if let Some(handle) = state.watchdog.take() {
                    handle.abort();
                }
            }
            SessionStatus::Paused => {
                if let Some(handle) = state.ticker.take() {
                    handle.abort();
                }
                if state.watchdog.is_none() {
                    state.watchdog = Some(self.spawn_watchdog());
                }
            }
            SessionStatus::Idle | SessionStatus::Complete => {
                for handle in [state.ticker.take(), state.watchdog.take()]
                    .into_iter()
                    .flatten()
                {
                    handle.abort();
                }
            }
        }
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.tick_interval;
        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(controller) = Self::from_weak(&weak) else {
                    break;
                };
                let mut state = controller.inner.state.lock().await;
                let effects = state.engine.tick(controller.now_ms());
                controller.apply(effects).await;
                if state.engine.status() != SessionStatus::Active {
                    // Detach rather than abort: this is the running task.
                    state.ticker = None;
                    controller.sync_tasks(&mut state);
                    break;
                }
            }
        })
    }

    fn spawn_watchdog(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.pause_check_interval;
        let timeout_secs = self.inner.settings.pause_timeout_secs;
        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(controller) = Self::from_weak(&weak) else {
                    break;
                };
                let mut state = controller.inner.state.lock().await;
                let effects = state
                    .engine
                    .check_pause_timeout(controller.now_ms(), timeout_secs);
                controller.apply(effects).await;
                if state.engine.status() != SessionStatus::Paused {
                    state.watchdog = None;
                    controller.sync_tasks(&mut state);
                    break;
                }
            }
        })
    }
}
