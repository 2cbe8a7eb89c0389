//! Audio port.
//!
//! The session engine never touches a sound device. It talks to an
//! [`AudioPort`], which the host platform implements; tests use a recording
//! port and the CLI prints what it would play.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::AudioError;

/// Lock-screen playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    None,
}

/// A command issued from lock-screen or headset controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Pause,
    Resume,
    SkipSegment,
}

/// Where remote commands go, and which ones the platform should offer.
#[derive(Debug, Clone)]
pub struct RemoteControls {
    pub sender: mpsc::UnboundedSender<RemoteCommand>,
    /// Offered only for stretch sessions.
    pub skip_enabled: bool,
}

impl RemoteControls {
    pub fn send(&self, command: RemoteCommand) {
        if command == RemoteCommand::SkipSegment && !self.skip_enabled {
            return;
        }
        if self.sender.send(command).is_err() {
            debug!(?command, "remote command dropped: controller gone");
        }
    }
}

/// Platform audio.
///
/// Narration and chimes resolve when playback finishes. There is a single
/// narration channel: starting a new clip replaces the current one.
#[async_trait]
pub trait AudioPort: Send + Sync {
    async fn init(&self) -> Result<(), AudioError>;

    async fn play_narration(&self, audio_ref: &str) -> Result<(), AudioError>;

    async fn play_bell(&self, audio_ref: &str) -> Result<(), AudioError>;

    async fn play_completion_sound(&self, audio_ref: &str) -> Result<(), AudioError>;

    async fn stop_narration(&self);

    /// Loop near-silent audio so the platform keeps the process alive.
    async fn start_keepalive(&self);

    async fn stop_keepalive(&self);

    fn set_now_playing(&self, title: &str, subtitle: &str);

    fn set_playback_state(&self, state: PlaybackState);

    fn register_controls(&self, controls: RemoteControls);

    async fn teardown(&self);
}

/// Session-facing wrapper around an [`AudioPort`].
///
/// Chimes are best-effort; only narration failures are reported back.
#[derive(Clone)]
pub struct AudioOrchestrator {
    port: Arc<dyn AudioPort>,
    keepalive: bool,
}

impl AudioOrchestrator {
    pub fn new(port: Arc<dyn AudioPort>, keepalive: bool) -> Self {
        Self { port, keepalive }
    }

    pub async fn init(&self) -> Result<(), AudioError> {
        self.port.init().await
    }

    pub async fn narrate(&self, audio_ref: &str) -> Result<(), AudioError> {
        debug!(%audio_ref, "narration");
        self.port.play_narration(audio_ref).await
    }

    pub async fn bell(&self, audio_ref: &str) {
        if let Err(e) = self.port.play_bell(audio_ref).await {
            warn!(%audio_ref, message = %e.message, "bell failed");
        }
    }

    pub async fn completion(&self, audio_ref: &str) {
        if let Err(e) = self.port.play_completion_sound(audio_ref).await {
            warn!(%audio_ref, message = %e.message, "completion sound failed");
        }
    }

    pub async fn stop_narration(&self) {
        self.port.stop_narration().await;
    }

    pub async fn start_keepalive(&self) {
        if self.keepalive {
            self.port.start_keepalive().await;
        }
    }

    pub async fn stop_keepalive(&self) {
        if self.keepalive {
            self.port.stop_keepalive().await;
        }
    }

    pub fn now_playing(&self, title: &str, subtitle: &str) {
        self.port.set_now_playing(title, subtitle);
    }

    pub fn playback(&self, state: PlaybackState) {
        self.port.set_playback_state(state);
    }

    pub fn register_controls(&self, controls: RemoteControls) {
        self.port.register_controls(controls);
    }

    pub async fn teardown(&self) {
        self.port.teardown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_is_withheld_when_disabled() {
        let (sender, mut rx) = mpsc::unbounded_channel();
        let controls = RemoteControls {
            sender,
            skip_enabled: false,
        };
        controls.send(RemoteCommand::SkipSegment);
        controls.send(RemoteCommand::Pause);
        assert_eq!(rx.try_recv().unwrap(), RemoteCommand::Pause);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_after_receiver_dropped_is_silent() {
        let (sender, rx) = mpsc::unbounded_channel();
        drop(rx);
        let controls = RemoteControls {
            sender,
            skip_enabled: true,
        };
        controls.send(RemoteCommand::Resume);
    }
}
