//! Terminal stand-in for platform audio.
//!
//! Clips are "played" by printing their reference to stderr and waiting a
//! fixed time. With an asset root set, a clip whose file is missing fails
//! the way an undecodable file would on a device.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use stillwater_core::audio::{AudioPort, PlaybackState, RemoteCommand, RemoteControls};
use stillwater_core::AudioError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ConsoleAudio {
    asset_root: Option<PathBuf>,
    volume: u32,
    clip: Duration,
    /// Cancelled to cut the current narration short.
    interrupt: Mutex<CancellationToken>,
    controls: Mutex<Option<RemoteControls>>,
}

impl ConsoleAudio {
    pub fn new(asset_root: Option<PathBuf>, volume: u32, clip: Duration) -> Self {
        Self {
            asset_root,
            volume,
            clip,
            interrupt: Mutex::new(CancellationToken::new()),
            controls: Mutex::new(None),
        }
    }

    /// Deliver a media-key press through the registered controls.
    pub fn press(&self, command: RemoteCommand) -> bool {
        let Ok(controls) = self.controls.lock() else {
            return false;
        };
        match controls.as_ref() {
            Some(controls) => {
                controls.send(command);
                true
            }
            None => false,
        }
    }

    fn check(&self, audio_ref: &str) -> Result<(), AudioError> {
        match &self.asset_root {
            Some(root) if !root.join(audio_ref).is_file() => {
                Err(AudioError::new(audio_ref, "file not found"))
            }
            _ => Ok(()),
        }
    }

    fn current_interrupt(&self) -> CancellationToken {
        self.interrupt
            .lock()
            .map(|token| token.clone())
            .unwrap_or_default()
    }

    /// Cancel whatever is playing; later narrations get a fresh token.
    fn interrupt_narration(&self) {
        if let Ok(mut token) = self.interrupt.lock() {
            token.cancel();
            *token = CancellationToken::new();
        }
    }

    fn announce(&self, label: &str, audio_ref: &str) {
        if self.volume > 0 {
            eprintln!("  [{label}] {audio_ref}");
        }
    }
}

#[async_trait]
impl AudioPort for ConsoleAudio {
    async fn init(&self) -> Result<(), AudioError> {
        if let Some(root) = &self.asset_root {
            if !root.is_dir() {
                return Err(AudioError::new(root.display().to_string(), "asset directory not found"));
            }
        }
        Ok(())
    }

    async fn play_narration(&self, audio_ref: &str) -> Result<(), AudioError> {
        self.check(audio_ref)?;
        self.announce("narration", audio_ref);
        let interrupt = self.current_interrupt();
        tokio::select! {
            _ = tokio::time::sleep(self.clip) => {}
            _ = interrupt.cancelled() => debug!(%audio_ref, "narration cut short"),
        }
        Ok(())
    }

    async fn play_bell(&self, audio_ref: &str) -> Result<(), AudioError> {
        self.check(audio_ref)?;
        self.announce("bell", audio_ref);
        Ok(())
    }

    async fn play_completion_sound(&self, audio_ref: &str) -> Result<(), AudioError> {
        self.check(audio_ref)?;
        self.announce("complete", audio_ref);
        Ok(())
    }

    async fn stop_narration(&self) {
        self.interrupt_narration();
    }

    async fn start_keepalive(&self) {
        debug!("keepalive started");
    }

    async fn stop_keepalive(&self) {
        debug!("keepalive stopped");
    }

    fn set_now_playing(&self, title: &str, subtitle: &str) {
        eprintln!("now playing: {title} / {subtitle}");
    }

    fn set_playback_state(&self, state: PlaybackState) {
        debug!(?state, "playback state");
    }

    fn register_controls(&self, controls: RemoteControls) {
        if let Ok(mut slot) = self.controls.lock() {
            *slot = Some(controls);
        }
    }

    async fn teardown(&self) {
        self.interrupt_narration();
        if let Ok(mut slot) = self.controls.lock() {
            slot.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_asset_fails_like_a_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bell.wav"), b"RIFF").unwrap();
        let audio = ConsoleAudio::new(Some(dir.path().to_path_buf()), 0, Duration::ZERO);

        assert!(audio.play_bell("bell.wav").await.is_ok());
        let err = audio.play_narration("missing.wav").await.unwrap_err();
        assert_eq!(err.audio_ref, "missing.wav");
    }

    #[tokio::test]
    async fn stop_cuts_narration_short() {
        let audio = std::sync::Arc::new(ConsoleAudio::new(None, 0, Duration::from_secs(3600)));
        let playing = {
            let audio = audio.clone();
            tokio::spawn(async move { audio.play_narration("long.wav").await })
        };
        tokio::task::yield_now().await;
        audio.stop_narration().await;
        let finished = tokio::time::timeout(Duration::from_secs(5), playing)
            .await
            .expect("narration should stop");
        assert!(finished.unwrap().is_ok());
    }

    #[test]
    fn press_without_controls_is_dropped() {
        let audio = ConsoleAudio::new(None, 80, Duration::ZERO);
        assert!(!audio.press(RemoteCommand::Pause));
    }
}
