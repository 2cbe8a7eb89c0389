use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Subcommand};
use stillwater_core::audio::RemoteCommand;
use stillwater_core::error::ValidationError;
use stillwater_core::{
    Config, ControllerSettings, Database, RegionSelection, SessionController, SessionEvent,
    SessionSelection, SqlitePersistence, SystemClock,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{runtime, Catalogs, CliResult};
use crate::console_audio::ConsoleAudio;

/// Time left for the closing chime before the runtime shuts down.
const CHIME_GRACE: Duration = Duration::from_millis(300);

const KEYS: &str = "commands: p pause | r resume | s skip segment | n next stretch | retry | skip-audio | status | q end";

#[derive(Subcommand)]
pub enum RunAction {
    /// Guided meditation
    Meditation {
        /// Session id from the meditation catalog
        session: String,
        /// Duration option in minutes
        #[arg(long)]
        minutes: u32,
        #[command(flatten)]
        audio: AudioArgs,
    },
    /// Timed stretching routine
    Stretch {
        /// Regions with their durations, e.g. neck:60 back:90
        #[arg(required = true, value_parser = parse_region)]
        regions: Vec<RegionSelection>,
        #[command(flatten)]
        audio: AudioArgs,
    },
}

#[derive(Args, Clone)]
pub struct AudioArgs {
    /// Directory audio references resolve against; missing files fail playback
    #[arg(long)]
    pub assets: Option<PathBuf>,
    /// Simulated narration length in milliseconds
    #[arg(long, default_value_t = 1500)]
    pub clip_ms: u64,
}

/// Parse `region:seconds`.
pub fn parse_region(arg: &str) -> Result<RegionSelection, ValidationError> {
    let invalid = |message: &str| ValidationError::InvalidValue {
        field: "region".into(),
        message: format!("'{arg}': {message}"),
    };
    let (region, seconds) = arg
        .split_once(':')
        .ok_or_else(|| invalid("expected <region>:<seconds>"))?;
    if region.is_empty() {
        return Err(invalid("region name is empty"));
    }
    let duration_seconds = seconds
        .parse::<u64>()
        .map_err(|_| invalid("seconds must be a whole number"))?;
    Ok(RegionSelection {
        region: region.to_string(),
        duration_seconds,
    })
}

/// A controller wired to console audio and on-disk storage.
pub(crate) struct Session {
    pub controller: SessionController,
    pub audio: Arc<ConsoleAudio>,
    history: Database,
}

impl Session {
    pub fn open(catalogs: &Catalogs, args: &AudioArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let audio = Arc::new(ConsoleAudio::new(
            args.assets.clone(),
            config.audio.narration_volume,
            Duration::from_millis(args.clip_ms),
        ));
        let persistence = Arc::new(SqlitePersistence::new(Database::open()?));
        let controller = SessionController::new(
            audio.clone(),
            persistence,
            Arc::new(catalogs.provider(&config)),
            Arc::new(SystemClock),
            ControllerSettings::from(&config),
        );
        Ok(Self {
            controller,
            audio,
            history: Database::open()?,
        })
    }

    /// Print events and read commands until the session completes or ends.
    ///
    /// Ctrl-C leaves the saved snapshot in place for `stillwater recover`.
    pub async fn drive(&self, mut events: broadcast::Receiver<SessionEvent>) -> CliResult {
        eprintln!("{KEYS}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut input_open = true;

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        println!("{}", serde_json::to_string(&event)?);
                        match event {
                            SessionEvent::Completed { summary, .. } => {
                                let id = self.history.record_session(&summary, Utc::now())?;
                                info!(id, "session recorded");
                                break;
                            }
                            SessionEvent::Ended { .. } => break,
                            SessionEvent::AudioFailed { error, .. } => {
                                eprintln!("{error}; type 'retry' or 'skip-audio'");
                            }
                            _ => {}
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event output fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => self.handle_input(line.trim()).await?,
                    Ok(None) => input_open = false,
                    Err(e) => {
                        warn!(error = %e, "stdin unreadable; commands disabled");
                        input_open = false;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted; session saved for recovery");
                    break;
                }
            }
        }

        tokio::time::sleep(CHIME_GRACE).await;
        self.controller.shutdown().await;
        Ok(())
    }

    async fn handle_input(&self, input: &str) -> CliResult {
        let controller = &self.controller;
        match input {
            "" => {}
            "p" | "pause" => {
                if !self.audio.press(RemoteCommand::Pause) {
                    controller.pause().await;
                }
            }
            "r" | "resume" => {
                if !self.audio.press(RemoteCommand::Resume) {
                    controller.resume().await;
                }
            }
            "s" | "skip" => controller.skip_segment().await,
            "n" | "next" => controller.skip_stretch().await,
            "retry" => controller.retry_audio().await,
            "skip-audio" => controller.skip_audio().await,
            "status" => {
                let view = controller.view().await;
                eprintln!("{}", serde_json::to_string_pretty(&view)?);
            }
            "q" | "end" => controller.end().await,
            other => eprintln!("unknown command '{other}'; {KEYS}"),
        }
        Ok(())
    }
}

pub fn run(action: RunAction, catalogs: &Catalogs) -> CliResult {
    let (selection, audio) = match action {
        RunAction::Meditation {
            session,
            minutes,
            audio,
        } => (
            SessionSelection::Meditation {
                session_id: session,
                duration_minutes: minutes,
            },
            audio,
        ),
        RunAction::Stretch { regions, audio } => (SessionSelection::Stretch { regions }, audio),
    };

    runtime()?.block_on(start_session(selection, &audio, catalogs))
}

async fn start_session(
    selection: SessionSelection,
    audio: &AudioArgs,
    catalogs: &Catalogs,
) -> CliResult {
    let session = Session::open(catalogs, audio)?;
    if session.controller.initialize().await.saved().is_some() {
        warn!("a saved session exists and will be replaced; use `stillwater recover --resume` to continue it instead");
    }

    let events = session.controller.subscribe();
    session.controller.init_audio().await?;
    if !session.controller.start(selection).await {
        return Err("session could not be started (see log)".into());
    }
    session.drive(events).await
}
