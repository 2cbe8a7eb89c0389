use clap::Args;
use stillwater_core::error::ManifestError;
use stillwater_core::{Config, CueScheduler};

use super::{Catalogs, CliResult};

#[derive(Args)]
pub struct ScheduleArgs {
    /// Meditation session id
    session: String,
    /// Duration option in minutes
    #[arg(long)]
    minutes: u32,
    /// Seed for a reproducible timeline
    #[arg(long)]
    seed: Option<u64>,
}

pub fn run(args: ScheduleArgs, catalogs: &Catalogs) -> CliResult {
    let config = Config::load_or_default();
    let manifest = catalogs.load(&config)?;

    let session = manifest
        .meditation()?
        .session(&args.session)
        .ok_or_else(|| ManifestError::UnknownSession(args.session.clone()))?;
    let variant = session
        .variant(args.minutes)
        .ok_or_else(|| ManifestError::UnknownVariant {
            session_id: args.session.clone(),
            duration_minutes: args.minutes,
        })?;

    let scheduler = match args.seed {
        Some(seed) => CueScheduler::with_seed(seed),
        None => CueScheduler::new(),
    };
    let cues = scheduler.schedule(variant);
    println!("{}", serde_json::to_string_pretty(&cues)?);
    Ok(())
}
