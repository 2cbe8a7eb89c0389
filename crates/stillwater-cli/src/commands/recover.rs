use clap::Args;

use super::run::{AudioArgs, Session};
use super::{runtime, Catalogs, CliResult};

#[derive(Args)]
pub struct RecoverArgs {
    /// Continue the saved session
    #[arg(long, conflicts_with = "discard")]
    resume: bool,
    /// Throw the saved session away
    #[arg(long)]
    discard: bool,
    #[command(flatten)]
    audio: AudioArgs,
}

pub fn run(args: RecoverArgs, catalogs: &Catalogs) -> CliResult {
    runtime()?.block_on(recover(args, catalogs))
}

async fn recover(args: RecoverArgs, catalogs: &Catalogs) -> CliResult {
    let session = Session::open(catalogs, &args.audio)?;
    let controller = &session.controller;

    // Stale and unusable snapshots are cleared here without asking.
    let assessment = controller.initialize().await;
    println!("{}", serde_json::to_string_pretty(&assessment)?);

    if args.discard {
        if controller.has_saved_session().await {
            controller.discard_saved_session().await;
            eprintln!("saved session discarded");
        }
    } else if args.resume {
        if assessment.saved().is_none() {
            return Err("no saved session to resume".into());
        }
        let events = controller.subscribe();
        controller.init_audio().await?;
        if !controller.resume_saved_session().await {
            return Err("saved session could not be restored".into());
        }
        session.drive(events).await?;
    }
    Ok(())
}
