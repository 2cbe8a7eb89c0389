use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod console_audio;

#[derive(Parser)]
#[command(name = "stillwater", version, about = "Guided meditation and stretching timer")]
struct Cli {
    /// Meditation catalog (overrides manifest.meditation_path)
    #[arg(long, global = true)]
    meditation: Option<PathBuf>,
    /// Stretching catalog (overrides manifest.stretching_path)
    #[arg(long, global = true)]
    stretching: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the session catalogs
    Manifest {
        #[command(subcommand)]
        action: commands::manifest::ManifestAction,
    },
    /// Preview the narration timeline of a meditation
    Schedule(commands::schedule::ScheduleArgs),
    /// Run a session in real time
    Run {
        #[command(subcommand)]
        action: commands::run::RunAction,
    },
    /// Inspect, resume or discard a saved session
    Recover(commands::recover::RecoverArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Completed-session history
    History {
        #[command(subcommand)]
        action: commands::history::HistoryAction,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("STILLWATER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let catalogs = commands::Catalogs {
        meditation: cli.meditation,
        stretching: cli.stretching,
    };

    let result = match cli.command {
        Commands::Manifest { action } => commands::manifest::run(action, &catalogs),
        Commands::Schedule(args) => commands::schedule::run(args, &catalogs),
        Commands::Run { action } => commands::run::run(action, &catalogs),
        Commands::Recover(args) => commands::recover::run(args, &catalogs),
        Commands::Config { action } => commands::config::run(action),
        Commands::History { action } => commands::history::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
