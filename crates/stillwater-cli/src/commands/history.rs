use clap::Subcommand;
use stillwater_core::Database;

use super::CliResult;

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Most recently completed sessions
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Totals across all completed sessions
    Stats,
}

pub fn run(action: HistoryAction) -> CliResult {
    let db = Database::open()?;

    match action {
        HistoryAction::List { limit } => {
            let sessions = db.recent_sessions(limit)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        HistoryAction::Stats => {
            let stats = db.stats_all()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
