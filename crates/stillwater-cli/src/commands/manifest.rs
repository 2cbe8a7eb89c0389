use clap::Subcommand;
use serde::Serialize;
use stillwater_core::Config;

use super::{Catalogs, CliResult};

#[derive(Subcommand)]
pub enum ManifestAction {
    /// List sessions, their duration options and stretch regions
    List,
    /// Print the loaded catalogs as JSON
    Show,
}

#[derive(Serialize)]
struct SessionListing {
    id: String,
    name: String,
    minutes: Vec<u32>,
}

#[derive(Serialize)]
struct RegionListing {
    region: String,
    stretches: Vec<String>,
}

#[derive(Serialize)]
struct Listing {
    sessions: Vec<SessionListing>,
    regions: Vec<RegionListing>,
}

pub fn run(action: ManifestAction, catalogs: &Catalogs) -> CliResult {
    let config = Config::load_or_default();
    let manifest = catalogs.load(&config)?;

    match action {
        ManifestAction::List => {
            let sessions = manifest
                .meditation
                .iter()
                .flat_map(|m| &m.sessions)
                .map(|s| SessionListing {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    minutes: s.variants.iter().map(|v| v.duration_minutes).collect(),
                })
                .collect();
            let regions = manifest
                .stretching
                .iter()
                .flat_map(|s| &s.regions)
                .map(|(region, r)| RegionListing {
                    region: region.clone(),
                    stretches: r.stretches.iter().map(|s| s.id.clone()).collect(),
                })
                .collect();
            let listing = Listing { sessions, regions };
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        ManifestAction::Show => {
            println!("{}", serde_json::to_string_pretty(manifest.as_ref())?);
        }
    }
    Ok(())
}
