//! Session catalogs: meditation sessions and stretch regions.
//!
//! Both catalogs are JSON files produced by the asset pipeline. Keys are
//! camelCase on disk; audio references are paths relative to the asset root
//! and are handed to the audio port verbatim.

mod provider;

pub use provider::{
    CachedManifestProvider, FileManifestProvider, ManifestProvider, StaticManifestProvider,
};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// Everything the session engine can be asked to play.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionManifest {
    #[serde(default)]
    pub meditation: Option<MeditationManifest>,
    #[serde(default)]
    pub stretching: Option<StretchManifest>,
}

impl SessionManifest {
    pub fn validate(&self) -> Result<(), ManifestError> {
        if let Some(meditation) = &self.meditation {
            meditation.validate()?;
        }
        if let Some(stretching) = &self.stretching {
            stretching.validate()?;
        }
        Ok(())
    }

    pub fn meditation(&self) -> Result<&MeditationManifest, ManifestError> {
        self.meditation
            .as_ref()
            .ok_or(ManifestError::MissingCatalog("meditation"))
    }

    pub fn stretching(&self) -> Result<&StretchManifest, ManifestError> {
        self.stretching
            .as_ref()
            .ok_or(ManifestError::MissingCatalog("stretching"))
    }
}

// ── Meditation ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeditationManifest {
    pub sessions: Vec<MeditationSession>,
    pub shared: MeditationShared,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeditationShared {
    pub bell: String,
    #[serde(default)]
    pub silence: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeditationSession {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub variants: Vec<SessionVariant>,
}

/// One duration option of a meditation session.
///
/// Phase durations are fixed once the variant is resolved; the session's
/// total length is always the sum of its phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionVariant {
    pub duration_minutes: u32,
    pub phases: Vec<Phase>,
}

impl SessionVariant {
    pub fn total_seconds(&self) -> u64 {
        self.phases.iter().map(|p| p.duration_seconds).sum()
    }

    /// Seconds from session start at which phase `index` begins.
    pub fn phase_start(&self, index: usize) -> u64 {
        self.phases
            .iter()
            .take(index)
            .map(|p| p.duration_seconds)
            .sum()
    }

    /// Index of the phase that contains `elapsed`. Past the end this is the
    /// last phase.
    pub fn phase_at(&self, elapsed: u64) -> usize {
        let mut end = 0;
        for (index, phase) in self.phases.iter().enumerate() {
            end += phase.duration_seconds;
            if elapsed < end {
                return index;
            }
        }
        self.phases.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    /// Stage tag: "intro", "breathing", "closing", ...
    #[serde(rename = "type")]
    pub kind: String,
    pub duration_seconds: u64,
    #[serde(default)]
    pub fixed_cues: Vec<FixedCue>,
    #[serde(default)]
    pub interjection_windows: Vec<InterjectionWindow>,
}

/// Narration at a fixed offset from the start of its phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedCue {
    pub at_seconds: u64,
    pub audio_file: String,
}

/// A window in which exactly one narration from the pool is played at a
/// randomly chosen second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterjectionWindow {
    pub earliest_seconds: u64,
    pub latest_seconds: u64,
    pub audio_pool: Vec<String>,
}

impl MeditationManifest {
    pub fn session(&self, id: &str) -> Option<&MeditationSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        for session in &self.sessions {
            if session.variants.is_empty() {
                return Err(ManifestError::Invalid(format!(
                    "session '{}' has no variants",
                    session.id
                )));
            }
            for variant in &session.variants {
                validate_variant(&session.id, variant)?;
            }
        }
        Ok(())
    }
}

impl MeditationSession {
    pub fn variant(&self, duration_minutes: u32) -> Option<&SessionVariant> {
        self.variants
            .iter()
            .find(|v| v.duration_minutes == duration_minutes)
    }
}

fn validate_variant(session_id: &str, variant: &SessionVariant) -> Result<(), ManifestError> {
    let label = format!("{session_id}/{}min", variant.duration_minutes);
    if variant.phases.is_empty() {
        return Err(ManifestError::Invalid(format!("{label} has no phases")));
    }

    let last = variant.phases.len() - 1;
    for (index, phase) in variant.phases.iter().enumerate() {
        // A cue at the very end of the final phase would fall on completion.
        let end = if index == last {
            phase.duration_seconds.saturating_sub(1)
        } else {
            phase.duration_seconds
        };
        if phase.duration_seconds == 0 {
            return Err(ManifestError::Invalid(format!(
                "{label}: phase '{}' has zero duration",
                phase.kind
            )));
        }
        for cue in &phase.fixed_cues {
            if cue.at_seconds > end {
                return Err(ManifestError::Invalid(format!(
                    "{label}: cue '{}' at {}s does not play within phase '{}' ({}s)",
                    cue.audio_file, cue.at_seconds, phase.kind, phase.duration_seconds
                )));
            }
        }
        for window in &phase.interjection_windows {
            if window.earliest_seconds > window.latest_seconds
                || window.latest_seconds > end
            {
                return Err(ManifestError::Invalid(format!(
                    "{label}: window [{}, {}] does not fit phase '{}' ({}s)",
                    window.earliest_seconds,
                    window.latest_seconds,
                    phase.kind,
                    phase.duration_seconds
                )));
            }
            if window.audio_pool.is_empty() {
                return Err(ManifestError::Invalid(format!(
                    "{label}: window [{}, {}] in phase '{}' has an empty audio pool",
                    window.earliest_seconds, window.latest_seconds, phase.kind
                )));
            }
        }
    }
    Ok(())
}

// ── Stretching ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StretchManifest {
    pub regions: BTreeMap<String, StretchRegion>,
    pub shared: StretchShared,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StretchRegion {
    pub stretches: Vec<StretchDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StretchShared {
    pub switch_sides: String,
    pub halfway: String,
    pub session_complete: String,
    #[serde(default)]
    pub silence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StretchDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Performed once per side; the midpoint narration says "switch sides".
    #[serde(default)]
    pub bilateral: bool,
    #[serde(default)]
    pub image: Option<String>,
    pub audio_files: StretchAudio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StretchAudio {
    pub begin: String,
}

impl StretchManifest {
    pub fn region(&self, name: &str) -> Option<&StretchRegion> {
        self.regions.get(name)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        for (name, region) in &self.regions {
            if region.stretches.is_empty() {
                return Err(ManifestError::EmptyRegion(name.clone()));
            }
        }
        Ok(())
    }
}
