//! Selections and the plans they resolve to.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::schedule::{schedule_cues, CueScheduler, ScheduledCue};
use crate::error::ManifestError;
use crate::manifest::{SessionManifest, SessionVariant};

/// What the user picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionSelection {
    Meditation {
        session_id: String,
        duration_minutes: u32,
    },
    Stretch {
        regions: Vec<RegionSelection>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSelection {
    pub region: String,
    pub duration_seconds: u64,
}

/// A fully resolved session, ready to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionPlan {
    Meditation(MeditationPlan),
    Stretch(StretchPlan),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeditationPlan {
    pub session_id: String,
    pub title: String,
    pub variant: SessionVariant,
    pub cues: Vec<ScheduledCue>,
    pub bell: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StretchPlan {
    pub items: Vec<StretchItem>,
    pub completion_audio: String,
}

/// One stretch, timed as two halves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StretchItem {
    pub region: String,
    pub stretch_id: String,
    pub name: String,
    pub bilateral: bool,
    pub segments: [u64; 2],
    /// Narrated when the item begins.
    pub opening_audio: String,
    /// Narrated at the segment 1 → 2 boundary.
    pub transition_audio: String,
    #[serde(default)]
    pub skipped_segments: u32,
}

impl StretchItem {
    pub fn segment_seconds(&self, segment: u8) -> u64 {
        match segment {
            1 => self.segments[0],
            2 => self.segments[1],
            _ => 0,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.segments[0] + self.segments[1]
    }
}

impl SessionPlan {
    /// Resolve `selection` against the manifest. Randomness (cue timing,
    /// stretch choice) comes from `scheduler`.
    pub fn resolve(
        manifest: &SessionManifest,
        selection: &SessionSelection,
        scheduler: &CueScheduler,
    ) -> Result<Self, ManifestError> {
        let mut rng = scheduler.rng();
        match selection {
            SessionSelection::Meditation {
                session_id,
                duration_minutes,
            } => {
                let catalog = manifest.meditation()?;
                let session = catalog
                    .session(session_id)
                    .ok_or_else(|| ManifestError::UnknownSession(session_id.clone()))?;
                let variant = session.variant(*duration_minutes).ok_or_else(|| {
                    ManifestError::UnknownVariant {
                        session_id: session_id.clone(),
                        duration_minutes: *duration_minutes,
                    }
                })?;
                if variant.phases.is_empty() {
                    return Err(ManifestError::EmptySelection);
                }

                Ok(SessionPlan::Meditation(MeditationPlan {
                    session_id: session.id.clone(),
                    title: session.name.clone(),
                    cues: schedule_cues(variant, &mut rng),
                    variant: variant.clone(),
                    bell: catalog.shared.bell.clone(),
                }))
            }
            SessionSelection::Stretch { regions } => {
                let catalog = manifest.stretching()?;
                let mut items = Vec::with_capacity(regions.len());
                for pick in regions.iter().filter(|r| r.duration_seconds > 0) {
                    let region = catalog
                        .region(&pick.region)
                        .ok_or_else(|| ManifestError::UnknownRegion(pick.region.clone()))?;
                    let stretch = region
                        .stretches
                        .choose(&mut rng)
                        .ok_or_else(|| ManifestError::EmptyRegion(pick.region.clone()))?;

                    let first = pick.duration_seconds / 2;
                    items.push(StretchItem {
                        region: pick.region.clone(),
                        stretch_id: stretch.id.clone(),
                        name: stretch.name.clone(),
                        bilateral: stretch.bilateral,
                        segments: [first, pick.duration_seconds - first],
                        opening_audio: stretch.audio_files.begin.clone(),
                        transition_audio: if stretch.bilateral {
                            catalog.shared.switch_sides.clone()
                        } else {
                            catalog.shared.halfway.clone()
                        },
                        skipped_segments: 0,
                    });
                }
                if items.is_empty() {
                    return Err(ManifestError::EmptySelection);
                }

                Ok(SessionPlan::Stretch(StretchPlan {
                    items,
                    completion_audio: catalog.shared.session_complete.clone(),
                }))
            }
        }
    }

    pub fn title(&self) -> String {
        match self {
            SessionPlan::Meditation(plan) => plan.title.clone(),
            SessionPlan::Stretch(plan) => match plan.items.as_slice() {
                [only] => only.name.clone(),
                items => format!("Stretching ({} stretches)", items.len()),
            },
        }
    }

    /// Number of phases or items.
    pub fn len(&self) -> usize {
        match self {
            SessionPlan::Meditation(plan) => plan.variant.phases.len(),
            SessionPlan::Stretch(plan) => plan.items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_seconds(&self) -> u64 {
        match self {
            SessionPlan::Meditation(plan) => plan.variant.total_seconds(),
            SessionPlan::Stretch(plan) => plan.items.iter().map(|i| i.total_seconds()).sum(),
        }
    }
}
