//! Cue scheduling.
//!
//! Turns a resolved [`SessionVariant`] into the narration timeline for one
//! run of the session. Fixed cues land at the same second every time;
//! each interjection window contributes exactly one cue at a random second
//! inside the window, voiced by a random clip from its pool.

use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};

use crate::manifest::SessionVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueOrigin {
    Fixed,
    Interjection,
}

/// A narration trigger on the session timeline.
///
/// Timing never changes after generation; only `played` flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledCue {
    /// Seconds from session start.
    pub at_seconds: u64,
    pub audio_ref: String,
    pub played: bool,
    pub origin: CueOrigin,
}

/// Builds cue timelines. Seeded schedulers are reproducible.
#[derive(Debug, Clone, Default)]
pub struct CueScheduler {
    seed: Option<u64>,
}

impl CueScheduler {
    /// Scheduler drawing from OS entropy.
    pub fn new() -> Self {
        Self { seed: None }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    pub fn schedule(&self, variant: &SessionVariant) -> Vec<ScheduledCue> {
        schedule_cues(variant, &mut self.rng())
    }

    pub(crate) fn rng(&self) -> Mcg128Xsl64 {
        match self.seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        }
    }
}

/// Generate the cue timeline for `variant`, sorted by `at_seconds`.
///
/// Ties keep manifest order: fixed cues of a phase, then its windows.
pub fn schedule_cues<R: Rng>(variant: &SessionVariant, rng: &mut R) -> Vec<ScheduledCue> {
    let mut cues = Vec::new();
    let mut phase_start = 0u64;

    for phase in &variant.phases {
        for cue in &phase.fixed_cues {
            cues.push(ScheduledCue {
                at_seconds: phase_start + cue.at_seconds,
                audio_ref: cue.audio_file.clone(),
                played: false,
                origin: CueOrigin::Fixed,
            });
        }

        for window in &phase.interjection_windows {
            let Some(audio_ref) = window.audio_pool.choose(rng) else {
                continue;
            };
            let (low, high) = if window.earliest_seconds <= window.latest_seconds {
                (window.earliest_seconds, window.latest_seconds)
            } else {
                (window.latest_seconds, window.earliest_seconds)
            };
            let offset = rng.gen_range(low..=high);
            cues.push(ScheduledCue {
                at_seconds: phase_start + offset,
                audio_ref: audio_ref.clone(),
                played: false,
                origin: CueOrigin::Interjection,
            });
        }

        phase_start += phase.duration_seconds;
    }

    // Vec::sort_by_key is stable.
    cues.sort_by_key(|c| c.at_seconds);
    cues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::fixtures::breathing_variant;
    use proptest::prelude::*;

    fn fixed_subset(cues: &[ScheduledCue]) -> Vec<(u64, String)> {
        cues.iter()
            .filter(|c| c.origin == CueOrigin::Fixed)
            .map(|c| (c.at_seconds, c.audio_ref.clone()))
            .collect()
    }

    #[test]
    fn fixed_cues_are_offset_by_phase_start() {
        let cues = CueScheduler::with_seed(7).schedule(&breathing_variant());
        assert_eq!(
            fixed_subset(&cues),
            vec![
                (0, "intro-welcome.wav".to_string()),
                (30, "breathing-settle.wav".to_string()),
                (50, "breathing-rhythm.wav".to_string()),
                (270, "closing-transition.wav".to_string()),
                (285, "closing-gratitude.wav".to_string()),
            ]
        );
    }

    #[test]
    fn one_cue_per_window() {
        let cues = CueScheduler::new().schedule(&breathing_variant());
        let interjections: Vec<_> = cues
            .iter()
            .filter(|c| c.origin == CueOrigin::Interjection)
            .collect();
        assert_eq!(interjections.len(), 2);
        assert!(cues.iter().all(|c| !c.played));
    }

    #[test]
    fn same_seed_same_schedule() {
        let variant = breathing_variant();
        assert_eq!(
            CueScheduler::with_seed(99).schedule(&variant),
            CueScheduler::with_seed(99).schedule(&variant)
        );
    }

    #[test]
    fn tie_keeps_fixed_before_interjection() {
        let mut variant = breathing_variant();
        variant.phases[1].interjection_windows[0].earliest_seconds = 20;
        variant.phases[1].interjection_windows[0].latest_seconds = 20;
        let cues = CueScheduler::with_seed(1).schedule(&variant);
        let at_50: Vec<_> = cues.iter().filter(|c| c.at_seconds == 50).collect();
        assert_eq!(at_50.len(), 2);
        assert_eq!(at_50[0].origin, CueOrigin::Fixed);
        assert_eq!(at_50[1].origin, CueOrigin::Interjection);
    }

    proptest! {
        #[test]
        fn interjections_stay_inside_windows(seed in any::<u64>()) {
            let variant = breathing_variant();
            let cues = CueScheduler::with_seed(seed).schedule(&variant);

            let main_start = variant.phase_start(1);
            let windows = &variant.phases[1].interjection_windows;
            let interjections: Vec<_> = cues
                .iter()
                .filter(|c| c.origin == CueOrigin::Interjection)
                .collect();
            prop_assert_eq!(interjections.len(), windows.len());

            for cue in interjections {
                let inside = windows.iter().any(|w| {
                    cue.at_seconds >= main_start + w.earliest_seconds
                        && cue.at_seconds <= main_start + w.latest_seconds
                        && w.audio_pool.contains(&cue.audio_ref)
                });
                prop_assert!(inside, "cue {:?} outside every window", cue);
            }
        }

        #[test]
        fn fixed_cues_never_vary(seed_a in any::<u64>(), seed_b in any::<u64>()) {
            let variant = breathing_variant();
            let a = CueScheduler::with_seed(seed_a).schedule(&variant);
            let b = CueScheduler::with_seed(seed_b).schedule(&variant);
            prop_assert_eq!(fixed_subset(&a), fixed_subset(&b));
        }

        #[test]
        fn schedule_is_sorted(seed in any::<u64>()) {
            let cues = CueScheduler::with_seed(seed).schedule(&breathing_variant());
            prop_assert!(cues.windows(2).all(|w| w[0].at_seconds <= w[1].at_seconds));
        }
    }
}
