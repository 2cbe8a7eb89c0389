//! Session timing: clock, cue scheduling, plans and the state machine.

mod clock;
mod engine;
mod plan;
mod schedule;
mod snapshot;

pub use clock::{elapsed_seconds, remaining_seconds, ClockState, ManualClock, SystemClock, TimeSource};
pub use engine::{Effect, SessionEngine, SessionView};
pub use plan::{
    MeditationPlan, RegionSelection, SessionPlan, SessionSelection, StretchItem, StretchPlan,
};
pub use schedule::{schedule_cues, CueOrigin, CueScheduler, ScheduledCue};
pub use snapshot::{Position, SessionSnapshot, SessionStatus};
