pub mod lap_timer;
pub mod lap_validator;
pub mod progress;
pub mod ranking;
pub mod session;
pub mod splits;
pub mod track;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use lap_timer::LapTimer;
pub use lap_validator::{CheckpointVerdict, LapValidator, LineRejection};
pub use progress::{ProgressConfig, ProgressTracker};
pub use ranking::{RankAggregator, RankEntry, RankInput};
pub use session::{RaceConfig, RaceSession, RaceState};
pub use splits::SplitBoard;
pub use track::CheckpointTrack;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A vehicle touched a checkpoint trigger.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointCrossing {
    pub vehicle: VehicleId,
    pub index: usize,
    /// Session clock in seconds
    pub timestamp: f64,
}

/// Everything a race session reports to its consumers (HUD, records, logs).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RaceEvent {
    RaceStarted,
    CheckpointPassed {
        vehicle: VehicleId,
        index: usize,
        /// Current lap time at the crossing
        split: f64,
        /// Positive when slower than the best lap's split
        delta_vs_best: Option<f64>,
    },
    LapCompleted {
        vehicle: VehicleId,
        lap: u32,
        lap_time: f64,
    },
    VehicleFinished {
        vehicle: VehicleId,
        total_time: f64,
    },
    RanksChanged(Vec<RankEntry>),
    RaceFinished,
}
