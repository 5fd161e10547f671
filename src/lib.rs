// Library interface for slipstream
// This allows integration tests and benches to access internal modules

pub mod config;
pub mod demo;
pub mod errors;
pub mod math;
pub mod race;
pub mod vehicle;
pub mod writer;

// Re-export commonly used types
pub use config::SimConfig;
pub use errors::SlipstreamError;
pub use race::{
    CheckpointCrossing, CheckpointTrack, RaceEvent, RaceSession, RaceState, RankAggregator,
    RankEntry, VehicleId,
};
pub use vehicle::{
    VehicleBody, VehicleInputs, VehicleState, VehicleTelemetry, WheelId, WheelSample,
    controller::VehicleController,
};
