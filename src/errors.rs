// Error types for slipstream

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum SlipstreamError {
    // Track and checkpoint layout errors
    #[snafu(display("Track needs at least 2 checkpoints, got {count}"))]
    TrackTooShort { count: usize },
    #[snafu(display("Track loop has zero length"))]
    DegenerateTrack,
    #[snafu(display("Track has {count} checkpoints, lap validation supports at most {max}"))]
    TooManyCheckpoints { count: usize, max: usize },

    // Vehicle configuration errors
    #[snafu(display("Invalid engine curve: {reason}"))]
    InvalidEngineCurve { reason: String },
    #[snafu(display("Invalid gear table: {reason}"))]
    InvalidGearTable { reason: String },
    #[snafu(display("Invalid engine config: {reason}"))]
    InvalidEngineConfig { reason: String },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Errors for the telemetry writer
    #[snafu(display("Error writing telemetry file"))]
    WriterError { source: io::Error },
    #[snafu(display("Error loading recording file"))]
    RecordLoaderError { source: io::Error },

    // User input validation errors
    #[snafu(display("Invalid user input: {field} - {reason}"))]
    InvalidUserInput { field: String, reason: String },
}
