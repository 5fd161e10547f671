use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::SlipstreamError;

/// Width of the visited-checkpoint bitmask.
pub const MAX_CHECKPOINTS: usize = u64::BITS as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineRejection {
    /// No mid checkpoint touched since the previous line crossing
    NoMidSinceLine,
    /// Some mid checkpoints were skipped this lap
    MissingCheckpoints,
    /// Lap shorter than the minimum lap duration
    TooShort,
}

/// Outcome of a single checkpoint crossing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum CheckpointVerdict {
    /// Not racing or index out of range
    Ignored,
    Debounced,
    MidVisited,
    LineRejected(LineRejection),
    LapCompleted { elapsed: f64 },
}

impl CheckpointVerdict {
    /// Whether the crossing registered at all, for split popups.
    pub fn is_passed(&self) -> bool {
        !matches!(self, CheckpointVerdict::Ignored | CheckpointVerdict::Debounced)
    }
}

/// Per-vehicle lap validation over checkpoint crossings.
///
/// Mid checkpoints (1..N-1) may be visited in any order; a lap counts when the
/// start/finish line (index 0) is crossed after all of them and at least
/// `min_lap_s` after the previous accepted lap.
#[derive(Clone, Debug)]
pub struct LapValidator {
    count: usize,
    required: u64,
    visited: u64,
    any_visited_since_line: bool,
    racing: bool,
    last_lap_at: f64,
    last_hit: Option<(usize, f64)>,
    min_lap_s: f64,
    debounce_s: f64,
}

impl LapValidator {
    pub fn new(count: usize, min_lap_s: f64, debounce_s: f64) -> Result<Self, SlipstreamError> {
        if count < 2 {
            return Err(SlipstreamError::TrackTooShort { count });
        }
        if count > MAX_CHECKPOINTS {
            return Err(SlipstreamError::TooManyCheckpoints {
                count,
                max: MAX_CHECKPOINTS,
            });
        }
        Ok(Self {
            count,
            // bits 1..count-1
            required: (u64::MAX >> (MAX_CHECKPOINTS - count)) & !1,
            visited: 0,
            any_visited_since_line: false,
            racing: false,
            last_lap_at: 0.,
            last_hit: None,
            min_lap_s: min_lap_s.max(0.),
            debounce_s: debounce_s.max(0.),
        })
    }

    pub fn checkpoint_count(&self) -> usize {
        self.count
    }

    pub fn required_mask(&self) -> u64 {
        self.required
    }

    pub fn visited_mask(&self) -> u64 {
        self.visited
    }

    pub fn is_racing(&self) -> bool {
        self.racing
    }

    /// Arms the validator at race start. The lap clock starts at `now`.
    pub fn start(&mut self, now: f64) {
        self.racing = true;
        self.last_lap_at = now;
        self.visited = 0;
        self.any_visited_since_line = false;
        self.last_hit = None;
    }

    pub fn finish(&mut self) {
        self.racing = false;
    }

    pub fn hit(&mut self, index: usize, now: f64) -> CheckpointVerdict {
        if !self.racing || index >= self.count {
            debug!("Ignoring checkpoint {index} (racing: {})", self.racing);
            return CheckpointVerdict::Ignored;
        }

        if matches!(self.last_hit, Some((last_index, last_time))
            if last_index == index && now - last_time < self.debounce_s)
        {
            debug!("Debounced checkpoint {index}");
            return CheckpointVerdict::Debounced;
        }
        self.last_hit = Some((index, now));

        if index > 0 {
            self.visited |= 1 << index;
            self.any_visited_since_line = true;
            return CheckpointVerdict::MidVisited;
        }

        if !self.any_visited_since_line {
            debug!("Line crossing rejected, no mid checkpoint since last crossing");
            return CheckpointVerdict::LineRejected(LineRejection::NoMidSinceLine);
        }
        if self.visited & self.required != self.required {
            debug!(
                "Line crossing rejected, visited {:#b} of {:#b}",
                self.visited, self.required
            );
            self.any_visited_since_line = false;
            return CheckpointVerdict::LineRejected(LineRejection::MissingCheckpoints);
        }
        let elapsed = now - self.last_lap_at;
        if elapsed < self.min_lap_s {
            debug!("Line crossing rejected, lap of {elapsed:.3}s below minimum");
            return CheckpointVerdict::LineRejected(LineRejection::TooShort);
        }

        info!("Lap accepted in {elapsed:.3}s");
        self.last_lap_at = now;
        self.visited = 0;
        self.any_visited_since_line = false;
        CheckpointVerdict::LapCompleted { elapsed }
    }
}
