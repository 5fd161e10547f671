use glam::Vec3;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::math::{EPSILON, finite_or};

use super::track::CheckpointTrack;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Pivot position as a fraction of the track length, 0 = checkpoint 0
    pub pivot_fraction: f32,
    /// Previous pivot distance above this fraction ...
    pub wrap_high: f32,
    /// ... and current below this fraction counts as a forward wrap
    pub wrap_low: f32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            pivot_fraction: 0.,
            wrap_high: 0.7,
            wrap_low: 0.3,
        }
    }
}

impl ProgressConfig {
    pub fn validated(self) -> Self {
        let mut cfg = self;
        if !(0. ..1.).contains(&cfg.pivot_fraction) {
            let wrapped = finite_or(cfg.pivot_fraction, 0.).rem_euclid(1.);
            warn!("Pivot fraction {} outside [0, 1), using {wrapped}", cfg.pivot_fraction);
            cfg.pivot_fraction = wrapped;
        }
        if !(cfg.wrap_low > 0. && cfg.wrap_low < cfg.wrap_high && cfg.wrap_high < 1.) {
            warn!(
                "Invalid wrap hysteresis {}/{}, using defaults",
                cfg.wrap_high, cfg.wrap_low
            );
            let defaults = Self::default();
            cfg.wrap_high = defaults.wrap_high;
            cfg.wrap_low = defaults.wrap_low;
        }
        cfg
    }
}

/// Turns a vehicle's position into a progress scalar that keeps growing across laps.
///
/// Arc length along the loop resets at the pivot; each forward crossing of the
/// pivot (detected with a hysteresis band) adds one track length.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    config: ProgressConfig,
    segment: usize,
    segment_t: f32,
    pivot_arc: f32,
    cycles: u32,
    last_from_pivot: f32,
    progress: f32,
}

impl ProgressTracker {
    pub fn new(track: &CheckpointTrack, config: ProgressConfig, start: Vec3) -> Self {
        let config = config.validated();
        let pivot_arc = config.pivot_fraction * track.length();
        let mut tracker = Self {
            config,
            segment: 0,
            segment_t: 0.,
            pivot_arc,
            cycles: 0,
            last_from_pivot: 0.,
            progress: 0.,
        };
        tracker.resync(track, start);
        tracker
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn segment(&self) -> usize {
        self.segment
    }

    pub fn segment_t(&self) -> f32 {
        self.segment_t
    }

    pub fn pivot_arc(&self) -> f32 {
        self.pivot_arc
    }

    /// Re-seeds the segment from a full projection, e.g. after a respawn.
    /// Keeps the cycle count so progress does not jump back a lap.
    pub fn resync(&mut self, track: &CheckpointTrack, position: Vec3) {
        if !position.is_finite() {
            return;
        }
        let projection = track.project(position);
        self.segment = projection.segment;
        self.segment_t = projection.t;
        self.last_from_pivot = self.from_pivot(track, projection.arc_length);
        self.progress = self.cycles as f32 * track.length() + self.last_from_pivot;
    }

    fn from_pivot(&self, track: &CheckpointTrack, arc_length: f32) -> f32 {
        let length = track.length();
        finite_or(
            (arc_length - self.pivot_arc + length).rem_euclid(length),
            0.,
        )
    }

    /// Moves at most one segment forward or back from the tracked segment.
    ///
    /// The bounds are inclusive: at a right-angle corner the parameter on the old
    /// segment stays pinned at exactly 1 (or 0) while the vehicle moves away.
    fn track_segment(&mut self, track: &CheckpointTrack, position: Vec3) {
        match track.segment_parameter(self.segment, position) {
            None => {
                self.segment = track.next_index(self.segment);
                self.segment_t = 0.;
            }
            Some(t) if t >= 1. => {
                self.segment = track.next_index(self.segment);
                self.segment_t = track
                    .segment_parameter(self.segment, position)
                    .map_or(0., |t| t.clamp(0., 1.));
            }
            Some(t) if t <= 0. => {
                self.segment = track.prev_index(self.segment);
                self.segment_t = track
                    .segment_parameter(self.segment, position)
                    .map_or(1., |t| t.clamp(0., 1.));
            }
            Some(t) => self.segment_t = finite_or(t, self.segment_t),
        }
    }

    pub fn update(&mut self, track: &CheckpointTrack, position: Vec3) -> f32 {
        if !position.is_finite() {
            return self.progress;
        }
        self.track_segment(track, position);

        let length = track.length();
        let s = track.arc_length_at(self.segment, self.segment_t);
        let from_pivot = self.from_pivot(track, s);

        if length > EPSILON {
            let hi = length * self.config.wrap_high;
            let lo = length * self.config.wrap_low;
            if self.last_from_pivot > hi && from_pivot < lo {
                self.cycles += 1;
            } else if self.last_from_pivot < lo && from_pivot > hi {
                // backwards over the pivot
                self.cycles = self.cycles.saturating_sub(1);
            }
        }
        self.last_from_pivot = from_pivot;
        self.progress = self.cycles as f32 * length + from_pivot;
        self.progress
    }
}
