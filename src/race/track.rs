use glam::Vec3;

use crate::errors::SlipstreamError;
use crate::math::EPSILON;

/// Segments shorter than this (squared) are skipped by the progress tracker.
pub const MIN_SEGMENT_LEN_SQ: f32 = 1e-6;

/// Closest point on the track loop to some position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackProjection {
    pub segment: usize,
    /// Position along the segment in [0, 1]
    pub t: f32,
    /// Arc length from checkpoint 0
    pub arc_length: f32,
}

/// Closed polyline through the checkpoints, index 0 = start/finish.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointTrack {
    points: Vec<Vec3>,
    /// cumulative[i] = arc length at checkpoint i, cumulative[n] = length
    cumulative: Vec<f32>,
    length: f32,
}

impl CheckpointTrack {
    pub fn new(points: Vec<Vec3>) -> Result<Self, SlipstreamError> {
        if points.len() < 2 {
            return Err(SlipstreamError::TrackTooShort {
                count: points.len(),
            });
        }
        let n = points.len();
        let mut cumulative = Vec::with_capacity(n + 1);
        cumulative.push(0.);
        let mut acc = 0.;
        for i in 0..n {
            acc += points[i].distance(points[(i + 1) % n]);
            cumulative.push(acc);
        }
        if !acc.is_finite() || acc <= EPSILON {
            return Err(SlipstreamError::DegenerateTrack);
        }
        Ok(Self {
            points,
            cumulative,
            length: acc,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn checkpoint(&self, index: usize) -> Option<Vec3> {
        self.points.get(index).copied()
    }

    /// Arc length at which checkpoint `index` sits.
    pub fn checkpoint_arc(&self, index: usize) -> Option<f32> {
        (index < self.points.len()).then(|| self.cumulative[index])
    }

    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.points.len()
    }

    pub fn prev_index(&self, index: usize) -> usize {
        (index + self.points.len() - 1) % self.points.len()
    }

    /// Start and end point of segment `index`, wrapping at the end of the loop.
    pub fn segment(&self, index: usize) -> (Vec3, Vec3) {
        let i = index % self.points.len();
        (self.points[i], self.points[self.next_index(i)])
    }

    pub fn segment_length(&self, index: usize) -> f32 {
        let i = index % self.points.len();
        self.cumulative[i + 1] - self.cumulative[i]
    }

    /// Arc length of the point at parameter `t` on segment `index`.
    pub fn arc_length_at(&self, index: usize, t: f32) -> f32 {
        let i = index % self.points.len();
        self.cumulative[i] + t.clamp(0., 1.) * self.segment_length(i)
    }

    /// Unclamped projection parameter of `position` on segment `index`, `None` for
    /// zero-length segments.
    pub fn segment_parameter(&self, index: usize, position: Vec3) -> Option<f32> {
        let (a, b) = self.segment(index);
        let ab = b - a;
        let len_sq = ab.length_squared();
        if len_sq < MIN_SEGMENT_LEN_SQ {
            return None;
        }
        Some((position - a).dot(ab) / len_sq)
    }

    /// Full scan for the closest point on the loop.
    pub fn project(&self, position: Vec3) -> TrackProjection {
        let mut best = TrackProjection {
            segment: 0,
            t: 0.,
            arc_length: 0.,
        };
        let mut best_dist = f32::INFINITY;
        for i in 0..self.points.len() {
            let (a, b) = self.segment(i);
            let t = self
                .segment_parameter(i, position)
                .map_or(0., |t| t.clamp(0., 1.));
            let dist = position.distance_squared(a + (b - a) * t);
            if dist < best_dist {
                best_dist = dist;
                best = TrackProjection {
                    segment: i,
                    t,
                    arc_length: self.arc_length_at(i, t),
                };
            }
        }
        best
    }

    /// World position at arc length `s`, wrapped onto the loop.
    pub fn position_at(&self, s: f32) -> Vec3 {
        let s = s.rem_euclid(self.length);
        let segment = self
            .cumulative
            .partition_point(|c| *c <= s)
            .saturating_sub(1)
            .min(self.points.len() - 1);
        let (a, b) = self.segment(segment);
        let seg_len = self.segment_length(segment).max(EPSILON);
        a.lerp(b, ((s - self.cumulative[segment]) / seg_len).clamp(0., 1.))
    }

    /// Unit direction of travel at arc length `s`.
    pub fn direction_at(&self, s: f32) -> Vec3 {
        let s = s.rem_euclid(self.length);
        let segment = self
            .cumulative
            .partition_point(|c| *c <= s)
            .saturating_sub(1)
            .min(self.points.len() - 1);
        let (a, b) = self.segment(segment);
        (b - a).normalize_or_zero()
    }

    /// Axis-aligned rectangle with checkpoints at its corners, counter-clockwise in XZ.
    pub fn rectangle(width: f32, depth: f32) -> Result<Self, SlipstreamError> {
        Self::new(vec![
            Vec3::ZERO,
            Vec3::new(width, 0., 0.),
            Vec3::new(width, 0., depth),
            Vec3::new(0., 0., depth),
        ])
    }

    /// Ellipse sampled with `count` checkpoints, checkpoint 0 on the +X axis.
    pub fn oval(radius_x: f32, radius_z: f32, count: usize) -> Result<Self, SlipstreamError> {
        let points = (0..count)
            .map(|i| {
                let angle = std::f32::consts::TAU * i as f32 / count as f32;
                Vec3::new(radius_x * angle.cos(), 0., radius_z * angle.sin())
            })
            .collect();
        Self::new(points)
    }
}
