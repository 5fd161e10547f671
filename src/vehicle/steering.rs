use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::math::{EPSILON, finite_or, lerp};

use super::{WHEEL_COUNT, WheelId};

/// Below this magnitude the steering command is treated as centred.
const CENTRED_DEG: f32 = 1e-4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Maximum wheel angle at standstill (degrees)
    pub max_angle_deg: f32,
    /// Maximum wheel angle at `fade_speed_kmh` and above (degrees)
    pub min_angle_deg: f32,
    pub fade_speed_kmh: f32,
    /// Steering authority left at full brake
    pub full_brake_scale: f32,
    pub track_width: f32,
    /// Used when the axle positions are unavailable or implausible
    pub fallback_wheelbase: f32,
    pub min_wheelbase: f32,
    pub radius_base: f32,
    /// Turn radius grows by 1 unit per this many km/h
    pub radius_speed_divisor: f32,
    pub radius_interval_s: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_angle_deg: 35.,
            min_angle_deg: 8.,
            fade_speed_kmh: 200.,
            full_brake_scale: 0.7,
            track_width: 1.5,
            fallback_wheelbase: 2.55,
            min_wheelbase: 0.1,
            radius_base: 6.,
            radius_speed_divisor: 20.,
            radius_interval_s: 0.7,
        }
    }
}

impl SteeringConfig {
    /// Speed and brake sensitive steering angle in degrees, signed like `steer`.
    pub fn current_angle(&self, steer: f32, speed_kmh: f32, brake: f32) -> f32 {
        let speed_t = speed_kmh.abs() / self.fade_speed_kmh.max(EPSILON);
        let current_max = lerp(self.max_angle_deg, self.min_angle_deg, speed_t);
        let brake_scale = lerp(1., self.full_brake_scale, brake);
        current_max * brake_scale * steer
    }

    /// Distance between front and rear axle midpoints.
    pub fn estimate_wheelbase(&self, positions: &[Option<Vec3>; WHEEL_COUNT]) -> f32 {
        let [Some(fl), Some(fr), Some(rl), Some(rr)] = *positions else {
            return self.fallback_wheelbase;
        };
        let front = (fl + fr) * 0.5;
        let rear = (rl + rr) * 0.5;
        let wheelbase = front.distance(rear);
        if !wheelbase.is_finite() || wheelbase < self.min_wheelbase {
            self.fallback_wheelbase
        } else {
            wheelbase
        }
    }
}

/// Ackermann-style split of one steering command into front left/right angles.
#[derive(Clone, Debug)]
pub struct SteeringSolver {
    turn_radius: f32,
    radius_timer: f32,
}

impl Default for SteeringSolver {
    fn default() -> Self {
        Self::new(&SteeringConfig::default())
    }
}

impl SteeringSolver {
    pub fn new(cfg: &SteeringConfig) -> Self {
        Self {
            turn_radius: cfg.radius_base,
            radius_timer: 0.,
        }
    }

    pub fn turn_radius(&self) -> f32 {
        self.turn_radius
    }

    /// Recomputes the turn radius from speed once every `radius_interval_s`.
    pub fn tick_radius(&mut self, cfg: &SteeringConfig, speed_kmh: f32, dt: f32) {
        self.radius_timer += dt;
        if self.radius_timer >= cfg.radius_interval_s {
            self.radius_timer = (self.radius_timer - cfg.radius_interval_s).max(0.);
            self.turn_radius = finite_or(
                cfg.radius_base + speed_kmh.abs() / cfg.radius_speed_divisor.max(EPSILON),
                cfg.radius_base,
            );
        }
    }

    /// Front left and front right angles in degrees. The inner wheel turns further.
    pub fn solve(
        &self,
        cfg: &SteeringConfig,
        steer: f32,
        speed_kmh: f32,
        brake: f32,
        wheelbase: f32,
    ) -> [f32; 2] {
        let angle = cfg.current_angle(steer, speed_kmh, brake);
        if angle.abs() < CENTRED_DEG {
            return [0., 0.];
        }

        let sign = angle.signum();
        let scale = angle / cfg.max_angle_deg.max(EPSILON);
        let half_track = cfg.track_width * 0.5;
        let wheelbase = wheelbase.max(EPSILON);

        let ackermann = |offset: f32| {
            let denom = (self.turn_radius + offset).max(EPSILON);
            (wheelbase / denom).atan().to_degrees() * scale
        };
        let left = ackermann(sign * half_track);
        let right = ackermann(-sign * half_track);
        [finite_or(left, 0.), finite_or(right, 0.)]
    }
}

/// Helper for callers that hold wheel positions by id.
pub fn wheel_positions(lookup: impl Fn(WheelId) -> Option<Vec3>) -> [Option<Vec3>; WHEEL_COUNT] {
    WheelId::ALL.map(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_chassis(wheelbase: f32) -> [Option<Vec3>; WHEEL_COUNT] {
        [
            Some(Vec3::new(-0.75, 0., wheelbase)),
            Some(Vec3::new(0.75, 0., wheelbase)),
            Some(Vec3::new(-0.75, 0., 0.)),
            Some(Vec3::new(0.75, 0., 0.)),
        ]
    }

    #[test]
    fn test_current_angle_fades_with_speed_and_brake() {
        let cfg = SteeringConfig::default();
        assert_eq!(cfg.current_angle(1., 0., 0.), 35.);
        assert_eq!(cfg.current_angle(-1., 400., 0.), -8.);
        assert!((cfg.current_angle(1., 0., 1.) - 24.5).abs() < 1e-4);
    }

    #[test]
    fn test_wheelbase_estimate_and_fallback() {
        let cfg = SteeringConfig::default();
        assert!((cfg.estimate_wheelbase(&square_chassis(2.8)) - 2.8).abs() < 1e-5);
        assert_eq!(cfg.estimate_wheelbase(&square_chassis(0.05)), 2.55);

        let mut missing = square_chassis(2.8);
        missing[2] = None;
        assert_eq!(cfg.estimate_wheelbase(&missing), 2.55);
    }

    #[test]
    fn test_centred_input_gives_zero_angles() {
        let cfg = SteeringConfig::default();
        let solver = SteeringSolver::new(&cfg);
        assert_eq!(solver.solve(&cfg, 0., 50., 0., 2.55), [0., 0.]);
    }

    #[test]
    fn test_inner_wheel_turns_further() {
        let cfg = SteeringConfig::default();
        let solver = SteeringSolver::new(&cfg);

        let [left, right] = solver.solve(&cfg, 1., 0., 0., 2.55);
        assert!(left > 0. && right > left);

        let [left, right] = solver.solve(&cfg, -1., 0., 0., 2.55);
        assert!(right < 0. && left < right);
    }

    #[test]
    fn test_radius_updates_on_timer_only() {
        let cfg = SteeringConfig::default();
        let mut solver = SteeringSolver::new(&cfg);
        solver.tick_radius(&cfg, 100., 0.5);
        assert_eq!(solver.turn_radius(), 6.);
        solver.tick_radius(&cfg, 100., 0.25);
        assert!((solver.turn_radius() - 11.).abs() < 1e-5);
    }

    #[test]
    fn test_zero_wheelbase_stays_finite() {
        let cfg = SteeringConfig::default();
        let solver = SteeringSolver::new(&cfg);
        let [left, right] = solver.solve(&cfg, 0.5, 10., 0., 0.);
        assert!(left.is_finite() && right.is_finite());
    }
}
