use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::math::finite_or;

use super::{WHEEL_COUNT, WheelId, WheelSample};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    pub anti_roll_front: f32,
    pub anti_roll_rear: f32,
    /// Downforce per unit of speed (N per m/s)
    pub downforce: f32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            anti_roll_front: 10000.,
            anti_roll_rear: 10000.,
            downforce: 10.,
        }
    }
}

/// Vertical anti-roll force per wheel, positive along the body's up axis.
///
/// Each axle compares left and right suspension travel; an ungrounded wheel counts
/// as fully extended and receives no force itself.
pub fn anti_roll(
    cfg: &StabilityConfig,
    samples: &[WheelSample; WHEEL_COUNT],
) -> [f32; WHEEL_COUNT] {
    let mut forces = [0.; WHEEL_COUNT];
    let axles = [
        (WheelId::FrontLeft, WheelId::FrontRight, cfg.anti_roll_front),
        (WheelId::RearLeft, WheelId::RearRight, cfg.anti_roll_rear),
    ];
    for (left, right, stiffness) in axles {
        let l = &samples[left.index()];
        let r = &samples[right.index()];
        let travel = |s: &WheelSample| {
            if s.grounded {
                finite_or(s.suspension_travel, 1.)
            } else {
                1.
            }
        };
        let force = (travel(l) - travel(r)) * stiffness;
        if l.grounded {
            forces[left.index()] = -force;
        }
        if r.grounded {
            forces[right.index()] = force;
        }
    }
    forces
}

/// Speed proportional force along the body's down axis.
pub fn downforce(cfg: &StabilityConfig, velocity: Vec3, up: Vec3) -> Vec3 {
    let force = -up * cfg.downforce * velocity.length();
    if force.is_finite() { force } else { Vec3::ZERO }
}
