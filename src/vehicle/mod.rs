pub mod controller;
pub mod drivetrain;
pub mod stability;
pub mod steering;
pub mod traction;

use glam::Vec3;
use serde::{Deserialize, Serialize};

pub use drivetrain::ShiftRequest;

pub const WHEEL_COUNT: usize = 4;

/// Wheel positions on the chassis. Arrays indexed by wheel use this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelId {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl WheelId {
    pub const ALL: [WheelId; WHEEL_COUNT] = [
        WheelId::FrontLeft,
        WheelId::FrontRight,
        WheelId::RearLeft,
        WheelId::RearRight,
    ];

    pub fn index(self) -> usize {
        match self {
            WheelId::FrontLeft => 0,
            WheelId::FrontRight => 1,
            WheelId::RearLeft => 2,
            WheelId::RearRight => 3,
        }
    }

    pub fn is_front(self) -> bool {
        matches!(self, WheelId::FrontLeft | WheelId::FrontRight)
    }
}

/// Per-wheel contact state reported by the physics world for one step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WheelSample {
    pub grounded: bool,
    /// Longitudinal slip ratio
    pub forward_slip: f32,
    /// Lateral slip ratio
    pub sideways_slip: f32,
    /// Wheel spin in revolutions per minute, negative when rolling backwards
    pub spin_rpm: f32,
    /// Suspension travel as a fraction of the suspension distance, 1.0 = fully extended
    pub suspension_travel: f32,
}

impl WheelSample {
    /// Sample used for wheels that are missing or not touching the ground.
    pub fn airborne() -> Self {
        Self {
            grounded: false,
            forward_slip: 0.,
            sideways_slip: 0.,
            spin_rpm: 0.,
            suspension_travel: 1.,
        }
    }

    pub fn grounded_rolling(spin_rpm: f32) -> Self {
        Self {
            grounded: true,
            spin_rpm,
            suspension_travel: 0.5,
            ..Self::airborne()
        }
    }
}

impl Default for WheelSample {
    fn default() -> Self {
        Self::airborne()
    }
}

/// Driver commands for one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleInputs {
    /// -1 = full brake/reverse, 1 = full throttle
    pub throttle: f32,
    /// -1 = full left, 1 = full right
    pub steer: f32,
    pub handbrake: bool,
    pub boost: bool,
    /// Manual gearbox request, ignored by the automatic shifter
    pub shift: Option<ShiftRequest>,
}

impl VehicleInputs {
    /// Clamps axes to [-1, 1] and zeroes non-finite values.
    pub fn sanitized(&self) -> Self {
        let axis = |v: f32| if v.is_finite() { v.clamp(-1., 1.) } else { 0. };
        Self {
            throttle: axis(self.throttle),
            steer: axis(self.steer),
            ..*self
        }
    }

    /// Brake pedal derived from the negative half of the throttle axis.
    pub fn brake(&self) -> f32 {
        (-self.throttle).clamp(0., 1.)
    }
}

/// Commands the controller writes back into the physics world each step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelCommands {
    pub motor_torque: [f32; WHEEL_COUNT],
    pub brake_torque: [f32; WHEEL_COUNT],
    /// Front left and front right steering angles in degrees
    pub steer_angle_deg: [f32; 2],
    /// Tire friction curve extremum/asymptote value per wheel
    pub grip: [f32; WHEEL_COUNT],
}

/// Mutable per-vehicle dynamics state, updated once per fixed step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub gear_index: usize,
    pub reverse: bool,
    pub engine_rpm: f32,
    pub target_rpm: f32,
    pub wheel_brake_torque: [f32; WHEEL_COUNT],
    pub steer_angle: [f32; 2],
    pub speed_kmh: f32,
    pub g_force: f32,
}

/// Public telemetry consumed by HUD, audio and recording.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleTelemetry {
    pub speed_kmh: f32,
    /// Displayed engine RPM, including the cosmetic shift wobble
    pub engine_rpm: f32,
    pub gear: usize,
    pub reverse: bool,
    pub nitrous: f32,
    pub g_force: f32,
    pub rev_limiter: bool,
    pub drift_smoke: bool,
}

/// The physics world as seen by one vehicle controller.
///
/// Rigid-body integration, collision response and tire contact are delegated to
/// the implementor; the controller only reads contact samples and writes torques,
/// angles and forces back.
pub trait VehicleBody {
    /// Latest contact sample, `None` when the wheel reference is missing
    fn wheel_sample(&self, wheel: WheelId) -> Option<WheelSample>;
    /// World-space wheel position, `None` when the wheel reference is missing
    fn wheel_position(&self, wheel: WheelId) -> Option<Vec3>;
    /// Rigid-body linear velocity, `None` when there is no rigid body
    fn linear_velocity(&self) -> Option<Vec3>;
    fn forward(&self) -> Vec3;
    fn up(&self) -> Vec3;

    fn apply_wheel_commands(&mut self, commands: &WheelCommands);
    fn add_force(&mut self, force: Vec3);
    fn add_force_at_wheel(&mut self, wheel: WheelId, force: Vec3);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_index_order() {
        for (i, wheel) in WheelId::ALL.iter().enumerate() {
            assert_eq!(wheel.index(), i);
        }
        assert!(WheelId::FrontRight.is_front());
        assert!(!WheelId::RearLeft.is_front());
    }

    #[test]
    fn test_inputs_sanitized() {
        let inputs = VehicleInputs {
            throttle: f32::NAN,
            steer: 3.,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(inputs.throttle, 0.);
        assert_eq!(inputs.steer, 1.);
    }

    #[test]
    fn test_brake_from_negative_throttle() {
        let inputs = VehicleInputs {
            throttle: -0.4,
            ..Default::default()
        };
        assert!((inputs.brake() - 0.4).abs() < 1e-6);
        let inputs = VehicleInputs {
            throttle: 0.8,
            ..Default::default()
        };
        assert_eq!(inputs.brake(), 0.);
    }
}
