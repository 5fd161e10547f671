use serde::{Deserialize, Serialize};

use crate::math::{finite_or, lerp, move_towards, smooth_damp};

use super::{WHEEL_COUNT, WheelId, WheelSample};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrakeConfig {
    /// Brake torque cap at standstill (N·m)
    pub max_torque: f32,
    /// Fraction of `max_torque` still available at `fade_speed_kmh`
    pub high_speed_factor: f32,
    pub fade_speed_kmh: f32,
    /// Share of brake torque on the front axle
    pub front_bias: f32,
}

impl Default for BrakeConfig {
    fn default() -> Self {
        Self {
            max_torque: 3000.,
            high_speed_factor: 0.6,
            fade_speed_kmh: 200.,
            front_bias: 0.65,
        }
    }
}

impl BrakeConfig {
    /// Desired per-wheel brake torque for a brake pedal in [0, 1].
    pub fn targets(&self, brake: f32, speed_kmh: f32) -> [f32; WHEEL_COUNT] {
        let brake = brake.clamp(0., 1.);
        let speed_t = speed_kmh.abs() / self.fade_speed_kmh.max(f32::EPSILON);
        let cap = lerp(
            self.max_torque,
            self.max_torque * self.high_speed_factor,
            speed_t,
        );
        let bias = self.front_bias.clamp(0., 1.);
        let front = brake * cap * bias;
        let rear = brake * cap * (1. - bias);
        [front, front, rear, rear]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsConfig {
    pub enabled: bool,
    /// Forward slip above which a grounded wheel is considered locking
    pub lock_slip: f32,
    /// N·m/s
    pub release_rate: f32,
    /// N·m/s
    pub apply_rate: f32,
}

impl Default for AbsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_slip: 0.35,
            release_rate: 8000.,
            apply_rate: 6000.,
        }
    }
}

/// Rate-limited per-wheel brake torque regulator.
///
/// Holds the torque it applied last step so that release and re-apply happen at
/// bounded rates instead of jumping to the target.
#[derive(Clone, Debug, Default)]
pub struct AbsController {
    torque: [f32; WHEEL_COUNT],
}

impl AbsController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn torque(&self) -> [f32; WHEEL_COUNT] {
        self.torque
    }

    pub fn regulate(
        &mut self,
        cfg: &AbsConfig,
        wheel: WheelId,
        target: f32,
        sample: &WheelSample,
        dt: f32,
    ) -> f32 {
        let target = finite_or(target, 0.).max(0.);
        let i = wheel.index();
        if !cfg.enabled {
            self.torque[i] = target;
            return target;
        }

        let current = self.torque[i];
        let next = if sample.grounded && sample.forward_slip.abs() > cfg.lock_slip {
            move_towards(current, 0., cfg.release_rate * dt)
        } else {
            move_towards(current, target, cfg.apply_rate * dt)
        };
        self.torque[i] = next.max(0.);
        self.torque[i]
    }

    /// Regulates all four wheels against their targets.
    pub fn regulate_all(
        &mut self,
        cfg: &AbsConfig,
        targets: &[f32; WHEEL_COUNT],
        samples: &[WheelSample; WHEEL_COUNT],
        dt: f32,
    ) -> [f32; WHEEL_COUNT] {
        WheelId::ALL.map(|wheel| {
            let i = wheel.index();
            self.regulate(cfg, wheel, targets[i], &samples[i], dt)
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub handbrake_friction_multiplier: f32,
    /// Grip blend smoothing time as a multiple of the step length
    pub blend_steps: f32,
    /// Grip kept on the front wheels while the handbrake is held
    pub front_drift_grip: f32,
    pub assist_enabled: bool,
    /// Assist force (N) at `assist_reference_speed_kmh`, scales linearly with speed
    pub assist_force: f32,
    pub assist_reference_speed_kmh: f32,
    /// Rear wheel slip magnitude that raises the smoke signal
    pub smoke_slip: f32,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            handbrake_friction_multiplier: 2.,
            blend_steps: 0.7,
            front_drift_grip: 1.1,
            assist_enabled: true,
            assist_force: 10000.,
            assist_reference_speed_kmh: 400.,
            smoke_slip: 0.3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TractionOutput {
    /// Friction curve value per wheel
    pub grip: [f32; WHEEL_COUNT],
    /// Forward assist force magnitude (N), zero when not drifting
    pub assist_force: f32,
    pub smoke: bool,
}

/// Handbrake drift state: blends tire grip between normal and drift values.
#[derive(Clone, Debug)]
pub struct GripBlend {
    drift_factor: f32,
    grip: f32,
}

impl Default for GripBlend {
    fn default() -> Self {
        Self {
            drift_factor: 0.,
            grip: 1.,
        }
    }
}

impl GripBlend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drift_factor(&self) -> f32 {
        self.drift_factor
    }

    pub fn update(
        &mut self,
        cfg: &DriftConfig,
        handbrake: bool,
        steer: f32,
        speed_kmh: f32,
        samples: &[WheelSample; WHEEL_COUNT],
        dt: f32,
    ) -> TractionOutput {
        let speed_kmh = speed_kmh.abs();
        let (grip, assist_force) = if handbrake {
            let target = self.drift_factor * cfg.handbrake_friction_multiplier;
            self.grip = smooth_damp(self.grip, target, cfg.blend_steps * dt, dt);
            let rear = self.grip;
            let front = cfg.front_drift_grip;
            let assist = if cfg.assist_enabled {
                speed_kmh / cfg.assist_reference_speed_kmh.max(f32::EPSILON) * cfg.assist_force
            } else {
                0.
            };
            ([front, front, rear, rear], assist)
        } else {
            self.grip = speed_kmh * cfg.handbrake_friction_multiplier / 300. + 1.;
            ([self.grip; WHEEL_COUNT], 0.)
        };

        let mut smoke = false;
        for wheel in [WheelId::RearLeft, WheelId::RearRight] {
            let sample = &samples[wheel.index()];
            if !sample.grounded {
                continue;
            }
            let side = finite_or(sample.sideways_slip, 0.);
            let forward = finite_or(sample.forward_slip, 0.);
            if side.abs() >= cfg.smoke_slip || forward.abs() >= cfg.smoke_slip {
                smoke = true;
            }
            if side < 0. {
                self.drift_factor = (1. - steer) * side.abs();
            } else if side > 0. {
                self.drift_factor = (1. + steer) * side.abs();
            }
        }

        TractionOutput {
            grip: grip.map(|g| finite_or(g, 1.)),
            assist_force: finite_or(assist_force, 0.),
            smoke,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DT: f32 = 0.02;

    fn locked() -> WheelSample {
        WheelSample {
            forward_slip: 0.9,
            ..WheelSample::grounded_rolling(0.)
        }
    }

    fn sliding_rear(side: f32) -> [WheelSample; WHEEL_COUNT] {
        let mut samples = [WheelSample::grounded_rolling(100.); WHEEL_COUNT];
        samples[2].sideways_slip = side;
        samples[3].sideways_slip = side;
        samples
    }

    #[test]
    fn test_brake_targets_bias_and_speed_fade() {
        let cfg = BrakeConfig::default();
        let slow = cfg.targets(1., 0.);
        assert!((slow[0] - 1950.).abs() < 1e-3);
        assert!((slow[3] - 1050.).abs() < 1e-3);

        let fast = cfg.targets(1., 200.);
        assert!((fast[0] + fast[1] + fast[2] + fast[3] - 2. * 1800.).abs() < 1e-2);

        assert_eq!(cfg.targets(0., 100.), [0.; WHEEL_COUNT]);
    }

    #[test]
    fn test_abs_releases_locked_wheel_then_reapplies() {
        let cfg = AbsConfig::default();
        let mut abs = AbsController::new();
        let target = 2000.;
        let free = WheelSample::grounded_rolling(100.);

        for _ in 0..50 {
            abs.regulate(&cfg, WheelId::FrontLeft, target, &free, DT);
        }
        assert_eq!(abs.torque()[0], target);

        // 8000 N·m/s * 0.02 s = 160 per step, 2000 / 160 -> 13 steps
        let mut steps = 0;
        while abs.torque()[0] > 0. {
            abs.regulate(&cfg, WheelId::FrontLeft, target, &locked(), DT);
            steps += 1;
            assert!(steps <= 13);
        }

        let after_one = abs.regulate(&cfg, WheelId::FrontLeft, target, &free, DT);
        assert!((after_one - 120.).abs() < 1e-3);
        for _ in 0..20 {
            abs.regulate(&cfg, WheelId::FrontLeft, target, &free, DT);
        }
        assert_eq!(abs.torque()[0], target);
    }

    #[test]
    fn test_abs_ignores_slip_when_airborne() {
        let cfg = AbsConfig::default();
        let mut abs = AbsController::new();
        let airborne = WheelSample {
            forward_slip: 0.9,
            ..WheelSample::airborne()
        };
        let torque = abs.regulate(&cfg, WheelId::RearLeft, 1000., &airborne, DT);
        assert!((torque - 120.).abs() < 1e-3);
    }

    #[test]
    fn test_abs_disabled_passes_target_through() {
        let cfg = AbsConfig {
            enabled: false,
            ..AbsConfig::default()
        };
        let mut abs = AbsController::new();
        assert_eq!(abs.regulate(&cfg, WheelId::FrontRight, 1500., &locked(), DT), 1500.);
        assert_eq!(abs.regulate(&cfg, WheelId::FrontRight, -5., &locked(), DT), 0.);
    }

    #[test]
    fn test_grip_restores_with_speed_without_handbrake() {
        let cfg = DriftConfig::default();
        let mut blend = GripBlend::new();
        let samples = [WheelSample::grounded_rolling(100.); WHEEL_COUNT];
        let out = blend.update(&cfg, false, 0., 150., &samples, DT);
        assert_eq!(out.grip, [2.; WHEEL_COUNT]);
        assert_eq!(out.assist_force, 0.);
        assert!(!out.smoke);
    }

    #[test]
    fn test_handbrake_blends_rear_grip_and_applies_assist() {
        let cfg = DriftConfig::default();
        let mut blend = GripBlend::new();
        let samples = sliding_rear(0.5);

        // first step only learns the drift factor from the slip
        blend.update(&cfg, true, 0., 100., &samples, DT);
        assert!((blend.drift_factor() - 0.5).abs() < 1e-6);

        let mut out = blend.update(&cfg, true, 0., 100., &samples, DT);
        for _ in 0..20 {
            out = blend.update(&cfg, true, 0., 100., &samples, DT);
        }
        assert!((out.grip[2] - 1.).abs() < 1e-2);
        assert_eq!(out.grip[0], 1.1);
        assert!((out.assist_force - 2500.).abs() < 1e-2);
        assert!(out.smoke);
    }

    #[test]
    fn test_drift_factor_follows_steer_direction() {
        let cfg = DriftConfig::default();
        let mut blend = GripBlend::new();
        blend.update(&cfg, true, 0.5, 50., &sliding_rear(-0.4), DT);
        assert!((blend.drift_factor() - 0.2).abs() < 1e-6);
        blend.update(&cfg, true, 0.5, 50., &sliding_rear(0.4), DT);
        assert!((blend.drift_factor() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_assist_can_be_disabled() {
        let cfg = DriftConfig {
            assist_enabled: false,
            ..DriftConfig::default()
        };
        let mut blend = GripBlend::new();
        let out = blend.update(&cfg, true, 0., 200., &sliding_rear(0.5), DT);
        assert_eq!(out.assist_force, 0.);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_abs_torque_bounded_by_target(
            target in 0f32..5000f32,
            slips in prop::collection::vec(-1f32..1f32, 1..100),
        ) {
            let cfg = AbsConfig::default();
            let mut abs = AbsController::new();
            for slip in slips {
                let sample = WheelSample {
                    forward_slip: slip,
                    ..WheelSample::grounded_rolling(0.)
                };
                let torque = abs.regulate(&cfg, WheelId::RearRight, target, &sample, DT);
                prop_assert!(torque >= 0.);
                prop_assert!(torque <= target + 1e-3);
            }
        }
    }
}
