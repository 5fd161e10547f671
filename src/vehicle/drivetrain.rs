use std::f32::consts::PI;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::SlipstreamError;
use crate::math::{finite_or, smooth_damp};

use super::{WHEEL_COUNT, WheelSample};

/// Wheel rpm to engine rpm factor applied together with the gear ratio.
const WHEEL_TO_ENGINE_RPM: f32 = 3.6;

/// Piecewise linear mapping from engine RPM to available torque.
///
/// Keys must be sorted by strictly increasing RPM. Queries outside the key range
/// return the value of the nearest key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineCurve {
    points: Vec<(f32, f32)>,
}

impl EngineCurve {
    pub fn new(points: Vec<(f32, f32)>) -> Result<Self, SlipstreamError> {
        let curve = Self { points };
        curve.validate()?;
        Ok(curve)
    }

    pub fn validate(&self) -> Result<(), SlipstreamError> {
        if self.points.is_empty() {
            return Err(SlipstreamError::InvalidEngineCurve {
                reason: "curve has no keys".to_string(),
            });
        }
        if self
            .points
            .iter()
            .any(|(rpm, torque)| !rpm.is_finite() || !torque.is_finite())
        {
            return Err(SlipstreamError::InvalidEngineCurve {
                reason: "curve contains non-finite values".to_string(),
            });
        }
        if self.points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(SlipstreamError::InvalidEngineCurve {
                reason: "keys must be sorted by strictly increasing rpm".to_string(),
            });
        }
        Ok(())
    }

    pub fn evaluate(&self, rpm: f32) -> f32 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.;
        };
        if rpm <= first.0 {
            return first.1;
        }
        for w in self.points.windows(2) {
            let ((x0, y0), (x1, y1)) = (w[0], w[1]);
            if rpm <= x1 {
                return y0 + (rpm - x0) * (y1 - y0) / (x1 - x0).max(f32::EPSILON);
            }
        }
        last.1
    }
}

impl Default for EngineCurve {
    fn default() -> Self {
        Self {
            points: vec![(1000., 50.), (3000., 120.), (5000., 100.), (6500., 60.)],
        }
    }
}

/// Immutable gearbox configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GearTable {
    /// Forward gear ratios, index = gear
    pub ratios: Vec<f32>,
    /// Minimum speed (km/h) to run in each gear, empty = no speed gate
    pub min_speed_kmh: Vec<f32>,
    pub final_drive: f32,
    /// Automatic upshift above this RPM
    pub upshift_rpm: f32,
    /// Automatic downshift below this RPM
    pub downshift_rpm: f32,
    /// Minimum time between two manual shifts
    pub shift_cooldown_s: f32,
}

impl Default for GearTable {
    fn default() -> Self {
        Self {
            ratios: vec![3.2, 2.1, 1.5, 1.15, 0.9],
            min_speed_kmh: vec![0., 25., 55., 85., 120.],
            final_drive: 4.3,
            upshift_rpm: 6200.,
            downshift_rpm: 2500.,
            shift_cooldown_s: 0.2,
        }
    }
}

impl GearTable {
    /// Gear table with default shift thresholds and cooldown.
    pub fn new(
        ratios: Vec<f32>,
        min_speed_kmh: Vec<f32>,
        final_drive: f32,
    ) -> Result<Self, SlipstreamError> {
        let table = Self {
            ratios,
            min_speed_kmh,
            final_drive,
            ..Self::default()
        };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), SlipstreamError> {
        if self.ratios.is_empty() {
            return Err(SlipstreamError::InvalidGearTable {
                reason: "no gear ratios".to_string(),
            });
        }
        if self.ratios.iter().any(|r| !r.is_finite() || *r <= 0.) {
            return Err(SlipstreamError::InvalidGearTable {
                reason: "gear ratios must be positive".to_string(),
            });
        }
        if !self.min_speed_kmh.is_empty() && self.min_speed_kmh.len() != self.ratios.len() {
            return Err(SlipstreamError::InvalidGearTable {
                reason: format!(
                    "{} speed gates for {} gears",
                    self.min_speed_kmh.len(),
                    self.ratios.len()
                ),
            });
        }
        if !self.final_drive.is_finite() || self.final_drive <= 0. {
            return Err(SlipstreamError::InvalidGearTable {
                reason: "final drive must be positive".to_string(),
            });
        }
        if self.downshift_rpm >= self.upshift_rpm {
            return Err(SlipstreamError::InvalidGearTable {
                reason: "downshift rpm must be below upshift rpm".to_string(),
            });
        }
        Ok(())
    }

    pub fn gear_count(&self) -> usize {
        self.ratios.len().max(1)
    }

    pub fn ratio(&self, gear: usize) -> f32 {
        self.ratios.get(gear).copied().unwrap_or(1.)
    }

    /// Whether `speed_kmh` satisfies the minimum speed of `gear`.
    pub fn speed_allows(&self, gear: usize, speed_kmh: f32) -> bool {
        match self.min_speed_kmh.get(gear) {
            Some(min) => speed_kmh >= *min,
            None => true,
        }
    }
}

/// Cosmetic RPM kick added to the displayed RPM after a gear change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WobbleConfig {
    pub duration_s: f32,
    pub amplitude_rpm: f32,
    pub oscillations: u32,
}

impl Default for WobbleConfig {
    fn default() -> Self {
        Self {
            duration_s: 0.35,
            amplitude_rpm: 250.,
            oscillations: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_rpm: f32,
    pub idle_rpm: f32,
    pub smooth_time_s: f32,
    pub limiter_smooth_time_s: f32,
    /// Limiter pulls RPM down to `max_rpm - limiter_drop_rpm`
    pub limiter_drop_rpm: f32,
    /// Limiter stays engaged until RPM falls below `max_rpm - limiter_release_rpm`
    pub limiter_release_rpm: f32,
    /// Hard ceiling above `max_rpm`
    pub overshoot_margin_rpm: f32,
    pub wobble: WobbleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rpm: 7000.,
            idle_rpm: 1000.,
            smooth_time_s: 0.09,
            limiter_smooth_time_s: 0.05,
            limiter_drop_rpm: 500.,
            limiter_release_rpm: 450.,
            overshoot_margin_rpm: 1000.,
            wobble: WobbleConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), SlipstreamError> {
        let values = [
            self.max_rpm,
            self.idle_rpm,
            self.smooth_time_s,
            self.limiter_smooth_time_s,
            self.limiter_drop_rpm,
            self.limiter_release_rpm,
            self.overshoot_margin_rpm,
            self.wobble.duration_s,
            self.wobble.amplitude_rpm,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SlipstreamError::InvalidEngineConfig {
                reason: "engine config contains non-finite values".to_string(),
            });
        }
        if self.idle_rpm <= 0. || self.idle_rpm >= self.max_rpm {
            return Err(SlipstreamError::InvalidEngineConfig {
                reason: format!(
                    "idle rpm {} must be positive and below max rpm {}",
                    self.idle_rpm, self.max_rpm
                ),
            });
        }
        if self.smooth_time_s <= 0. || self.limiter_smooth_time_s <= 0. {
            return Err(SlipstreamError::InvalidEngineConfig {
                reason: "smoothing times must be positive".to_string(),
            });
        }
        if self.limiter_drop_rpm < 0.
            || self.limiter_release_rpm < 0.
            || self.overshoot_margin_rpm < 0.
        {
            return Err(SlipstreamError::InvalidEngineConfig {
                reason: "limiter and overshoot margins must not be negative".to_string(),
            });
        }
        if self.wobble.duration_s <= 0. {
            return Err(SlipstreamError::InvalidEngineConfig {
                reason: "wobble duration must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Which wheels receive motor torque.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveLayout {
    FrontWheel,
    #[default]
    RearWheel,
    AllWheel,
}

impl DriveLayout {
    /// Even split of `total` across the driven wheels, zero for undriven wheels.
    pub fn split(self, total: f32) -> [f32; WHEEL_COUNT] {
        match self {
            DriveLayout::FrontWheel => [total / 2., total / 2., 0., 0.],
            DriveLayout::RearWheel => [0., 0., total / 2., total / 2.],
            DriveLayout::AllWheel => [total / 4.; WHEEL_COUNT],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftMode {
    #[default]
    Automatic,
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftRequest {
    Up,
    Down,
}

/// State changes produced by a drivetrain update, in the order they happened.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum DrivetrainEvent {
    GearChanged { gear: usize },
    ReverseChanged { reverse: bool },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrivetrainOutput {
    pub motor_torque: [f32; WHEEL_COUNT],
    pub total_power: f32,
    pub events: Vec<DrivetrainEvent>,
}

/// Engine, gearbox and torque split for one vehicle.
#[derive(Clone, Debug)]
pub struct Drivetrain {
    engine: EngineConfig,
    curve: EngineCurve,
    gears: GearTable,
    layout: DriveLayout,
    mode: ShiftMode,

    gear: usize,
    reverse: bool,
    rpm: f32,
    target_rpm: f32,
    limiter_active: bool,
    wheel_rpm: f32,
    total_power: f32,
    since_last_shift: f32,
    wobble_elapsed: Option<f32>,
}

impl Drivetrain {
    /// Expects an already validated engine config, curve and gear table.
    pub fn new(
        engine: EngineConfig,
        curve: EngineCurve,
        gears: GearTable,
        layout: DriveLayout,
        mode: ShiftMode,
    ) -> Self {
        let idle = engine.idle_rpm;
        let since_last_shift = gears.shift_cooldown_s;
        Self {
            engine,
            curve,
            gears,
            layout,
            mode,
            gear: 0,
            reverse: false,
            rpm: idle,
            target_rpm: idle,
            limiter_active: false,
            wheel_rpm: 0.,
            total_power: 0.,
            since_last_shift,
            wobble_elapsed: None,
        }
    }

    pub fn gear(&self) -> usize {
        self.gear
    }

    pub fn gear_count(&self) -> usize {
        self.gears.gear_count()
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    pub fn target_rpm(&self) -> f32 {
        self.target_rpm
    }

    pub fn is_limiter_active(&self) -> bool {
        self.limiter_active
    }

    pub fn wheel_rpm(&self) -> f32 {
        self.wheel_rpm
    }

    pub fn total_power(&self) -> f32 {
        self.total_power
    }

    /// Engine RPM plus the decaying shift wobble. Never fed back into the engine state.
    pub fn display_rpm(&self) -> f32 {
        self.rpm + self.wobble_offset()
    }

    fn wobble_offset(&self) -> f32 {
        let Some(elapsed) = self.wobble_elapsed else {
            return 0.;
        };
        let cfg = &self.engine.wobble;
        let t = elapsed / cfg.duration_s.max(f32::EPSILON);
        if t >= 1. {
            return 0.;
        }
        (PI * cfg.oscillations as f32 * t).sin() * (1. - t) * cfg.amplitude_rpm
    }

    pub fn start_wobble(&mut self) {
        self.wobble_elapsed = Some(0.);
    }

    /// Advances the engine by one step and splits the resulting power across the driven wheels.
    pub fn update(
        &mut self,
        throttle: f32,
        wheels: &[WheelSample; WHEEL_COUNT],
        dt: f32,
    ) -> DrivetrainOutput {
        let mut events = Vec::new();
        self.update_wheel_rpm(wheels, &mut events);

        let gear_ratio = self.gears.ratio(self.gear);
        self.total_power = finite_or(
            gear_ratio * self.gears.final_drive * self.curve.evaluate(self.rpm) * throttle,
            0.,
        );

        self.update_rpm(gear_ratio, dt);
        self.advance_wobble(dt);

        DrivetrainOutput {
            motor_torque: self.layout.split(self.total_power),
            total_power: self.total_power,
            events,
        }
    }

    fn update_wheel_rpm(
        &mut self,
        wheels: &[WheelSample; WHEEL_COUNT],
        events: &mut Vec<DrivetrainEvent>,
    ) {
        let (sum, grounded) = wheels
            .iter()
            .filter(|w| w.grounded)
            .fold((0., 0), |(sum, n), w| (sum + finite_or(w.spin_rpm, 0.), n + 1));
        self.wheel_rpm = if grounded > 0 { sum / grounded as f32 } else { 0. };

        if self.wheel_rpm < 0. && !self.reverse {
            self.reverse = true;
            events.push(DrivetrainEvent::ReverseChanged { reverse: true });
        } else if self.wheel_rpm > 0. && self.reverse {
            self.reverse = false;
            events.push(DrivetrainEvent::ReverseChanged { reverse: false });
        }
    }

    fn update_rpm(&mut self, gear_ratio: f32, dt: f32) {
        let max_rpm = self.engine.max_rpm;
        if self.rpm >= max_rpm || self.limiter_active {
            self.target_rpm = max_rpm - self.engine.limiter_drop_rpm;
            self.rpm = smooth_damp(
                self.rpm,
                self.target_rpm,
                self.engine.limiter_smooth_time_s,
                dt,
            );
            self.limiter_active = self.rpm >= max_rpm - self.engine.limiter_release_rpm;
        } else {
            self.target_rpm =
                self.engine.idle_rpm + self.wheel_rpm.abs() * WHEEL_TO_ENGINE_RPM * gear_ratio;
            self.rpm = smooth_damp(self.rpm, self.target_rpm, self.engine.smooth_time_s, dt);
        }

        let ceiling = finite_or(max_rpm + self.engine.overshoot_margin_rpm, 0.).max(0.);
        self.rpm = finite_or(self.rpm, self.engine.idle_rpm).clamp(0., ceiling);
    }

    fn advance_wobble(&mut self, dt: f32) {
        if let Some(elapsed) = self.wobble_elapsed {
            let elapsed = elapsed + dt;
            self.wobble_elapsed = if elapsed >= self.engine.wobble.duration_s {
                None
            } else {
                Some(elapsed)
            };
        }
    }

    /// Runs the shifter for this step. Shifting needs every wheel on the ground.
    pub fn shift(
        &mut self,
        speed_kmh: f32,
        wheels: &[WheelSample; WHEEL_COUNT],
        request: Option<ShiftRequest>,
        dt: f32,
    ) -> Option<DrivetrainEvent> {
        self.since_last_shift += dt;

        if !wheels.iter().all(|w| w.grounded) {
            return None;
        }

        let top_gear = self.gears.gear_count() - 1;
        let next_gear = match self.mode {
            ShiftMode::Automatic => {
                if self.rpm > self.gears.upshift_rpm
                    && self.gear < top_gear
                    && !self.reverse
                    && self.gears.speed_allows(self.gear + 1, speed_kmh)
                {
                    Some(self.gear + 1)
                } else if self.rpm < self.gears.downshift_rpm && self.gear > 0 {
                    Some(self.gear - 1)
                } else {
                    None
                }
            }
            ShiftMode::Manual => {
                if self.since_last_shift < self.gears.shift_cooldown_s {
                    return None;
                }
                match request {
                    Some(ShiftRequest::Up) if self.gear < top_gear => Some(self.gear + 1),
                    Some(ShiftRequest::Down) if self.gear > 0 => Some(self.gear - 1),
                    _ => None,
                }
            }
        }?;

        debug!("Gear change {} -> {}", self.gear, next_gear);
        self.gear = next_gear;
        self.since_last_shift = 0.;
        Some(DrivetrainEvent::GearChanged { gear: next_gear })
    }
}
