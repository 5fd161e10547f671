use glam::Vec3;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::math::{finite_or, g_from_mps2, kmh_from_mps};

use super::drivetrain::{
    DriveLayout, Drivetrain, DrivetrainEvent, EngineConfig, EngineCurve, GearTable, ShiftMode,
};
use super::stability::{StabilityConfig, anti_roll, downforce};
use super::steering::{SteeringConfig, SteeringSolver, wheel_positions};
use super::traction::{AbsConfig, AbsController, BrakeConfig, DriftConfig, GripBlend};
use super::{
    VehicleBody, VehicleInputs, VehicleState, VehicleTelemetry, WHEEL_COUNT, WheelCommands,
    WheelId, WheelSample,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NitrousConfig {
    pub capacity: f32,
    /// Units per second while not boosting
    pub recharge_rate: f32,
    /// Units per second while boosting
    pub drain_rate: f32,
    /// Forward force (N) while boosting with charge left
    pub force: f32,
}

impl Default for NitrousConfig {
    fn default() -> Self {
        Self {
            capacity: 10.,
            recharge_rate: 0.5,
            drain_rate: 1.,
            force: 5000.,
        }
    }
}

/// Per-vehicle tuning. An invalid engine config and a missing or invalid engine
/// curve or gear table fall back to defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub engine: EngineConfig,
    pub engine_curve: Option<EngineCurve>,
    pub gears: Option<GearTable>,
    pub layout: DriveLayout,
    pub shift_mode: ShiftMode,
    pub brakes: BrakeConfig,
    pub abs: AbsConfig,
    pub drift: DriftConfig,
    pub steering: SteeringConfig,
    pub stability: StabilityConfig,
    pub nitrous: NitrousConfig,
    /// AI vehicles skip the drift blend and nitrous
    pub ai_controlled: bool,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            engine_curve: Some(EngineCurve::default()),
            gears: Some(GearTable::default()),
            layout: DriveLayout::default(),
            shift_mode: ShiftMode::default(),
            brakes: BrakeConfig::default(),
            abs: AbsConfig::default(),
            drift: DriftConfig::default(),
            steering: SteeringConfig::default(),
            stability: StabilityConfig::default(),
            nitrous: NitrousConfig::default(),
            ai_controlled: false,
        }
    }
}

/// What one call to [`VehicleController::step`] did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    pub events: Vec<DrivetrainEvent>,
    /// Commands written to the body, `None` when the controller is not ready
    pub commands: Option<WheelCommands>,
    pub drift_smoke: bool,
}

/// Per-vehicle orchestrator: runs drivetrain, brakes, steering, stability and
/// traction in order once per fixed step and writes the results to the body.
pub struct VehicleController {
    config: VehicleConfig,
    drivetrain: Drivetrain,
    abs: AbsController,
    grip: GripBlend,
    steering: SteeringSolver,
    ready: bool,
    warnings: Vec<String>,

    state: VehicleState,
    last_grip: [f32; WHEEL_COUNT],
    last_velocity: Vec3,
    nitrous: f32,
    drift_smoke: bool,
}

impl VehicleController {
    pub fn new<B: VehicleBody + ?Sized>(mut config: VehicleConfig, body: &B) -> Self {
        let mut warnings = Vec::new();

        if let Err(e) = config.engine.validate() {
            warnings.push(format!("{e}, using the default engine config"));
            config.engine = EngineConfig::default();
        }

        let curve = match config.engine_curve.clone().map(|c| c.validate().map(|_| c)) {
            Some(Ok(curve)) => curve,
            Some(Err(e)) => {
                warnings.push(format!("{e}, using the default engine curve"));
                EngineCurve::default()
            }
            None => {
                warnings.push("No engine curve configured, using the default curve".to_string());
                EngineCurve::default()
            }
        };
        let gears = match config.gears.clone().map(|g| g.validate().map(|_| g)) {
            Some(Ok(gears)) => gears,
            Some(Err(e)) => {
                warnings.push(format!("{e}, using the default gear table"));
                GearTable::default()
            }
            None => {
                warnings.push("No gear table configured, using the default gears".to_string());
                GearTable::default()
            }
        };
        for warning in &warnings {
            warn!("{warning}");
        }

        let mut ready = true;
        if WheelId::ALL
            .iter()
            .any(|w| body.wheel_position(*w).is_none())
        {
            error!("Wheel references missing, vehicle will not be driven");
            ready = false;
        }
        let last_velocity = match body.linear_velocity() {
            Some(v) => v,
            None => {
                error!("Rigid body missing, vehicle will not be driven");
                ready = false;
                Vec3::ZERO
            }
        };

        let drivetrain = Drivetrain::new(
            config.engine.clone(),
            curve,
            gears,
            config.layout,
            config.shift_mode,
        );
        let steering = SteeringSolver::new(&config.steering);
        let state = VehicleState {
            engine_rpm: drivetrain.rpm(),
            target_rpm: drivetrain.target_rpm(),
            ..Default::default()
        };

        Self {
            config,
            drivetrain,
            abs: AbsController::new(),
            grip: GripBlend::new(),
            steering,
            ready,
            warnings,
            state,
            last_grip: [1.; WHEEL_COUNT],
            last_velocity,
            nitrous: 0.,
            drift_smoke: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Fallbacks substituted at construction.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn nitrous(&self) -> f32 {
        self.nitrous
    }

    pub fn telemetry(&self) -> VehicleTelemetry {
        VehicleTelemetry {
            speed_kmh: self.state.speed_kmh,
            engine_rpm: self.drivetrain.display_rpm(),
            gear: self.state.gear_index,
            reverse: self.state.reverse,
            nitrous: self.nitrous,
            g_force: self.state.g_force,
            rev_limiter: self.drivetrain.is_limiter_active(),
            drift_smoke: self.drift_smoke,
        }
    }

    pub fn step<B: VehicleBody + ?Sized>(
        &mut self,
        inputs: &VehicleInputs,
        body: &mut B,
        dt: f32,
    ) -> StepReport {
        if !self.ready || !dt.is_finite() || dt <= 0. {
            return StepReport::default();
        }
        let inputs = inputs.sanitized();
        let brake = inputs.brake();
        let samples: [WheelSample; WHEEL_COUNT] =
            WheelId::ALL.map(|w| body.wheel_sample(w).unwrap_or_else(WheelSample::airborne));

        let velocity = body.linear_velocity().unwrap_or(Vec3::ZERO);
        let velocity = if velocity.is_finite() { velocity } else { Vec3::ZERO };
        let speed_kmh = kmh_from_mps(velocity.length());
        let up = body.up();
        let forward = body.forward();

        let mut events = Vec::new();
        if let Some(event) = self
            .drivetrain
            .shift(speed_kmh, &samples, inputs.shift, dt)
        {
            self.drivetrain.start_wobble();
            events.push(event);
        }

        body.add_force(downforce(&self.config.stability, velocity, up));

        let steer_cfg = &self.config.steering;
        self.steering.tick_radius(steer_cfg, speed_kmh, dt);
        let wheelbase = steer_cfg.estimate_wheelbase(&wheel_positions(|w| body.wheel_position(w)));
        let steer_angle = self
            .steering
            .solve(steer_cfg, inputs.steer, speed_kmh, brake, wheelbase);

        let drive = self.drivetrain.update(inputs.throttle, &samples, dt);
        events.extend(drive.events);

        let brake_targets = self.config.brakes.targets(brake, speed_kmh);
        let brake_torque = self
            .abs
            .regulate_all(&self.config.abs, &brake_targets, &samples, dt);

        let accel = (velocity - self.last_velocity).length() / dt;
        let g_force = finite_or(g_from_mps2(accel), 0.);
        self.last_velocity = velocity;

        for (wheel, force) in WheelId::ALL
            .iter()
            .zip(anti_roll(&self.config.stability, &samples))
        {
            if samples[wheel.index()].grounded && force != 0. {
                body.add_force_at_wheel(*wheel, up * force);
            }
        }

        if !self.config.ai_controlled {
            let traction = self.grip.update(
                &self.config.drift,
                inputs.handbrake,
                inputs.steer,
                speed_kmh,
                &samples,
                dt,
            );
            self.last_grip = traction.grip;
            self.drift_smoke = traction.smoke;
            if traction.assist_force > 0. {
                body.add_force(forward * traction.assist_force);
            }
            self.update_nitrous(inputs.boost, forward, body, dt);
        }

        let commands = WheelCommands {
            motor_torque: drive.motor_torque,
            brake_torque,
            steer_angle_deg: steer_angle,
            grip: self.last_grip,
        };
        body.apply_wheel_commands(&commands);

        self.state = VehicleState {
            gear_index: self.drivetrain.gear(),
            reverse: self.drivetrain.is_reverse(),
            engine_rpm: self.drivetrain.rpm(),
            target_rpm: self.drivetrain.target_rpm(),
            wheel_brake_torque: brake_torque,
            steer_angle,
            speed_kmh,
            g_force,
        };
        if !events.is_empty() {
            debug!("Drivetrain events: {events:?}");
        }

        StepReport {
            events,
            commands: Some(commands),
            drift_smoke: self.drift_smoke,
        }
    }

    fn update_nitrous<B: VehicleBody + ?Sized>(
        &mut self,
        boosting: bool,
        forward: Vec3,
        body: &mut B,
        dt: f32,
    ) {
        let cfg = &self.config.nitrous;
        if boosting {
            if self.nitrous > 0. {
                body.add_force(forward * cfg.force);
            }
            self.nitrous = (self.nitrous - cfg.drain_rate * dt).max(0.);
        } else {
            self.nitrous = (self.nitrous + cfg.recharge_rate * dt).min(cfg.capacity);
        }
    }
}
