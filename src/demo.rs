//! Headless race used by the CLI, the integration tests and the benches.
//!
//! [`DemoCar`] is a kinematic stand-in for a physics engine: it rides along the
//! checkpoint loop at a lane offset and turns the controller's wheel torques into
//! longitudinal acceleration. It fires checkpoint triggers whenever its arc
//! length passes a checkpoint.

use glam::Vec3;
use log::{debug, info};

use crate::config::SimConfig;
use crate::errors::SlipstreamError;
use crate::math::rpm_from_rad_per_sec;
use crate::race::{CheckpointCrossing, CheckpointTrack, RaceEvent, RaceSession, VehicleId};
use crate::vehicle::controller::{VehicleConfig, VehicleController};
use crate::vehicle::{VehicleBody, VehicleInputs, WheelCommands, WheelId, WheelSample};
use crate::writer::{SimRecord, VehicleSample};

pub const WHEEL_RADIUS: f32 = 0.34;
const MASS_KG: f32 = 1200.;
const AERO_DRAG: f32 = 0.45;
const ROLLING_DRAG: f32 = 12.;
const HALF_TRACK: f32 = 0.75;
const HALF_WHEELBASE: f32 = 1.275;
const GRID_SPACING: f32 = 6.;
/// Distance of the last grid slot past the line. A car parked on a vertex with
/// a lane offset would project onto the previous segment.
const GRID_START: f32 = 3.;
const LANE_WIDTH: f32 = 2.5;
const STEER_LOOKAHEAD: f32 = 10.;

/// Kinematic car that follows the checkpoint loop.
#[derive(Clone, Debug)]
pub struct DemoCar {
    track: CheckpointTrack,
    /// Unwrapped arc length, keeps growing across laps
    arc: f32,
    lane: f32,
    speed: f32,
    /// Scales the drive force so identical controllers spread out
    power_scale: f32,
    commands: WheelCommands,
    pending_force: Vec3,
}

impl DemoCar {
    pub fn new(track: CheckpointTrack, arc: f32, lane: f32, power_scale: f32) -> Self {
        Self {
            track,
            arc,
            lane,
            speed: 0.,
            power_scale,
            commands: WheelCommands::default(),
            pending_force: Vec3::ZERO,
        }
    }

    pub fn arc(&self) -> f32 {
        self.arc
    }

    /// Speed along the track in m/s.
    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn position(&self) -> Vec3 {
        let centre = self.track.position_at(self.arc);
        centre + self.right() * self.lane
    }

    fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize_or_zero()
    }

    /// Steering input a driver would use to follow the loop.
    pub fn steer_hint(&self) -> f32 {
        let here = self.track.direction_at(self.arc);
        let ahead = self.track.direction_at(self.arc + STEER_LOOKAHEAD);
        let angle = here.angle_between(ahead);
        let side = if here.cross(ahead).y > 0. { -1. } else { 1. };
        if angle.is_finite() {
            (side * angle / 0.6).clamp(-1., 1.)
        } else {
            0.
        }
    }

    /// Moves the car by one step using the last commands and accumulated forces.
    /// Returns the checkpoints passed, in driving order.
    pub fn integrate(&mut self, dt: f32) -> Vec<usize> {
        let drive: f32 =
            self.commands.motor_torque.iter().sum::<f32>() / WHEEL_RADIUS * self.power_scale;
        let push = self.pending_force.dot(self.forward());
        let resist = AERO_DRAG * self.speed * self.speed + ROLLING_DRAG * self.speed;
        self.speed += (drive + push - resist) / MASS_KG * dt;

        let braking: f32 = self.commands.brake_torque.iter().sum::<f32>() / WHEEL_RADIUS;
        self.speed = (self.speed - braking / MASS_KG * dt).max(0.);
        if !self.speed.is_finite() {
            self.speed = 0.;
        }
        self.pending_force = Vec3::ZERO;

        let before = self.arc;
        self.arc += self.speed * dt;
        self.crossed(before, self.arc)
    }

    fn crossed(&self, before: f32, after: f32) -> Vec<usize> {
        let length = self.track.length();
        let mut passed: Vec<(f32, usize)> = (0..self.track.len())
            .filter_map(|i| {
                let at = self.track.checkpoint_arc(i)?;
                // first lap-aligned copy of this checkpoint strictly after `before`
                let next = at + ((before - at) / length).floor() * length + length;
                (next <= after).then_some((next, i))
            })
            .collect();
        passed.sort_by(|a, b| a.0.total_cmp(&b.0));
        passed.into_iter().map(|(_, i)| i).collect()
    }

    /// Teleports back onto the centre line at `arc`, standing still.
    pub fn respawn(&mut self, arc: f32) {
        self.arc = arc;
        self.lane = 0.;
        self.speed = 0.;
        self.pending_force = Vec3::ZERO;
    }
}

impl VehicleBody for DemoCar {
    fn wheel_sample(&self, _wheel: WheelId) -> Option<WheelSample> {
        Some(WheelSample::grounded_rolling(rpm_from_rad_per_sec(self.speed / WHEEL_RADIUS)))
    }

    fn wheel_position(&self, wheel: WheelId) -> Option<Vec3> {
        let along = if wheel.is_front() {
            HALF_WHEELBASE
        } else {
            -HALF_WHEELBASE
        };
        let across = match wheel {
            WheelId::FrontLeft | WheelId::RearLeft => -HALF_TRACK,
            WheelId::FrontRight | WheelId::RearRight => HALF_TRACK,
        };
        Some(self.position() + self.forward() * along + self.right() * across)
    }

    fn linear_velocity(&self) -> Option<Vec3> {
        Some(self.forward() * self.speed)
    }

    fn forward(&self) -> Vec3 {
        self.track.direction_at(self.arc)
    }

    fn up(&self) -> Vec3 {
        Vec3::Y
    }

    fn apply_wheel_commands(&mut self, commands: &WheelCommands) {
        self.commands = *commands;
    }

    fn add_force(&mut self, force: Vec3) {
        if force.is_finite() {
            self.pending_force += force;
        }
    }

    fn add_force_at_wheel(&mut self, _wheel: WheelId, force: Vec3) {
        self.add_force(force);
    }
}

/// Full-throttle driver that fires the nitrous in full bursts.
#[derive(Clone, Debug, Default)]
struct DemoDriver {
    boosting: bool,
}

impl DemoDriver {
    fn inputs(&mut self, car: &DemoCar, controller: &VehicleController) -> VehicleInputs {
        let capacity = controller.config().nitrous.capacity;
        if controller.nitrous() >= capacity {
            self.boosting = true;
        } else if controller.nitrous() <= 0. {
            self.boosting = false;
        }
        VehicleInputs {
            throttle: 1.,
            steer: car.steer_hint(),
            boost: self.boosting,
            ..Default::default()
        }
    }
}

struct DemoEntrant {
    id: VehicleId,
    car: DemoCar,
    controller: VehicleController,
    driver: DemoDriver,
}

/// A race session plus one controller and kinematic car per entrant, stepped at a
/// fixed rate.
pub struct DemoRace {
    session: RaceSession,
    entrants: Vec<DemoEntrant>,
    dt: f32,
    steps: u64,
}

impl DemoRace {
    pub fn new(config: &SimConfig, cars: usize, dt: f32) -> Result<Self, SlipstreamError> {
        if cars == 0 {
            return Err(SlipstreamError::InvalidUserInput {
                field: "cars".to_string(),
                reason: "at least one car is needed".to_string(),
            });
        }
        if !(dt.is_finite() && dt > 0.) {
            return Err(SlipstreamError::InvalidUserInput {
                field: "dt".to_string(),
                reason: format!("{dt} is not a positive step"),
            });
        }
        let track = config.track.build()?;
        let mut session = RaceSession::new(config.race.clone(), track.clone())?;

        let mut entrants = Vec::with_capacity(cars);
        for i in 0..cars {
            let id = VehicleId(i as u32 + 1);
            // pole position is furthest ahead, nobody starts behind the line
            let arc = GRID_START + (cars - 1 - i) as f32 * GRID_SPACING;
            let lane = if i % 2 == 0 { -LANE_WIDTH / 2. } else { LANE_WIDTH / 2. };
            let car = DemoCar::new(track.clone(), arc, lane, 1. - 0.02 * i as f32);
            let vehicle_config = VehicleConfig {
                ai_controlled: i > 0,
                ..config.vehicle.clone()
            };
            let controller = VehicleController::new(vehicle_config, &car);
            session.add_vehicle(id, car.position())?;
            entrants.push(DemoEntrant {
                id,
                car,
                controller,
                driver: DemoDriver::default(),
            });
        }
        info!("Demo race with {cars} cars on a {:.0}m loop", track.length());

        Ok(Self {
            session,
            entrants,
            dt,
            steps: 0,
        })
    }

    pub fn start(&mut self) -> bool {
        self.session.start_countdown()
    }

    pub fn session(&self) -> &RaceSession {
        &self.session
    }

    pub fn car(&self, vehicle: VehicleId) -> Option<&DemoCar> {
        self.entrants
            .iter()
            .find(|e| e.id == vehicle)
            .map(|e| &e.car)
    }

    pub fn controller(&self, vehicle: VehicleId) -> Option<&VehicleController> {
        self.entrants
            .iter()
            .find(|e| e.id == vehicle)
            .map(|e| &e.controller)
    }

    /// Puts a car back on the centre line where it is, standing still.
    pub fn respawn(&mut self, vehicle: VehicleId) -> bool {
        let Some(entrant) = self.entrants.iter_mut().find(|e| e.id == vehicle) else {
            return false;
        };
        let arc = entrant.car.arc();
        entrant.car.respawn(arc);
        let position = entrant.car.position();
        self.session.respawn(vehicle, position)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.session.state() == crate::race::RaceState::Finished
    }

    /// Advances controllers, cars and the session by one fixed step.
    pub fn step(&mut self) -> Vec<RaceEvent> {
        self.steps += 1;
        let frozen = self.session.vehicles_frozen();
        let mut crossings = Vec::new();
        for entrant in &mut self.entrants {
            if frozen {
                continue;
            }
            let inputs = entrant.driver.inputs(&entrant.car, &entrant.controller);
            entrant
                .controller
                .step(&inputs, &mut entrant.car, self.dt);
            for index in entrant.car.integrate(self.dt) {
                crossings.push((entrant.id, index));
            }
        }

        let positions: Vec<(VehicleId, Vec3)> = self
            .entrants
            .iter()
            .map(|e| (e.id, e.car.position()))
            .collect();
        let mut events = self.session.tick(f64::from(self.dt), &positions);

        let now = self.session.clock();
        for (vehicle, index) in crossings {
            events.extend(self.session.on_checkpoint(CheckpointCrossing {
                vehicle,
                index,
                timestamp: now,
            }));
        }
        if !events.is_empty() {
            debug!("Step {}: {} race events", self.steps, events.len());
        }
        events
    }

    /// Steps until the race finishes or `max_steps` is reached, handing every
    /// sample and event to `sink`. Returns the number of steps taken.
    pub fn run(&mut self, max_steps: u64, mut sink: impl FnMut(SimRecord)) -> u64 {
        let mut taken = 0;
        while taken < max_steps && !self.is_finished() {
            let events = self.step();
            taken += 1;
            let time = self.session.clock();
            for sample in self.samples() {
                sink(SimRecord::Sample(Box::new(sample)));
            }
            for event in events {
                sink(SimRecord::Event { time, event });
            }
        }
        taken
    }

    pub fn samples(&self) -> Vec<VehicleSample> {
        let time = self.session.clock();
        self.entrants
            .iter()
            .map(|e| VehicleSample {
                time,
                vehicle: e.id,
                position: e.car.position(),
                progress: self.session.progress_of(e.id).unwrap_or(0.),
                rank: self.session.rank_of(e.id),
                lap: self.session.laps_of(e.id).unwrap_or(0),
                telemetry: e.controller.telemetry(),
            })
            .collect()
    }
}
