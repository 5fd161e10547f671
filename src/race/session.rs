use std::collections::BTreeMap;

use glam::Vec3;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::SlipstreamError;

use super::lap_timer::LapTimer;
use super::lap_validator::{CheckpointVerdict, LapValidator};
use super::progress::{ProgressConfig, ProgressTracker};
use super::ranking::{RankAggregator, RankEntry, RankInput};
use super::splits::SplitBoard;
use super::track::CheckpointTrack;
use super::{CheckpointCrossing, RaceEvent, VehicleId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceState {
    PreRace,
    Countdown,
    Racing,
    Finished,
}

/// Race rules handed to [`RaceSession::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub total_laps: u32,
    pub countdown_s: f64,
    pub min_lap_s: f64,
    pub debounce_s: f64,
    /// Progress trackers update every this many ticks
    pub progress_interval_steps: u32,
    /// Standings are rebuilt every this many ticks
    pub rank_interval_steps: u32,
    pub progress: ProgressConfig,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            total_laps: 3,
            countdown_s: 3.,
            min_lap_s: 3.,
            debounce_s: 0.2,
            progress_interval_steps: 1,
            rank_interval_steps: 10,
            progress: ProgressConfig::default(),
        }
    }
}

impl RaceConfig {
    /// Clamps the rules into their supported ranges.
    pub fn validated(self) -> Self {
        let mut cfg = self;
        if cfg.total_laps < 1 {
            warn!("total_laps {} raised to 1", cfg.total_laps);
            cfg.total_laps = 1;
        }
        if !(cfg.countdown_s >= 0.5) {
            warn!("countdown_s {} raised to 0.5", cfg.countdown_s);
            cfg.countdown_s = 0.5;
        }
        if !(cfg.min_lap_s >= 0.) {
            warn!("min_lap_s {} raised to 0", cfg.min_lap_s);
            cfg.min_lap_s = 0.;
        }
        if !(cfg.debounce_s >= 0.) {
            warn!("debounce_s {} raised to 0", cfg.debounce_s);
            cfg.debounce_s = 0.;
        }
        if cfg.progress_interval_steps < 1 {
            warn!("progress_interval_steps raised to 1");
            cfg.progress_interval_steps = 1;
        }
        if cfg.rank_interval_steps < 1 {
            warn!("rank_interval_steps raised to 1");
            cfg.rank_interval_steps = 1;
        }
        cfg.progress = cfg.progress.validated();
        cfg
    }
}

#[derive(Clone, Debug)]
struct Entrant {
    validator: LapValidator,
    progress: ProgressTracker,
    timer: LapTimer,
    splits: SplitBoard,
    position: Vec3,
    laps: u32,
    finished: bool,
}

/// One race on one track: countdown, lap validation, timing and live ranking.
pub struct RaceSession {
    config: RaceConfig,
    track: CheckpointTrack,
    state: RaceState,
    clock: f64,
    countdown_left: f64,
    ticks: u64,
    entrants: BTreeMap<VehicleId, Entrant>,
    ranking: RankAggregator,
}

impl RaceSession {
    pub fn new(config: RaceConfig, track: CheckpointTrack) -> Result<Self, SlipstreamError> {
        let config = config.validated();
        // fail early on tracks the lap bitmask cannot represent
        LapValidator::new(track.len(), config.min_lap_s, config.debounce_s)?;
        Ok(Self {
            countdown_left: config.countdown_s,
            config,
            track,
            state: RaceState::PreRace,
            clock: 0.,
            ticks: 0,
            entrants: BTreeMap::new(),
            ranking: RankAggregator::new(),
        })
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn track(&self) -> &CheckpointTrack {
        &self.track
    }

    pub fn state(&self) -> RaceState {
        self.state
    }

    /// Seconds since the session was created.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn countdown_remaining(&self) -> f64 {
        match self.state {
            RaceState::PreRace => self.config.countdown_s,
            RaceState::Countdown => self.countdown_left.max(0.),
            _ => 0.,
        }
    }

    /// Vehicles are held in place outside of the racing state.
    pub fn vehicles_frozen(&self) -> bool {
        self.state != RaceState::Racing
    }

    pub fn add_vehicle(&mut self, vehicle: VehicleId, start: Vec3) -> Result<(), SlipstreamError> {
        if self.entrants.contains_key(&vehicle) {
            return Err(SlipstreamError::InvalidUserInput {
                field: "vehicle".to_string(),
                reason: format!("{vehicle} is already in the race"),
            });
        }
        let mut entrant = Entrant {
            validator: LapValidator::new(
                self.track.len(),
                self.config.min_lap_s,
                self.config.debounce_s,
            )?,
            progress: ProgressTracker::new(&self.track, self.config.progress.clone(), start),
            timer: LapTimer::new(),
            splits: SplitBoard::new(self.track.len()),
            position: start,
            laps: 0,
            finished: false,
        };
        if self.state == RaceState::Racing {
            entrant.validator.start(self.clock);
            entrant.timer.start();
        }
        self.entrants.insert(vehicle, entrant);
        self.ranking.register(vehicle);
        debug!("Vehicle {vehicle} joined the session");
        Ok(())
    }

    /// Drops a vehicle from the session. Removing the last unfinished vehicle of a
    /// running race finishes it, so the returned events may end with `RaceFinished`.
    pub fn remove_vehicle(&mut self, vehicle: VehicleId) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        self.ranking.unregister(vehicle);
        if self.entrants.remove(&vehicle).is_none() {
            debug!("Vehicle {vehicle} is not in the session");
            return events;
        }
        debug!("Vehicle {vehicle} left the session");
        if self.state == RaceState::Racing {
            self.finish_if_done(&mut events);
        }
        events
    }

    pub fn vehicles(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.entrants.keys().copied()
    }

    /// Starts the countdown from the pre-race state. Returns false in any other state.
    pub fn start_countdown(&mut self) -> bool {
        if self.state != RaceState::PreRace {
            return false;
        }
        info!("Countdown started ({:.1}s)", self.config.countdown_s);
        self.state = RaceState::Countdown;
        self.countdown_left = self.config.countdown_s;
        true
    }

    /// Advances the session by `dt` seconds with the latest vehicle positions.
    pub fn tick(&mut self, dt: f64, positions: &[(VehicleId, Vec3)]) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        if !dt.is_finite() || dt <= 0. {
            return events;
        }
        for (vehicle, position) in positions {
            match self.entrants.get_mut(vehicle) {
                Some(entrant) if position.is_finite() => entrant.position = *position,
                _ => {}
            }
        }
        self.clock += dt;
        self.ticks += 1;

        match self.state {
            RaceState::PreRace | RaceState::Finished => {}
            RaceState::Countdown => {
                self.countdown_left -= dt;
                if self.countdown_left <= 0. {
                    self.begin_racing();
                    events.push(RaceEvent::RaceStarted);
                }
            }
            RaceState::Racing => {
                for entrant in self.entrants.values_mut() {
                    entrant.timer.tick(dt);
                }
            }
        }

        if self.state != RaceState::PreRace
            && self.ticks % u64::from(self.config.progress_interval_steps) == 0
        {
            for entrant in self.entrants.values_mut() {
                entrant.progress.update(&self.track, entrant.position);
            }
        }

        let rank_due = self.ticks % u64::from(self.config.rank_interval_steps) == 0;
        if self.state == RaceState::Racing && rank_due {
            events.extend(self.rerank().map(RaceEvent::RanksChanged));
        }

        events
    }

    fn begin_racing(&mut self) {
        info!("Race started with {} vehicles", self.entrants.len());
        self.state = RaceState::Racing;
        self.countdown_left = 0.;
        for entrant in self.entrants.values_mut() {
            entrant.validator.start(self.clock);
            entrant.timer.start();
        }
    }

    /// Rebuilds the standings now, regardless of the tick cadence.
    pub fn rerank(&mut self) -> Option<Vec<RankEntry>> {
        let entrants = &self.entrants;
        self.ranking
            .aggregate(|vehicle| {
                entrants.get(&vehicle).map(|e| RankInput {
                    progress: e.progress.progress(),
                    finished: e.finished,
                    total_time: e.timer.total_time(),
                    best_lap: e.timer.fastest_lap(),
                })
            })
            .map(<[RankEntry]>::to_vec)
    }

    /// Routes a checkpoint trigger to the vehicle's lap validation.
    pub fn on_checkpoint(&mut self, crossing: CheckpointCrossing) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        if self.state != RaceState::Racing {
            debug!("Checkpoint {} ignored outside of racing", crossing.index);
            return events;
        }
        let Some(entrant) = self.entrants.get_mut(&crossing.vehicle) else {
            debug!("Checkpoint from unknown vehicle {}", crossing.vehicle);
            return events;
        };
        if entrant.finished {
            return events;
        }

        let verdict = entrant.validator.hit(crossing.index, crossing.timestamp);
        if !verdict.is_passed() {
            return events;
        }

        let split = entrant.timer.current_lap_time();
        if crossing.index > 0 {
            entrant.splits.record_split(crossing.index, split);
        }
        events.push(RaceEvent::CheckpointPassed {
            vehicle: crossing.vehicle,
            index: crossing.index,
            split,
            delta_vs_best: entrant.splits.delta_vs_best(crossing.index, split),
        });

        let completed_lap = match verdict {
            CheckpointVerdict::LapCompleted { .. } => entrant.timer.complete_lap(),
            _ => None,
        };
        if let Some(lap_time) = completed_lap {
            entrant.splits.finish_lap(lap_time);
            entrant.laps += 1;
            info!(
                "Vehicle {} completed lap {} in {lap_time:.3}s",
                crossing.vehicle, entrant.laps
            );
            events.push(RaceEvent::LapCompleted {
                vehicle: crossing.vehicle,
                lap: entrant.laps,
                lap_time,
            });

            if entrant.laps >= self.config.total_laps {
                entrant.finished = true;
                entrant.timer.stop();
                entrant.validator.finish();
                let total_time = entrant.timer.total_time();
                info!("Vehicle {} finished in {total_time:.3}s", crossing.vehicle);
                events.push(RaceEvent::VehicleFinished {
                    vehicle: crossing.vehicle,
                    total_time,
                });
            }
        }

        self.finish_if_done(&mut events);
        events
    }

    fn finish_if_done(&mut self, events: &mut Vec<RaceEvent>) {
        if self.all_finished() {
            info!("All vehicles finished");
            self.state = RaceState::Finished;
            events.extend(self.rerank().map(RaceEvent::RanksChanged));
            events.push(RaceEvent::RaceFinished);
        }
    }

    fn all_finished(&self) -> bool {
        !self.entrants.is_empty() && self.entrants.values().all(|e| e.finished)
    }

    pub fn standings(&self) -> &[RankEntry] {
        self.ranking.standings()
    }

    pub fn rank_of(&self, vehicle: VehicleId) -> Option<usize> {
        self.ranking.rank_of(vehicle)
    }

    pub fn progress_of(&self, vehicle: VehicleId) -> Option<f32> {
        self.entrants.get(&vehicle).map(|e| e.progress.progress())
    }

    pub fn laps_of(&self, vehicle: VehicleId) -> Option<u32> {
        self.entrants.get(&vehicle).map(|e| e.laps)
    }

    pub fn is_finished(&self, vehicle: VehicleId) -> Option<bool> {
        self.entrants.get(&vehicle).map(|e| e.finished)
    }

    pub fn lap_timer(&self, vehicle: VehicleId) -> Option<&LapTimer> {
        self.entrants.get(&vehicle).map(|e| &e.timer)
    }

    pub fn splits(&self, vehicle: VehicleId) -> Option<&SplitBoard> {
        self.entrants.get(&vehicle).map(|e| &e.splits)
    }

    /// Re-seeds a vehicle's progress after it was moved, e.g. a respawn.
    pub fn respawn(&mut self, vehicle: VehicleId, position: Vec3) -> bool {
        let Some(entrant) = self.entrants.get_mut(&vehicle) else {
            return false;
        };
        entrant.position = position;
        entrant.progress.resync(&self.track, position);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.1;

    fn square_session(config: RaceConfig) -> RaceSession {
        let track = CheckpointTrack::rectangle(100., 100.).unwrap();
        RaceSession::new(config, track).unwrap()
    }

    fn quick_rules() -> RaceConfig {
        RaceConfig {
            total_laps: 2,
            countdown_s: 0.5,
            min_lap_s: 1.,
            rank_interval_steps: 1,
            ..RaceConfig::default()
        }
    }

    fn cross(session: &mut RaceSession, vehicle: u32, index: usize) -> Vec<RaceEvent> {
        let timestamp = session.clock();
        session.on_checkpoint(CheckpointCrossing {
            vehicle: VehicleId(vehicle),
            index,
            timestamp,
        })
    }

    fn run_until_racing(session: &mut RaceSession) -> Vec<RaceEvent> {
        session.start_countdown();
        let mut events = Vec::new();
        while session.state() != RaceState::Racing {
            events.extend(session.tick(DT, &[]));
        }
        events
    }

    fn drive_lap(session: &mut RaceSession, vehicle: u32) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        for index in [1, 2, 3, 0] {
            for _ in 0..5 {
                session.tick(DT, &[]);
            }
            events.extend(cross(session, vehicle, index));
        }
        events
    }

    #[test]
    fn test_config_clamps() {
        let cfg = RaceConfig {
            total_laps: 0,
            countdown_s: 0.1,
            min_lap_s: -1.,
            debounce_s: f64::NAN,
            progress_interval_steps: 0,
            rank_interval_steps: 0,
            ..RaceConfig::default()
        }
        .validated();
        assert_eq!(cfg.total_laps, 1);
        assert_eq!(cfg.countdown_s, 0.5);
        assert_eq!(cfg.min_lap_s, 0.);
        assert_eq!(cfg.debounce_s, 0.);
        assert_eq!(cfg.progress_interval_steps, 1);
        assert_eq!(cfg.rank_interval_steps, 1);
    }

    #[test]
    fn test_rejects_oversized_track() {
        let points = (0..65).map(|i| Vec3::new(i as f32, 0., 0.)).collect();
        let track = CheckpointTrack::new(points).unwrap();
        assert!(matches!(
            RaceSession::new(RaceConfig::default(), track),
            Err(SlipstreamError::TooManyCheckpoints { .. })
        ));
    }

    #[test]
    fn test_countdown_then_racing() {
        let mut session = square_session(quick_rules());
        session.add_vehicle(VehicleId(1), Vec3::ZERO).unwrap();
        assert_eq!(session.state(), RaceState::PreRace);
        assert!(session.vehicles_frozen());
        assert!(cross(&mut session, 1, 1).is_empty());

        let events = run_until_racing(&mut session);
        assert!(events.contains(&RaceEvent::RaceStarted));
        assert!(!session.vehicles_frozen());
        assert!(!session.start_countdown());
    }

    #[test]
    fn test_duplicate_vehicle_rejected() {
        let mut session = square_session(quick_rules());
        session.add_vehicle(VehicleId(1), Vec3::ZERO).unwrap();
        assert!(session.add_vehicle(VehicleId(1), Vec3::ZERO).is_err());
    }

    #[test]
    fn test_laps_and_finish() {
        let mut session = square_session(quick_rules());
        session.add_vehicle(VehicleId(1), Vec3::ZERO).unwrap();
        run_until_racing(&mut session);

        let first = drive_lap(&mut session, 1);
        let laps: Vec<_> = first
            .iter()
            .filter(|e| matches!(e, RaceEvent::LapCompleted { .. }))
            .collect();
        assert_eq!(laps.len(), 1);
        assert_eq!(session.laps_of(VehicleId(1)), Some(1));
        assert_eq!(
            first
                .iter()
                .filter(|e| matches!(e, RaceEvent::CheckpointPassed { .. }))
                .count(),
            4
        );

        let second = drive_lap(&mut session, 1);
        assert!(second.iter().any(|e| matches!(
            e,
            RaceEvent::VehicleFinished { vehicle: VehicleId(1), .. }
        )));
        assert_eq!(second.last(), Some(&RaceEvent::RaceFinished));
        assert_eq!(session.state(), RaceState::Finished);

        let timer = session.lap_timer(VehicleId(1)).unwrap();
        assert_eq!(timer.lap_times().len(), 2);
        assert!(!timer.is_running());
    }

    #[test]
    fn test_split_delta_against_best_lap() {
        let mut session = square_session(RaceConfig {
            total_laps: 5,
            ..quick_rules()
        });
        session.add_vehicle(VehicleId(1), Vec3::ZERO).unwrap();
        run_until_racing(&mut session);

        let first = drive_lap(&mut session, 1);
        assert!(first.iter().all(|e| !matches!(
            e,
            RaceEvent::CheckpointPassed { delta_vs_best: Some(_), .. }
        )));
        let second = drive_lap(&mut session, 1);
        let deltas: Vec<f64> = second
            .iter()
            .filter_map(|e| match e {
                RaceEvent::CheckpointPassed { delta_vs_best, .. } => *delta_vs_best,
                _ => None,
            })
            .collect();
        assert_eq!(deltas.len(), 4);
        assert!(deltas.iter().all(|d| d.abs() < 1e-6));
    }

    #[test]
    fn test_ranking_follows_progress() {
        let mut session = square_session(quick_rules());
        session.add_vehicle(VehicleId(1), Vec3::ZERO).unwrap();
        session.add_vehicle(VehicleId(2), Vec3::ZERO).unwrap();
        run_until_racing(&mut session);

        let positions = [
            (VehicleId(1), Vec3::new(30., 0., 0.)),
            (VehicleId(2), Vec3::new(60., 0., 0.)),
        ];
        let events = session.tick(DT, &positions);
        let Some(RaceEvent::RanksChanged(standings)) = events.last() else {
            panic!("expected a rank update, got {events:?}");
        };
        assert_eq!(standings[0].vehicle, VehicleId(2));
        assert_eq!(session.rank_of(VehicleId(1)), Some(2));

        // unchanged order is not re-announced
        assert!(session.tick(DT, &positions).is_empty());
    }

    #[test]
    fn test_late_joiner_is_armed() {
        let mut session = square_session(quick_rules());
        session.add_vehicle(VehicleId(1), Vec3::ZERO).unwrap();
        run_until_racing(&mut session);
        session.add_vehicle(VehicleId(2), Vec3::ZERO).unwrap();
        let events = drive_lap(&mut session, 2);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, RaceEvent::LapCompleted { vehicle: VehicleId(2), .. }))
        );
    }

    #[test]
    fn test_removing_last_unfinished_vehicle_finishes_race() {
        let mut session = square_session(RaceConfig {
            total_laps: 1,
            ..quick_rules()
        });
        session.add_vehicle(VehicleId(1), Vec3::ZERO).unwrap();
        session.add_vehicle(VehicleId(2), Vec3::ZERO).unwrap();
        run_until_racing(&mut session);

        let events = drive_lap(&mut session, 1);
        assert!(events.iter().any(|e| matches!(e, RaceEvent::VehicleFinished { .. })));
        assert_eq!(session.state(), RaceState::Racing);

        assert!(session.remove_vehicle(VehicleId(9)).is_empty());
        let events = session.remove_vehicle(VehicleId(2));
        assert!(matches!(events.last(), Some(RaceEvent::RaceFinished)));
        assert_eq!(session.state(), RaceState::Finished);
        assert_eq!(session.rank_of(VehicleId(1)), Some(1));
        assert_eq!(session.rank_of(VehicleId(2)), None);
    }

    #[test]
    fn test_removing_every_vehicle_keeps_race_open() {
        let mut session = square_session(quick_rules());
        session.add_vehicle(VehicleId(1), Vec3::ZERO).unwrap();
        run_until_racing(&mut session);
        assert!(session.remove_vehicle(VehicleId(1)).is_empty());
        assert_eq!(session.state(), RaceState::Racing);
    }

    #[test]
    fn test_respawn_resyncs_progress() {
        let mut session = square_session(quick_rules());
        session.add_vehicle(VehicleId(1), Vec3::ZERO).unwrap();
        assert!(session.respawn(VehicleId(1), Vec3::new(100., 0., 50.)));
        let progress = session.progress_of(VehicleId(1)).unwrap();
        assert!((progress - 150.).abs() < 1e-3);
        assert!(!session.respawn(VehicleId(9), Vec3::ZERO));
    }
}
