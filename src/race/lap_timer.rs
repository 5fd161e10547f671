use serde::{Deserialize, Serialize};

/// Running lap clock with the history of completed laps.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LapTimer {
    current_lap_time: f64,
    total_time: f64,
    lap_times: Vec<f64>,
    /// lap_times[i] - fastest lap, kept in step with lap_times
    deltas: Vec<f64>,
    fastest: Option<f64>,
    running: bool,
}

impl LapTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        *self = Self {
            running: true,
            ..Self::default()
        };
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick(&mut self, dt: f64) {
        if self.running && dt.is_finite() && dt > 0. {
            self.current_lap_time += dt;
            self.total_time += dt;
        }
    }

    /// Closes the current lap and returns its time, `None` when stopped.
    pub fn complete_lap(&mut self) -> Option<f64> {
        if !self.running {
            return None;
        }
        let lap = self.current_lap_time;
        self.lap_times.push(lap);
        match self.fastest {
            Some(fastest) if lap >= fastest => self.deltas.push(lap - fastest),
            _ => {
                self.fastest = Some(lap);
                self.deltas = self.lap_times.iter().map(|t| t - lap).collect();
            }
        }
        self.current_lap_time = 0.;
        Some(lap)
    }

    pub fn current_lap_time(&self) -> f64 {
        self.current_lap_time
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn lap_times(&self) -> &[f64] {
        &self.lap_times
    }

    pub fn deltas(&self) -> &[f64] {
        &self.deltas
    }

    pub fn fastest_lap(&self) -> Option<f64> {
        self.fastest
    }
}
