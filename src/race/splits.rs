use serde::{Deserialize, Serialize};

/// Split times per checkpoint for the current lap and the best lap so far.
///
/// Index 0 holds the lap time once a lap is finished. Kept in memory only.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SplitBoard {
    current: Vec<Option<f64>>,
    best: Vec<Option<f64>>,
    best_lap: Option<f64>,
}

impl SplitBoard {
    pub fn new(checkpoint_count: usize) -> Self {
        Self {
            current: vec![None; checkpoint_count],
            best: Vec::new(),
            best_lap: None,
        }
    }

    pub fn record_split(&mut self, index: usize, time: f64) {
        if self.current.len() <= index {
            self.current.resize(index + 1, None);
        }
        self.current[index] = Some(time);
    }

    /// Split difference to the best lap, positive = slower.
    pub fn delta_vs_best(&self, index: usize, time: f64) -> Option<f64> {
        let best = (*self.best.get(index)?)?;
        (best.is_finite() && best > 0.).then(|| time - best)
    }

    /// Closes the lap, promoting its splits when it beats the best lap.
    pub fn finish_lap(&mut self, lap_time: f64) {
        if lap_time.is_finite() && lap_time > 0. {
            self.record_split(0, lap_time);
            if self.best_lap.is_none_or(|best| lap_time < best) {
                self.best_lap = Some(lap_time);
                self.best = self.current.clone();
            }
        }
        self.reset_current();
    }

    pub fn reset_current(&mut self) {
        self.current.iter_mut().for_each(|s| *s = None);
    }

    pub fn current_splits(&self) -> &[Option<f64>] {
        &self.current
    }

    pub fn best_splits(&self) -> &[Option<f64>] {
        &self.best
    }

    pub fn best_lap(&self) -> Option<f64> {
        self.best_lap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_delta_before_first_lap() {
        let mut board = SplitBoard::new(4);
        board.record_split(1, 10.);
        assert_eq!(board.delta_vs_best(1, 10.), None);
    }

    #[test]
    fn test_best_lap_splits_replace_on_improvement() {
        let mut board = SplitBoard::new(3);
        board.record_split(1, 10.);
        board.record_split(2, 20.);
        board.finish_lap(30.);
        assert_eq!(board.best_lap(), Some(30.));
        assert_eq!(board.delta_vs_best(1, 11.), Some(1.));
        assert_eq!(board.delta_vs_best(0, 29.), Some(-1.));
        assert_eq!(board.current_splits(), &[None, None, None]);

        // slower lap keeps the old reference
        board.record_split(1, 12.);
        board.finish_lap(35.);
        assert_eq!(board.delta_vs_best(1, 12.), Some(2.));

        board.record_split(1, 9.);
        board.finish_lap(28.);
        assert_eq!(board.best_lap(), Some(28.));
        assert_eq!(board.best_splits()[1], Some(9.));
        // checkpoint 2 was not recorded on the new best lap
        assert_eq!(board.delta_vs_best(2, 20.), None);
    }
}
