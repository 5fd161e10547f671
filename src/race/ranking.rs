use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use super::VehicleId;

/// What the aggregator reads from a vehicle on each pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RankInput {
    pub progress: f32,
    pub finished: bool,
    pub total_time: f64,
    pub best_lap: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankEntry {
    pub vehicle: VehicleId,
    /// 1-based
    pub rank: usize,
    pub progress: f32,
    pub finished: bool,
    pub total_time: f64,
    pub best_lap: Option<f64>,
}

/// Live classification of all registered vehicles by progress, highest first.
///
/// Equal progress keeps registration order. Callers wanting tie-breaks on time
/// can re-sort [`RankAggregator::standings`] using the carried fields.
#[derive(Clone, Debug, Default)]
pub struct RankAggregator {
    registered: Vec<VehicleId>,
    standings: Vec<RankEntry>,
    last_order: Vec<VehicleId>,
}

impl RankAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the vehicle was already registered.
    pub fn register(&mut self, vehicle: VehicleId) -> bool {
        if self.registered.contains(&vehicle) {
            return false;
        }
        self.registered.push(vehicle);
        true
    }

    pub fn unregister(&mut self, vehicle: VehicleId) -> bool {
        let before = self.registered.len();
        self.registered.retain(|v| *v != vehicle);
        self.standings.retain(|e| e.vehicle != vehicle);
        before != self.registered.len()
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    pub fn standings(&self) -> &[RankEntry] {
        &self.standings
    }

    pub fn rank_of(&self, vehicle: VehicleId) -> Option<usize> {
        self.standings
            .iter()
            .find(|e| e.vehicle == vehicle)
            .map(|e| e.rank)
    }

    /// Rebuilds the standings. Vehicles the lookup cannot provide are left out.
    ///
    /// Returns the new standings only when the order differs from the last
    /// order returned.
    pub fn aggregate(
        &mut self,
        lookup: impl Fn(VehicleId) -> Option<RankInput>,
    ) -> Option<&[RankEntry]> {
        self.standings = self
            .registered
            .iter()
            .filter_map(|v| lookup(*v).map(|input| (*v, input)))
            .sorted_by(|(_, a), (_, b)| {
                let a = if a.progress.is_finite() { a.progress } else { f32::MIN };
                let b = if b.progress.is_finite() { b.progress } else { f32::MIN };
                b.total_cmp(&a)
            })
            .enumerate()
            .map(|(i, (vehicle, input))| RankEntry {
                vehicle,
                rank: i + 1,
                progress: input.progress,
                finished: input.finished,
                total_time: input.total_time,
                best_lap: input.best_lap,
            })
            .collect();

        let order: Vec<VehicleId> = self.standings.iter().map(|e| e.vehicle).collect();
        if order == self.last_order {
            return None;
        }
        debug!(
            "Rank order changed: {}",
            order.iter().map(|v| v.to_string()).join(" ")
        );
        self.last_order = order;
        Some(self.standings.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn at(progress: f32) -> RankInput {
        RankInput {
            progress,
            ..Default::default()
        }
    }

    #[test]
    fn test_orders_by_progress_descending() {
        let mut ranks = RankAggregator::new();
        for id in 1..=3 {
            ranks.register(VehicleId(id));
        }
        let progress = HashMap::from([(1u32, 120f32), (2, 480.), (3, 300.)]);
        let standings = ranks
            .aggregate(|v| progress.get(&v.0).copied().map(at))
            .unwrap();
        let order: Vec<u32> = standings.iter().map(|e| e.vehicle.0).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(ranks.rank_of(VehicleId(1)), Some(3));
        assert_eq!(ranks.standings()[0].rank, 1);
    }

    #[test]
    fn test_reports_only_order_changes() {
        let mut ranks = RankAggregator::new();
        ranks.register(VehicleId(1));
        ranks.register(VehicleId(2));

        assert!(ranks.aggregate(|v| Some(at(v.0 as f32))).is_some());
        assert!(ranks.aggregate(|v| Some(at(v.0 as f32 * 10.))).is_none());
        assert!(ranks.aggregate(|v| Some(at(-(v.0 as f32)))).is_some());
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut ranks = RankAggregator::new();
        assert!(ranks.register(VehicleId(7)));
        assert!(!ranks.register(VehicleId(7)));
        assert_eq!(ranks.len(), 1);
        assert!(!ranks.unregister(VehicleId(8)));
        assert!(ranks.unregister(VehicleId(7)));
        assert!(ranks.is_empty());
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let mut ranks = RankAggregator::new();
        for id in [5, 3, 9] {
            ranks.register(VehicleId(id));
        }
        let standings = ranks.aggregate(|_| Some(at(100.))).unwrap();
        let order: Vec<u32> = standings.iter().map(|e| e.vehicle.0).collect();
        assert_eq!(order, vec![5, 3, 9]);
    }

    #[test]
    fn test_nan_progress_ranks_last() {
        let mut ranks = RankAggregator::new();
        ranks.register(VehicleId(1));
        ranks.register(VehicleId(2));
        ranks.aggregate(|v| Some(at(if v.0 == 1 { f32::NAN } else { 5. })));
        assert_eq!(ranks.rank_of(VehicleId(1)), Some(2));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_ranks_are_dense_and_sorted(
            progress in prop::collection::vec(0f32..10_000f32, 1..40)
        ) {
            let mut ranks = RankAggregator::new();
            for id in 0..progress.len() as u32 {
                ranks.register(VehicleId(id));
            }
            ranks.aggregate(|v| Some(at(progress[v.0 as usize])));
            let standings = ranks.standings();
            prop_assert_eq!(standings.len(), progress.len());
            for (i, pair) in standings.windows(2).enumerate() {
                prop_assert_eq!(pair[0].rank, i + 1);
                prop_assert!(pair[0].progress >= pair[1].progress);
            }
        }
    }
}
