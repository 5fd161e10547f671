use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::Vec3;
use slipstream::demo::{DemoCar, DemoRace};
use slipstream::race::{ProgressConfig, ProgressTracker, RankInput};
use slipstream::vehicle::controller::VehicleConfig;
use slipstream::{
    CheckpointTrack, RankAggregator, SimConfig, VehicleController, VehicleId, VehicleInputs,
};
use std::time::Duration;

fn bench_vehicle_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("vehicle_controller");

    let track = CheckpointTrack::rectangle(100_000., 50.).unwrap();
    let mut car = DemoCar::new(track, 0., 0., 1.);
    let mut controller = VehicleController::new(VehicleConfig::default(), &car);
    let inputs = VehicleInputs {
        throttle: 1.,
        steer: 0.2,
        ..Default::default()
    };

    group.bench_function("controller_step", |b| {
        b.iter(|| {
            let report = controller.step(black_box(&inputs), &mut car, 0.02);
            car.integrate(0.02);
            black_box(report)
        });
    });

    group.finish();
}

fn bench_race_core(c: &mut Criterion) {
    let mut group = c.benchmark_group("race_core");

    let track = CheckpointTrack::oval(300., 200., 48).unwrap();
    let mut tracker = ProgressTracker::new(&track, ProgressConfig::default(), Vec3::ZERO);
    let mut s = 0.;
    group.bench_function("progress_update", |b| {
        b.iter(|| {
            s += 0.8;
            black_box(tracker.update(&track, track.position_at(s)))
        });
    });

    let mut ranks = RankAggregator::new();
    for id in 0..64 {
        ranks.register(VehicleId(id));
    }
    let mut offset = 0u32;
    group.bench_function("rank_64_vehicles", |b| {
        b.iter(|| {
            offset = offset.wrapping_add(7);
            let standings = ranks.aggregate(|v| {
                Some(RankInput {
                    progress: ((v.0.wrapping_mul(31) + offset) % 1000) as f32,
                    ..Default::default()
                })
            });
            black_box(standings.map(<[_]>::len))
        });
    });

    group.bench_function("demo_race_1000_steps", |b| {
        b.iter(|| {
            let mut race = DemoRace::new(&SimConfig::default(), 8, 0.02).unwrap();
            race.start();
            black_box(race.run(1000, |record| {
                black_box(record);
            }))
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(50);
    targets = bench_vehicle_step, bench_race_core
}
criterion_main!(benches);
