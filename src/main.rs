use std::{
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use slipstream::{
    RaceEvent, SimConfig, SlipstreamError, VehicleId,
    demo::DemoRace,
    writer::{self, SimRecord},
};

const FIXED_DT: f32 = 0.02;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs a headless race with kinematic demo cars
    Simulate {
        #[arg(short, long, default_value_t = 4)]
        cars: usize,

        /// Overrides the configured lap count
        #[arg(short, long)]
        laps: Option<u32>,

        /// Stops after this many fixed steps even if the race is not over
        #[arg(short, long, default_value_t = 100_000)]
        steps: u64,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Records samples and race events as JSON lines
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sleeps between steps to run at wall-clock speed
        #[arg(long, default_value_t = false)]
        realtime: bool,
    },
    /// Writes the default configuration
    Config {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Prints lap times and results from a recording
    Summary {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<SimConfig, SlipstreamError> {
    match path {
        Some(path) => SimConfig::from_file(path),
        None => Ok(SimConfig::from_local_file()
            .unwrap_or_else(|e| {
                warn!("Ignoring saved config: {e}");
                None
            })
            .unwrap_or_default()),
    }
}

fn print_event(event: &RaceEvent) {
    match event {
        RaceEvent::RaceStarted => println!("GO!"),
        RaceEvent::LapCompleted {
            vehicle,
            lap,
            lap_time,
        } => println!("{vehicle} lap {lap}: {lap_time:.3}s"),
        RaceEvent::VehicleFinished {
            vehicle,
            total_time,
        } => println!("{vehicle} finished in {total_time:.3}s"),
        RaceEvent::RaceFinished => println!("Race finished"),
        RaceEvent::CheckpointPassed { .. } | RaceEvent::RanksChanged(_) => {}
    }
}

fn simulate(
    cars: usize,
    laps: Option<u32>,
    max_steps: u64,
    config: Option<&Path>,
    output: Option<PathBuf>,
    realtime: bool,
) -> Result<(), SlipstreamError> {
    let mut sim_config = load_config(config)?;
    if let Some(laps) = laps {
        sim_config.race.total_laps = laps;
    }
    let mut race = DemoRace::new(&sim_config, cars, FIXED_DT)?;

    let (record_tx, writer_handle) = match output {
        Some(output_file) => {
            let (tx, rx) = mpsc::channel::<SimRecord>();
            let handle = thread::spawn(move || writer::write_records(&output_file, rx));
            (Some(tx), Some(handle))
        }
        None => (None, None),
    };

    race.start();
    let pause = Duration::from_secs_f32(FIXED_DT);
    let mut steps = 0;
    while steps < max_steps && !race.is_finished() {
        let taken = race.run(1, |record| {
            if let SimRecord::Event { event, .. } = &record {
                print_event(event);
            }
            if let Some(tx) = &record_tx {
                if tx.send(record).is_err() {
                    warn!("Recording stopped, writer is gone");
                }
            }
        });
        steps += taken;
        if realtime {
            thread::sleep(pause);
        }
    }
    if !race.is_finished() {
        warn!("Stopped after {steps} steps before the race finished");
    }

    println!("Standings after {:.1}s:", race.session().clock());
    for entry in race.session().standings() {
        let best = entry
            .best_lap
            .map_or_else(|| "-".to_string(), |t| format!("{t:.3}s"));
        println!(
            "{:>3}. {:<4} progress {:>8.1}m  best lap {best}",
            entry.rank, entry.vehicle, entry.progress
        );
    }

    drop(record_tx);
    if let Some(handle) = writer_handle {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => error!("Writer thread panicked"),
        }
    }
    Ok(())
}

fn write_config(output: Option<PathBuf>) -> Result<(), SlipstreamError> {
    let path = match output {
        Some(path) => path,
        None => SimConfig::default_path()?,
    };
    SimConfig::default().save(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn summary(input: &Path) -> Result<(), SlipstreamError> {
    if !input.exists() {
        return Err(SlipstreamError::InvalidUserInput {
            field: "input".to_string(),
            reason: format!("{} does not exist", input.display()),
        });
    }
    let records = writer::load_records(input)?;
    info!("Loaded {} records", records.len());

    let mut finishers: Vec<(VehicleId, f64)> = Vec::new();
    for record in &records {
        if let SimRecord::Event { event, .. } = record {
            print_event(event);
            if let RaceEvent::VehicleFinished {
                vehicle,
                total_time,
            } = event
            {
                finishers.push((*vehicle, *total_time));
            }
        }
    }
    for (place, (vehicle, total_time)) in finishers.iter().enumerate() {
        println!("{:>3}. {vehicle} {total_time:.3}s", place + 1);
    }
    Ok(())
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    }) {
        warn!("Could not set Ctrl-C handler: {e}");
    }

    let result = match cli.command {
        Commands::Simulate {
            cars,
            laps,
            steps,
            config,
            output,
            realtime,
        } => simulate(cars, laps, steps, config.as_deref(), output, realtime),
        Commands::Config { output } => write_config(output),
        Commands::Summary { input } => summary(&input),
    };
    if let Err(e) = result {
        error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
