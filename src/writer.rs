use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::mpsc::Receiver,
};

use glam::Vec3;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_jsonlines::JsonLinesWriter;

use crate::{
    SlipstreamError,
    race::{RaceEvent, VehicleId},
    vehicle::VehicleTelemetry,
};

/// One vehicle at one instant of a recorded run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleSample {
    /// Session clock in seconds
    pub time: f64,
    pub vehicle: VehicleId,
    pub position: Vec3,
    pub progress: f32,
    pub rank: Option<usize>,
    pub lap: u32,
    pub telemetry: VehicleTelemetry,
}

/// A line of a recording file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimRecord {
    Sample(Box<VehicleSample>),
    Event { time: f64, event: RaceEvent },
}

/// Drains the channel into a JSON lines file until every sender is dropped.
pub fn write_records(file: &PathBuf, receiver: Receiver<SimRecord>) -> Result<(), SlipstreamError> {
    let out = File::create(file).map_err(|e| SlipstreamError::WriterError { source: e })?;
    let mut writer = JsonLinesWriter::new(BufWriter::new(out));
    for record in &receiver {
        if let Err(e) = writer.write(&record) {
            warn!("Error while writing record to output file: {e}");
        }
    }
    writer
        .flush()
        .map_err(|e| SlipstreamError::WriterError { source: e })?;
    Ok(())
}

pub fn load_records(file: &Path) -> Result<Vec<SimRecord>, SlipstreamError> {
    serde_jsonlines::json_lines(file)
        .map_err(|e| SlipstreamError::RecordLoaderError { source: e })?
        .collect::<Result<Vec<SimRecord>, std::io::Error>>()
        .map_err(|e| SlipstreamError::RecordLoaderError { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_records_written_from_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.jsonl");

        let (tx, rx) = mpsc::channel();
        let out = path.clone();
        let handle = thread::spawn(move || write_records(&out, rx));
        tx.send(SimRecord::Event {
            time: 3.,
            event: RaceEvent::RaceStarted,
        })
        .unwrap();
        tx.send(SimRecord::Sample(Box::new(VehicleSample {
            time: 3.5,
            vehicle: VehicleId(2),
            position: Vec3::new(1., 0., 2.),
            progress: 12.5,
            rank: Some(1),
            lap: 0,
            telemetry: VehicleTelemetry::default(),
        })))
        .unwrap();
        drop(tx);
        handle.join().unwrap().unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(
            records[0],
            SimRecord::Event {
                event: RaceEvent::RaceStarted,
                ..
            }
        ));
        match &records[1] {
            SimRecord::Sample(sample) => assert_eq!(sample.vehicle, VehicleId(2)),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_missing_recording_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_records(&dir.path().join("nope.jsonl")),
            Err(SlipstreamError::RecordLoaderError { .. })
        ));
    }
}
