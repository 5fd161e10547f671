use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use glam::Vec3;
use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::SlipstreamError;
use crate::race::{CheckpointTrack, RaceConfig};
use crate::vehicle::controller::VehicleConfig;

const CONFIG_DIR: &str = "slipstream";
const CONFIG_FILE: &str = "config.json";

/// Checkpoint loop in world space, in driving order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub checkpoints: Vec<Vec3>,
}

impl Default for TrackConfig {
    fn default() -> Self {
        // 8 checkpoints on a 120 x 80 m ellipse
        let checkpoints = (0..8)
            .map(|i| {
                let angle = i as f32 / 8. * std::f32::consts::TAU;
                Vec3::new(120. * angle.cos(), 0., 80. * angle.sin())
            })
            .collect();
        Self { checkpoints }
    }
}

impl TrackConfig {
    pub fn build(&self) -> Result<CheckpointTrack, SlipstreamError> {
        CheckpointTrack::new(self.checkpoints.clone())
    }
}

/// Everything a simulation run needs, stored as a single JSON document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub vehicle: VehicleConfig,
    pub race: RaceConfig,
    pub track: TrackConfig,
}

impl SimConfig {
    /// `<config dir>/slipstream/config.json`
    pub fn default_path() -> Result<PathBuf, SlipstreamError> {
        let dir = dirs::config_dir().ok_or(SlipstreamError::NoConfigDir)?;
        Ok(dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn from_file(path: &Path) -> Result<Self, SlipstreamError> {
        let file = File::open(path).map_err(|e| SlipstreamError::ConfigIOError { source: e })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SlipstreamError::ConfigSerializeError { source: e })
    }

    /// Loads the user's saved config, `None` when nothing was saved yet.
    pub fn from_local_file() -> Result<Option<Self>, SlipstreamError> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(None);
        }
        info!("Loading config from {}", path.display());
        Self::from_file(&path).map(Some)
    }

    pub fn save(&self, path: &Path) -> Result<(), SlipstreamError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| SlipstreamError::ConfigIOError { source: e })?;
            }
        }
        let file = File::create(path).map_err(|e| SlipstreamError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| SlipstreamError::ConfigSerializeError { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_track_builds() {
        let track = SimConfig::default().track.build().unwrap();
        assert_eq!(track.len(), 8);
        assert!(track.length() > 500.);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = SimConfig::default();
        config.race.total_laps = 5;
        config.vehicle.ai_controlled = true;
        config.save(&path).unwrap();

        let loaded = SimConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "race": { "total_laps": 7 } }"#).unwrap();

        let loaded = SimConfig::from_file(&path).unwrap();
        assert_eq!(loaded.race.total_laps, 7);
        assert_eq!(loaded.race.countdown_s, RaceConfig::default().countdown_s);
        assert_eq!(loaded.track, TrackConfig::default());
    }

    #[test]
    fn test_errors_are_mapped() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            SimConfig::from_file(&missing),
            Err(SlipstreamError::ConfigIOError { .. })
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            SimConfig::from_file(&broken),
            Err(SlipstreamError::ConfigSerializeError { .. })
        ));
    }

    #[test]
    fn test_short_track_is_rejected() {
        let track = TrackConfig {
            checkpoints: vec![Vec3::ZERO],
        };
        assert!(matches!(
            track.build(),
            Err(SlipstreamError::TrackTooShort { count: 1 })
        ));
    }
}
