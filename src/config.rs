use serde::{Deserialize, Serialize};
use serde_json;
use std::fs::File;
use std::path::Path;

use crate::drive::{CurrentDrive, FieldDrive, TemperatureDrive};

/// Snapshot of the run setup, written as config.json next to the run
/// outputs so a recorded trajectory stays interpretable.
#[derive(Serialize, Deserialize)]
pub struct RunConfig {
    pub geometry: GeometryConfig,
    pub material: MaterialConfig,
    pub drive: DriveConfig,
    pub numerics: NumericsConfig,
    pub run: RunInfo,
}

#[derive(Serialize, Deserialize)]
pub struct GeometryConfig {
    pub rows: usize,
    pub cols: usize,
    pub lattice: f64,
    pub boundary: String,
}

#[derive(Serialize, Deserialize)]
pub struct MaterialConfig {
    pub exchange: f64,
    pub dm: f64,
    pub anisotropy: f64,
    pub easy_axis: [f64; 3],
    pub cubic: f64,
    pub alpha: f64,
    pub mu_s: f64,
}

#[derive(Serialize, Deserialize)]
pub struct DriveConfig {
    pub field: FieldDrive,
    pub current: CurrentDrive,
    pub temperature: TemperatureDrive,
}

#[derive(Serialize, Deserialize)]
pub struct NumericsConfig {
    pub integrator: String,
    pub backend: String,
    pub dt: f64,
    pub steps: u64,
    pub info_interval: u64,
    pub frame_interval: u64,
}

#[derive(Serialize, Deserialize)]
pub struct RunInfo {
    pub binary: String,
    pub run_id: String,
    pub grid_file: Option<String>,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> std::io::Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
