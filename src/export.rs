use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::annotations::Flag;
use crate::calibration::Calibration;
use crate::error::HubResult;
use crate::kinematics::KinematicSample;
use crate::packet::DecodedSample;

pub const CSV_HEADER: &str = "Time(s),Displacement,Velocity,Heading,Trajectory_X,Trajectory_Y,\
Gyro_Left_1,Gyro_Left_2,Gyro_Left_3,Gyro_Left_4,\
Gyro_Right_1,Gyro_Right_2,Gyro_Right_3,Gyro_Right_4,\
Accel_Left_1,Accel_Left_2,Accel_Left_3,Accel_Left_4,\
Accel_Right_1,Accel_Right_2,Accel_Right_3,Accel_Right_4";

fn push_columns(row: &mut String, values: &[f64]) {
    for v in values {
        let _ = write!(row, ",{}", v);
    }
}

/// One CSV row per raw sample, header first
pub fn to_csv(samples: &[KinematicSample]) -> String {
    let mut csv = String::with_capacity(CSV_HEADER.len() + samples.len() * 160);
    csv.push_str(CSV_HEADER);
    csv.push('\n');

    for s in samples {
        let _ = write!(
            csv,
            "{},{},{},{},{},{}",
            s.time_stamp_ms as f64 / 1000.0,
            s.displacement,
            s.velocity,
            s.heading,
            s.traj_x,
            s.traj_y
        );
        let DecodedSample { accel: accel_left, gyro: gyro_left } = s.pair.left;
        let DecodedSample { accel: accel_right, gyro: gyro_right } = s.pair.right;
        push_columns(&mut csv, &gyro_left);
        push_columns(&mut csv, &gyro_right);
        push_columns(&mut csv, &accel_left);
        push_columns(&mut csv, &accel_right);
        csv.push('\n');
    }

    csv
}

pub fn write_csv(path: &Path, samples: &[KinematicSample]) -> HubResult<()> {
    fs::write(path, to_csv(samples))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    /// RFC 3339
    pub created_at: String,
    pub calibration_profile: Option<String>,
    pub calibration: Calibration,
    /// Rates were replaced by a smoothed series before export
    pub smoothed: bool,
}

impl SessionMetadata {
    pub fn new(calibration: Calibration, calibration_profile: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: format!("session_{}", now.timestamp_millis()),
            created_at: now.to_rfc3339(),
            calibration_profile,
            calibration,
            smoothed: false,
        }
    }
}

/// Session statistics for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub duration_seconds: f64,
    pub sample_count: usize,
    pub final_displacement_m: f64,
    pub peak_velocity_ms: f64,
    pub final_heading_deg: f64,
    pub flag_count: usize,
}

impl SessionStats {
    pub fn from_samples(samples: &[KinematicSample], flags: &[Flag]) -> Self {
        let duration_seconds = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => (last.time_stamp_ms - first.time_stamp_ms) as f64 / 1000.0,
            _ => 0.0,
        };
        let last = samples.last();

        SessionStats {
            duration_seconds,
            sample_count: samples.len(),
            final_displacement_m: last.map_or(0.0, |s| s.displacement),
            peak_velocity_ms: samples.iter().map(|s| s.velocity.abs()).fold(0.0, f64::max),
            final_heading_deg: last.map_or(0.0, |s| s.heading),
            flag_count: flags.len(),
        }
    }
}

/// Complete session export (JSON-serializable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub metadata: SessionMetadata,
    pub stats: SessionStats,
    pub samples: Vec<KinematicSample>,
    pub flags: Vec<Flag>,
}

impl SessionExport {
    pub fn new(metadata: SessionMetadata, samples: Vec<KinematicSample>, flags: Vec<Flag>) -> Self {
        let stats = SessionStats::from_samples(&samples, &flags);
        Self {
            metadata,
            stats,
            samples,
            flags,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: &Path) -> HubResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> HubResult<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
