use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::HubResult;
use crate::pairing::PairingStats;
use crate::session::SessionState;

/// Recorder counters written out for dashboards and replay summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderStatus {
    /// Wall-clock time of the snapshot (RFC 3339)
    pub generated_at: String,
    pub state: SessionState,
    pub elapsed_ms: i64,
    pub calibration: Option<String>,
    // Frames accepted while recording
    pub frames_left: u64,
    pub frames_right: u64,
    /// Frames that arrived outside Recording
    pub frames_ignored: u64,
    pub malformed_frames: u64,
    pub pairing: PairingStats,
    pub flushes: u64,
    pub raw_samples: usize,
    pub pending_samples: usize,
    pub flags: usize,
    /// Latest integrated values
    pub displacement: f64,
    pub velocity: f64,
    pub heading: f64,
}

impl RecorderStatus {
    pub fn new(state: SessionState) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            state,
            elapsed_ms: 0,
            calibration: None,
            frames_left: 0,
            frames_right: 0,
            frames_ignored: 0,
            malformed_frames: 0,
            pairing: PairingStats::default(),
            flushes: 0,
            raw_samples: 0,
            pending_samples: 0,
            flags: 0,
            displacement: 0.0,
            velocity: 0.0,
            heading: 0.0,
        }
    }

    pub fn save(&self, path: &Path) -> HubResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_left + self.frames_right
    }
}
