use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{HubResult, SmartHubError};

/// Remote smoothing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    pub url: String,
    #[serde(default = "default_smoothing_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_smoothing_timeout_ms() -> u64 {
    5_000
}

/// Recorder and pipeline tuning, loaded from JSON with every field optional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Samples collected before a live flush
    pub flush_threshold: usize,
    /// Samples kept per flush
    pub downsample_to: usize,
    pub flush_on_first_sample: bool,
    /// Pending one-sided samples older than this are dropped (None = keep)
    pub max_pending_age_ms: Option<i64>,
    /// Capacity of each per-side notification queue
    pub channel_capacity: usize,
    pub smoothing: Option<SmoothingConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 5,
            downsample_to: 3,
            flush_on_first_sample: false,
            max_pending_age_ms: Some(1_000),
            channel_capacity: 256,
            smoothing: None,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> HubResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> HubResult<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.flush_threshold == 0 {
            return Err(SmartHubError::InvalidParameters(
                "flush_threshold must be at least 1".to_string(),
            ));
        }
        if self.downsample_to < 2 {
            return Err(SmartHubError::InvalidParameters(format!(
                "downsample_to must keep at least the first and last sample, got {}",
                self.downsample_to
            )));
        }
        if self.channel_capacity == 0 {
            return Err(SmartHubError::InvalidParameters(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(age) = self.max_pending_age_ms {
            if age < 0 {
                return Err(SmartHubError::InvalidParameters(format!(
                    "max_pending_age_ms must not be negative, got {}",
                    age
                )));
            }
        }
        Ok(())
    }
}
