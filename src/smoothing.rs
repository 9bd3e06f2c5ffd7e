//! Gyro smoothing for finished recordings.
//!
//! Two sources: a remote smoothing service (low-pass filter run server side)
//! reached over HTTP, and a local Hann-window smoother. Either way the
//! smoothed wheel rates are re-integrated into a new kinematic series; a
//! failed remote call falls back to the unsmoothed rates.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::calibration::Calibration;
use crate::config::SmoothingConfig;
use crate::error::{HubResult, SmartHubError};
use crate::kinematics::{reintegrate, KinematicSample, KinematicState};

/// Causal Hann-window moving average
pub struct HannSmoother {
    window: VecDeque<f64>,
    window_size: usize,
    weights_cache: HashMap<usize, Vec<f64>>,
}

impl HannSmoother {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            weights_cache: HashMap::new(),
        }
    }

    /// Push one value and return the weighted average of the current window
    pub fn apply(&mut self, value: f64) -> f64 {
        self.window.push_back(value);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        let length = self.window.len();
        if length == 1 {
            return value;
        }

        let weights = self
            .weights_cache
            .entry(length)
            .or_insert_with(|| hann_weights(length));

        self.window.iter().zip(weights.iter()).map(|(v, w)| v * w).sum()
    }

    /// Smooth a whole series with a fresh window
    pub fn smooth_series(window_size: usize, values: &[f64]) -> Vec<f64> {
        let mut smoother = Self::new(window_size);
        values.iter().map(|&v| smoother.apply(v)).collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Normalized weights `0.5 - 0.5 cos(2πi / (n - 1))`
fn hann_weights(length: usize) -> Vec<f64> {
    match length {
        0 | 1 => return vec![1.0],
        2 => return vec![0.5, 0.5],
        _ => {}
    }

    let mut weights: Vec<f64> = (0..length)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / (length as f64 - 1.0);
            0.5 - 0.5 * angle.cos()
        })
        .collect();

    let sum: f64 = weights.iter().sum();
    let total = if sum > 0.0 { sum } else { 1.0 };
    weights.iter_mut().for_each(|w| *w /= total);
    weights
}

/// Column view of a recording's wheel rates
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GyroSeries {
    pub left: Vec<f64>,
    pub right: Vec<f64>,
    /// Seconds on the elapsed clock
    pub time_stamps_s: Vec<f64>,
}

impl GyroSeries {
    pub fn from_samples(samples: &[KinematicSample]) -> Self {
        Self {
            left: samples.iter().map(|s| s.pair.left.wheel_rate()).collect(),
            right: samples.iter().map(|s| s.pair.right.wheel_rate()).collect(),
            time_stamps_s: samples
                .iter()
                .map(|s| s.time_stamp_ms as f64 / 1000.0)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.time_stamps_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_stamps_s.is_empty()
    }

    /// Hann-smooth both wheels locally
    pub fn hann(&self, window_size: usize) -> Self {
        Self {
            left: HannSmoother::smooth_series(window_size, &self.left),
            right: HannSmoother::smooth_series(window_size, &self.right),
            time_stamps_s: self.time_stamps_s.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SmoothingRequest<'a> {
    gyro_left: &'a [f64],
    gyro_right: &'a [f64],
    time_stamps: &'a [f64],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SmoothingResponse {
    gyro_left_smoothed: Vec<f64>,
    gyro_right_smoothed: Vec<f64>,
}

/// Client for the remote smoothing service
pub struct SmoothingClient {
    client: reqwest::Client,
    url: String,
}

impl SmoothingClient {
    pub fn new(config: &SmoothingConfig) -> HubResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SmartHubError::Smoothing(format!("client setup: {}", e)))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// POST the raw rates and return the smoothed ones
    pub async fn smooth(&self, series: &GyroSeries) -> HubResult<GyroSeries> {
        let request = SmoothingRequest {
            gyro_left: &series.left,
            gyro_right: &series.right,
            time_stamps: &series.time_stamps_s,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SmartHubError::Smoothing("request timed out".to_string())
                } else {
                    SmartHubError::Smoothing(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SmartHubError::Smoothing(format!("HTTP {}", status.as_u16())));
        }

        let body: SmoothingResponse = response
            .json()
            .await
            .map_err(|e| SmartHubError::Smoothing(format!("bad response body: {}", e)))?;

        if body.gyro_left_smoothed.len() != series.len()
            || body.gyro_right_smoothed.len() != series.len()
        {
            return Err(SmartHubError::Smoothing(format!(
                "expected {} smoothed values, got {} left / {} right",
                series.len(),
                body.gyro_left_smoothed.len(),
                body.gyro_right_smoothed.len()
            )));
        }

        Ok(GyroSeries {
            left: body.gyro_left_smoothed,
            right: body.gyro_right_smoothed,
            time_stamps_s: series.time_stamps_s.clone(),
        })
    }

    /// Smoothed rates, or the input unchanged if the service call fails
    pub async fn smooth_or_raw(&self, series: &GyroSeries) -> GyroSeries {
        match self.smooth(series).await {
            Ok(smoothed) => smoothed,
            Err(e) => {
                log::warn!("[smoothing] {}; using unsmoothed gyro data", e);
                series.clone()
            }
        }
    }
}

/// Recompute a recording from zero using replacement wheel rates
pub fn smooth_recording(
    samples: &[KinematicSample],
    rates: &GyroSeries,
    calibration: &Calibration,
) -> HubResult<Vec<KinematicSample>> {
    reintegrate(
        samples,
        &rates.left,
        &rates.right,
        calibration,
        KinematicState::default(),
    )
}
