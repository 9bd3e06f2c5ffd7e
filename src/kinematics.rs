//! Differential-wheel dead reckoning.
//!
//! Each paired sample gives a left and right wheel rate. Their mean scaled by
//! the wheel radius is the chair's forward velocity, their difference over
//! the wheel track is the yaw rate (right faster than left turns left, which
//! is a positive heading change). Displacement, heading and the 2-D
//! trajectory are running integrals that continue across batches.

use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;
use crate::error::{HubResult, SmartHubError};
use crate::pairing::PairedSample;

/// Integration state carried from one batch to the next
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KinematicState {
    /// Forward velocity of the last integrated sample (m/s)
    pub velocity: f64,
    /// Yaw rate of the last integrated sample (rad/s)
    pub yaw_rate: f64,
    pub displacement: f64,
    /// Degrees, counter-clockwise positive
    pub heading: f64,
    pub traj_x: f64,
    pub traj_y: f64,
    /// Elapsed-clock time of the last integrated sample, `None` before the first one
    pub last_time_ms: Option<i64>,
}

/// Wheel rates for one instant, before gains are applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicInput {
    pub time_stamp_ms: i64,
    pub rate_left: f64,
    pub rate_right: f64,
}

/// Motion estimate for one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEstimate {
    pub time_stamp_ms: i64,
    pub velocity: f64,
    pub displacement: f64,
    pub heading: f64,
    pub traj_x: f64,
    pub traj_y: f64,
}

/// A paired sample stamped with the recording's elapsed clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedPair {
    pub time_stamp_ms: i64,
    pub pair: PairedSample,
}

impl TimedPair {
    pub fn new(time_stamp_ms: i64, pair: PairedSample) -> Self {
        Self { time_stamp_ms, pair }
    }

    fn input(&self) -> KinematicInput {
        KinematicInput {
            time_stamp_ms: self.time_stamp_ms,
            rate_left: self.pair.left.wheel_rate(),
            rate_right: self.pair.right.wheel_rate(),
        }
    }
}

/// One output row of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicSample {
    pub velocity: f64,
    pub displacement: f64,
    pub heading: f64,
    pub traj_x: f64,
    pub traj_y: f64,
    pub time_stamp_ms: i64,
    /// Raw frames the estimate was computed from
    pub pair: PairedSample,
}

impl KinematicSample {
    pub fn from_estimate(estimate: MotionEstimate, pair: PairedSample) -> Self {
        Self {
            velocity: estimate.velocity,
            displacement: estimate.displacement,
            heading: estimate.heading,
            traj_x: estimate.traj_x,
            traj_y: estimate.traj_y,
            time_stamp_ms: estimate.time_stamp_ms,
            pair,
        }
    }
}

fn dt_seconds(from_ms: i64, to_ms: i64) -> f64 {
    let dt_ms = to_ms - from_ms;
    if dt_ms < 0 {
        log::warn!(
            "[kinematics] timestamp went backwards ({} -> {} ms), using dt = 0",
            from_ms,
            to_ms
        );
        return 0.0;
    }
    dt_ms as f64 / 1000.0
}

/// Integrate `inputs` starting from `state`.
///
/// Pure function of its arguments: returns one estimate per input and the
/// state to carry into the next call.
pub fn integrate(
    state: KinematicState,
    inputs: &[KinematicInput],
    calibration: &Calibration,
) -> (Vec<MotionEstimate>, KinematicState) {
    let radius_m = calibration.wheel_radius_m();
    let track_m = calibration.wheel_track_m();
    let mut current = state;
    let mut estimates = Vec::with_capacity(inputs.len());

    for input in inputs {
        let left = calibration.wheel_rate(input.rate_left, calibration.gain_left);
        let right = calibration.wheel_rate(input.rate_right, calibration.gain_right);
        let velocity = (right + left) / 2.0 * radius_m;
        let yaw_rate = ((right - left) * radius_m) / track_m;

        if let Some(last_ms) = current.last_time_ms {
            let dt = dt_seconds(last_ms, input.time_stamp_ms);
            let heading_rad = current.heading.to_radians();
            current.traj_x += current.velocity * heading_rad.cos() * dt;
            current.traj_y += current.velocity * heading_rad.sin() * dt;
            current.displacement += current.velocity * dt;
            current.heading += (current.yaw_rate * dt).to_degrees();
        }

        current.velocity = velocity;
        current.yaw_rate = yaw_rate;
        current.last_time_ms = Some(input.time_stamp_ms);

        estimates.push(MotionEstimate {
            time_stamp_ms: input.time_stamp_ms,
            velocity,
            displacement: current.displacement,
            heading: current.heading,
            traj_x: current.traj_x,
            traj_y: current.traj_y,
        });
    }

    (estimates, current)
}

/// Stateful wrapper around [`integrate`] owned by one recording
#[derive(Debug, Clone, Default)]
pub struct KinematicEngine {
    seed: KinematicState,
    state: KinematicState,
}

impl KinematicEngine {
    /// Engine whose first sample (and every post-reset sample) starts at `seed`
    pub fn new(seed: KinematicState) -> Self {
        Self { seed, state: seed }
    }

    /// Compute one sample per pair, continuing from the previous call
    pub fn calc(&mut self, batch: &[TimedPair], calibration: &Calibration) -> Vec<KinematicSample> {
        let inputs: Vec<KinematicInput> = batch.iter().map(TimedPair::input).collect();
        let (estimates, next) = integrate(self.state, &inputs, calibration);
        self.state = next;

        estimates
            .into_iter()
            .zip(batch)
            .map(|(estimate, timed)| KinematicSample::from_estimate(estimate, timed.pair))
            .collect()
    }

    /// Return to the seed state; only a session restart should call this
    pub fn reset(&mut self) {
        self.state = self.seed;
    }

    pub fn state(&self) -> &KinematicState {
        &self.state
    }
}

/// Recompute a finished recording from `seed` with replacement wheel rates
/// (for example a smoothed gyro series). Raw frames are carried through.
pub fn reintegrate(
    samples: &[KinematicSample],
    rates_left: &[f64],
    rates_right: &[f64],
    calibration: &Calibration,
    seed: KinematicState,
) -> HubResult<Vec<KinematicSample>> {
    if rates_left.len() != samples.len() || rates_right.len() != samples.len() {
        return Err(SmartHubError::InvalidParameters(format!(
            "rate series length mismatch: {} samples, {} left, {} right",
            samples.len(),
            rates_left.len(),
            rates_right.len()
        )));
    }

    let inputs: Vec<KinematicInput> = samples
        .iter()
        .zip(rates_left.iter().zip(rates_right))
        .map(|(sample, (&rate_left, &rate_right))| KinematicInput {
            time_stamp_ms: sample.time_stamp_ms,
            rate_left,
            rate_right,
        })
        .collect();
    let (estimates, _) = integrate(seed, &inputs, calibration);

    Ok(estimates
        .into_iter()
        .zip(samples)
        .map(|(estimate, sample)| KinematicSample::from_estimate(estimate, sample.pair))
        .collect())
}
