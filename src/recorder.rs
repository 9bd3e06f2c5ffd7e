//! Single-writer recording core.
//!
//! `Recorder` owns every piece of per-recording state and is driven one event
//! at a time, either directly (deterministic replay, tests) or by the pipeline
//! actor. All methods take the wall-clock time of the event so the session
//! clock can stamp samples and flags.

use crate::annotations::{AnnotationLog, Flag, NewFlag};
use crate::calibration::{Calibration, CalibrationStore};
use crate::config::PipelineConfig;
use crate::error::{HubResult, SmartHubError};
use crate::kinematics::{KinematicEngine, KinematicSample, KinematicState, TimedPair};
use crate::packet::{self, DecodedSample};
use crate::pairing::{SamplePairer, Side};
use crate::session::{RecordingSession, RecordingSnapshot, SessionState};
use crate::status::RecorderStatus;
use crate::stream_buffer::StreamBuffer;

#[derive(Debug, Clone, Copy, Default)]
struct FrameCounters {
    left: u64,
    right: u64,
    ignored: u64,
    malformed: u64,
}

pub struct Recorder {
    session: RecordingSession,
    calibrations: CalibrationStore,
    // Geometry in force; only changes while Idle
    calibration: Calibration,
    pairer: SamplePairer,
    engine: KinematicEngine,
    stream: StreamBuffer,
    flags: AnnotationLog,
    counters: FrameCounters,
}

impl Recorder {
    pub fn new(config: &PipelineConfig, calibrations: CalibrationStore) -> Self {
        let calibration = calibrations.active();
        Self {
            session: RecordingSession::new(),
            calibrations,
            calibration,
            pairer: SamplePairer::new(config.max_pending_age_ms),
            engine: KinematicEngine::default(),
            stream: StreamBuffer::new(config.flush_threshold, config.downsample_to)
                .with_first_sample_flush(config.flush_on_first_sample),
            flags: AnnotationLog::new(),
            counters: FrameCounters::default(),
        }
    }

    /// Start every recording (and every restart) from `seed` instead of zero
    pub fn with_seed(mut self, seed: KinematicState) -> Self {
        self.engine = KinematicEngine::new(seed);
        self
    }

    /// Decode one raw notification and feed it through the pipeline.
    ///
    /// A malformed frame is counted and returned as an error; the recorder
    /// state is untouched and the next frame is processed normally.
    pub fn on_frame(
        &mut self,
        side: Side,
        frame: &[u8],
        now_ms: i64,
    ) -> HubResult<Option<Vec<KinematicSample>>> {
        match packet::decode(frame) {
            Ok(sample) => Ok(self.on_decoded(side, sample, now_ms)),
            Err(e) => {
                self.record_malformed(side, &e);
                Err(e)
            }
        }
    }

    pub(crate) fn record_malformed(&mut self, side: Side, err: &SmartHubError) {
        self.counters.malformed += 1;
        log::warn!("[{}] dropping frame: {}", side, err);
    }

    /// Pair a decoded frame, integrate any completed pair and return the
    /// downsampled batch if this sample triggered a flush.
    pub fn on_decoded(
        &mut self,
        side: Side,
        sample: DecodedSample,
        now_ms: i64,
    ) -> Option<Vec<KinematicSample>> {
        if !self.session.is_recording() {
            self.counters.ignored += 1;
            return None;
        }

        match side {
            Side::Left => self.counters.left += 1,
            Side::Right => self.counters.right += 1,
        }

        let pair = self.pairer.offer(side, sample, now_ms)?;
        let elapsed_ms = self.session.elapsed_ms(now_ms);
        let samples = self
            .engine
            .calc(&[TimedPair::new(elapsed_ms, pair)], &self.calibration);

        let mut flushed = None;
        for sample in samples {
            if let Some(batch) = self.stream.push(sample) {
                flushed = Some(batch);
            }
        }
        flushed
    }

    /// Idle → Recording or Paused → Recording
    pub fn begin(&mut self, now_ms: i64) -> HubResult<()> {
        let resuming = self.session.state() == SessionState::Paused;
        self.session.start(now_ms)?;
        if resuming {
            log::info!(
                "[session] resumed at {} ms elapsed",
                self.session.elapsed_ms(now_ms)
            );
        } else {
            log::info!(
                "[session] recording started (wheel {} in, track {} in)",
                self.calibration.wheel_diameter_in,
                self.calibration.wheel_track_in
            );
        }
        Ok(())
    }

    /// Recording → Paused. Returns false when there was nothing to pause.
    pub fn pause(&mut self, now_ms: i64) -> bool {
        if !self.session.stop(now_ms) {
            return false;
        }
        self.pairer.clear();
        log::info!(
            "[session] paused at {} ms, {} samples recorded",
            self.session.elapsed_ms(now_ms),
            self.stream.raw_series().len()
        );
        true
    }

    /// Zero the clock and drop everything recorded so far
    pub fn restart(&mut self, now_ms: i64) {
        self.session.restart(now_ms);
        self.engine.reset();
        self.stream.clear();
        self.flags.clear();
        self.pairer.clear();
        log::info!("[session] restarted, now {:?}", self.session.state());
    }

    pub fn add_flag(&mut self, flag: NewFlag, now_ms: i64) -> HubResult<Flag> {
        let time_stamp_ms = self.session.flag_timestamp(now_ms);
        self.flags.add_flag(flag, time_stamp_ms).cloned()
    }

    pub fn flags(&self, graph_id: Option<u8>) -> Vec<Flag> {
        self.flags.query(graph_id)
    }

    /// Full-resolution series since the last restart
    pub fn raw_series(&self) -> &[KinematicSample] {
        self.stream.raw_series()
    }

    pub fn recording_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn snapshot(&self, now_ms: i64) -> RecordingSnapshot {
        self.session.snapshot(now_ms)
    }

    /// Choose a named profile (or the defaults with `None`); only while Idle
    pub fn select_calibration(&mut self, name: Option<&str>) -> HubResult<()> {
        if self.session.state() != SessionState::Idle {
            return Err(SmartHubError::CalibrationLocked);
        }
        match name {
            Some(name) => self.calibrations.select(name)?,
            None => self.calibrations.clear_selection(),
        }
        self.calibration = self.calibrations.active();
        log::info!(
            "[calibration] using {} (gains {:.3}/{:.3})",
            self.calibrations.selected_name().unwrap_or("defaults"),
            self.calibration.gain_left,
            self.calibration.gain_right
        );
        Ok(())
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn calibration_store(&self) -> &CalibrationStore {
        &self.calibrations
    }

    pub fn status(&self, now_ms: i64) -> RecorderStatus {
        let state = self.engine.state();
        let mut status = RecorderStatus::new(self.session.state());
        status.elapsed_ms = self.session.elapsed_ms(now_ms);
        status.calibration = self.calibrations.selected_name().map(str::to_string);
        status.frames_left = self.counters.left;
        status.frames_right = self.counters.right;
        status.frames_ignored = self.counters.ignored;
        status.malformed_frames = self.counters.malformed;
        status.pairing = self.pairer.stats();
        status.flushes = self.stream.flush_count();
        status.raw_samples = self.stream.raw_series().len();
        status.pending_samples = self.stream.pending_len();
        status.flags = self.flags.len();
        status.displacement = state.displacement;
        status.velocity = state.velocity;
        status.heading = state.heading;
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::encode;
    use approx::assert_abs_diff_eq;

    fn frame(gyro: f64) -> [u8; 18] {
        encode(&DecodedSample::new([0.0, 0.5, -0.25, 1.0], [gyro; 4]))
    }

    fn recorder() -> Recorder {
        Recorder::new(&PipelineConfig::default(), CalibrationStore::new())
    }

    #[test]
    fn test_frames_to_kinematics_end_to_end() {
        let mut rec = recorder();
        rec.begin(1_000).unwrap();

        assert!(rec.on_frame(Side::Left, &frame(1.0), 1_000).unwrap().is_none());
        rec.on_frame(Side::Right, &frame(2.0), 1_000).unwrap();
        rec.on_frame(Side::Right, &frame(1.5), 1_100).unwrap();
        rec.on_frame(Side::Left, &frame(1.5), 1_100).unwrap();

        let series = rec.raw_series();
        assert_eq!(series.len(), 2);

        let r = 24.0 / 2.0 * 0.0254;
        let w = 26.0 * 0.0254;
        let v0 = (2.0 + 1.0) / 2.0 * r;
        let yaw0 = ((2.0 - 1.0) * r) / w;

        assert_eq!(series[0].time_stamp_ms, 0);
        assert_abs_diff_eq!(series[0].velocity, v0, epsilon = 1e-9);
        assert_eq!(series[0].displacement, 0.0);

        assert_eq!(series[1].time_stamp_ms, 100);
        assert_abs_diff_eq!(series[1].velocity, 1.5 * r, epsilon = 1e-9);
        assert_abs_diff_eq!(series[1].displacement, v0 * 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(series[1].heading, (yaw0 * 0.1).to_degrees(), epsilon = 1e-9);
        assert_abs_diff_eq!(series[1].traj_x, v0 * 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(series[1].pair.left.accel[2], -0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_frames_ignored_unless_recording() {
        let mut rec = recorder();
        rec.on_frame(Side::Left, &frame(1.0), 0).unwrap();
        rec.on_frame(Side::Right, &frame(1.0), 0).unwrap();

        assert!(rec.raw_series().is_empty());
        assert_eq!(rec.status(0).frames_ignored, 2);
    }

    #[test]
    fn test_malformed_frame_dropped_and_counted() {
        let mut rec = recorder();
        rec.begin(0).unwrap();

        let err = rec.on_frame(Side::Left, &[0u8; 7], 0).unwrap_err();
        assert_eq!(err, SmartHubError::MalformedFrame { len: 7 });

        rec.on_frame(Side::Left, &frame(1.0), 10).unwrap();
        rec.on_frame(Side::Right, &frame(1.0), 10).unwrap();
        assert_eq!(rec.raw_series().len(), 1);
        assert_eq!(rec.status(10).malformed_frames, 1);
    }

    #[test]
    fn test_flush_after_threshold() {
        let mut rec = recorder();
        rec.begin(0).unwrap();

        let mut batches = Vec::new();
        for i in 0..5 {
            let now = i * 58;
            rec.on_frame(Side::Left, &frame(1.0), now).unwrap();
            if let Some(batch) = rec.on_frame(Side::Right, &frame(1.2), now).unwrap() {
                batches.push(batch);
            }
        }

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[0][0].time_stamp_ms, 0);
        assert_eq!(batches[0][2].time_stamp_ms, 4 * 58);
        assert_eq!(rec.status(300).flushes, 1);
    }

    #[test]
    fn test_pause_clears_pending_and_flag_uses_elapsed() {
        let mut rec = recorder();
        rec.begin(0).unwrap();
        rec.on_frame(Side::Left, &frame(1.0), 4_000).unwrap();
        assert!(rec.pause(5_000));

        // A right frame after resume must not pair with the pre-pause left frame
        rec.begin(8_000).unwrap();
        rec.on_frame(Side::Right, &frame(1.0), 8_000).unwrap();
        assert!(rec.raw_series().is_empty());

        let flag = rec.add_flag(NewFlag::new("f1", 1, "curb"), 8_000).unwrap();
        assert_eq!(flag.time_stamp_ms, Some(5_000));
    }

    #[test]
    fn test_samples_after_resume_continue_clock() {
        let mut rec = recorder();
        rec.begin(0).unwrap();
        rec.on_frame(Side::Left, &frame(1.0), 1_000).unwrap();
        rec.on_frame(Side::Right, &frame(1.0), 1_000).unwrap();
        rec.pause(2_000);
        rec.begin(10_000).unwrap();
        rec.on_frame(Side::Left, &frame(1.0), 10_500).unwrap();
        rec.on_frame(Side::Right, &frame(1.0), 10_500).unwrap();

        let series = rec.raw_series();
        assert_eq!(series[0].time_stamp_ms, 1_000);
        assert_eq!(series[1].time_stamp_ms, 2_500);
    }

    #[test]
    fn test_restart_clears_everything() {
        let mut rec = recorder();
        rec.begin(0).unwrap();
        rec.on_frame(Side::Left, &frame(1.0), 10).unwrap();
        rec.on_frame(Side::Right, &frame(1.0), 10).unwrap();
        rec.on_frame(Side::Left, &frame(1.0), 20).unwrap();
        rec.add_flag(NewFlag::new("f", 2, ""), 20).unwrap();

        rec.restart(100);
        assert_eq!(rec.recording_state(), SessionState::Recording);
        assert!(rec.raw_series().is_empty());
        assert!(rec.flags(None).is_empty());

        // The pending left frame is gone and integration starts from zero
        rec.on_frame(Side::Right, &frame(1.0), 150).unwrap();
        assert!(rec.raw_series().is_empty());
        rec.on_frame(Side::Left, &frame(1.0), 150).unwrap();
        assert_eq!(rec.raw_series()[0].displacement, 0.0);
        assert_eq!(rec.raw_series()[0].time_stamp_ms, 50);
    }

    #[test]
    fn test_calibration_locked_outside_idle() {
        let mut store = CalibrationStore::new();
        store
            .insert("lab", Calibration::new(25.0, 27.0, 1.1, 1.0).unwrap())
            .unwrap();
        let mut rec = Recorder::new(&PipelineConfig::default(), store);

        rec.select_calibration(Some("lab")).unwrap();
        assert_eq!(rec.calibration().wheel_diameter_in, 25.0);
        assert!(matches!(
            rec.select_calibration(Some("nope")),
            Err(SmartHubError::UnknownCalibration(_))
        ));

        rec.begin(0).unwrap();
        assert_eq!(rec.select_calibration(None), Err(SmartHubError::CalibrationLocked));
        rec.pause(10);
        assert_eq!(rec.select_calibration(None), Err(SmartHubError::CalibrationLocked));

        rec.restart(20);
        rec.select_calibration(None).unwrap();
        assert_eq!(rec.calibration(), Calibration::default());
    }

    #[test]
    fn test_seeded_recorder() {
        let seed = KinematicState {
            displacement: 3.0,
            ..KinematicState::default()
        };
        let mut rec = recorder().with_seed(seed);
        rec.begin(0).unwrap();
        rec.on_frame(Side::Left, &frame(0.0), 0).unwrap();
        rec.on_frame(Side::Right, &frame(0.0), 0).unwrap();

        assert_eq!(rec.raw_series()[0].displacement, 3.0);
    }

    #[test]
    fn test_status_snapshot() {
        let mut rec = recorder();
        rec.begin(0).unwrap();
        rec.on_frame(Side::Left, &frame(1.0), 0).unwrap();
        rec.on_frame(Side::Left, &frame(1.0), 5).unwrap();
        rec.on_frame(Side::Right, &frame(1.0), 10).unwrap();

        let status = rec.status(40);
        assert_eq!(status.state, SessionState::Recording);
        assert_eq!(status.elapsed_ms, 40);
        assert_eq!(status.frames_left, 2);
        assert_eq!(status.frames_right, 1);
        assert_eq!(status.pairing.overwritten, 1);
        assert_eq!(status.pairing.pairs_emitted, 1);
        assert_eq!(status.raw_samples, 1);
        assert_eq!(status.pending_samples, 1);
    }
}
