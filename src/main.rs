use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use smarthub_rs::capture::{Capture, CaptureEvent, ControlAction};
use smarthub_rs::export::{self, SessionExport, SessionMetadata};
use smarthub_rs::pipeline;
use smarthub_rs::smoothing::{smooth_recording, GyroSeries, SmoothingClient};
use smarthub_rs::{
    CalibrationStore, Clock, NullTransport, PipelineConfig, Recorder, SessionState, Side,
    SmoothingConfig, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "smarthub_replay")]
#[command(about = "Replay a SmartHub wheel-sensor capture through the odometry pipeline", long_about = None)]
struct Args {
    /// Capture file (JSON, or gzip with a .gz suffix)
    capture: PathBuf,

    /// Pipeline config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Calibration profiles (JSON map of name -> calibration)
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Profile to select from --calibration
    #[arg(long, requires = "calibration")]
    profile: Option<String>,

    /// Write the full-resolution series as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write the session export as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the final recorder status as JSON
    #[arg(long)]
    status: Option<PathBuf>,

    /// Remote smoothing endpoint (overrides the config file)
    #[arg(long)]
    smoothing_url: Option<String>,

    /// Smooth locally with a Hann window of this many samples
    #[arg(long, conflicts_with = "smoothing_url")]
    hann_window: Option<usize>,

    /// Feed frames through the async pipeline at capture speed
    #[arg(long, default_value_t = false)]
    realtime: bool,
}

struct ReplayOutcome {
    recorder: Recorder,
    batches: usize,
    /// Clock value the session is frozen at
    end_ms: i64,
}

/// Drive the recorder directly with capture timestamps
fn replay_direct(capture: &Capture, mut recorder: Recorder) -> Result<ReplayOutcome> {
    let span = capture.time_span();
    if capture.controls.is_empty() {
        if let Some((start, _)) = span {
            recorder.begin(start)?;
        }
    }

    let mut batches = 0;
    for event in capture.events() {
        match event {
            CaptureEvent::Control(control) => match control.action {
                ControlAction::Start => {
                    if let Err(e) = recorder.begin(control.at_ms) {
                        log::warn!("start at {} ms ignored: {}", control.at_ms, e);
                    }
                }
                ControlAction::Stop => {
                    recorder.pause(control.at_ms);
                }
                ControlAction::Restart => recorder.restart(control.at_ms),
            },
            CaptureEvent::Frame(frame) => {
                // Malformed frames are logged and counted by the recorder
                if let Ok(Some(_)) = recorder.on_frame(frame.side, &frame.payload, frame.at_ms) {
                    batches += 1;
                }
            }
            CaptureEvent::Flag(flag) => {
                if let Err(e) = recorder.add_flag(flag.to_new_flag(), flag.at_ms) {
                    log::warn!("flag {} skipped: {}", flag.id, e);
                }
            }
        }
    }

    let end_ms = span.map_or(0, |(_, end)| end);
    Ok(ReplayOutcome {
        recorder,
        batches,
        end_ms,
    })
}

/// Replay through the actor pipeline, sleeping between events
async fn replay_realtime(
    capture: &Capture,
    recorder: Recorder,
    config: &PipelineConfig,
) -> Result<ReplayOutcome> {
    let clock = Arc::new(SystemClock);
    let parts = pipeline::spawn(recorder, config, Arc::new(NullTransport), clock.clone());
    let mut live = parts.batches;

    let consumer = tokio::spawn(async move {
        let mut batches = 0;
        while let Some(batch) = live.recv().await {
            batches += 1;
            if let Some(last) = batch.last() {
                log::debug!(
                    "live batch: {} samples, displacement {:.3} m",
                    batch.len(),
                    last.displacement
                );
            }
        }
        batches
    });

    if capture.controls.is_empty() {
        parts.handle.start().await?;
    }

    let mut previous = capture.time_span().map(|(start, _)| start);
    for event in capture.events() {
        if let Some(prev) = previous {
            let wait = event.at_ms() - prev;
            if wait > 0 {
                sleep(Duration::from_millis(wait as u64)).await;
            }
        }
        previous = Some(event.at_ms());

        match event {
            CaptureEvent::Control(control) => {
                let result = match control.action {
                    ControlAction::Start => parts.handle.start().await,
                    ControlAction::Stop => parts.handle.stop().await.map(|_| ()),
                    ControlAction::Restart => parts.handle.restart().await,
                };
                if let Err(e) = result {
                    log::warn!("{:?} at {} ms failed: {}", control.action, control.at_ms, e);
                }
            }
            CaptureEvent::Frame(frame) => {
                let sender = match frame.side {
                    Side::Left => &parts.left,
                    Side::Right => &parts.right,
                };
                sender.on_notification(&frame.payload);
            }
            CaptureEvent::Flag(flag) => {
                if let Err(e) = parts.handle.add_flag(flag.to_new_flag()).await {
                    log::warn!("flag {} skipped: {}", flag.id, e);
                }
            }
        }
    }

    // Let the decode tasks drain before freezing the clock
    sleep(Duration::from_millis(50)).await;
    parts.handle.stop().await?;
    let end_ms = clock.now_ms();
    parts.handle.shutdown().await?;
    drop(parts.left);
    drop(parts.right);

    let recorder = parts.task.await.context("recorder task panicked")?;
    let batches = consumer.await.unwrap_or(0);
    Ok(ReplayOutcome {
        recorder,
        batches,
        end_ms,
    })
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(url) = &args.smoothing_url {
        let timeout_ms = config.smoothing.as_ref().map_or(5_000, |s| s.timeout_ms);
        config.smoothing = Some(SmoothingConfig {
            url: url.clone(),
            timeout_ms,
        });
    }
    if args.hann_window.is_some() {
        config.smoothing = None;
    }
    Ok(config)
}

fn load_calibrations(path: Option<&Path>, profile: Option<&str>) -> Result<CalibrationStore> {
    let mut store = match path {
        Some(path) => CalibrationStore::load(path)
            .with_context(|| format!("loading calibration profiles {}", path.display()))?,
        None => CalibrationStore::new(),
    };
    if let Some(name) = profile {
        store.select(name)?;
    }
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(&args)?;
    let calibrations = load_calibrations(args.calibration.as_deref(), args.profile.as_deref())?;
    let profile = calibrations.selected_name().map(str::to_string);
    let capture = Capture::load(&args.capture)
        .with_context(|| format!("loading capture {}", args.capture.display()))?;

    println!(
        "Replaying {} ({} left / {} right frames, {} flags)",
        args.capture.display(),
        capture.frame_count(Side::Left),
        capture.frame_count(Side::Right),
        capture.flags.len()
    );

    let recorder = Recorder::new(&config, calibrations);
    let mut outcome = if args.realtime {
        replay_realtime(&capture, recorder, &config).await?
    } else {
        replay_direct(&capture, recorder)?
    };
    if outcome.recorder.recording_state() == SessionState::Recording {
        outcome.recorder.pause(outcome.end_ms);
    }

    let recorder = &outcome.recorder;
    let calibration = recorder.calibration();
    let raw = recorder.raw_series().to_vec();
    let mut metadata = SessionMetadata::new(calibration, profile);

    let samples = if let Some(smoothing) = &config.smoothing {
        let client = SmoothingClient::new(smoothing)?;
        let rates = GyroSeries::from_samples(&raw);
        let smoothed = client.smooth_or_raw(&rates).await;
        metadata.smoothed = smoothed != rates;
        smooth_recording(&raw, &smoothed, &calibration)?
    } else if let Some(window) = args.hann_window {
        metadata.smoothed = true;
        let rates = GyroSeries::from_samples(&raw).hann(window);
        smooth_recording(&raw, &rates, &calibration)?
    } else {
        raw
    };

    let session = SessionExport::new(metadata, samples, recorder.flags(None));

    if let Some(path) = &args.csv {
        export::write_csv(path, &session.samples)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("CSV written to {}", path.display());
    }
    if let Some(path) = &args.json {
        session
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Session export written to {}", path.display());
    }
    let status = recorder.status(outcome.end_ms);
    if let Some(path) = &args.status {
        status
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let stats = &session.stats;
    println!("\n=== Replay summary ===");
    println!("Samples: {} ({} live batches)", stats.sample_count, outcome.batches);
    println!("Duration: {:.2} s", stats.duration_seconds);
    println!("Displacement: {:.3} m", stats.final_displacement_m);
    println!("Peak velocity: {:.3} m/s", stats.peak_velocity_ms);
    println!("Final heading: {:.1}°", stats.final_heading_deg);
    println!(
        "Frames: {} accepted, {} malformed, {} stale discards",
        status.frames_total(),
        status.malformed_frames,
        status.pairing.stale_discards
    );
    println!("Flags: {}", stats.flag_count);

    Ok(())
}
