use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::f64::consts::PI;
use std::path::PathBuf;

use smarthub_rs::capture::{Capture, CapturedControl, CapturedFlag, CapturedFrame, ControlAction};
use smarthub_rs::packet::{encode, SUB_SAMPLES};
use smarthub_rs::{DecodedSample, Side};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Pattern {
    /// Both wheels pushed together
    Straight,
    /// Right wheel faster, steady left turn
    Turn,
    /// Straight, a turnaround, then back
    Turnaround,
}

#[derive(Parser, Debug)]
#[command(name = "synth_capture")]
#[command(about = "Generate a synthetic SmartHub capture for replay", long_about = None)]
struct Args {
    /// Output file (.json or .json.gz)
    #[arg(long, default_value = "synthetic_capture.json")]
    output: PathBuf,

    /// Recording length in seconds
    #[arg(long, default_value = "10")]
    seconds: f64,

    /// Notification interval per sensor (ms)
    #[arg(long, default_value = "60")]
    period_ms: i64,

    /// Right sensor lag behind the left one (ms)
    #[arg(long, default_value = "7")]
    skew_ms: i64,

    #[arg(long, value_enum, default_value = "straight")]
    pattern: Pattern,

    /// Insert a pause of this many seconds halfway through
    #[arg(long)]
    pause: Option<f64>,

    /// Corrupt every Nth left frame (truncated payload)
    #[arg(long)]
    corrupt_every: Option<usize>,
}

/// Wheel rates (rad/s) at time `t` seconds
fn wheel_rates(pattern: Pattern, t: f64, total: f64) -> (f64, f64) {
    // Push stroke roughly every 1.2 s
    let push = 2.5 + 1.2 * (2.0 * PI * t / 1.2).sin();
    match pattern {
        Pattern::Straight => (push, push),
        Pattern::Turn => (push * 0.8, push * 1.2),
        Pattern::Turnaround => {
            let middle = total / 2.0;
            if (t - middle).abs() < 1.0 {
                (-1.5, 1.5)
            } else {
                (push, push)
            }
        }
    }
}

fn frame_at(side: Side, pattern: Pattern, t_ms: i64, period_ms: i64, total: f64) -> DecodedSample {
    let mut sample = DecodedSample::default();
    for i in 0..SUB_SAMPLES {
        let t = (t_ms as f64 + period_ms as f64 * i as f64 / SUB_SAMPLES as f64) / 1000.0;
        let (left, right) = wheel_rates(pattern, t, total);
        sample.gyro[i] = match side {
            Side::Left => left,
            Side::Right => right,
        };
        sample.accel[i] = (t * 2.0 * PI).sin() * 0.3;
    }
    sample
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    anyhow::ensure!(args.period_ms > 0, "--period-ms must be positive");
    anyhow::ensure!(args.seconds > 0.0, "--seconds must be positive");

    let start_ms = chrono::Utc::now().timestamp_millis();
    let duration_ms = (args.seconds * 1000.0) as i64;
    let pause_ms = args.pause.map(|p| (p * 1000.0) as i64).unwrap_or(0);
    let pause_at = duration_ms / 2;

    let mut capture = Capture::default();
    capture.controls.push(CapturedControl {
        action: ControlAction::Start,
        at_ms: start_ms,
    });

    let mut index = 0usize;
    let mut t_ms = 0;
    while t_ms < duration_ms {
        // Frames are stamped with wall time, which skips over the pause
        let offset = if pause_ms > 0 && t_ms >= pause_at { pause_ms } else { 0 };
        for (side, skew) in [(Side::Left, 0), (Side::Right, args.skew_ms)] {
            let sample = frame_at(side, args.pattern, t_ms, args.period_ms, args.seconds);
            let mut payload = encode(&sample).to_vec();
            if side == Side::Left {
                if let Some(every) = args.corrupt_every {
                    if every > 0 && index % every == every - 1 {
                        payload.truncate(11);
                    }
                }
            }
            capture.frames.push(CapturedFrame {
                side,
                at_ms: start_ms + t_ms + offset + skew,
                payload,
            });
        }
        index += 1;
        t_ms += args.period_ms;
    }

    if pause_ms > 0 {
        capture.controls.push(CapturedControl {
            action: ControlAction::Stop,
            at_ms: start_ms + pause_at,
        });
        capture.controls.push(CapturedControl {
            action: ControlAction::Start,
            at_ms: start_ms + pause_at + pause_ms,
        });
    }

    for (i, (graph_id, comment)) in [(1u8, "first push"), (2, "turn"), (3, "coasting")].iter().enumerate() {
        let at = duration_ms * (i as i64 + 1) / 4;
        let offset = if pause_ms > 0 && at >= pause_at { pause_ms } else { 0 };
        capture.flags.push(CapturedFlag {
            id: format!("flag-{}", i + 1),
            graph_id: *graph_id,
            comment: comment.to_string(),
            at_ms: start_ms + at + offset,
        });
    }

    capture
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!(
        "wrote {} frames, {} flags ({:?}) to {}",
        capture.frames.len(),
        capture.flags.len(),
        args.pattern,
        args.output.display()
    );
    Ok(())
}
