//! Recorded notification streams for offline replay.
//!
//! A capture is JSON (gzip when the file name ends in `.gz`) holding raw
//! frames as they arrived from each sensor, the flags placed during the
//! recording and optionally the start/stop/restart presses.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::annotations::NewFlag;
use crate::error::HubResult;
use crate::pairing::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub side: Side,
    /// Wall-clock receive time
    pub at_ms: i64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedFlag {
    pub id: String,
    pub graph_id: u8,
    #[serde(default)]
    pub comment: String,
    pub at_ms: i64,
}

impl CapturedFlag {
    pub fn to_new_flag(&self) -> NewFlag {
        NewFlag::new(self.id.clone(), self.graph_id, self.comment.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedControl {
    pub action: ControlAction,
    pub at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Capture {
    #[serde(default)]
    pub frames: Vec<CapturedFrame>,
    #[serde(default)]
    pub flags: Vec<CapturedFlag>,
    #[serde(default)]
    pub controls: Vec<CapturedControl>,
}

/// One replay step, borrowed from the capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureEvent<'a> {
    Control(&'a CapturedControl),
    Frame(&'a CapturedFrame),
    Flag(&'a CapturedFlag),
}

impl CaptureEvent<'_> {
    pub fn at_ms(&self) -> i64 {
        match self {
            CaptureEvent::Control(c) => c.at_ms,
            CaptureEvent::Frame(f) => f.at_ms,
            CaptureEvent::Flag(f) => f.at_ms,
        }
    }
}

fn is_gz(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

impl Capture {
    pub fn load(path: &Path) -> HubResult<Self> {
        let file = File::open(path)?;
        if is_gz(path) {
            let reader = BufReader::new(GzDecoder::new(file));
            Ok(serde_json::from_reader(reader)?)
        } else {
            Ok(serde_json::from_reader(BufReader::new(file))?)
        }
    }

    pub fn save(&self, path: &Path) -> HubResult<()> {
        let file = File::create(path)?;
        if is_gz(path) {
            let mut encoder = GzEncoder::new(file, Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// All events in time order. At equal times controls come first, then
    /// frames, then flags; otherwise file order is kept.
    pub fn events(&self) -> Vec<CaptureEvent<'_>> {
        let mut events: Vec<CaptureEvent<'_>> = self
            .controls
            .iter()
            .map(CaptureEvent::Control)
            .chain(self.frames.iter().map(CaptureEvent::Frame))
            .chain(self.flags.iter().map(CaptureEvent::Flag))
            .collect();
        events.sort_by_key(|e| e.at_ms());
        events
    }

    /// First and last event time, `None` for an empty capture
    pub fn time_span(&self) -> Option<(i64, i64)> {
        let times = self
            .controls
            .iter()
            .map(|c| c.at_ms)
            .chain(self.frames.iter().map(|f| f.at_ms))
            .chain(self.flags.iter().map(|f| f.at_ms));
        times.fold(None, |span, t| match span {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
    }

    pub fn frame_count(&self, side: Side) -> usize {
        self.frames.iter().filter(|f| f.side == side).count()
    }
}
