use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::{HubResult, SmartHubError};

/// Wall-clock source in milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock moved by hand, shared between clones (tests and deterministic replay)
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No recording in progress
    Idle,
    /// Pairing and integrating incoming frames
    Recording,
    /// Stopped with the elapsed clock frozen, resumable
    Paused,
}

/// Point-in-time view of the recording clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSnapshot {
    pub state: SessionState,
    pub start_time_ms: Option<i64>,
    pub paused_elapsed_ms: i64,
    pub elapsed_ms: i64,
}

/// Recording state machine and pause-aware elapsed clock.
///
/// `Idle -> Recording <-> Paused`, back to `Idle` only through `restart`.
/// The start time is re-based on resume so elapsed time never jumps
/// backwards and paused time is excluded.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    state: SessionState,
    start_time_ms: Option<i64>,
    paused_elapsed_ms: i64,
}

impl RecordingSession {
    /// Create new session in Idle state
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            start_time_ms: None,
            paused_elapsed_ms: 0,
        }
    }

    /// Idle → Recording (fresh) or Paused → Recording (resume)
    pub fn start(&mut self, now_ms: i64) -> HubResult<()> {
        match self.state {
            SessionState::Recording => return Err(SmartHubError::AlreadyRecording),
            SessionState::Paused => {
                self.start_time_ms = Some(now_ms - self.paused_elapsed_ms);
            }
            SessionState::Idle => {
                self.start_time_ms = Some(now_ms);
                self.paused_elapsed_ms = 0;
            }
        }
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Recording → Paused. Returns false (and changes nothing) otherwise.
    pub fn stop(&mut self, now_ms: i64) -> bool {
        if self.state != SessionState::Recording {
            return false;
        }
        if let Some(start) = self.start_time_ms {
            self.paused_elapsed_ms = now_ms - start;
        }
        self.state = SessionState::Paused;
        true
    }

    /// Zero the clock. Recording keeps recording from `now_ms`, Paused drops to Idle.
    pub fn restart(&mut self, now_ms: i64) {
        self.paused_elapsed_ms = 0;
        match self.state {
            SessionState::Recording => {
                self.start_time_ms = Some(now_ms);
            }
            SessionState::Paused | SessionState::Idle => {
                self.start_time_ms = None;
                self.state = SessionState::Idle;
            }
        }
    }

    /// Elapsed recording time excluding pauses
    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        match (self.state, self.start_time_ms) {
            (SessionState::Recording, Some(start)) => now_ms - start,
            (SessionState::Paused, _) => self.paused_elapsed_ms,
            _ => 0,
        }
    }

    /// Timestamp for a new annotation, `None` outside a session
    pub fn flag_timestamp(&self, now_ms: i64) -> Option<i64> {
        match self.state {
            SessionState::Idle => None,
            _ => Some(self.elapsed_ms(now_ms)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn snapshot(&self, now_ms: i64) -> RecordingSnapshot {
        RecordingSnapshot {
            state: self.state,
            start_time_ms: self.start_time_ms,
            paused_elapsed_ms: self.paused_elapsed_ms,
            elapsed_ms: self.elapsed_ms(now_ms),
        }
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}
