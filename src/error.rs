use thiserror::Error;

use crate::transport::TransportError;

/// SmartHub core error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SmartHubError {
    #[error("Malformed frame: expected 18 bytes, got {len}")]
    MalformedFrame { len: usize },

    #[error("Session already recording")]
    AlreadyRecording,

    #[error("Calibration cannot change while a session is active")]
    CalibrationLocked,

    #[error("Unknown calibration profile: {0}")]
    UnknownCalibration(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Duplicate flag id: {0}")]
    DuplicateFlag(String),

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Smoothing failed: {0}")]
    Smoothing(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Recorder pipeline closed")]
    PipelineClosed,
}

impl SmartHubError {
    /// Errors that drop a single frame and let the pipeline continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SmartHubError::MalformedFrame { .. } | SmartHubError::Smoothing(_)
        )
    }
}

impl From<serde_json::Error> for SmartHubError {
    fn from(err: serde_json::Error) -> Self {
        SmartHubError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for SmartHubError {
    fn from(err: std::io::Error) -> Self {
        SmartHubError::Storage(err.to_string())
    }
}

/// Result type for core operations
pub type HubResult<T> = Result<T, SmartHubError>;
