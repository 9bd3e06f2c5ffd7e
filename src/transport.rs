use futures::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::pairing::Side;

/// Failure reported by the peripheral transport for one device
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{side} sensor: {reason}")]
pub struct TransportError {
    pub side: Side,
    pub reason: String,
}

impl TransportError {
    pub fn new(side: Side, reason: impl Into<String>) -> Self {
        Self {
            side,
            reason: reason.into(),
        }
    }
}

/// Lifecycle calls of the wireless transport that bracket a recording.
///
/// Connecting and disconnecting devices happens outside this crate. Start
/// re-subscribes to the data characteristic and stop unsubscribes, the link
/// itself stays up.
pub trait PeripheralTransport: Send + Sync {
    fn discover_service(&self, side: Side) -> BoxFuture<'_, Result<(), TransportError>>;
    fn subscribe(&self, side: Side) -> BoxFuture<'_, Result<(), TransportError>>;
    fn unsubscribe(&self, side: Side) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Transport for offline replay: every lifecycle call succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl PeripheralTransport for NullTransport {
    fn discover_service(&self, side: Side) -> BoxFuture<'_, Result<(), TransportError>> {
        log::debug!("[transport] discover service ({})", side);
        futures::future::ready(Ok(())).boxed()
    }

    fn subscribe(&self, side: Side) -> BoxFuture<'_, Result<(), TransportError>> {
        log::debug!("[transport] subscribe ({})", side);
        futures::future::ready(Ok(())).boxed()
    }

    fn unsubscribe(&self, side: Side) -> BoxFuture<'_, Result<(), TransportError>> {
        log::debug!("[transport] unsubscribe ({})", side);
        futures::future::ready(Ok(())).boxed()
    }
}

/// Notification callback handed to the transport for one device side.
///
/// Frames go into a bounded channel; when the consumer falls behind the
/// newest frame is dropped instead of blocking the radio callback.
#[derive(Clone, Debug)]
pub struct FrameSender {
    side: Side,
    tx: mpsc::Sender<Vec<u8>>,
}

impl FrameSender {
    pub(crate) fn new(side: Side, tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self { side, tx }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Non-blocking delivery of one raw notification payload.
    /// Returns false when the frame was dropped.
    pub fn on_notification(&self, frame: &[u8]) -> bool {
        match self.tx.try_send(frame.to_vec()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("[{}] notification queue full, frame dropped", self.side);
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::warn!("[{}] notification queue closed, frame dropped", self.side);
                false
            }
        }
    }

    /// Delivery that waits for queue space (used by replay)
    pub async fn send(&self, frame: Vec<u8>) -> bool {
        self.tx.send(frame).await.is_ok()
    }
}
