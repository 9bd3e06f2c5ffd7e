//! Async recorder actor.
//!
//! Each wheel sensor gets a bounded frame queue and a decode task. Decoded
//! frames and every control request end up in one command queue consumed by
//! the actor that owns the [`Recorder`], so a notification is always handled
//! entirely before or entirely after a start/stop/restart. Samples are stamped
//! when the actor handles them, never earlier, so a frame queued behind a
//! start or restart is timed on the new clock.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::annotations::{Flag, NewFlag};
use crate::calibration::Calibration;
use crate::config::PipelineConfig;
use crate::error::{HubResult, SmartHubError};
use crate::kinematics::KinematicSample;
use crate::packet::{self, DecodedSample};
use crate::pairing::Side;
use crate::recorder::Recorder;
use crate::session::{Clock, RecordingSnapshot, SessionState};
use crate::status::RecorderStatus;
use crate::transport::{FrameSender, PeripheralTransport, TransportError};

enum Command {
    Decoded {
        side: Side,
        sample: DecodedSample,
    },
    FrameDropped {
        side: Side,
        error: SmartHubError,
    },
    Start(oneshot::Sender<HubResult<()>>),
    Stop(oneshot::Sender<HubResult<bool>>),
    Restart(oneshot::Sender<()>),
    AddFlag(NewFlag, oneshot::Sender<HubResult<Flag>>),
    Flags(Option<u8>, oneshot::Sender<Vec<Flag>>),
    RawSeries(oneshot::Sender<Vec<KinematicSample>>),
    State(oneshot::Sender<RecordingSnapshot>),
    SelectCalibration(Option<String>, oneshot::Sender<HubResult<()>>),
    Calibration(oneshot::Sender<Calibration>),
    Status(oneshot::Sender<RecorderStatus>),
    Shutdown,
}

/// Cloneable front door to a running recorder actor
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<Command>,
}

impl RecorderHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> HubResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SmartHubError::PipelineClosed)?;
        reply_rx.await.map_err(|_| SmartHubError::PipelineClosed)
    }

    /// Subscribe both sensors, then start or resume recording
    pub async fn start(&self) -> HubResult<()> {
        self.request(Command::Start).await?
    }

    /// Unsubscribe both sensors, then pause. `Ok(false)` when not recording.
    pub async fn stop(&self) -> HubResult<bool> {
        self.request(Command::Stop).await?
    }

    pub async fn restart(&self) -> HubResult<()> {
        self.request(Command::Restart).await
    }

    pub async fn add_flag(&self, flag: NewFlag) -> HubResult<Flag> {
        self.request(|tx| Command::AddFlag(flag, tx)).await?
    }

    pub async fn flags(&self, graph_id: Option<u8>) -> HubResult<Vec<Flag>> {
        self.request(|tx| Command::Flags(graph_id, tx)).await
    }

    pub async fn raw_series(&self) -> HubResult<Vec<KinematicSample>> {
        self.request(Command::RawSeries).await
    }

    pub async fn recording_state(&self) -> HubResult<RecordingSnapshot> {
        self.request(Command::State).await
    }

    pub async fn select_calibration(&self, name: Option<String>) -> HubResult<()> {
        self.request(|tx| Command::SelectCalibration(name, tx)).await?
    }

    pub async fn calibration(&self) -> HubResult<Calibration> {
        self.request(Command::Calibration).await
    }

    pub async fn status(&self) -> HubResult<RecorderStatus> {
        self.request(Command::Status).await
    }

    /// Ask the actor to exit; the recorder comes back through the task handle
    pub async fn shutdown(&self) -> HubResult<()> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| SmartHubError::PipelineClosed)
    }
}

/// Everything a caller needs to drive a spawned pipeline
pub struct PipelineParts {
    pub handle: RecorderHandle,
    /// Notification callbacks to hand to the transport
    pub left: FrameSender,
    pub right: FrameSender,
    /// One message per live flush
    pub batches: mpsc::Receiver<Vec<KinematicSample>>,
    pub task: JoinHandle<Recorder>,
}

/// Spawn the decode tasks and the recorder actor on the current runtime
pub fn spawn(
    recorder: Recorder,
    config: &PipelineConfig,
    transport: Arc<dyn PeripheralTransport>,
    clock: Arc<dyn Clock>,
) -> PipelineParts {
    let capacity = config.channel_capacity.max(1);
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (batch_tx, batch_rx) = mpsc::channel(capacity);

    let (left_tx, left_rx) = mpsc::channel(capacity);
    let (right_tx, right_rx) = mpsc::channel(capacity);
    tokio::spawn(decode_loop(Side::Left, left_rx, command_tx.clone()));
    tokio::spawn(decode_loop(Side::Right, right_rx, command_tx.clone()));

    let actor = RecorderActor {
        recorder,
        transport,
        clock,
        batches: batch_tx,
    };
    let task = tokio::spawn(actor.run(command_rx));

    PipelineParts {
        handle: RecorderHandle { tx: command_tx },
        left: FrameSender::new(Side::Left, left_tx),
        right: FrameSender::new(Side::Right, right_tx),
        batches: batch_rx,
        task,
    }
}

async fn decode_loop(
    side: Side,
    mut frames: mpsc::Receiver<Vec<u8>>,
    commands: mpsc::Sender<Command>,
) {
    while let Some(frame) = frames.recv().await {
        let command = match packet::decode(&frame) {
            Ok(sample) => Command::Decoded { side, sample },
            Err(error) => Command::FrameDropped { side, error },
        };
        if commands.send(command).await.is_err() {
            log::debug!("[{}] recorder gone, decode loop exiting", side);
            break;
        }
    }
}

struct RecorderActor {
    recorder: Recorder,
    transport: Arc<dyn PeripheralTransport>,
    clock: Arc<dyn Clock>,
    batches: mpsc::Sender<Vec<KinematicSample>>,
}

impl RecorderActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Recorder {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Decoded { side, sample } => {
                    let now_ms = self.clock.now_ms();
                    if let Some(batch) = self.recorder.on_decoded(side, sample, now_ms) {
                        self.publish(batch);
                    }
                }
                Command::FrameDropped { side, error } => {
                    self.recorder.record_malformed(side, &error);
                }
                Command::Start(reply) => {
                    let result = self.start().await;
                    let _ = reply.send(result);
                }
                Command::Stop(reply) => {
                    let result = self.stop().await;
                    let _ = reply.send(result);
                }
                Command::Restart(reply) => {
                    self.recorder.restart(self.clock.now_ms());
                    let _ = reply.send(());
                }
                Command::AddFlag(flag, reply) => {
                    let _ = reply.send(self.recorder.add_flag(flag, self.clock.now_ms()));
                }
                Command::Flags(graph_id, reply) => {
                    let _ = reply.send(self.recorder.flags(graph_id));
                }
                Command::RawSeries(reply) => {
                    let _ = reply.send(self.recorder.raw_series().to_vec());
                }
                Command::State(reply) => {
                    let _ = reply.send(self.recorder.snapshot(self.clock.now_ms()));
                }
                Command::SelectCalibration(name, reply) => {
                    let _ = reply.send(self.recorder.select_calibration(name.as_deref()));
                }
                Command::Calibration(reply) => {
                    let _ = reply.send(self.recorder.calibration());
                }
                Command::Status(reply) => {
                    let _ = reply.send(self.recorder.status(self.clock.now_ms()));
                }
                Command::Shutdown => break,
            }
        }
        log::debug!("[pipeline] recorder actor stopped");
        self.recorder
    }

    fn publish(&self, batch: Vec<KinematicSample>) {
        match self.batches.try_send(batch) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("[pipeline] consumer behind, live batch dropped (raw series kept)");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("[pipeline] no live consumer");
            }
        }
    }

    async fn connect(&self, side: Side) -> Result<(), TransportError> {
        self.transport.discover_service(side).await?;
        self.transport.subscribe(side).await
    }

    async fn start(&mut self) -> HubResult<()> {
        if self.recorder.recording_state() == SessionState::Recording {
            return Err(SmartHubError::AlreadyRecording);
        }

        let mut subscribed = Vec::with_capacity(2);
        for side in Side::BOTH {
            if let Err(e) = self.connect(side).await {
                log::warn!("[pipeline] start aborted: {}", e);
                for done in subscribed {
                    if let Err(undo) = self.transport.unsubscribe(done).await {
                        log::warn!("[pipeline] rollback failed: {}", undo);
                    }
                }
                return Err(e.into());
            }
            subscribed.push(side);
        }

        self.recorder.begin(self.clock.now_ms())
    }

    async fn stop(&mut self) -> HubResult<bool> {
        if self.recorder.recording_state() != SessionState::Recording {
            return Ok(false);
        }
        let mut released = Vec::with_capacity(2);
        for side in Side::BOTH {
            if let Err(e) = self.transport.unsubscribe(side).await {
                log::warn!("[pipeline] stop aborted, still recording: {}", e);
                for done in released {
                    if let Err(redo) = self.transport.subscribe(done).await {
                        log::warn!("[pipeline] resubscribe failed: {}", redo);
                    }
                }
                return Err(e.into());
            }
            released.push(side);
        }
        Ok(self.recorder.pause(self.clock.now_ms()))
    }
}
