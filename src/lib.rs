// SmartHub wheel-odometry core
// Decodes paired wheel-sensor notifications into wheelchair motion estimates

pub mod annotations;
pub mod calibration;
pub mod capture;
pub mod config;
pub mod downsample;
pub mod error;
pub mod export;
pub mod kinematics;
pub mod packet;
pub mod pairing;
pub mod pipeline;
pub mod recorder;
pub mod session;
pub mod smoothing;
pub mod status;
pub mod stream_buffer;
pub mod transport;

pub use annotations::{AnnotationLog, Flag, GraphKind, NewFlag};
pub use calibration::{Calibration, CalibrationStore};
pub use config::{PipelineConfig, SmoothingConfig};
pub use error::{HubResult, SmartHubError};
pub use kinematics::{KinematicEngine, KinematicSample, KinematicState, TimedPair};
pub use packet::DecodedSample;
pub use pairing::{PairedSample, SamplePairer, Side};
pub use pipeline::{PipelineParts, RecorderHandle};
pub use recorder::Recorder;
pub use session::{Clock, ManualClock, RecordingSession, SessionState, SystemClock};
pub use status::RecorderStatus;
pub use transport::{FrameSender, NullTransport, PeripheralTransport, TransportError};
