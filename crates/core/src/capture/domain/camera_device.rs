use thiserror::Error;

use crate::shared::constants::{DEFAULT_STREAM_HEIGHT, DEFAULT_STREAM_WIDTH};
use crate::shared::frame::Frame;

/// Stream acquisition failures. These surface to the caller and are never
/// retried automatically; the user decides whether to attempt again.
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Which way the requested camera should face. Advisory on platforms whose
/// capture backends expose no facing metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

/// Requested stream properties. Width and height are ideals, not exact
/// requirements; the backend picks the closest supported format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: DEFAULT_STREAM_WIDTH,
            height: DEFAULT_STREAM_HEIGHT,
            facing: FacingMode::User,
        }
    }
}

/// Opens camera streams.
///
/// Implementations handle the platform capture API; the stream manager works
/// with the abstract stream only. `open` runs on the capture worker thread,
/// so the returned stream never crosses threads.
pub trait CameraDevice: Send + Sync {
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn CameraStream>, StreamError>;
}

/// An open capture session. Dropping it releases the device.
pub trait CameraStream {
    /// Blocks until the next frame is available and returns it decoded.
    fn grab(&mut self) -> Result<Frame, Box<dyn std::error::Error>>;

    /// The negotiated capture resolution.
    fn native_size(&self) -> (u32, u32);
}
