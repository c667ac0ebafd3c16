//! Camera capture backed by `nokhwa`'s native input backends.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;

use crate::capture::domain::camera_device::{
    CameraDevice, CameraStream, StreamConstraints, StreamError,
};
use crate::shared::frame::Frame;

/// A camera selected by platform device index.
///
/// Facing mode is advisory here: desktop backends expose no facing metadata,
/// so device selection is by index and the requested facing is only logged.
pub struct NokhwaCamera {
    index: u32,
}

impl NokhwaCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

impl CameraDevice for NokhwaCamera {
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn CameraStream>, StreamError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(constraints.width, constraints.height),
                FrameFormat::MJPEG,
                30,
            ),
        ));
        let mut camera =
            Camera::new(CameraIndex::Index(self.index), requested).map_err(open_error)?;
        camera.open_stream().map_err(open_error)?;
        log::debug!(
            "opened camera {} (requested {}x{}, facing {:?})",
            self.index,
            constraints.width,
            constraints.height,
            constraints.facing
        );
        Ok(Box::new(NokhwaStream { camera, seq: 0 }))
    }
}

struct NokhwaStream {
    camera: Camera,
    seq: u64,
}

impl CameraStream for NokhwaStream {
    fn grab(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        let buffer = self.camera.frame()?;
        let decoded = buffer.decode_image::<RgbFormat>()?;
        let (width, height) = decoded.dimensions();
        self.seq += 1;
        Ok(Frame::new(decoded.into_raw(), width, height, 3, self.seq))
    }

    fn native_size(&self) -> (u32, u32) {
        let resolution = self.camera.resolution();
        (resolution.width(), resolution.height())
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        let _ = self.camera.stop_stream();
    }
}

/// One enumerated capture device.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub index: String,
    pub name: String,
    pub description: String,
}

/// Enumerate capture devices across the platform's available backends.
pub fn list_devices() -> Result<Vec<DeviceInfo>, Box<dyn std::error::Error>> {
    let cameras = nokhwa::query(ApiBackend::Auto)?;
    Ok(cameras
        .iter()
        .map(|cam| DeviceInfo {
            index: cam.index().to_string(),
            name: cam.human_name().to_string(),
            description: cam.description().to_string(),
        })
        .collect())
}

fn open_error(err: nokhwa::NokhwaError) -> StreamError {
    let text = err.to_string();
    if is_permission_error(&text) {
        StreamError::PermissionDenied(text)
    } else {
        StreamError::DeviceUnavailable(text)
    }
}

fn is_permission_error(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("permission")
        || lowered.contains("denied")
        || lowered.contains("not authorized")
}
