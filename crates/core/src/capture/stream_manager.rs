//! Live stream ownership: one capture worker per handle, at most one handle.
//!
//! The worker thread opens the device itself, so the platform stream never
//! crosses threads. It grabs frames into a shared latest-frame slot that the
//! detection loop reads from. Stopping is synchronous: when `stop` returns
//! the worker has exited and the device is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::capture::domain::camera_device::{CameraDevice, StreamConstraints, StreamError};
use crate::shared::frame::Frame;

/// An acquired camera stream backed by a capture worker thread.
pub struct StreamHandle {
    stop: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<Frame>>>,
    native_size: (u32, u32),
    worker: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Cheap read handle for consumers of the stream.
    pub fn view(&self) -> StreamView {
        StreamView {
            active: Arc::clone(&self.active),
            latest: Arc::clone(&self.latest),
            native_size: self.native_size,
        }
    }

    pub fn native_size(&self) -> (u32, u32) {
        self.native_size
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop the capture worker and release the device. Synchronous: when this
    /// returns, the worker has exited. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.active.store(false, Ordering::Release);
        *self.latest.lock().unwrap() = None;
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read-only view of a stream: active flag, latest frame, native size.
#[derive(Clone, Debug)]
pub struct StreamView {
    active: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<Frame>>>,
    native_size: (u32, u32),
}

impl StreamView {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Latest decoded frame, cloned out of the slot. `None` until the first
    /// frame has been decoded.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.latest.lock().unwrap().clone()
    }

    pub fn native_size(&self) -> (u32, u32) {
        self.native_size
    }
}

/// Owns the current stream handle and enforces single-stream semantics:
/// starting while a stream is active stops the existing one first.
pub struct DeviceStreamManager {
    device: Arc<dyn CameraDevice>,
    current: Option<StreamHandle>,
}

impl DeviceStreamManager {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self {
            device,
            current: None,
        }
    }

    /// Acquire a stream for `constraints`.
    ///
    /// Blocks until the worker reports the open outcome, so permission and
    /// availability errors surface here synchronously. On failure no handle
    /// is retained.
    pub fn start(&mut self, constraints: &StreamConstraints) -> Result<StreamView, StreamError> {
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let worker = thread::spawn({
            let device = Arc::clone(&self.device);
            let constraints = *constraints;
            let stop = Arc::clone(&stop);
            let active = Arc::clone(&active);
            let latest = Arc::clone(&latest);
            move || capture_loop(device, constraints, ready_tx, stop, active, latest)
        });

        let native_size = match ready_rx.recv() {
            Ok(Ok(size)) => size,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(StreamError::DeviceUnavailable(
                    "capture worker exited before reporting".to_string(),
                ));
            }
        };

        log::info!(
            "camera stream started at {}x{}",
            native_size.0,
            native_size.1
        );
        let handle = StreamHandle {
            stop,
            active,
            latest,
            native_size,
            worker: Some(worker),
        };
        let view = handle.view();
        self.current = Some(handle);
        Ok(view)
    }

    /// Release the current stream. No-op when nothing is active.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.current.take() {
            handle.stop();
            log::info!("camera stream stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(StreamHandle::is_active)
    }

    pub fn handle(&self) -> Option<&StreamHandle> {
        self.current.as_ref()
    }
}

impl Drop for DeviceStreamManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    device: Arc<dyn CameraDevice>,
    constraints: StreamConstraints,
    ready_tx: Sender<Result<(u32, u32), StreamError>>,
    stop: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<Frame>>>,
) {
    let mut stream = match device.open(&constraints) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    active.store(true, Ordering::Release);
    let _ = ready_tx.send(Ok(stream.native_size()));

    while !stop.load(Ordering::Relaxed) {
        match stream.grab() {
            Ok(frame) => {
                *latest.lock().unwrap() = Some(frame);
            }
            Err(e) => {
                // Transient decode failures leave the slot as-is; the
                // detection loop just sees no newer frame.
                log::debug!("frame grab failed: {e}");
                thread::sleep(Duration::from_millis(50));
            }
        }
    }

    active.store(false, Ordering::Release);
    // Dropping the stream here releases the device.
}
