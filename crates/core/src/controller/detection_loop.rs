//! Periodic detection over the most recent captured frame.
//!
//! A single worker thread wakes on a tick channel, grabs whatever frame the
//! capture worker published last and runs the annotator on it. Ticks are
//! delivered through a capacity-one channel, so a detection pass that
//! overruns the interval coalesces the ticks it missed into a single
//! pending one instead of building a backlog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::capture::stream_manager::StreamView;
use crate::detection::domain::face_annotator::FaceAnnotator;
use crate::models::registry::ModelRegistry;
use crate::shared::face::DetectionResult;

#[derive(Clone, Debug)]
pub enum LoopEvent {
    /// A completed detection pass. Replaces any earlier result wholesale.
    Results(DetectionResult),
    /// A failed pass. The loop keeps running and the next tick retries.
    TickError(String),
}

pub struct DetectionLoopHandle {
    events: Receiver<LoopEvent>,
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DetectionLoopHandle {
    pub fn events(&self) -> &Receiver<LoopEvent> {
        &self.events
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for DetectionLoopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn spawn(
    mut annotator: Box<dyn FaceAnnotator>,
    registry: Arc<ModelRegistry>,
    view: StreamView,
    interval: Duration,
    min_face_width: f32,
) -> DetectionLoopHandle {
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let worker = thread::spawn(move || {
        let ticker = crossbeam_channel::tick(interval);
        while !stop_flag.load(Ordering::Relaxed) {
            // Short timeout keeps stop() responsive between ticks.
            match ticker.recv_timeout(Duration::from_millis(50)) {
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            if !registry.is_ready() || !view.is_active() {
                log::debug!("detection tick skipped: models or stream not ready");
                continue;
            }
            let Some(frame) = view.latest_frame() else {
                log::debug!("detection tick skipped: no decoded frame yet");
                continue;
            };

            match annotator.annotate(&frame) {
                Ok(faces) => {
                    let mut result = DetectionResult::new(
                        annotator.depth(),
                        faces,
                        frame.width(),
                        frame.height(),
                    );
                    result.retain_wider_than(min_face_width);
                    if event_tx.send(LoopEvent::Results(result)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("detection tick failed: {e}");
                    if event_tx.send(LoopEvent::TickError(e.to_string())).is_err() {
                        break;
                    }
                }
            }
        }
    });

    DetectionLoopHandle {
        events: event_rx,
        stop,
        worker: Some(worker),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::camera_device::{
        CameraDevice, CameraStream, StreamConstraints, StreamError,
    };
    use crate::capture::stream_manager::DeviceStreamManager;
    use crate::models::registry::{ModelRegistry, ModelSelection, ModelSources};
    use crate::models::source::ModelSource;
    use crate::shared::constants::DETECTOR_MODEL_NAME;
    use crate::shared::face::{AnnotationDepth, Face, FaceBox};
    use crate::shared::frame::Frame;
    use crossbeam_channel::TryRecvError;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    // --- Stubs ---

    struct FakeDevice;

    impl CameraDevice for FakeDevice {
        fn open(
            &self,
            _constraints: &StreamConstraints,
        ) -> Result<Box<dyn CameraStream>, StreamError> {
            Ok(Box::new(FakeStream { seq: 0 }))
        }
    }

    struct FakeStream {
        seq: u64,
    }

    impl CameraStream for FakeStream {
        fn grab(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
            thread::sleep(Duration::from_millis(2));
            self.seq += 1;
            Ok(Frame::new(vec![0; 8 * 6 * 3], 8, 6, 3, self.seq))
        }

        fn native_size(&self) -> (u32, u32) {
            (8, 6)
        }
    }

    struct FakeAnnotator {
        script: VecDeque<Result<Vec<Face>, String>>,
        steady: Vec<Face>,
        delay: Duration,
    }

    impl FakeAnnotator {
        fn steady(faces: Vec<Face>) -> Box<Self> {
            Box::new(Self {
                script: VecDeque::new(),
                steady: faces,
                delay: Duration::ZERO,
            })
        }

        fn scripted(script: Vec<Result<Vec<Face>, String>>) -> Box<Self> {
            Box::new(Self {
                script: script.into(),
                steady: Vec::new(),
                delay: Duration::ZERO,
            })
        }

        fn slow(faces: Vec<Face>, delay: Duration) -> Box<Self> {
            Box::new(Self {
                script: VecDeque::new(),
                steady: faces,
                delay,
            })
        }
    }

    impl FaceAnnotator for FakeAnnotator {
        fn annotate(&mut self, _frame: &Frame) -> Result<Vec<Face>, Box<dyn std::error::Error>> {
            thread::sleep(self.delay);
            match self.script.pop_front() {
                Some(Ok(faces)) => Ok(faces),
                Some(Err(msg)) => Err(msg.into()),
                None => Ok(self.steady.clone()),
            }
        }

        fn depth(&self) -> AnnotationDepth {
            AnnotationDepth::Detection
        }
    }

    fn face(width: f32) -> Face {
        Face {
            bbox: FaceBox {
                x: 0.0,
                y: 0.0,
                width,
                height: width,
            },
            score: 0.9,
            landmarks: None,
            attributes: None,
        }
    }

    fn ready_registry(dir: &TempDir) -> Arc<ModelRegistry> {
        std::fs::write(dir.path().join(DETECTOR_MODEL_NAME), b"stub").unwrap();
        let registry = Arc::new(ModelRegistry::new());
        let sources = ModelSources {
            primary: ModelSource::Dir(dir.path().to_path_buf()),
            fallback: ModelSource::Dir(dir.path().to_path_buf()),
        };
        let selection = ModelSelection {
            landmarks: false,
            attributes: false,
        };
        registry.load(&sources, selection).unwrap();
        registry
    }

    fn running_stream() -> (DeviceStreamManager, StreamView) {
        let mut manager = DeviceStreamManager::new(Arc::new(FakeDevice));
        let view = manager.start(&StreamConstraints::default()).unwrap();
        (manager, view)
    }

    const INTERVAL: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_results_carry_frame_dimensions() {
        let dir = TempDir::new().unwrap();
        let registry = ready_registry(&dir);
        let (_manager, view) = running_stream();

        let mut handle = spawn(
            FakeAnnotator::steady(vec![face(50.0)]),
            registry,
            view,
            INTERVAL,
            10.0,
        );
        let event = handle.events().recv_timeout(WAIT).unwrap();
        match event {
            LoopEvent::Results(result) => {
                assert_eq!(result.face_count(), 1);
                assert_eq!(result.native_width(), 8);
                assert_eq!(result.native_height(), 6);
            }
            LoopEvent::TickError(e) => panic!("unexpected tick error: {e}"),
        }
        handle.stop();
    }

    #[test]
    fn test_narrow_faces_filtered_before_publish() {
        let dir = TempDir::new().unwrap();
        let registry = ready_registry(&dir);
        let (_manager, view) = running_stream();

        let mut handle = spawn(
            FakeAnnotator::steady(vec![face(5.0), face(50.0)]),
            registry,
            view,
            INTERVAL,
            10.0,
        );
        match handle.events().recv_timeout(WAIT).unwrap() {
            LoopEvent::Results(result) => {
                assert_eq!(result.face_count(), 1);
                assert_eq!(result.faces()[0].bbox.width, 50.0);
            }
            LoopEvent::TickError(e) => panic!("unexpected tick error: {e}"),
        }
        handle.stop();
    }

    #[test]
    fn test_loop_survives_tick_error() {
        let dir = TempDir::new().unwrap();
        let registry = ready_registry(&dir);
        let (_manager, view) = running_stream();

        let mut handle = spawn(
            FakeAnnotator::scripted(vec![Err("model exploded".into()), Ok(vec![face(40.0)])]),
            registry,
            view,
            INTERVAL,
            10.0,
        );
        match handle.events().recv_timeout(WAIT).unwrap() {
            LoopEvent::TickError(msg) => assert!(msg.contains("model exploded")),
            LoopEvent::Results(_) => panic!("expected the scripted error first"),
        }
        // The next tick runs normally.
        match handle.events().recv_timeout(WAIT).unwrap() {
            LoopEvent::Results(result) => assert_eq!(result.face_count(), 1),
            LoopEvent::TickError(e) => panic!("unexpected tick error: {e}"),
        }
        handle.stop();
    }

    #[test]
    fn test_slow_annotation_coalesces_missed_ticks() {
        let dir = TempDir::new().unwrap();
        let registry = ready_registry(&dir);
        let (_manager, view) = running_stream();

        // Each pass spans five intervals, so most ticks fall due mid-pass.
        let pass = INTERVAL * 5;
        let mut handle = spawn(
            FakeAnnotator::slow(vec![face(50.0)], pass),
            registry,
            view,
            INTERVAL,
            10.0,
        );
        let run = pass * 4;
        thread::sleep(run);
        handle.stop();

        // With one call in flight at a time, throughput is bounded by the
        // pass duration, not the interval. A backlog of queued ticks would
        // burst far past this bound.
        let results = handle
            .events()
            .try_iter()
            .filter(|e| matches!(e, LoopEvent::Results(_)))
            .count();
        let max = (run.as_millis() / pass.as_millis()) as usize + 1;
        assert!(results >= 1, "no results published during the run");
        assert!(
            results <= max,
            "missed ticks queued instead of coalescing: {results} results, bound {max}"
        );
    }

    #[test]
    fn test_no_events_until_registry_ready() {
        let registry = Arc::new(ModelRegistry::new());
        let (_manager, view) = running_stream();

        let mut handle = spawn(
            FakeAnnotator::steady(vec![face(50.0)]),
            registry,
            view,
            INTERVAL,
            10.0,
        );
        assert!(handle
            .events()
            .recv_timeout(Duration::from_millis(250))
            .is_err());
        handle.stop();
    }

    #[test]
    fn test_no_events_when_view_inactive() {
        let dir = TempDir::new().unwrap();
        let registry = ready_registry(&dir);
        let (mut manager, view) = running_stream();
        manager.stop();

        let mut handle = spawn(
            FakeAnnotator::steady(vec![face(50.0)]),
            registry,
            view,
            INTERVAL,
            10.0,
        );
        assert!(handle
            .events()
            .recv_timeout(Duration::from_millis(250))
            .is_err());
        handle.stop();
    }

    #[test]
    fn test_stop_joins_and_disconnects() {
        let dir = TempDir::new().unwrap();
        let registry = ready_registry(&dir);
        let (_manager, view) = running_stream();

        let mut handle = spawn(
            FakeAnnotator::steady(vec![face(50.0)]),
            registry,
            view,
            INTERVAL,
            10.0,
        );
        handle.events().recv_timeout(WAIT).unwrap();
        handle.stop();
        handle.stop();

        while handle.events().try_recv().is_ok() {}
        assert!(matches!(
            handle.events().try_recv(),
            Err(TryRecvError::Disconnected)
        ));
    }
}
