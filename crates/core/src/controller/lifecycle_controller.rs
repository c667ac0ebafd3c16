//! Mount-to-close lifecycle around model loading, capture and detection.
//!
//! The controller is single-threaded from the embedder's point of view:
//! worker outcomes arrive over channels and are applied inside `poll`, which
//! the embedder calls from its own tick. Every externally visible change is
//! reported as a [`ControllerEvent`] in the order it happened.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use thiserror::Error;

use crate::capture::domain::camera_device::{CameraDevice, StreamConstraints, StreamError};
use crate::capture::stream_manager::DeviceStreamManager;
use crate::controller::detection_loop::{self, DetectionLoopHandle, LoopEvent};
use crate::detection::domain::face_annotator::FaceAnnotator;
use crate::models::registry::{
    LoadedModels, ModelLoadError, ModelRegistry, ModelSelection, ModelSources,
};
use crate::overlay::overlay_renderer::OverlayRenderer;
use crate::shared::constants::{
    DEFAULT_STREAM_HEIGHT, DEFAULT_STREAM_WIDTH, DEFAULT_TICK_INTERVAL_MS, MIN_FACE_WIDTH,
};
use crate::shared::face::DetectionResult;

/// Lifecycle state of the detection pipeline.
///
/// `Error` is reached only by a failed model load; stream and tick failures
/// are reported as events without leaving the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Loading,
    Ready,
    Running,
    Error,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Loading => "loading",
            LoopState::Ready => "ready",
            LoopState::Running => "running",
            LoopState::Error => "error",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug)]
pub enum ControllerEvent {
    StateChanged(LoopState),
    /// A new detection result replaced the previous one wholesale.
    ResultsUpdated(DetectionResult),
    /// Both model sources failed. The controller is in `Error` until `retry`.
    LoadFailed(String),
    /// An automatic start after loading failed. The controller stays `Ready`.
    StartFailed(String),
    /// One detection tick failed. The loop keeps running.
    TickFailed(String),
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("failed to initialise detector: {0}")]
    Annotator(String),
}

/// Builds the annotator once models are available. Runs on the embedder's
/// thread during `start`, so it may do session setup work.
pub type AnnotatorFactory =
    Box<dyn Fn(&LoadedModels) -> Result<Box<dyn FaceAnnotator>, Box<dyn std::error::Error>> + Send>;

pub struct ControllerConfig {
    pub sources: ModelSources,
    pub selection: ModelSelection,
    pub constraints: StreamConstraints,
    pub tick_interval: Duration,
    pub min_face_width: f32,
    /// Start capture as soon as the first load succeeds.
    pub auto_start: bool,
    /// Overlay surface size in display pixels.
    pub display_size: (u32, u32),
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sources: ModelSources::default(),
            selection: ModelSelection::default(),
            constraints: StreamConstraints::default(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            min_face_width: MIN_FACE_WIDTH,
            auto_start: false,
            display_size: (DEFAULT_STREAM_WIDTH, DEFAULT_STREAM_HEIGHT),
        }
    }
}

pub struct LifecycleController {
    config: ControllerConfig,
    registry: Arc<ModelRegistry>,
    streams: DeviceStreamManager,
    annotator_factory: AnnotatorFactory,
    overlay: OverlayRenderer,
    state: LoopState,
    /// Cleared by `close`. A dead controller ignores every call and every
    /// late worker outcome.
    alive: bool,
    /// Auto-start applies to the first successful load only; re-arms after
    /// `stop` settle in `Ready`.
    auto_start_pending: bool,
    /// Set by `stop` when models are cached; the next `poll` re-enters the
    /// load path from `Idle`.
    rearm: bool,
    last_result: Option<DetectionResult>,
    load_rx: Option<Receiver<Result<LoadedModels, ModelLoadError>>>,
    loop_handle: Option<DetectionLoopHandle>,
    pending: Vec<ControllerEvent>,
}

impl LifecycleController {
    pub fn new(
        config: ControllerConfig,
        device: Arc<dyn CameraDevice>,
        registry: Arc<ModelRegistry>,
        annotator_factory: AnnotatorFactory,
    ) -> Self {
        let overlay = OverlayRenderer::new(config.display_size.0, config.display_size.1);
        let auto_start_pending = config.auto_start;
        Self {
            config,
            registry,
            streams: DeviceStreamManager::new(device),
            annotator_factory,
            overlay,
            state: LoopState::Idle,
            alive: true,
            auto_start_pending,
            rearm: false,
            last_result: None,
            load_rx: None,
            loop_handle: None,
            pending: Vec::new(),
        }
    }

    /// Begin loading models. Only meaningful in `Idle`.
    pub fn mount(&mut self) {
        if !self.alive || self.state != LoopState::Idle {
            return;
        }
        self.begin_loading();
    }

    /// Apply pending worker outcomes and return the events they produced.
    pub fn poll(&mut self) -> Vec<ControllerEvent> {
        if !self.alive {
            return Vec::new();
        }
        if mem::take(&mut self.rearm) && self.state == LoopState::Idle {
            self.begin_loading();
        }
        self.poll_load_outcome();
        self.poll_loop_events();
        mem::take(&mut self.pending)
    }

    /// Open the camera and start the detection loop. In `Running` this
    /// restarts capture on the current constraints.
    ///
    /// A failure leaves the controller in `Ready` with nothing running.
    pub fn start(&mut self) -> Result<(), StartError> {
        if !self.alive || !matches!(self.state, LoopState::Ready | LoopState::Running) {
            return Ok(());
        }
        let Some(models) = self.registry.loaded() else {
            return Ok(());
        };

        self.stop_loop();
        let view = match self.streams.start(&self.config.constraints) {
            Ok(view) => view,
            Err(e) => {
                self.set_state(LoopState::Ready);
                return Err(StartError::Stream(e));
            }
        };
        let annotator = match (self.annotator_factory)(&models) {
            Ok(annotator) => annotator,
            Err(e) => {
                self.streams.stop();
                self.set_state(LoopState::Ready);
                return Err(StartError::Annotator(e.to_string()));
            }
        };

        self.loop_handle = Some(detection_loop::spawn(
            annotator,
            Arc::clone(&self.registry),
            view,
            self.config.tick_interval,
            self.config.min_face_width,
        ));
        self.set_state(LoopState::Running);
        Ok(())
    }

    /// Stop detection and release the camera, discarding the current result
    /// and overlay contents.
    ///
    /// Lands in `Idle`. Models stay loaded for the session, so the next
    /// `poll` re-enters the idempotent load path and settles back in `Ready`
    /// without re-fetching.
    pub fn stop(&mut self) {
        if !self.alive || !matches!(self.state, LoopState::Ready | LoopState::Running) {
            return;
        }
        self.teardown();
        self.set_state(LoopState::Idle);
        self.rearm = self.registry.is_ready();
    }

    /// Start a fresh load attempt after a failure. No-op outside `Error`.
    pub fn retry(&mut self) {
        if self.alive && self.state == LoopState::Error {
            self.begin_loading();
        }
    }

    /// Tear everything down and refuse further work. Idempotent.
    pub fn close(&mut self) {
        if !self.alive {
            return;
        }
        // Flip first so a load finishing mid-teardown cannot resurrect us.
        self.alive = false;
        self.teardown();
        self.state = LoopState::Idle;
        self.rearm = false;
        self.load_rx = None;
        self.pending.clear();
    }

    /// Resize the overlay surface, re-rendering the current result if any.
    pub fn set_display_size(&mut self, width: u32, height: u32) {
        self.config.display_size = (width, height);
        if let Some(result) = self.last_result.clone() {
            self.overlay.render(&result, self.config.display_size);
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn last_result(&self) -> Option<&DetectionResult> {
        self.last_result.as_ref()
    }

    pub fn overlay(&self) -> &OverlayRenderer {
        &self.overlay
    }

    fn begin_loading(&mut self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let registry = Arc::clone(&self.registry);
        let sources = self.config.sources.clone();
        let selection = self.config.selection;
        thread::spawn(move || {
            let _ = tx.send(registry.load(&sources, selection));
        });
        self.load_rx = Some(rx);
        self.set_state(LoopState::Loading);
    }

    fn poll_load_outcome(&mut self) {
        let Some(rx) = &self.load_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(outcome) => {
                self.load_rx = None;
                // An outcome that lands after the controller moved away from
                // loading is stale and must not flip the state.
                if self.state != LoopState::Loading {
                    return;
                }
                match outcome {
                    Ok(_) => {
                        self.set_state(LoopState::Ready);
                        if mem::take(&mut self.auto_start_pending) {
                            if let Err(e) = self.start() {
                                self.pending
                                    .push(ControllerEvent::StartFailed(e.to_string()));
                            }
                        }
                    }
                    Err(e) => {
                        self.pending.push(ControllerEvent::LoadFailed(e.to_string()));
                        self.set_state(LoopState::Error);
                    }
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.load_rx = None;
            }
        }
    }

    fn poll_loop_events(&mut self) {
        let events: Vec<LoopEvent> = match &self.loop_handle {
            Some(handle) => handle.events().try_iter().collect(),
            None => return,
        };
        for event in events {
            match event {
                LoopEvent::Results(result) => {
                    if self.state != LoopState::Running {
                        continue;
                    }
                    self.overlay.render(&result, self.config.display_size);
                    self.pending
                        .push(ControllerEvent::ResultsUpdated(result.clone()));
                    self.last_result = Some(result);
                }
                LoopEvent::TickError(msg) => {
                    self.pending.push(ControllerEvent::TickFailed(msg));
                }
            }
        }
    }

    // Loop first so no tick can observe a half-stopped stream.
    fn teardown(&mut self) {
        self.stop_loop();
        self.streams.stop();
        self.last_result = None;
        self.overlay.clear();
    }

    fn stop_loop(&mut self) {
        if let Some(mut handle) = self.loop_handle.take() {
            handle.stop();
        }
    }

    fn set_state(&mut self, next: LoopState) {
        if self.state != next {
            log::debug!("controller state {} -> {next}", self.state);
            self.state = next;
            self.pending.push(ControllerEvent::StateChanged(next));
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.close();
    }
}
