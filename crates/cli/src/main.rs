use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use facelive_core::capture::domain::camera_device::StreamConstraints;
use facelive_core::capture::infrastructure::nokhwa_camera::{self, NokhwaCamera};
use facelive_core::controller::lifecycle_controller::{
    AnnotatorFactory, ControllerConfig, ControllerEvent, LifecycleController, LoopState,
};
use facelive_core::detection::domain::face_annotator::FaceAnnotator;
use facelive_core::detection::infrastructure::onnx_face_annotator::OnnxFaceAnnotator;
use facelive_core::models::registry::{ModelRegistry, ModelSelection, ModelSources};
use facelive_core::models::source::ModelSource;

mod settings;
use settings::{Facing, Settings};

/// Live face detection from a camera with a rendered overlay.
#[derive(Parser)]
#[command(name = "facelive")]
struct Cli {
    /// Camera index to open.
    #[arg(long, default_value = "0")]
    camera: u32,

    /// List available cameras and exit.
    #[arg(long)]
    list_cameras: bool,

    /// Requested stream width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Requested stream height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Camera facing: user or environment.
    #[arg(long)]
    facing: Option<String>,

    /// Milliseconds between detection ticks.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Drop detections narrower than this many pixels.
    #[arg(long)]
    min_face_width: Option<f32>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f32>,

    /// Skip the landmark model.
    #[arg(long)]
    no_landmarks: bool,

    /// Skip the age/gender model.
    #[arg(long)]
    no_attributes: bool,

    /// Start capture as soon as models are loaded.
    #[arg(long)]
    auto_start: bool,

    /// Seconds to run before exiting.
    #[arg(long, default_value = "10")]
    duration: u64,

    /// Directory holding the model files.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Base URL for downloading missing models.
    #[arg(long)]
    fallback_url: Option<String>,

    /// Write the final overlay surface to this PNG file.
    #[arg(long)]
    overlay_out: Option<PathBuf>,

    /// Persist the effective camera and detection settings.
    #[arg(long)]
    remember: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    if cli.list_cameras {
        return list_cameras();
    }

    let settings = effective_settings(&cli);
    if cli.remember {
        settings.save();
    }

    let confidence = settings.confidence;
    let factory: AnnotatorFactory = Box::new(move |models| {
        let annotator = OnnxFaceAnnotator::from_models(models, confidence)?;
        Ok(Box::new(annotator) as Box<dyn FaceAnnotator>)
    });

    let device = Arc::new(NokhwaCamera::new(cli.camera));
    let mut controller = LifecycleController::new(
        controller_config(&settings),
        device,
        ModelRegistry::global(),
        factory,
    );
    controller.mount();

    let deadline = Instant::now() + Duration::from_secs(cli.duration);
    let mut started = false;
    while Instant::now() < deadline {
        for event in controller.poll() {
            match event {
                ControllerEvent::StateChanged(state) => {
                    log::info!("state: {state}");
                    if state == LoopState::Ready && !settings.auto_start && !started {
                        controller.start()?;
                        started = true;
                    }
                }
                ControllerEvent::ResultsUpdated(result) => println!("{}", result.summary()),
                ControllerEvent::LoadFailed(msg) => {
                    return Err(format!("model load failed: {msg}").into());
                }
                ControllerEvent::StartFailed(msg) => eprintln!("start failed: {msg}"),
                ControllerEvent::TickFailed(msg) => eprintln!("detection tick failed: {msg}"),
            }
        }
        thread::sleep(Duration::from_millis(50));
    }

    if let Some(path) = &cli.overlay_out {
        controller.overlay().surface().save(path)?;
        log::info!("Overlay written to {}", path.display());
    }
    controller.stop();
    controller.close();
    Ok(())
}

fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let devices = nokhwa_camera::list_devices()?;
    if devices.is_empty() {
        println!("No cameras found");
        return Ok(());
    }
    println!("{:<8} {:<32} Description", "Index", "Name");
    for device in devices {
        println!(
            "{:<8} {:<32} {}",
            device.index, device.name, device.description
        );
    }
    Ok(())
}

/// Saved settings with command-line flags layered on top.
fn effective_settings(cli: &Cli) -> Settings {
    let mut settings = Settings::load();
    if let Some(width) = cli.width {
        settings.width = width;
    }
    if let Some(height) = cli.height {
        settings.height = height;
    }
    if let Some(facing) = &cli.facing {
        settings.facing = parse_facing(facing);
    }
    if let Some(interval) = cli.interval_ms {
        settings.interval_ms = interval;
    }
    if let Some(min_width) = cli.min_face_width {
        settings.min_face_width = min_width;
    }
    if let Some(confidence) = cli.confidence {
        settings.confidence = confidence;
    }
    if cli.no_landmarks {
        settings.landmarks = false;
    }
    if cli.no_attributes {
        settings.attributes = false;
    }
    if cli.auto_start {
        settings.auto_start = true;
    }
    if let Some(dir) = &cli.model_dir {
        settings.model_dir = Some(dir.clone());
    }
    if let Some(url) = &cli.fallback_url {
        settings.fallback_url = Some(url.clone());
    }
    settings
}

fn controller_config(settings: &Settings) -> ControllerConfig {
    let mut sources = ModelSources::default();
    if let Some(dir) = &settings.model_dir {
        sources.primary = ModelSource::Dir(dir.clone());
    }
    if let Some(url) = &settings.fallback_url {
        sources.fallback = ModelSource::Http(url.clone());
    }
    ControllerConfig {
        sources,
        selection: ModelSelection {
            landmarks: settings.landmarks,
            attributes: settings.attributes,
        },
        constraints: StreamConstraints {
            width: settings.width,
            height: settings.height,
            facing: settings.facing.to_facing_mode(),
        },
        tick_interval: Duration::from_millis(settings.interval_ms),
        min_face_width: settings.min_face_width,
        auto_start: settings.auto_start,
        display_size: (settings.width, settings.height),
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(
                format!("Confidence must be between 0.0 and 1.0, got {confidence}").into(),
            );
        }
    }
    if let Some(facing) = &cli.facing {
        if !Facing::ALL.iter().any(|f| f.to_string() == *facing) {
            return Err(format!("Facing must be 'user' or 'environment', got '{facing}'").into());
        }
    }
    if let Some(interval) = cli.interval_ms {
        if interval == 0 {
            return Err("Interval must be at least 1 ms".into());
        }
    }
    if cli.width == Some(0) || cli.height == Some(0) {
        return Err("Stream dimensions must be positive".into());
    }
    if cli.duration == 0 {
        return Err("Duration must be at least 1 second".into());
    }
    Ok(())
}

fn parse_facing(facing: &str) -> Facing {
    if facing == "environment" {
        Facing::Environment
    } else {
        Facing::User
    }
}
