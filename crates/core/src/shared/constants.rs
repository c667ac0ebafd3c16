pub const DETECTOR_MODEL_NAME: &str = "version-RFB-320.onnx";
pub const LANDMARKS_MODEL_NAME: &str = "2d106det.onnx";
pub const AGE_GENDER_MODEL_NAME: &str = "genderage.onnx";

/// Local directory checked first for model files, relative to the working dir.
pub const DEFAULT_MODEL_DIR: &str = "models";

/// Remote source tried when the local directory is missing an artifact.
pub const FALLBACK_MODEL_BASE_URL: &str =
    "https://github.com/neutrinographics/facelive/releases/download/v0.1.0";

/// Detection cadence (~3 checks per second).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 300;

/// Boxes must be strictly wider than this to count as a face.
pub const MIN_FACE_WIDTH: f32 = 10.0;

pub const DEFAULT_CONFIDENCE: f32 = 0.5;

pub const DEFAULT_STREAM_WIDTH: u32 = 720;
pub const DEFAULT_STREAM_HEIGHT: u32 = 560;
