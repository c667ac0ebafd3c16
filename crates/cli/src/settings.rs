use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use facelive_core::capture::domain::camera_device::FacingMode;
use facelive_core::shared::constants::{
    DEFAULT_CONFIDENCE, DEFAULT_STREAM_HEIGHT, DEFAULT_STREAM_WIDTH, DEFAULT_TICK_INTERVAL_MS,
    MIN_FACE_WIDTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    User,
    Environment,
}

impl Facing {
    pub const ALL: &[Facing] = &[Facing::User, Facing::Environment];

    pub fn to_facing_mode(self) -> FacingMode {
        match self {
            Facing::User => FacingMode::User,
            Facing::Environment => FacingMode::Environment,
        }
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::User => write!(f, "user"),
            Facing::Environment => write!(f, "environment"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
    pub interval_ms: u64,
    pub min_face_width: f32,
    pub confidence: f32,
    pub landmarks: bool,
    pub attributes: bool,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    #[serde(default)]
    pub fallback_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: DEFAULT_STREAM_WIDTH,
            height: DEFAULT_STREAM_HEIGHT,
            facing: Facing::User,
            interval_ms: DEFAULT_TICK_INTERVAL_MS,
            min_face_width: MIN_FACE_WIDTH,
            confidence: DEFAULT_CONFIDENCE,
            landmarks: true,
            attributes: true,
            auto_start: false,
            model_dir: None,
            fallback_url: None,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceLive").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Ok(json) = serde_json::to_string_pretty(self) {
                let _ = fs::write(path, json);
            }
        }
    }
}
