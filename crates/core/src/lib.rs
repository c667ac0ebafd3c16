//! Live camera face detection with overlay rendering.
//!
//! A capture worker owns the camera and publishes the latest frame; a
//! detection loop runs an ONNX face detector (plus optional landmark and
//! age/gender heads) over it at a fixed interval; an overlay renderer turns
//! each result into a transparent RGBA surface sized to the display. The
//! [`controller::lifecycle_controller::LifecycleController`] ties these
//! together behind a mount/start/stop/close lifecycle driven by `poll`.

pub mod capture;
pub mod controller;
pub mod detection;
pub mod models;
pub mod overlay;
pub mod shared;
