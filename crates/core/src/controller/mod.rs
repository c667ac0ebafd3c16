pub mod detection_loop;
pub mod lifecycle_controller;
