//! Posture Calibrator - webcam capture agent for measurement calibration
//!
//! Captures live camera frames on a fixed tick, composites alignment
//! markers, and submits JPEG frames to an external calibration backend.
//! The backend answers each frame with an alignment color; a sentinel
//! color signals that calibration or measurement is satisfied.

pub mod api;
pub mod camera;
pub mod config;
pub mod overlay;
pub mod session;
pub mod storage;
pub mod workflow;

pub use config::AgentConfig;
pub use workflow::Workflow;
