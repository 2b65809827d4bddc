//! Calibration backend interface.
//!
//! All backend behavior (image analysis, alignment decisions, coordinate
//! estimation) lives server-side; this module only speaks its HTTP
//! surface.

pub mod client;
pub mod protocol;

pub use client::BackendClient;
pub use protocol::{FrameStatus, MarkerCoordinates, SubmitOutcome};

/// Frame status endpoint a capture loop submits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEndpoint {
    /// Calibration flow endpoint.
    CalibrationPage,
    /// Measurement flow endpoint.
    ProcessFrame,
}

impl StatusEndpoint {
    /// URL path for this endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            StatusEndpoint::CalibrationPage => "/calibration_page",
            StatusEndpoint::ProcessFrame => "/process_frame",
        }
    }
}

/// Whether a shoulder width submission is a fresh entry or a stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    /// First-time entry, submitted to `/submit_measurements`.
    New,
    /// Previously stored value, submitted to `/existing_value`.
    Existing,
}

impl MeasurementKind {
    pub fn path(&self) -> &'static str {
        match self {
            MeasurementKind::New => "/submit_measurements",
            MeasurementKind::Existing => "/existing_value",
        }
    }
}

/// Backend errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend rejected the request: {0}")]
    Rejected(String),
}

/// Operations the agent needs from the calibration backend.
///
/// `BackendClient` is the HTTP implementation; tests substitute their own.
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// Submit a JPEG frame to a status endpoint.
    async fn submit_frame(
        &self,
        endpoint: StatusEndpoint,
        jpeg: Vec<u8>,
    ) -> Result<FrameStatus, BackendError>;

    /// Ask the backend to reset its calibration state.
    async fn request_recalibration(&self) -> Result<(), BackendError>;

    /// Fetch alignment marker coordinates.
    async fn fetch_marker_coordinates(&self) -> Result<MarkerCoordinates, BackendError>;

    /// Submit a shoulder width value.
    async fn submit_shoulder_width(
        &self,
        width: f64,
        kind: MeasurementKind,
    ) -> Result<(), BackendError>;

    /// Submit a user reading ID.
    async fn submit_reading_id(&self, id: &str) -> Result<(), BackendError>;
}
