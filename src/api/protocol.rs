//! Backend response types.
//!
//! JSON shapes exchanged with the calibration backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Response to a submitted frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameStatus {
    /// Whether the frame was processed.
    pub success: bool,
    /// Alignment signal as a hex color (e.g. `#00ff00` when satisfied).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Error description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response to a measurement submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Named marker coordinates returned by `/get_circle_coords`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerCoordinates {
    /// Marker name to `[x, y]` pixel position.
    pub coordinates: BTreeMap<String, [f32; 2]>,
}
