//! HTTP client for the calibration backend.

use reqwest::multipart::{Form, Part};

use super::protocol::{FrameStatus, MarkerCoordinates, SubmitOutcome};
use super::{Backend, BackendError, MeasurementKind, StatusEndpoint};

/// Reqwest-backed client for the calibration backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Backend base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Backend for BackendClient {
    async fn submit_frame(
        &self,
        endpoint: StatusEndpoint,
        jpeg: Vec<u8>,
    ) -> Result<FrameStatus, BackendError> {
        let part = Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("frame", part);

        let status: FrameStatus = self
            .http
            .post(self.url(endpoint.path()))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status)
    }

    async fn request_recalibration(&self) -> Result<(), BackendError> {
        self.http
            .post(self.url("/re_calibrate"))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_marker_coordinates(&self) -> Result<MarkerCoordinates, BackendError> {
        let coords: MarkerCoordinates = self
            .http
            .post(self.url("/get_circle_coords"))
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(coords)
    }

    async fn submit_shoulder_width(
        &self,
        width: f64,
        kind: MeasurementKind,
    ) -> Result<(), BackendError> {
        let outcome: SubmitOutcome = self
            .http
            .post(self.url(kind.path()))
            .form(&[("shoulder_width", width.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if outcome.success {
            Ok(())
        } else {
            Err(BackendError::Rejected(
                outcome.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    async fn submit_reading_id(&self, id: &str) -> Result<(), BackendError> {
        self.http
            .post(self.url("/reading_submission"))
            .json(&serde_json::json!({ "id": id }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
