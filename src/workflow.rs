//! Workflow orchestration.
//!
//! Ties the pieces together into the user-facing flows: shoulder width
//! entry (with the returning-user fast path), the calibration and
//! measurement capture loops, and reading submission.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{Backend, BackendError, MeasurementKind};
use crate::camera::{CameraCapture, CameraError, FrameSource};
use crate::config::AgentConfig;
use crate::overlay::MarkerSet;
use crate::session::{
    CaptureFlow, CaptureSession, SessionCommand, SessionError, SessionOutcome, SourceFactory,
};
use crate::storage::{MeasurementStore, SessionCache, StorageError};

/// Which landing path applies, based on the stored measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryPath {
    /// No stored measurement; prompt for a fresh one.
    NewMeasurement,
    /// A measurement is stored; offer to continue with it.
    Returning(f64),
}

/// Workflow errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("input error: {0}")]
    Input(#[from] std::io::Error),
}

/// Drives the calibration and measurement flows.
pub struct Workflow<B> {
    config: AgentConfig,
    backend: B,
    store: MeasurementStore,
    cache: SessionCache,
}

impl<B: Backend + Clone> Workflow<B> {
    pub fn new(config: AgentConfig, backend: B, store: MeasurementStore) -> Self {
        Self {
            config,
            backend,
            store,
            cache: SessionCache::new(),
        }
    }

    /// The durable measurement store.
    pub fn store(&self) -> &MeasurementStore {
        &self.store
    }

    /// Decide the landing path from the stored measurement.
    pub fn entry_path(&self) -> Result<EntryPath, WorkflowError> {
        Ok(match self.store.shoulder_width()? {
            Some(width) => EntryPath::Returning(width),
            None => EntryPath::NewMeasurement,
        })
    }

    /// Persist a fresh shoulder width, then submit it.
    ///
    /// The local write happens before the network call resolves, so the
    /// value survives a backend rejection.
    pub async fn submit_new_width(&self, width: f64) -> Result<(), WorkflowError> {
        self.store.save_shoulder_width(width)?;
        self.backend
            .submit_shoulder_width(width, MeasurementKind::New)
            .await?;
        Ok(())
    }

    /// Re-submit the stored shoulder width.
    pub async fn continue_with_existing(&self, width: f64) -> Result<(), WorkflowError> {
        self.backend
            .submit_shoulder_width(width, MeasurementKind::Existing)
            .await?;
        Ok(())
    }

    /// Alignment markers for the measurement flow, fetched from the
    /// backend at most once per run. A failed fetch yields an empty set
    /// without caching, so a later flow can retry.
    pub async fn ensure_markers(&mut self) -> MarkerSet {
        if let Some(markers) = self.cache.markers() {
            return markers.clone();
        }
        match self.backend.fetch_marker_coordinates().await {
            Ok(coords) => {
                let markers = MarkerSet::from(coords);
                log::info!("Fetched {} alignment markers", markers.len());
                self.cache.store_markers(markers.clone());
                markers
            }
            Err(e) => {
                log::warn!("Could not fetch alignment markers: {e}");
                MarkerSet::empty()
            }
        }
    }

    /// The full calibration flow: shoulder width entry followed by the
    /// capture loop against `/calibration_page`.
    pub async fn calibrate(&mut self) -> Result<(), WorkflowError> {
        match self.entry_path()? {
            EntryPath::Returning(width) => {
                log::info!("Found stored shoulder width: {width}");
                if prompt_yes_no("Continue with the stored measurement? [Y/n] ")? {
                    self.continue_with_existing(width).await?;
                } else {
                    self.store.clear()?;
                    let width = prompt_width()?;
                    self.submit_new_width(width).await?;
                }
            }
            EntryPath::NewMeasurement => {
                let width = prompt_width()?;
                self.submit_new_width(width).await?;
            }
        }

        let outcome = self
            .run_capture(CaptureFlow::Calibration, MarkerSet::empty())
            .await?;
        if outcome == SessionOutcome::Complete {
            log::info!("Calibration complete; run `measure` to capture measurements");
        }
        Ok(())
    }

    /// The measurement flow: capture loop with marker overlay against
    /// `/process_frame`, then reading submission after the advance delay.
    pub async fn measure(&mut self, reading_id: Option<String>) -> Result<(), WorkflowError> {
        let markers = self.ensure_markers().await;
        let outcome = self.run_capture(CaptureFlow::Measurement, markers).await?;

        if outcome == SessionOutcome::Shutdown {
            log::info!("Measurement stopped before completion");
            return Ok(());
        }

        log::info!(
            "Measurement satisfied; submitting reading in {:.1}s",
            self.config.advance_delay().as_secs_f64()
        );
        tokio::time::sleep(self.config.advance_delay()).await;

        let id = match reading_id {
            Some(id) => id,
            None => prompt_nonempty("Reading ID: ")?,
        };
        self.submit_reading(&id).await
    }

    /// Submit a reading ID.
    pub async fn submit_reading(&self, id: &str) -> Result<(), WorkflowError> {
        self.backend.submit_reading_id(id).await?;
        log::info!("Reading submitted for {id}");
        Ok(())
    }

    /// Clear the stored measurement.
    pub fn reset(&self) -> Result<(), WorkflowError> {
        self.store.clear()?;
        log::info!("Stored measurement cleared");
        Ok(())
    }

    /// Run one capture session on a freshly opened camera.
    async fn run_capture(
        &self,
        flow: CaptureFlow,
        markers: MarkerSet,
    ) -> Result<SessionOutcome, WorkflowError> {
        let factory = self.camera_factory();
        let source = factory()?;

        let (tx, rx) = mpsc::channel(4);
        let reader = spawn_command_reader(tx);
        log::info!("Capture running; 'r' then Enter recalibrates, 'q' then Enter stops");

        let session = CaptureSession::new(
            flow,
            self.backend.clone(),
            source,
            factory,
            markers,
            self.config.clone(),
        );
        let outcome = session.run(rx).await;
        reader.abort();

        Ok(outcome?)
    }

    fn camera_factory(&self) -> SourceFactory {
        let index = self.config.camera_index;
        let width = self.config.frame_width;
        let height = self.config.frame_height;
        Box::new(move || {
            CameraCapture::open(index, width, height)
                .map(|capture| Box::new(capture) as Box<dyn FrameSource>)
        })
    }
}

/// Forward stdin lines as session commands while a capture loop runs.
fn spawn_command_reader(tx: mpsc::Sender<SessionCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "r" | "recalibrate" => SessionCommand::Recalibrate,
                "q" | "quit" => SessionCommand::Shutdown,
                _ => continue,
            };
            if tx.send(command).await.is_err() {
                break;
            }
        }
    })
}

fn prompt_line(message: &str) -> Result<String, std::io::Error> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line)
}

fn prompt_yes_no(message: &str) -> Result<bool, std::io::Error> {
    let line = prompt_line(message)?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

fn prompt_width() -> Result<f64, std::io::Error> {
    loop {
        let line = prompt_line("Shoulder width (cm): ")?;
        match line.trim().parse::<f64>() {
            Ok(width) if width > 0.0 => return Ok(width),
            _ => eprintln!("Enter a positive number."),
        }
    }
}

fn prompt_nonempty(message: &str) -> Result<String, std::io::Error> {
    loop {
        let line = prompt_line(message)?;
        let value = line.trim();
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::StubBackend;
    use crate::api::MarkerCoordinates;

    fn workflow_in(dir: &tempfile::TempDir, backend: StubBackend) -> Workflow<StubBackend> {
        let store = MeasurementStore::with_path(dir.path().join("measurements.json"));
        Workflow::new(AgentConfig::default(), backend, store)
    }

    #[tokio::test]
    async fn width_is_persisted_before_backend_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::default();
        *backend.reject_widths.lock().unwrap() = Some("backend unavailable".to_string());
        let workflow = workflow_in(&dir, backend);

        let result = workflow.submit_new_width(41.5).await;
        assert!(result.is_err());
        // The local write happened anyway.
        assert_eq!(workflow.store().shoulder_width().unwrap(), Some(41.5));
    }

    #[tokio::test]
    async fn stored_width_routes_to_returning_path() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = workflow_in(&dir, StubBackend::default());

        assert_eq!(workflow.entry_path().unwrap(), EntryPath::NewMeasurement);
        workflow.store().save_shoulder_width(38.0).unwrap();
        assert_eq!(workflow.entry_path().unwrap(), EntryPath::Returning(38.0));
    }

    #[tokio::test]
    async fn existing_width_goes_to_existing_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::default();
        let workflow = workflow_in(&dir, backend.clone());

        workflow.continue_with_existing(38.0).await.unwrap();
        assert_eq!(
            *backend.widths.lock().unwrap(),
            vec![(38.0, MeasurementKind::Existing)]
        );
    }

    #[tokio::test]
    async fn markers_fetched_once_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::default();
        *backend.markers.lock().unwrap() = Some(
            serde_json::from_str::<MarkerCoordinates>(
                r#"{"coordinates": {"Left Shoulder": [120.0, 80.0]}}"#,
            )
            .unwrap(),
        );
        let mut workflow = workflow_in(&dir, backend.clone());

        let first = workflow.ensure_markers().await;
        let second = workflow.ensure_markers().await;

        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
        assert_eq!(
            backend
                .marker_fetches
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn failed_marker_fetch_yields_empty_set_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::default();
        let mut workflow = workflow_in(&dir, backend.clone());

        let markers = workflow.ensure_markers().await;
        assert!(markers.is_empty());

        // Not cached, so the next call tries again.
        workflow.ensure_markers().await;
        assert_eq!(
            backend
                .marker_fetches
                .load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }

    #[tokio::test]
    async fn reading_submission_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::default();
        let workflow = workflow_in(&dir, backend.clone());

        workflow.submit_reading("user-17").await.unwrap();
        assert_eq!(
            *backend.reading_ids.lock().unwrap(),
            vec!["user-17".to_string()]
        );
    }
}
