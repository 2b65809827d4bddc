//! The frame capture loop.
//!
//! `CaptureSession` owns everything one capture loop needs: the frame
//! source, the marker overlay, the completion flag, and the backend
//! handle. Each tick renders the latest frame, composites the markers,
//! and submits the JPEG to the flow's status endpoint. The backend's
//! sentinel color terminates the loop; an explicit command recalibrates
//! or shuts it down.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbaImage};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::api::{Backend, FrameStatus, StatusEndpoint};
use crate::camera::{CameraError, FrameSource};
use crate::config::AgentConfig;
use crate::overlay::MarkerSet;

/// Which capture workflow the loop is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFlow {
    /// Initial camera/subject alignment.
    Calibration,
    /// Measurement capture with marker overlay.
    Measurement,
}

impl CaptureFlow {
    /// Status endpoint frames are submitted to.
    pub fn status_endpoint(&self) -> StatusEndpoint {
        match self {
            CaptureFlow::Calibration => StatusEndpoint::CalibrationPage,
            CaptureFlow::Measurement => StatusEndpoint::ProcessFrame,
        }
    }
}

/// Commands a running session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Release the camera, ask the backend to reset, re-acquire after
    /// the configured delay, and clear the completion flag.
    Recalibrate,
    /// Stop the loop.
    Shutdown,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The sentinel color was reached.
    Complete,
    /// The loop was stopped by command before completion.
    Shutdown,
}

/// Result of a single capture tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    /// Nothing was submitted (frame not ready or encode/send failed).
    Skipped,
    /// A frame was processed without reaching the sentinel.
    Continue,
    /// The backend reported the sentinel color.
    Sentinel,
}

/// Builds a fresh frame source, used when recalibration re-acquires
/// the camera.
pub type SourceFactory = Box<dyn Fn() -> Result<Box<dyn FrameSource>, CameraError> + Send>;

/// Session errors. Per-tick failures are logged and skipped; only
/// camera re-acquisition is fatal.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("camera re-acquisition failed: {0}")]
    Reacquire(#[from] CameraError),
}

/// One capture loop and all of its state.
pub struct CaptureSession<B> {
    flow: CaptureFlow,
    backend: B,
    source: Box<dyn FrameSource>,
    source_factory: SourceFactory,
    markers: MarkerSet,
    completed: bool,
    config: AgentConfig,
}

impl<B: Backend> CaptureSession<B> {
    pub fn new(
        flow: CaptureFlow,
        backend: B,
        source: Box<dyn FrameSource>,
        source_factory: SourceFactory,
        markers: MarkerSet,
        config: AgentConfig,
    ) -> Self {
        Self {
            flow,
            backend,
            source,
            source_factory,
            markers,
            completed: false,
            config,
        }
    }

    /// Run the capture loop until the sentinel arrives or a shutdown
    /// command is received.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> Result<SessionOutcome, SessionError> {
        let mut ticker = time::interval(self.config.capture_interval());
        // Each request is awaited in-line, so at most one is in flight;
        // ticks that come due while a request is pending are dropped.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.completed {
                        continue;
                    }
                    if self.tick().await == TickOutcome::Sentinel {
                        self.completed = true;
                        self.source.stop();
                        match self.flow {
                            CaptureFlow::Measurement => return Ok(SessionOutcome::Complete),
                            CaptureFlow::Calibration => {
                                log::info!(
                                    "Calibration satisfied; 'r' recalibrates, 'q' finishes"
                                );
                            }
                        }
                    }
                }
                command = commands.recv() => match command {
                    Some(SessionCommand::Recalibrate) => self.recalibrate().await?,
                    Some(SessionCommand::Shutdown) | None => {
                        self.source.stop();
                        return Ok(if self.completed {
                            SessionOutcome::Complete
                        } else {
                            SessionOutcome::Shutdown
                        });
                    }
                }
            }
        }
    }

    /// One capture tick: render, composite, encode, submit, apply.
    async fn tick(&mut self) -> TickOutcome {
        if !self.source.is_ready() {
            log::debug!("Frame not ready yet");
            return TickOutcome::Skipped;
        }
        let Some(frame) = self.source.latest_frame() else {
            return TickOutcome::Skipped;
        };
        let Some(mut canvas) = frame.into_image() else {
            log::error!("Captured frame has inconsistent dimensions");
            return TickOutcome::Skipped;
        };

        self.markers.draw(&mut canvas, self.config.marker_radius);

        let jpeg = match encode_jpeg(canvas, self.config.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                log::error!("Failed to encode frame: {e}");
                return TickOutcome::Skipped;
            }
        };

        match self
            .backend
            .submit_frame(self.flow.status_endpoint(), jpeg)
            .await
        {
            Ok(status) => self.apply_status(status),
            Err(e) => {
                log::error!("Error sending frame: {e}");
                TickOutcome::Continue
            }
        }
    }

    /// Apply a backend response to the session.
    fn apply_status(&self, status: FrameStatus) -> TickOutcome {
        if !status.success {
            log::error!(
                "Frame processing error: {}",
                status.error.as_deref().unwrap_or("unknown")
            );
            return TickOutcome::Continue;
        }

        match status.background_color {
            Some(color) if is_sentinel(&color, &self.config.sentinel_color) => {
                log::info!("Alignment satisfied ({color})");
                TickOutcome::Sentinel
            }
            Some(color) => {
                log::debug!("Alignment signal: {color}");
                TickOutcome::Continue
            }
            None => TickOutcome::Continue,
        }
    }

    /// Release the camera, reset the backend, and restart capture with
    /// the completion flag cleared.
    async fn recalibrate(&mut self) -> Result<(), SessionError> {
        log::info!("Recalibration requested");
        self.source.stop();

        if let Err(e) = self.backend.request_recalibration().await {
            log::error!("Recalibration request failed: {e}");
        }

        // Give the backend time to reset before the camera comes back.
        time::sleep(self.config.restart_delay()).await;

        self.source = (self.source_factory)()?;
        self.completed = false;
        log::info!("Capture restarted");
        Ok(())
    }
}

/// Whether a reported color matches the sentinel.
fn is_sentinel(color: &str, sentinel: &str) -> bool {
    color.trim().eq_ignore_ascii_case(sentinel.trim())
}

/// Encode a composited frame as JPEG.
fn encode_jpeg(canvas: RgbaImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let rgb = image::DynamicImage::ImageRgba8(canvas).into_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}
