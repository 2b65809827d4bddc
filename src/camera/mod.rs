//! Camera capture.
//!
//! Frames are captured on a background thread with the nokhwa crate and
//! published into a shared latest-frame slot the capture loop reads on
//! each tick. The device is opened before the thread reports success,
//! so permission or open failures surface before any loop starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::{Camera, NokhwaError};
use parking_lot::Mutex;

/// A captured RGBA frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGBA pixel data.
    pub data: Vec<u8>,
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
}

impl Frame {
    /// Convert into an image buffer. Returns `None` if the pixel data
    /// does not match the dimensions.
    pub fn into_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data)
    }
}

/// Source of live frames.
///
/// `CameraCapture` is the real device; tests substitute scripted sources.
pub trait FrameSource: Send {
    /// Whether at least one frame has been captured.
    fn is_ready(&self) -> bool;

    /// Latest captured frame, if any.
    fn latest_frame(&self) -> Option<Frame>;

    /// Stop capturing and release the device.
    fn stop(&mut self);
}

/// Camera errors.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("failed to open camera {index}: {source}")]
    Open {
        index: u32,
        #[source]
        source: NokhwaError,
    },
    #[error("failed to open camera stream: {0}")]
    Stream(#[source] NokhwaError),
    #[error("failed to spawn capture thread: {0}")]
    Thread(#[source] std::io::Error),
    #[error("capture thread exited before reporting readiness")]
    Disconnected,
}

struct SharedState {
    frame: Mutex<Option<Frame>>,
    ready: AtomicBool,
    running: AtomicBool,
}

/// Live camera capture on a background thread.
pub struct CameraCapture {
    state: Arc<SharedState>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CameraCapture {
    /// Open a camera and start capturing.
    ///
    /// Blocks until the device is open; an inaccessible camera is
    /// reported here, before any capture loop exists.
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self, CameraError> {
        let state = Arc::new(SharedState {
            frame: Mutex::new(None),
            ready: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });

        let (open_tx, open_rx) = mpsc::channel();
        let thread_state = state.clone();

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let camera = match open_device(index, width, height) {
                    Ok(camera) => {
                        let _ = open_tx.send(Ok(()));
                        camera
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                capture_loop(camera, thread_state);
            })
            .map_err(CameraError::Thread)?;

        match open_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                state,
                thread_handle: Some(thread_handle),
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread_handle.join();
                Err(CameraError::Disconnected)
            }
        }
    }
}

impl FrameSource for CameraCapture {
    fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::Acquire)
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.state.frame.lock().clone()
    }

    fn stop(&mut self) {
        self.state.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_device(index: u32, width: u32, height: u32) -> Result<Camera, CameraError> {
    let camera_index = CameraIndex::Index(index);

    let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::HighestResolution(
        Resolution::new(width, height),
    ));
    let mut camera = match Camera::new(camera_index.clone(), requested) {
        Ok(camera) => camera,
        Err(e) => {
            log::warn!("Requested resolution unavailable, trying any format: {e}");
            let fallback = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None);
            Camera::new(camera_index, fallback).map_err(|source| CameraError::Open {
                index,
                source,
            })?
        }
    };

    camera.open_stream().map_err(CameraError::Stream)?;

    log::info!(
        "Camera opened: {} ({}x{})",
        camera.info().human_name(),
        camera.resolution().width(),
        camera.resolution().height()
    );

    Ok(camera)
}

fn capture_loop(mut camera: Camera, state: Arc<SharedState>) {
    while state.running.load(Ordering::Acquire) {
        match camera.frame() {
            Ok(buffer) => match buffer.decode_image::<RgbAFormat>() {
                Ok(decoded) => {
                    let resolution = buffer.resolution();
                    let frame = Frame {
                        data: decoded.into_raw(),
                        width: resolution.width(),
                        height: resolution.height(),
                    };
                    *state.frame.lock() = Some(frame);
                    state.ready.store(true, Ordering::Release);
                }
                Err(e) => {
                    log::warn!("Failed to decode frame: {e}");
                }
            },
            Err(e) => {
                log::warn!("Failed to capture frame: {e}");
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    log::info!("Camera released");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_into_image() {
        let frame = Frame {
            data: vec![255; 4 * 4 * 4],
            width: 4,
            height: 4,
        };
        let image = frame.into_image().unwrap();
        assert_eq!(image.dimensions(), (4, 4));
    }

    #[test]
    fn mismatched_frame_data_is_rejected() {
        let frame = Frame {
            data: vec![0; 7],
            width: 4,
            height: 4,
        };
        assert!(frame.into_image().is_none());
    }
}
