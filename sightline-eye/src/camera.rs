//! Camera device ownership and frame capture

use crate::config::VisionConfig;
use crate::error::VisionError;
use crate::frame::Frame;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_HANDOFF_MS: u64 = 2000;

/// An opened camera device
pub trait FrameCapture: Send {
    /// Read the next frame; an error means the device is no longer usable
    fn read(&mut self) -> Result<Frame, VisionError>;
}

/// Something that can open the camera device
pub trait FrameSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameCapture>, VisionError>;

    fn name(&self) -> &str;
}

/// Frame source used when no camera backend is compiled in
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl FrameSource for UnavailableSource {
    fn open(&self) -> Result<Box<dyn FrameCapture>, VisionError> {
        Err(VisionError::Camera(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// Serializes access to the single camera device.
///
/// Every capture goes through `device_lock`, which is held for one
/// capture cycle at a time so that stop requests are observed between
/// cycles. At most one [`CameraSession`] owns the device; a new session
/// waits up to the hand-off timeout for the previous one to release it.
pub struct CameraManager {
    source: Arc<dyn FrameSource>,
    device_lock: Mutex<()>,
    session_open: Mutex<bool>,
    session_closed: Condvar,
    handoff_timeout: Duration,
}

impl CameraManager {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            device_lock: Mutex::new(()),
            session_open: Mutex::new(false),
            session_closed: Condvar::new(),
            handoff_timeout: Duration::from_millis(DEFAULT_HANDOFF_MS),
        }
    }

    /// How long [`open_session`](Self::open_session) waits for the previous
    /// session to release the device
    pub fn with_handoff_timeout(mut self, timeout: Duration) -> Self {
        self.handoff_timeout = timeout;
        self
    }

    /// Build the frame source selected at compile time
    pub fn from_config(config: &VisionConfig) -> Self {
        let handoff = config.handoff_timeout();

        #[cfg(feature = "opencv")]
        {
            let source = opencv_source::OpenCvSource::new(config.camera_id, config.resolution);
            return Self::new(Arc::new(source)).with_handoff_timeout(handoff);
        }

        #[cfg(not(feature = "opencv"))]
        {
            warn!(
                "No camera backend compiled in, camera {} unavailable (enable the `opencv` feature)",
                config.camera_id
            );
            Self::new(Arc::new(UnavailableSource::new(
                "No camera backend compiled in (enable the `opencv` feature)",
            )))
            .with_handoff_timeout(handoff)
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Open the device for a streaming session.
    ///
    /// The device stays open until the returned session is released or
    /// dropped. Fails if the previous session still holds it after the
    /// hand-off timeout.
    pub fn open_session(self: &Arc<Self>) -> Result<CameraSession, VisionError> {
        self.claim_session()?;

        let capture = {
            let _guard = self.device_lock.lock();
            self.source.open()
        };
        let capture = match capture {
            Ok(capture) => capture,
            Err(e) => {
                self.session_released();
                return Err(e);
            }
        };

        info!("Camera session opened on {}", self.source.name());
        Ok(CameraSession {
            camera: self.clone(),
            capture: Some(capture),
        })
    }

    fn claim_session(&self) -> Result<(), VisionError> {
        let mut open = self.session_open.lock();
        if *open {
            debug!("Waiting for the previous camera session to release the device");
            let deadline = Instant::now() + self.handoff_timeout;
            while *open {
                if self.session_closed.wait_until(&mut open, deadline).timed_out() {
                    break;
                }
            }
            if *open {
                return Err(VisionError::Camera(format!(
                    "Camera still held by the previous session after {:?}",
                    self.handoff_timeout
                )));
            }
        }
        *open = true;
        Ok(())
    }

    fn session_released(&self) {
        *self.session_open.lock() = false;
        self.session_closed.notify_all();
    }

    /// Whether a streaming session currently owns the device
    pub fn has_session(&self) -> bool {
        *self.session_open.lock()
    }

    /// Grab a single frame: open, read, release, all under the device lock
    pub fn capture_single(&self) -> Result<Frame, VisionError> {
        let _guard = self.device_lock.lock();
        let mut capture = self.source.open()?;
        let frame = capture.read();
        drop(capture);
        debug!("Single frame capture finished");
        frame
    }

    /// Check that the device can be opened, releasing it immediately
    pub fn health_check(&self) -> Result<(), VisionError> {
        let capture = self.source.open()?;
        drop(capture);
        Ok(())
    }
}

/// An open camera device owned by one streaming session
pub struct CameraSession {
    camera: Arc<CameraManager>,
    capture: Option<Box<dyn FrameCapture>>,
}

impl CameraSession {
    /// Run one capture cycle.
    ///
    /// The device lock is held while the frame is read and while `process`
    /// runs, and released before this returns. A read failure releases the
    /// device; later cycles fail immediately.
    pub fn cycle<T>(&mut self, process: impl FnOnce(Frame) -> T) -> Result<T, VisionError> {
        let camera = Arc::clone(&self.camera);
        let _guard = camera.device_lock.lock();
        let read = match self.capture.as_mut() {
            Some(capture) => capture.read(),
            None => return Err(VisionError::Camera("Camera session already released".to_string())),
        };

        match read {
            Ok(frame) => Ok(process(frame)),
            Err(e) => {
                warn!("Camera read failed, releasing device: {}", e);
                self.close_device();
                Err(e)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    /// Release the device
    pub fn release(&mut self) {
        if self.capture.is_some() {
            let camera = Arc::clone(&self.camera);
            let _guard = camera.device_lock.lock();
            self.close_device();
            info!("Camera session released");
        }
    }

    /// Drop the capture, then hand the device to the next session
    fn close_device(&mut self) {
        if let Some(capture) = self.capture.take() {
            drop(capture);
            self.camera.session_released();
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(feature = "opencv")]
pub mod opencv_source {
    //! OpenCV `VideoCapture` backend

    use super::{FrameCapture, FrameSource};
    use crate::error::VisionError;
    use crate::frame::Frame;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
    };
    use tracing::info;

    pub struct OpenCvSource {
        camera_id: u32,
        resolution: (u32, u32),
    }

    impl OpenCvSource {
        pub fn new(camera_id: u32, resolution: (u32, u32)) -> Self {
            Self { camera_id, resolution }
        }
    }

    impl FrameSource for OpenCvSource {
        fn open(&self) -> Result<Box<dyn FrameCapture>, VisionError> {
            let mut capture = VideoCapture::new(self.camera_id as i32, CAP_ANY)
                .map_err(|e| VisionError::Camera(format!("Failed to open camera {}: {}", self.camera_id, e)))?;

            if !capture.is_opened()? {
                return Err(VisionError::Camera(format!("Camera {} failed to open", self.camera_id)));
            }

            capture
                .set(CAP_PROP_FRAME_WIDTH, self.resolution.0 as f64)
                .map_err(|e| VisionError::Camera(format!("Failed to set width: {}", e)))?;
            capture
                .set(CAP_PROP_FRAME_HEIGHT, self.resolution.1 as f64)
                .map_err(|e| VisionError::Camera(format!("Failed to set height: {}", e)))?;

            info!(
                "Camera {} opened at {}x{}",
                self.camera_id, self.resolution.0, self.resolution.1
            );
            Ok(Box::new(OpenCvCapture { capture }))
        }

        fn name(&self) -> &str {
            "opencv"
        }
    }

    struct OpenCvCapture {
        capture: VideoCapture,
    }

    impl FrameCapture for OpenCvCapture {
        fn read(&mut self) -> Result<Frame, VisionError> {
            let mut bgr = Mat::default();
            let grabbed = self
                .capture
                .read(&mut bgr)
                .map_err(|e| VisionError::Camera(format!("Failed to read frame: {}", e)))?;
            if !grabbed || bgr.empty() {
                return Err(VisionError::Camera("Camera returned no frame".to_string()));
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

            let width = rgb.cols() as u32;
            let height = rgb.rows() as u32;
            let data = if rgb.is_continuous() {
                rgb.data_bytes()?.to_vec()
            } else {
                rgb.try_clone()?.data_bytes()?.to_vec()
            };
            Frame::from_rgb_bytes(width, height, data)
        }
    }

    impl Drop for OpenCvCapture {
        fn drop(&mut self) {
            let _ = self.capture.release();
        }
    }
}
