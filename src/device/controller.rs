//! [`MediaDeviceController`] — owner of the single live camera/microphone
//! stream.
//!
//! Responsibilities:
//!
//! * stream lifecycle ([`activate`](MediaDeviceController::activate) /
//!   [`deactivate`](MediaDeviceController::deactivate)), with a one-shot
//!   fallback request when the preferred configuration is refused;
//! * zoom, clamped to the capability discovered at activation;
//! * still frames with a bounded readiness poll;
//! * clip recording into a [`RecordingBuffer`].
//!
//! No other component touches the stream; everything goes through here.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::CaptureConfig;
use crate::device::backend::{
    BackendError, ClipRecorder, MediaBackend, MediaStream, StreamConstraints,
};
use crate::device::recorder::{select_encoding, ClipPayload, RecordingBuffer};
use crate::device::zoom::ZoomCapability;

/// Most stills one frame sequence will capture.
pub const MAX_FRAME_SEQUENCE: usize = 100;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Why the camera/microphone could not be acquired.
///
/// Surfaced to the user as "camera unavailable" together with a retry
/// action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("camera access was denied")]
    Permission,

    #[error("no camera was found")]
    NotFound,

    #[error("the camera is in use by another application")]
    InUse,

    #[error("camera access requires a secure context")]
    InsecureContext,

    #[error("camera capture is not supported on this host")]
    Unsupported,

    #[error("the camera could not be started")]
    Unknown,
}

impl From<&BackendError> for DeviceError {
    fn from(err: &BackendError) -> Self {
        match err {
            BackendError::PermissionDenied(_) => DeviceError::Permission,
            BackendError::NotFound(_) => DeviceError::NotFound,
            BackendError::NotReadable(_) => DeviceError::InUse,
            BackendError::InsecureContext => DeviceError::InsecureContext,
            BackendError::Unsupported(_) => DeviceError::Unsupported,
            BackendError::Other(_) => DeviceError::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Frame / recording mechanics failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// No decoded video frame became available within the poll budget.
    #[error("video not ready")]
    NotReady,

    /// `stop_recording` was called with no recording in progress.
    #[error("recorder inactive")]
    RecorderInactive,

    /// The recorder failed while flushing the clip.
    #[error("recorder failed: {0}")]
    RecorderFailed(String),
}

// ---------------------------------------------------------------------------
// Session / recording bookkeeping
// ---------------------------------------------------------------------------

/// The live stream plus what was discovered about it at activation.
struct CaptureSession {
    stream: Box<dyn MediaStream>,
    zoom: Option<ZoomCapability>,
    current_zoom: f64,
}

/// A recorder that has been started and not yet stopped.
struct ActiveRecording {
    recorder: Box<dyn ClipRecorder>,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// MediaDeviceController
// ---------------------------------------------------------------------------

/// Owns at most one live stream and at most one recording on it.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use visionally::config::CaptureConfig;
/// use visionally::device::{CpalMediaBackend, MediaDeviceController};
///
/// # async fn example() {
/// let mut device = MediaDeviceController::new(
///     Arc::new(CpalMediaBackend::new()),
///     CaptureConfig::default(),
/// );
/// device.activate().await.expect("camera unavailable");
/// device.start_recording();
/// // ...
/// let clip = device.stop_recording().await.unwrap();
/// println!("{} bytes of {}", clip.len(), clip.mime_type);
/// # }
/// ```
pub struct MediaDeviceController {
    backend: Arc<dyn MediaBackend>,
    config: CaptureConfig,
    session: Option<CaptureSession>,
    recording: Option<ActiveRecording>,
    buffer: RecordingBuffer,
}

impl MediaDeviceController {
    pub fn new(backend: Arc<dyn MediaBackend>, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            session: None,
            recording: None,
            buffer: RecordingBuffer::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Stream lifecycle
    // -----------------------------------------------------------------------

    /// Acquire a stream, tearing down any previous one first.
    ///
    /// Tries the preferred audio + video configuration, then once more with
    /// the minimal video-only fallback. The error reported is the one from
    /// the last attempt.
    pub async fn activate(&mut self) -> Result<(), DeviceError> {
        self.deactivate();

        let preferred = StreamConstraints::preferred(&self.config);
        let stream = match self.backend.acquire(&preferred).await {
            Ok(stream) => stream,
            Err(first) => {
                log::info!("device: preferred stream refused ({first}); retrying with fallback");
                match self.backend.acquire(&StreamConstraints::fallback()).await {
                    Ok(stream) => stream,
                    Err(second) => {
                        // A fallback the host cannot serve says nothing about
                        // why the preferred request was denied.
                        let err = match second {
                            BackendError::NotFound(_) | BackendError::Unsupported(_) => first,
                            other => other,
                        };
                        log::error!("device: stream acquisition failed: {err}");
                        return Err(DeviceError::from(&err));
                    }
                }
            }
        };

        let zoom = stream.zoom_capability().filter(ZoomCapability::is_usable);
        let current_zoom = zoom.map(|caps| caps.min).unwrap_or(1.0);
        match zoom {
            Some(caps) => log::info!(
                "device: stream active, zoom {:.2}..{:.2} step {:.2}",
                caps.min,
                caps.max,
                caps.step
            ),
            None => log::info!("device: stream active, no zoom capability"),
        }

        self.session = Some(CaptureSession {
            stream,
            zoom,
            current_zoom,
        });
        Ok(())
    }

    /// Stop every track and forget the stream. Idempotent.
    pub fn deactivate(&mut self) {
        self.recording = None;
        if let Some(mut session) = self.session.take() {
            session.stream.stop_tracks();
            log::debug!("device: stream stopped");
        }
    }

    /// `true` while a stream is live.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// `true` while a recorder is running.
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    // -----------------------------------------------------------------------
    // Zoom
    // -----------------------------------------------------------------------

    /// Zoom range discovered at activation, if any.
    pub fn zoom_capability(&self) -> Option<ZoomCapability> {
        self.session.as_ref().and_then(|s| s.zoom)
    }

    /// Current zoom level; `None` without a zoom-capable stream.
    pub fn current_zoom(&self) -> Option<f64> {
        self.session
            .as_ref()
            .filter(|s| s.zoom.is_some())
            .map(|s| s.current_zoom)
    }

    pub async fn zoom_in(&mut self) {
        self.zoom_by(1.0).await;
    }

    pub async fn zoom_out(&mut self) {
        self.zoom_by(-1.0).await;
    }

    /// Request an absolute zoom level, clamped to the capability range.
    /// No-op without a zoom-capable stream; hardware failures are logged.
    pub async fn set_zoom(&mut self, zoom: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(caps) = session.zoom else {
            return;
        };

        let clamped = caps.clamp(zoom);
        session.current_zoom = clamped;
        if let Err(err) = session.stream.apply_zoom(clamped).await {
            log::warn!("device: zoom {clamped:.2} not applied: {err}");
        }
    }

    async fn zoom_by(&mut self, direction: f64) {
        let Some((caps, current)) = self
            .session
            .as_ref()
            .and_then(|s| s.zoom.map(|caps| (caps, s.current_zoom)))
        else {
            return;
        };
        self.set_zoom(current + direction * caps.increment()).await;
    }

    // -----------------------------------------------------------------------
    // Still frames
    // -----------------------------------------------------------------------

    /// Capture the current video frame as a base64 lossy still.
    ///
    /// Polls for a decoded frame up to `frame_poll_attempts` more times,
    /// `frame_poll_interval_ms` apart, before giving up with
    /// [`CaptureError::NotReady`].
    pub async fn capture_still_frame(&mut self) -> Result<String, CaptureError> {
        let retries = self.config.frame_poll_attempts;
        let interval = Duration::from_millis(self.config.frame_poll_interval_ms);
        let quality = self.config.jpeg_quality;

        let Some(session) = self.session.as_mut() else {
            return Err(CaptureError::NotReady);
        };

        let mut attempt = 0;
        loop {
            let (width, height) = session.stream.frame_size();
            if width > 0 && height > 0 {
                break;
            }
            if attempt >= retries {
                log::debug!("device: no decoded frame after {retries} retries");
                return Err(CaptureError::NotReady);
            }
            attempt += 1;
            tokio::time::sleep(interval).await;
        }

        let still = session.stream.grab_frame(quality).map_err(|err| {
            log::warn!("device: frame rasterisation failed: {err}");
            CaptureError::NotReady
        })?;
        Ok(BASE64.encode(still))
    }

    /// Capture `count` stills spaced `interval` apart, at most
    /// [`MAX_FRAME_SEQUENCE`]. Frames that fail are skipped, so the result
    /// may hold fewer entries.
    pub async fn capture_frame_sequence(&mut self, count: usize, interval: Duration) -> Vec<String> {
        if count > MAX_FRAME_SEQUENCE {
            log::warn!("device: frame sequence of {count} capped at {MAX_FRAME_SEQUENCE}");
        }
        let count = count.min(MAX_FRAME_SEQUENCE);
        let mut frames = Vec::new();
        for i in 0..count {
            match self.capture_still_frame().await {
                Ok(frame) => frames.push(frame),
                Err(err) => log::warn!("device: frame {i} skipped: {err}"),
            }
            if i + 1 < count {
                tokio::time::sleep(interval).await;
            }
        }
        frames
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Start a new recording. No-op without a live stream.
    ///
    /// Any recording still running is discarded and the chunk buffer is
    /// emptied first. The encoding is the first supported entry of
    /// `codec_preferences`, or the recorder's own default.
    pub fn start_recording(&mut self) {
        let Some(session) = self.session.as_mut() else {
            log::warn!("device: start_recording ignored, no active stream");
            return;
        };

        self.recording = None;
        self.buffer.clear();

        let backend = Arc::clone(&self.backend);
        let mime = select_encoding(&self.config.codec_preferences, |m| {
            backend.is_type_supported(m)
        });

        let (tx, rx) = mpsc::unbounded_channel();
        match session.stream.start_recorder(mime, tx) {
            Ok(recorder) => {
                log::info!(
                    "device: recording started ({})",
                    mime.unwrap_or("recorder default")
                );
                self.recording = Some(ActiveRecording {
                    recorder,
                    chunks: rx,
                });
            }
            Err(err) => log::error!("device: failed to start recording: {err}"),
        }
    }

    /// Stop the running recording and assemble the clip.
    ///
    /// Fails with [`CaptureError::RecorderInactive`] when nothing is being
    /// recorded, including a second call after a successful stop.
    pub async fn stop_recording(&mut self) -> Result<ClipPayload, CaptureError> {
        let ActiveRecording {
            recorder,
            mut chunks,
        } = self.recording.take().ok_or(CaptureError::RecorderInactive)?;

        let mime = recorder.mime_type();
        recorder.stop().await.map_err(|err| {
            log::error!("device: recorder stop failed: {err}");
            CaptureError::RecorderFailed(err.to_string())
        })?;

        while let Ok(chunk) = chunks.try_recv() {
            self.buffer.push(chunk);
        }

        let clip = self.buffer.flush(&mime);
        log::info!(
            "device: recording stopped, {} bytes of {} ({})",
            clip.len(),
            clip.mime_type,
            clip.url
        );
        Ok(clip)
    }

    /// Drop the running recording, if any, without producing a clip.
    pub fn discard_recording(&mut self) {
        if self.recording.take().is_some() {
            self.buffer.clear();
            log::debug!("device: recording discarded");
        }
    }
}

impl Drop for MediaDeviceController {
    fn drop(&mut self) {
        self.deactivate();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
