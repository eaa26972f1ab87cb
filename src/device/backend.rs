//! Hardware port of the media device controller.
//!
//! [`MediaBackend`] acquires streams, [`MediaStream`] is one live
//! camera/microphone stream, and [`ClipRecorder`] encodes one clip from it.
//! The controller only ever talks to these traits, so the real hardware
//! (see [`crate::device::CpalMediaBackend`]) and the test double
//! ([`MockBackend`], `#[cfg(test)]`) are interchangeable.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::CaptureConfig;
use crate::device::zoom::ZoomCapability;

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

/// Failure reported by a backend, in the backend's own vocabulary.
///
/// Acquisition failures are mapped onto [`crate::device::DeviceError`] by the
/// controller; every other use is logged or wrapped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// The user or the platform refused access.
    #[error("access denied: {0}")]
    PermissionDenied(String),

    /// No device satisfies the requested tracks.
    #[error("no matching device: {0}")]
    NotFound(String),

    /// The device exists but could not be opened (usually held elsewhere).
    #[error("device not readable: {0}")]
    NotReadable(String),

    /// Media capture is only available from a secure context.
    #[error("media capture requires a secure context")]
    InsecureContext,

    /// The host has no media capture API at all.
    #[error("media capture unsupported: {0}")]
    Unsupported(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// Which way the camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera.
    Environment,
    /// Front (selfie) camera.
    User,
}

impl FacingMode {
    /// Parse a config value; anything unknown means the rear camera.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => FacingMode::User,
            _ => FacingMode::Environment,
        }
    }
}

/// Video part of a stream request. `None` fields mean "no constraint".
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConstraints {
    pub facing: Option<FacingMode>,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
    /// Ask the device to expose its zoom capability.
    pub zoom: bool,
}

/// A stream request handed to [`MediaBackend::acquire`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConstraints {
    pub audio: bool,
    pub video: Option<VideoConstraints>,
}

impl StreamConstraints {
    /// Combined audio + video, rear-facing, ideal resolution, zoom-capable.
    pub fn preferred(config: &CaptureConfig) -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints {
                facing: Some(FacingMode::parse(&config.facing_mode)),
                ideal_width: Some(config.ideal_width),
                ideal_height: Some(config.ideal_height),
                zoom: true,
            }),
        }
    }

    /// Minimal retry request: any camera, no audio, no constraints.
    pub fn fallback() -> Self {
        Self {
            audio: false,
            video: Some(VideoConstraints {
                facing: None,
                ideal_width: None,
                ideal_height: None,
                zoom: false,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Port traits
// ---------------------------------------------------------------------------

/// Sender a recorder pushes encoded chunks into, in order.
pub type ChunkSender = mpsc::UnboundedSender<Vec<u8>>;

/// Acquires media streams.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Open a new stream satisfying `constraints`.
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, BackendError>;

    /// Whether clips can be encoded as `mime_type`.
    fn is_type_supported(&self, mime_type: &str) -> bool;
}

/// One live camera/microphone stream.
#[async_trait]
pub trait MediaStream: Send {
    /// Hardware zoom range of the video track, if it has one.
    fn zoom_capability(&self) -> Option<ZoomCapability>;

    /// Apply a zoom level to the video track.
    async fn apply_zoom(&mut self, zoom: f64) -> Result<(), BackendError>;

    /// Size of the most recently decoded video frame; `(0, 0)` until the
    /// first frame has been decoded (or when there is no video track).
    fn frame_size(&self) -> (u32, u32);

    /// Rasterise the current frame into a lossy still image.
    fn grab_frame(&mut self, quality: f32) -> Result<Vec<u8>, BackendError>;

    /// Start encoding the stream. `mime_type = None` lets the recorder pick
    /// its default encoding.
    fn start_recorder(
        &mut self,
        mime_type: Option<&str>,
        chunks: ChunkSender,
    ) -> Result<Box<dyn ClipRecorder>, BackendError>;

    /// Stop every track. Safe to call more than once.
    fn stop_tracks(&mut self);
}

/// An in-progress clip encoding.
#[async_trait]
pub trait ClipRecorder: Send {
    /// Encoding actually in use; may be empty when the recorder cannot say.
    fn mime_type(&self) -> String;

    /// Stop encoding. Resolves once the final chunk has been sent. Consumes
    /// the recorder, so a recording can be stopped at most once.
    async fn stop(self: Box<Self>) -> Result<(), BackendError>;
}

// Compile-time assertion: the ports must be usable as trait objects.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn MediaBackend>, _: Box<dyn MediaStream>, _: Box<dyn ClipRecorder>) {}
};

// ---------------------------------------------------------------------------
// MockBackend (tests only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{MockBackend, MockState};


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
