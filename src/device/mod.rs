//! Media device layer: camera/microphone stream lifecycle, zoom, still
//! frames and clip recording.
//!
//! ```text
//!  SessionStateMachine
//!        │
//!        ▼
//!  MediaDeviceController ──► dyn MediaBackend ──► dyn MediaStream ──► dyn ClipRecorder
//!        │                     (CpalMediaBackend on the host)
//!        └── RecordingBuffer ──flush──► ClipPayload
//! ```

pub mod backend;
pub mod controller;
pub mod cpal_backend;
pub mod recorder;
pub mod zoom;

pub use backend::{
    BackendError, ChunkSender, ClipRecorder, FacingMode, MediaBackend, MediaStream,
    StreamConstraints, VideoConstraints,
};
pub use controller::{CaptureError, DeviceError, MediaDeviceController, MAX_FRAME_SEQUENCE};
pub use cpal_backend::{encode_wav, CpalMediaBackend, WAV_MIME};
pub use recorder::{
    extension_for_mime, select_encoding, ClipPayload, RecordingBuffer, DEFAULT_CLIP_MIME,
};
pub use zoom::ZoomCapability;

#[cfg(test)]
pub use backend::{MockBackend, MockState};
