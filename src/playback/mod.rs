//! Timed playback of a decoded narration buffer.
//!
//! ```text
//!  DecodedAudio (hound) ──load──► TimedPlaybackController<Clock, Sink>
//!                                   │ play / pause / seek / replay
//!                                   ▼
//!                           dyn PlaybackSource ──natural end (generation)──┐
//!                                                                          │
//!                                   ◄─────────── ended channel ────────────┘
//! ```

pub mod audio;
pub mod clock;
pub mod controller;
pub mod cpal_sink;
pub mod sink;

use thiserror::Error;

pub use audio::DecodedAudio;
pub use clock::{MonotonicClock, PlaybackClock};
pub use controller::TimedPlaybackController;
pub use cpal_sink::CpalPlaybackSink;
pub use sink::{EndedSender, PlaybackSink, PlaybackSource};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio buffer loaded")]
    NoBuffer,

    #[error("no output device found on the default audio host")]
    NoOutputDevice,

    #[error("audio output failed: {0}")]
    Stream(String),

    #[error("failed to decode audio: {0}")]
    Decode(String),
}
