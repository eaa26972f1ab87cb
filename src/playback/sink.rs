//! Output port of the playback controller.
//!
//! A [`PlaybackSink`] turns a decoded buffer into a running
//! [`PlaybackSource`]. When a source reaches the end of the buffer on its own
//! it sends its `generation` on the `ended` channel; a source that was
//! stopped must not.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::playback::{DecodedAudio, PlaybackError};

/// Channel a source reports natural end-of-buffer on.
pub type EndedSender = mpsc::UnboundedSender<u64>;

pub trait PlaybackSink: Send {
    /// Start playing `audio` from `offset_secs`.
    fn start(
        &mut self,
        audio: Arc<DecodedAudio>,
        offset_secs: f64,
        generation: u64,
        ended: EndedSender,
    ) -> Result<Box<dyn PlaybackSource>, PlaybackError>;
}

/// One running playback node.
pub trait PlaybackSource: Send {
    /// Silence the source. Safe to call more than once.
    fn stop(&mut self);
}

// Compile-time assertion: both ports must be usable as trait objects.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PlaybackSink>, _: Box<dyn PlaybackSource>) {}
};

#[cfg(test)]
pub use mock::{MockSink, MockSinkState};
