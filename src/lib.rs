//! VisionAlly: an accessibility assistant that records a short clip, has a
//! remote multimodal model describe it, and speaks the description.
//!
//! * [`device`]: camera/microphone stream, zoom, frames and clip recording.
//! * [`playback`]: timed playback of decoded narration audio.
//! * [`analysis`]: the remote analysis collaborator.
//! * [`voice`]: routing of recognised speech to commands.
//! * [`session`]: the state machine tying it all together.
//! * [`config`]: settings loaded from `settings.toml`.
//! * [`cli`]: the line-oriented console front end.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod device;
pub mod playback;
pub mod session;
pub mod voice;
