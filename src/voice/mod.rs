//! Voice command routing.
//!
//! Speech recognition itself is external; this module only decides what a
//! finalized transcript means in the current session state.

pub mod router;

pub use router::{VoiceAction, VoiceCommandRouter};
