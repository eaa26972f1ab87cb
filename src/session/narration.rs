//! Spoken output: the emphasis cleaner, the narration port, and the fixed
//! cue texts.

use std::io::Write;

/// Spoken when a credential is present at startup.
pub const READY_ANNOUNCEMENT: &str = "VisionAlly Ready. Say zoom in or zoom out to control camera.";
/// Spoken when no credential is present at startup.
pub const MISSING_KEY_ANNOUNCEMENT: &str = "System Error. API Key missing.";

pub const RECORDING_STARTED: &str = "Recording started.";
pub const PROCESSING: &str = "Processing video...";
pub const ANALYSIS_FAILED: &str = "Analysis failed. Please try again.";
pub const READY: &str = "Ready.";
pub const THINKING: &str = "Thinking...";
pub const ANSWER_FAILED: &str = "Sorry, I could not answer that.";
pub const ZOOMING_IN: &str = "Zooming in";
pub const ZOOMING_OUT: &str = "Zooming out";
pub const QUOTA_EXHAUSTED: &str = "You have used all free attempts. Please upgrade to continue.";
pub const CANNOT_START_NO_KEY: &str = "Cannot start. API Key missing.";
pub const UPGRADE_SUCCEEDED: &str = "Upgrade successful. You now have unlimited access.";
pub const DOWNLOADING: &str = "Downloading files.";

/// Strip emphasis markup (`**` then `*`) and surrounding whitespace.
///
/// ```
/// use visionally::session::clean_text;
///
/// assert_eq!(clean_text("**Warning:** Car *ahead*"), "Warning: Car ahead");
/// ```
pub fn clean_text(text: &str) -> String {
    text.replace("**", "").replace('*', "").trim().to_string()
}

/// Speech output sink. Text reaching it is already cleaned.
pub trait Narrator: Send + Sync {
    /// Speak `text`, cutting off whatever is still being spoken.
    fn speak(&self, text: &str);

    /// Stop speaking.
    fn cancel(&self);
}

/// Writes every cue to stdout, one line per utterance.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNarrator;

impl Narrator for ConsoleNarrator {
    fn speak(&self, text: &str) {
        log::debug!("narrate: {text}");
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "[speak] {text}");
        let _ = out.flush();
    }

    fn cancel(&self) {
        log::debug!("narrate: cancel");
    }
}

#[cfg(test)]
pub use recording::RecordingNarrator;
