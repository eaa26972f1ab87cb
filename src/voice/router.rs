//! [`VoiceCommandRouter`] — maps a finalized utterance to an action given the
//! session state at the instant it arrived.
//!
//! | state              | utterance                    | action          |
//! |--------------------|------------------------------|-----------------|
//! | Idle, Recording    | contains "zoom in"           | `ZoomIn`        |
//! | Idle, Recording    | contains "zoom out"          | `ZoomOut`       |
//! | Result + context   | longer than the threshold    | `Ask(question)` |
//! | anything else      |                              | `Ignore`        |

use crate::session::SessionState;

/// What the session should do with an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceAction {
    ZoomIn,
    ZoomOut,
    /// Follow-up question about the retained clip (normalized text).
    Ask(String),
    Ignore,
}

/// Stateless router. The session state is passed in on every call.
#[derive(Debug, Clone, Copy)]
pub struct VoiceCommandRouter {
    /// A question must be strictly longer than this many characters.
    min_question_chars: usize,
}

impl VoiceCommandRouter {
    pub fn new(min_question_chars: usize) -> Self {
        Self { min_question_chars }
    }

    /// Trim, lowercase and collapse internal whitespace.
    ///
    /// ```
    /// use visionally::voice::VoiceCommandRouter;
    ///
    /// assert_eq!(VoiceCommandRouter::normalize("  Zoom   IN "), "zoom in");
    /// ```
    pub fn normalize(utterance: &str) -> String {
        utterance
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn route(&self, state: SessionState, has_context: bool, utterance: &str) -> VoiceAction {
        let text = Self::normalize(utterance);
        match state {
            SessionState::Idle | SessionState::Recording => {
                if text.contains("zoom in") {
                    VoiceAction::ZoomIn
                } else if text.contains("zoom out") {
                    VoiceAction::ZoomOut
                } else {
                    VoiceAction::Ignore
                }
            }
            SessionState::Result
                if has_context && text.chars().count() > self.min_question_chars =>
            {
                VoiceAction::Ask(text)
            }
            SessionState::Result | SessionState::Analyzing | SessionState::Error => {
                VoiceAction::Ignore
            }
        }
    }
}

impl Default for VoiceCommandRouter {
    fn default() -> Self {
        Self::new(2)
    }
}
