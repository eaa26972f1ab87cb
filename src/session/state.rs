//! Session state and the snapshot shared with the front end.
//!
//! [`SessionState`] is the finite state of one capture/analysis session.
//! [`SessionSnapshot`] is everything a front end needs to render it; the
//! state machine is its only writer.
//!
//! [`SharedSession`] is `Arc<Mutex<SessionSnapshot>>`: cheap to clone, lock
//! briefly, never hold across `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::{ClipPayload, DeviceError};
use crate::session::usage::AttemptBudget;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// ```text
/// Idle ──start──▶ Recording ──stop / countdown 0──▶ Analyzing ──ok + settle──▶ Result
///                     │                                 │
///                     └── recorder / credential fail ───┴──fail──▶ Error ──3 s──▶ Idle
/// any state ──reset──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Analyzing,
    Result,
    Error,
}

impl SessionState {
    /// `true` while a clip is being recorded or analyzed.
    ///
    /// ```
    /// use visionally::session::SessionState;
    ///
    /// assert!(SessionState::Recording.is_busy());
    /// assert!(SessionState::Analyzing.is_busy());
    /// assert!(!SessionState::Result.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Recording | SessionState::Analyzing)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Ready",
            SessionState::Recording => "Recording",
            SessionState::Analyzing => "Analyzing",
            SessionState::Result => "Result",
            SessionState::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisContext
// ---------------------------------------------------------------------------

/// The clip follow-up questions are asked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisContext {
    pub base64: String,
    pub mime_type: String,
}

impl From<&ClipPayload> for AnalysisContext {
    fn from(clip: &ClipPayload) -> Self {
        Self {
            base64: clip.base64.clone(),
            mime_type: clip.mime_type.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub budget: AttemptBudget,
    /// Seconds left in the current recording; the ceiling outside Recording.
    pub time_left_secs: u32,
    /// Analysis progress, `0..=100`.
    pub progress_pct: u8,
    /// Cleaned narration of the last successful analysis.
    pub narration: Option<String>,
    /// Cleaned answer to the last follow-up question.
    pub qa_answer: Option<String>,
    pub context: Option<AnalysisContext>,
    /// The last recorded clip, kept for download.
    pub clip: Option<ClipPayload>,
    pub upgrade_prompt_visible: bool,
    pub listening: bool,
    pub last_transcript: Option<String>,
    /// Set while the camera could not be acquired; cleared on success.
    pub device_error: Option<DeviceError>,
}

impl SessionSnapshot {
    pub fn new(budget: AttemptBudget, max_recording_secs: u32) -> Self {
        Self {
            state: SessionState::Idle,
            budget,
            time_left_secs: max_recording_secs,
            progress_pct: 0,
            narration: None,
            qa_answer: None,
            context: None,
            clip: None,
            upgrade_prompt_visible: false,
            listening: false,
            last_transcript: None,
            device_error: None,
        }
    }

    /// Drop everything produced by the last recording cycle.
    pub fn clear_transient(&mut self) {
        self.narration = None;
        self.qa_answer = None;
        self.context = None;
        self.clip = None;
        self.progress_pct = 0;
    }
}

// ---------------------------------------------------------------------------
// SharedSession
// ---------------------------------------------------------------------------

pub type SharedSession = Arc<Mutex<SessionSnapshot>>;

pub fn new_shared_session(budget: AttemptBudget, max_recording_secs: u32) -> SharedSession {
    Arc::new(Mutex::new(SessionSnapshot::new(budget, max_recording_secs)))
}

/// Lock the snapshot, recovering from a poisoned lock.
pub fn lock_session(shared: &SharedSession) -> MutexGuard<'_, SessionSnapshot> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Countdown display
// ---------------------------------------------------------------------------

/// Render seconds as `m:ss`.
///
/// ```
/// use visionally::session::format_countdown;
///
/// assert_eq!(format_countdown(135), "2:15");
/// assert_eq!(format_countdown(9), "0:09");
/// ```
pub fn format_countdown(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
