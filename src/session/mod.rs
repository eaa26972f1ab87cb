//! Session core: the state machine that sequences recording, remote
//! analysis and narrated results.
//!
//! This module provides:
//! * [`SessionStateMachine`]: the single task that owns session state.
//! * [`SessionCommand`]: everything the front end can ask of it.
//! * [`SessionSnapshot`] / [`SharedSession`]: what the front end renders.
//! * [`AttemptBudget`] / [`UsageStore`]: metered free attempts.
//! * [`Narrator`] / [`Haptics`]: speech and vibration output ports.
//!
//! # Data flow
//!
//! ```text
//! stdin / UI ──SessionCommand──▶ SessionStateMachine ──▶ MediaDeviceController
//!                                      │   ▲
//!                                      │   └── Analyzer (analyze / ask)
//!                                      ├──▶ SharedSession  ──▶ renderer
//!                                      ├──▶ Narrator / Haptics
//!                                      └──▶ UsageStore (usage.toml)
//! ```

pub mod downloads;
pub mod haptics;
pub mod machine;
pub mod narration;
pub mod state;
pub mod timers;
pub mod usage;

pub use downloads::{now_millis, transcript_text, write_artifacts, DownloadArtifacts};
pub use haptics::{Haptics, LogHaptics};
pub use machine::{SessionCommand, SessionPorts, SessionStateMachine, StartError};
pub use narration::{clean_text, ConsoleNarrator, Narrator};
pub use state::{
    format_countdown, lock_session, new_shared_session, AnalysisContext, SessionSnapshot,
    SessionState, SharedSession,
};
pub use usage::{
    load_budget, AttemptBudget, MemoryUsageStore, TomlUsageStore, UsageError, UsageStore,
};

#[cfg(test)]
pub use haptics::RecordingHaptics;
#[cfg(test)]
pub use narration::RecordingNarrator;
