//! Console front end: command-line arguments, the stdin command grammar and
//! the status line.
//!
//! Each stdin line is one command:
//!
//! ```text
//! start | stop | reset              session control
//! say <words...>                    a finalized speech transcript
//! mic | mic-ended                   toggle listening / recogniser stopped
//! upgrade | close-upgrade           checkout returned / dismiss prompt
//! download | camera                 save artifacts / retry camera
//! frames <n> [interval-ms]          capture a still-frame sequence
//! play <file.wav> | toggle | pause | resume | back | fwd | replay
//! status | help | quit
//! ```

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::device::MAX_FRAME_SEQUENCE;
use crate::session::{format_countdown, SessionCommand, SessionSnapshot, SessionState};

/// Interval between captured frames when `frames` is given no interval.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 500;

pub const HELP: &str = "\
commands:
  start | stop | reset
  say <words...>            speak a command or question
  mic | mic-ended           toggle listening / recogniser stopped
  upgrade | close-upgrade
  download | camera
  frames <n> [interval-ms]
  play <file.wav> | toggle | pause | resume
  back | fwd | replay
  status | help | quit";

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "visionally", version, about = "Record, describe and narrate what the camera sees")]
pub struct Args {
    /// Settings file to use instead of the platform default.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Treat this launch as the return from a successful checkout.
    #[arg(long)]
    pub upgrade_success: bool,

    /// Directory for downloaded clips and transcripts.
    #[arg(long, value_name = "DIR")]
    pub downloads: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Console commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Session(SessionCommand),
    Play(PathBuf),
    Toggle,
    Pause,
    Resume,
    Back,
    Forward,
    Replay,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{command}' needs {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },

    #[error("'{0}' is not a whole number in range")]
    BadNumber(String),
}

/// Parse one stdin line. Keywords are case-insensitive; the text after
/// `say` is passed through untouched.
///
/// ```
/// use visionally::cli::{parse_command, ConsoleCommand};
/// use visionally::session::SessionCommand;
///
/// assert_eq!(parse_command("start"), Ok(ConsoleCommand::Session(SessionCommand::Start)));
/// assert_eq!(
///     parse_command("say Zoom in"),
///     Ok(ConsoleCommand::Session(SessionCommand::Utterance("Zoom in".into())))
/// );
/// ```
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ParseError> {
    let line = line.trim();
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };
    if keyword.is_empty() {
        return Err(ParseError::Empty);
    }

    let session = |cmd: SessionCommand| -> Result<ConsoleCommand, ParseError> {
        Ok(ConsoleCommand::Session(cmd))
    };
    match keyword.to_ascii_lowercase().as_str() {
        "start" => session(SessionCommand::Start),
        "stop" => session(SessionCommand::Stop),
        "reset" => session(SessionCommand::Reset),
        "say" => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument {
                    command: "say",
                    what: "some words",
                });
            }
            session(SessionCommand::Utterance(rest.to_string()))
        }
        "mic" => session(SessionCommand::ToggleListening),
        "mic-ended" => session(SessionCommand::ListeningEnded),
        "upgrade" => session(SessionCommand::UpgradeSucceeded),
        "close-upgrade" => session(SessionCommand::DismissUpgrade),
        "download" => session(SessionCommand::Download),
        "camera" => session(SessionCommand::ActivateCamera),
        "frames" => parse_frames(rest),
        "play" => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument {
                    command: "play",
                    what: "a WAV file",
                });
            }
            Ok(ConsoleCommand::Play(PathBuf::from(rest)))
        }
        "toggle" => Ok(ConsoleCommand::Toggle),
        "pause" => Ok(ConsoleCommand::Pause),
        "resume" => Ok(ConsoleCommand::Resume),
        "back" => Ok(ConsoleCommand::Back),
        "fwd" | "forward" => Ok(ConsoleCommand::Forward),
        "replay" => Ok(ConsoleCommand::Replay),
        "status" => Ok(ConsoleCommand::Status),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        _ => Err(ParseError::Unknown(keyword.to_string())),
    }
}

fn parse_frames(rest: &str) -> Result<ConsoleCommand, ParseError> {
    let mut args = rest.split_whitespace();
    let count = args.next().ok_or(ParseError::MissingArgument {
        command: "frames",
        what: "a frame count",
    })?;
    let count = match count.parse::<usize>() {
        Ok(n) if n <= MAX_FRAME_SEQUENCE => n,
        _ => return Err(ParseError::BadNumber(count.to_string())),
    };
    let interval_ms = match args.next() {
        Some(ms) => ms
            .parse::<u64>()
            .map_err(|_| ParseError::BadNumber(ms.to_string()))?,
        None => DEFAULT_FRAME_INTERVAL_MS,
    };
    Ok(ConsoleCommand::Session(SessionCommand::CaptureFrames {
        count,
        interval_ms,
    }))
}

// ---------------------------------------------------------------------------
// Status line
// ---------------------------------------------------------------------------

/// One-line summary of the snapshot, plus any text the user should see.
pub fn render_status(snap: &SessionSnapshot, checkout_url: &str) -> String {
    let mut out = format!("[{}]", snap.state.label());
    match snap.state {
        SessionState::Recording => {
            out.push_str(&format!(" {}", format_countdown(snap.time_left_secs)))
        }
        SessionState::Analyzing => out.push_str(&format!(" {}%", snap.progress_pct)),
        _ => {}
    }
    if snap.budget.is_premium {
        out.push_str(" premium");
    } else {
        out.push_str(&format!(" {} free left", snap.budget.attempts_left));
    }
    if snap.listening {
        out.push_str(" mic:on");
    }
    if let Some(err) = snap.device_error {
        out.push_str(&format!("\n  camera: {err} (type 'camera' to retry)"));
    }
    if let Some(heard) = &snap.last_transcript {
        out.push_str(&format!("\n  heard: \"{heard}\""));
    }
    if let Some(narration) = &snap.narration {
        out.push_str(&format!("\n  {narration}"));
    }
    if let Some(answer) = &snap.qa_answer {
        out.push_str(&format!("\n  Q&A: {answer}"));
    }
    if snap.upgrade_prompt_visible {
        out.push_str(&format!(
            "\n  Free attempts used up. Upgrade at {checkout_url} then run with --upgrade-success"
        ));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
