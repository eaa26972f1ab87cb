//! Download artifacts: the recorded clip and a plain-text transcript.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::device::{extension_for_mime, ClipPayload};

/// Paths of the two files written by one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifacts {
    pub recording: PathBuf,
    pub transcript: PathBuf,
}

/// Narration, followed by the Q&A answer when there is one.
///
/// ```
/// use visionally::session::transcript_text;
///
/// assert_eq!(transcript_text("A door.", None), "A door.");
/// assert_eq!(transcript_text("A door.", Some("Blue.")), "A door.\n\nQ&A:\nBlue.");
/// ```
pub fn transcript_text(narration: &str, answer: Option<&str>) -> String {
    match answer {
        Some(answer) if !answer.is_empty() => format!("{narration}\n\nQ&A:\n{answer}"),
        _ => narration.to_string(),
    }
}

/// Write both artifacts into `dir`, naming them after `millis` (Unix time in
/// milliseconds).
pub fn write_artifacts(
    dir: &Path,
    clip: &ClipPayload,
    narration: &str,
    answer: Option<&str>,
    millis: i64,
) -> Result<DownloadArtifacts> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create download dir {}", dir.display()))?;

    let recording = dir.join(format!(
        "visionally-recording-{millis}.{}",
        extension_for_mime(&clip.mime_type)
    ));
    std::fs::write(&recording, &clip.blob)
        .with_context(|| format!("cannot write {}", recording.display()))?;

    let transcript = dir.join(format!("visionally-transcript-{millis}.txt"));
    std::fs::write(&transcript, transcript_text(narration, answer))
        .with_context(|| format!("cannot write {}", transcript.display()))?;

    Ok(DownloadArtifacts {
        recording,
        transcript,
    })
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
