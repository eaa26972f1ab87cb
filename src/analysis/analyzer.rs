//! The analysis collaborator port.

use async_trait::async_trait;
use thiserror::Error;

use crate::analysis::credentials::ApiCredential;

// ---------------------------------------------------------------------------
// AnalysisError
// ---------------------------------------------------------------------------

/// The remote call failed or could not be made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// HTTP transport failure or a non-success status.
    #[error("analysis request failed: {0}")]
    Request(String),

    #[error("analysis request timed out")]
    Timeout,

    /// The response body was not the expected JSON.
    #[error("failed to parse analysis response: {0}")]
    Parse(String),

    /// No API credential is configured.
    #[error("API key missing")]
    MissingCredential,
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AnalysisError::Timeout
        } else {
            AnalysisError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Analyzer trait
// ---------------------------------------------------------------------------

/// Single-shot multimodal calls over an inline clip. No retries here; a
/// failure is reported as-is.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Describe the clip for a visually impaired listener.
    async fn analyze(
        &self,
        credential: &ApiCredential,
        media_base64: &str,
        mime_type: &str,
    ) -> Result<String, AnalysisError>;

    /// Answer `question` about the same clip.
    async fn ask(
        &self,
        credential: &ApiCredential,
        media_base64: &str,
        mime_type: &str,
        question: &str,
    ) -> Result<String, AnalysisError>;
}

// ---------------------------------------------------------------------------
// MockAnalyzer (tests only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{MockAnalyzer, MockAnalyzerState};
