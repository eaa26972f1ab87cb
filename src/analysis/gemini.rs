//! [`GeminiAnalyzer`] — Google Generative Language `generateContent` over
//! REST, with the clip sent as `inline_data`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::analysis::analyzer::{AnalysisError, Analyzer};
use crate::analysis::credentials::ApiCredential;
use crate::analysis::prompt::{
    question_prompt, EMPTY_ANALYSIS_REPLY, EMPTY_ANSWER_REPLY, SCENE_PROMPT,
};
use crate::config::AnalysisConfig;

/// Calls `{base_url}/v1beta/models/{model}:generateContent`.
///
/// All connection details come from [`AnalysisConfig`]; the key travels in
/// the `x-goog-api-key` header, never in the URL.
pub struct GeminiAnalyzer {
    client: reqwest::Client,
    config: AnalysisConfig,
}

impl GeminiAnalyzer {
    /// Build from config. The client carries the per-request timeout.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn generate(
        &self,
        credential: &ApiCredential,
        media_base64: &str,
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, AnalysisError> {
        let body = request_body(media_base64, mime_type, prompt);

        log::debug!(
            "analysis: POST {} ({} base64 bytes of {mime_type})",
            self.endpoint(),
            media_base64.len()
        );
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", credential.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let json: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        if !status.is_success() {
            let message = json["error"]["message"]
                .as_str()
                .unwrap_or("no error message");
            return Err(AnalysisError::Request(format!("HTTP {status}: {message}")));
        }

        Ok(response_text(&json))
    }
}

#[async_trait]
impl Analyzer for GeminiAnalyzer {
    async fn analyze(
        &self,
        credential: &ApiCredential,
        media_base64: &str,
        mime_type: &str,
    ) -> Result<String, AnalysisError> {
        let text = self
            .generate(credential, media_base64, mime_type, SCENE_PROMPT)
            .await?;
        Ok(or_default(text, EMPTY_ANALYSIS_REPLY))
    }

    async fn ask(
        &self,
        credential: &ApiCredential,
        media_base64: &str,
        mime_type: &str,
        question: &str,
    ) -> Result<String, AnalysisError> {
        let text = self
            .generate(credential, media_base64, mime_type, &question_prompt(question))
            .await?;
        Ok(or_default(text, EMPTY_ANSWER_REPLY))
    }
}

/// `generateContent` request: the clip first, then the prompt.
fn request_body(media_base64: &str, mime_type: &str, prompt: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inline_data": { "mime_type": mime_type, "data": media_base64 } },
                { "text": prompt }
            ]
        }]
    })
}

/// Concatenated text parts of the first candidate; empty when there are
/// none.
fn response_text(json: &Value) -> String {
    json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn or_default(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
