//! Remote multimodal analysis of recorded clips.
//!
//! This module provides:
//! * [`Analyzer`] — async trait for the `analyze` / `ask` calls.
//! * [`GeminiAnalyzer`] — REST implementation over `generateContent`.
//! * [`CredentialSource`] / [`ConfigCredentials`] — API key lookup.
//! * The scene and follow-up prompts.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use visionally::analysis::{Analyzer, ConfigCredentials, CredentialSource, GeminiAnalyzer};
//! use visionally::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let analyzer = GeminiAnalyzer::from_config(&config.analysis);
//!     let key = ConfigCredentials::new(config.analysis.api_key.clone())
//!         .lookup()
//!         .expect("set VISIONALLY_API_KEY");
//!
//!     let clip_base64 = "GkXfo59ChoEBQveBAULygQRC84EIQoKEd2VibUKHgQRChYEC";
//!     let narration = analyzer.analyze(&key, clip_base64, "video/webm").await.unwrap();
//!     println!("{narration}");
//! }
//! ```

pub mod analyzer;
pub mod credentials;
pub mod gemini;
pub mod prompt;

pub use analyzer::{AnalysisError, Analyzer};
pub use credentials::{
    ApiCredential, ConfigCredentials, CredentialSource, StaticCredentials, CREDENTIAL_ENV_VARS,
};
pub use gemini::GeminiAnalyzer;
pub use prompt::{question_prompt, EMPTY_ANALYSIS_REPLY, EMPTY_ANSWER_REPLY, SCENE_PROMPT};

#[cfg(test)]
pub use analyzer::{MockAnalyzer, MockAnalyzerState};
