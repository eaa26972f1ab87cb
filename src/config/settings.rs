//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// Settings for the remote multimodal analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL of the `generateContent` REST API.
    pub base_url: String,
    /// Model identifier (e.g. `"gemini-flash-latest"`).
    pub model: String,
    /// API key. `None` defers to the `VISIONALLY_API_KEY` / `GEMINI_API_KEY`
    /// environment variables.
    pub api_key: Option<String>,
    /// Maximum seconds to wait for one analysis or Q&A response.
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-flash-latest".into(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Camera / microphone acquisition and capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Preferred camera facing, `"environment"` (rear) or `"user"` (front).
    pub facing_mode: String,
    /// Ideal video width in pixels for the preferred stream.
    pub ideal_width: u32,
    /// Ideal video height in pixels for the preferred stream.
    pub ideal_height: u32,
    /// How many times a still-frame capture re-polls for a decoded frame.
    pub frame_poll_attempts: u32,
    /// Delay between two readiness polls in milliseconds.
    pub frame_poll_interval_ms: u64,
    /// Lossy still-image quality in `0.0..=1.0`.
    pub jpeg_quality: f32,
    /// Clip encodings in order of preference; the first one the backend
    /// supports wins, otherwise the recorder picks its own default.
    pub codec_preferences: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            facing_mode: "environment".into(),
            ideal_width: 1280,
            ideal_height: 720,
            frame_poll_attempts: 5,
            frame_poll_interval_ms: 100,
            jpeg_quality: 0.5,
            codec_preferences: vec!["video/webm; codecs=vp9".into(), "video/mp4".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing and thresholds of the record → analyze → result session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard recording budget in seconds; recording auto-stops at zero.
    pub max_recording_secs: u32,
    /// Pause between analysis completion and the Result state.
    pub settle_delay_ms: u64,
    /// How long the Error state lingers before returning to Idle.
    pub error_return_ms: u64,
    /// Period of the analysis progress indicator.
    pub progress_tick_ms: u64,
    /// Percentage the progress indicator holds at until analysis completes.
    pub progress_hold_pct: u8,
    /// Utterances must be strictly longer than this to count as a question.
    pub min_question_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_recording_secs: 135,
            settle_delay_ms: 500,
            error_return_ms: 3_000,
            progress_tick_ms: 50,
            progress_hold_pct: 90,
            min_question_chars: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// UsageConfig
// ---------------------------------------------------------------------------

/// Free-usage metering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Free attempts granted on first run.
    pub free_attempts: u32,
    /// Checkout page offered when the free attempts are exhausted.
    pub checkout_url: String,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            free_attempts: 3,
            checkout_url: "https://buy.stripe.com/test_placeholder".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Narration-asset playback controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Seconds moved by one skip-back / skip-forward command.
    pub skip_secs: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { skip_secs: 5.0 }
    }
}

// ---------------------------------------------------------------------------
// DownloadConfig
// ---------------------------------------------------------------------------

/// Where download artifacts are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Target directory; `None` uses [`AppPaths::downloads_dir`].
    pub dir: Option<PathBuf>,
}

impl DownloadConfig {
    /// The effective download directory.
    pub fn resolve(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().downloads_dir)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use visionally::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote analysis service settings.
    pub analysis: AnalysisConfig,
    /// Camera / microphone capture settings.
    pub capture: CaptureConfig,
    /// Session timing settings.
    pub session: SessionConfig,
    /// Free-usage metering.
    pub usage: UsageConfig,
    /// Narration playback controls.
    pub playback: PlaybackConfig,
    /// Download artifact location.
    pub downloads: DownloadConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.analysis.base_url, loaded.analysis.base_url);
        assert_eq!(original.analysis.model, loaded.analysis.model);
        assert_eq!(original.analysis.api_key, loaded.analysis.api_key);
        assert_eq!(original.capture.ideal_width, loaded.capture.ideal_width);
        assert_eq!(
            original.capture.codec_preferences,
            loaded.capture.codec_preferences
        );
        assert_eq!(
            original.session.max_recording_secs,
            loaded.session.max_recording_secs
        );
        assert_eq!(original.usage.free_attempts, loaded.usage.free_attempts);
        assert_eq!(original.playback.skip_secs, loaded.playback.skip_secs);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.analysis.model, "gemini-flash-latest");
        assert_eq!(config.session.max_recording_secs, 135);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.capture.facing_mode, "environment");
        assert_eq!(cfg.capture.ideal_width, 1280);
        assert_eq!(cfg.capture.ideal_height, 720);
        assert_eq!(cfg.capture.frame_poll_attempts, 5);
        assert_eq!(cfg.capture.frame_poll_interval_ms, 100);
        assert_eq!(cfg.session.max_recording_secs, 135);
        assert_eq!(cfg.session.settle_delay_ms, 500);
        assert_eq!(cfg.session.error_return_ms, 3_000);
        assert_eq!(cfg.session.progress_hold_pct, 90);
        assert_eq!(cfg.usage.free_attempts, 3);
        assert!(cfg.analysis.api_key.is_none());
        assert!(cfg.downloads.dir.is_none());
    }

    /// A partial file only overrides the keys it names.
    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[session]\nmax_recording_secs = 30\n").expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.session.max_recording_secs, 30);
        assert_eq!(cfg.session.settle_delay_ms, 500);
        assert_eq!(cfg.usage.free_attempts, 3);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.analysis.api_key = Some("key-test".into());
        cfg.analysis.timeout_secs = 15;
        cfg.capture.codec_preferences = vec!["audio/wav".into()];
        cfg.usage.free_attempts = 10;
        cfg.downloads.dir = Some(PathBuf::from("/tmp/visionally"));

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.analysis.api_key.as_deref(), Some("key-test"));
        assert_eq!(loaded.analysis.timeout_secs, 15);
        assert_eq!(loaded.capture.codec_preferences, vec!["audio/wav".to_string()]);
        assert_eq!(loaded.usage.free_attempts, 10);
        assert_eq!(loaded.downloads.resolve(), PathBuf::from("/tmp/visionally"));
    }
}
