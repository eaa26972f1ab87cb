//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings + usage counters):
//!   Windows: %APPDATA%\visionally\
//!   macOS:   ~/Library/Application Support/visionally/
//!   Linux:   ~/.config/visionally/
//!
//! Downloads (recorded clips + transcripts):
//!   the platform download dir, or `<data dir>/visionally/downloads` when the
//!   platform has none.

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and `usage.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to `usage.toml` (remaining free attempts + premium flag).
    pub usage_file: PathBuf,
    /// Default target directory for download artifacts.
    pub downloads_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "visionally";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let downloads_dir = dirs::download_dir().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(Self::APP_NAME)
                .join("downloads")
        });

        let settings_file = config_dir.join("settings.toml");
        let usage_file = config_dir.join("usage.toml");

        Self {
            config_dir,
            settings_file,
            usage_file,
            downloads_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.downloads_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .usage_file
            .file_name()
            .is_some_and(|n| n == "usage.toml"));
    }

    #[test]
    fn usage_file_lives_next_to_settings() {
        let paths = AppPaths::new();
        assert_eq!(paths.usage_file.parent(), paths.settings_file.parent());
    }
}
