//! Configuration and data paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/webscenario/` and `~/.local/share/webscenario/`
//! - macOS: `~/Library/Application Support/webscenario/`
//! - Windows: `%APPDATA%\webscenario\`

use std::path::PathBuf;

/// Application name used for all directories
const APP_NAME: &str = "webscenario";

/// File extension of saved web test scenarios
pub const SCENARIO_EXTENSION: &str = "wts";

/// Name of the result record written into each run folder
pub const RESULT_FILE_NAME: &str = "result.json";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Default parent directory of per-run artifact folders
pub fn default_results_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().join("results"))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME).join("results"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_dir_is_valid() {
        let dir = default_results_dir();
        assert!(dir.ends_with("results"));
    }

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
        }
    }
}
