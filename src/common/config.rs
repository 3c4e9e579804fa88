//! Configuration file handling

use serde::Deserialize;
use std::path::PathBuf;

use super::paths::{config_path, default_results_dir};
use super::Result;
use crate::driver::BrowserKind;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Runner settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Scenario editing settings
    #[serde(default)]
    pub editor: EditorConfig,

    /// Default settings for new scenarios
    #[serde(default)]
    pub defaults: Defaults,
}

/// Runner settings
#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Parent directory of per-run artifact folders
    #[serde(default)]
    pub results_dir: Option<PathBuf>,

    /// Delay between element lookups while waiting for an element
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Wait timeout used when a wait action does not set one
    #[serde(default = "default_wait_timeout")]
    pub default_wait_timeout_ms: u64,

    /// How deeply sub-scenarios may include other scenarios
    #[serde(default = "default_max_depth")]
    pub max_subscenario_depth: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            results_dir: None,
            poll_interval_ms: default_poll_interval(),
            default_wait_timeout_ms: default_wait_timeout(),
            max_subscenario_depth: default_max_depth(),
        }
    }
}

impl RunnerConfig {
    /// Results directory, falling back to the platform data directory
    pub fn results_dir(&self) -> PathBuf {
        self.results_dir.clone().unwrap_or_else(default_results_dir)
    }
}

fn default_poll_interval() -> u64 {
    250
}
fn default_wait_timeout() -> u64 {
    10_000
}
fn default_max_depth() -> usize {
    8
}

/// Scenario editing settings
#[derive(Debug, Deserialize, Clone)]
pub struct EditorConfig {
    /// Maximum number of undoable change sets kept per scenario
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    100
}

/// Default settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Defaults {
    /// Browser used by new scenarios
    #[serde(default)]
    pub browser: BrowserKind,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return Self::parse(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
