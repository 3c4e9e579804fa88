//! Error types for scenario editing, persistence and execution
//!
//! Edit errors are returned synchronously and leave the scenario untouched.
//! Run errors are caught by the runner and turned into `Failed` results;
//! they never escape a run as a panic.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario core
#[derive(Error, Debug)]
pub enum Error {
    // === Edit Errors ===
    #[error("Node {0} not found in scenario tree")]
    NodeNotFound(u64),

    #[error("Node {0} cannot hold children. Only containers, expressions and loopers can")]
    NotAContainer(u64),

    #[error("The scenario root cannot be removed")]
    CannotRemoveRoot,

    #[error("Node {node} is not a child of node {parent}")]
    NotAChild { parent: u64, node: u64 },

    #[error("Cannot move node {node} below itself (target {target} is in its subtree)")]
    CyclicMove { node: u64, target: u64 },

    #[error("Invalid property '{name}': {reason}")]
    InvalidProperty { name: String, reason: String },

    // === Runner Errors ===
    #[error("A run is already in progress for this runner")]
    AlreadyRunning,

    #[error("No run is in progress")]
    NotRunning,

    #[error("'{0}' is not supported by this runner")]
    Unsupported(&'static str),

    #[error("Could not create a {browser} driver: {reason}")]
    DriverUnavailable { browser: String, reason: String },

    #[error("Driver command '{command}' failed: {message}")]
    DriverCommand { command: String, message: String },

    #[error("No element matches {0}")]
    ElementNotFound(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Sub-scenario nesting exceeds the limit of {0}")]
    NestingTooDeep(usize),

    #[error("The result record of this run has been closed")]
    ResultClosed,

    #[error("Run task ended abnormally: {0}")]
    RunAborted(String),

    // === Persistence Errors ===
    #[error("Node kind '{0}' is not registered")]
    UnknownNodeKind(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Configuration Errors ===
    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),
}

impl Error {
    /// Create an invalid property error
    pub fn invalid_property(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidProperty {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a driver command failure
    pub fn driver_command(command: &str, message: impl Into<String>) -> Self {
        Self::DriverCommand {
            command: command.to_string(),
            message: message.into(),
        }
    }

    /// Create a driver creation failure
    pub fn driver_unavailable(browser: impl ToString, reason: impl Into<String>) -> Self {
        Self::DriverUnavailable {
            browser: browser.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error was caused by an invalid edit
    pub fn is_edit_error(&self) -> bool {
        matches!(
            self,
            Error::NodeNotFound(_)
                | Error::NotAContainer(_)
                | Error::CannotRemoveRoot
                | Error::NotAChild { .. }
                | Error::CyclicMove { .. }
                | Error::InvalidProperty { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_errors_are_classified() {
        assert!(Error::NotAContainer(3).is_edit_error());
        assert!(Error::invalid_property("x", "bad").is_edit_error());
        assert!(!Error::AlreadyRunning.is_edit_error());
        assert!(!Error::driver_command("click", "stale").is_edit_error());
    }

    #[test]
    fn test_messages_name_the_operation() {
        let e = Error::driver_unavailable("chrome", "binary missing");
        assert_eq!(
            e.to_string(),
            "Could not create a chrome driver: binary missing"
        );
        assert_eq!(
            Error::Unsupported("pause").to_string(),
            "'pause' is not supported by this runner"
        );
    }
}
