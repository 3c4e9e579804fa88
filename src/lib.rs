//! webscenario - editable web test scenarios with an asynchronous runner
//!
//! A scenario is a tree of test-case nodes (folders, conditions, loops,
//! variable assignments and browser actions) edited through an undoable
//! change log. A [`Runner`] executes a copy of the scenario on a background
//! task against a [`driver::Driver`] and publishes the results as they are
//! produced.

pub mod changes;
pub mod cli;
pub mod commands;
pub mod common;
pub mod driver;
pub mod expr;
pub mod persist;
pub mod results;
pub mod runner;
pub mod scenario;
pub mod tree;
pub mod variables;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use runner::{RunEvent, RunHandle, Runner};
pub use scenario::{Scenario, ScenarioSettings};
pub use tree::{Node, NodeId, NodeKind, TestCaseResult, Tree};
