//! Test-case node types
//!
//! Every node shares the fields in [`Node`]; what a node does when it runs is
//! decided by its [`NodeKind`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::logging::LogEntry;
use crate::common::{Error, Result};

/// Stable identity of a node within one tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of executing a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseResult {
    #[default]
    NotRun,
    Passed,
    Failed,
}

impl fmt::Display for TestCaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRun => write!(f, "not run"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle marker of a node during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestRunState {
    #[default]
    Idle,
    Running,
    Done,
}

/// How a web action finds its element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum By {
    Id,
    Name,
    Css,
    #[serde(rename = "xpath")]
    XPath,
    LinkText,
}

/// Element search specification handed to the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub by: By,
    pub value: String,
}

impl Locator {
    pub fn new(by: By, value: impl Into<String>) -> Self {
        Self {
            by,
            value: value.into(),
        }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(By::Css, value)
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(By::Id, value)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.by, self.value)
    }
}

/// A single browser interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebAction {
    /// Load a URL in the current window
    Navigate { url: String },
    /// Click the first element matching the locator
    Click { locator: Locator },
    /// Type text into the first element matching the locator
    TypeText { locator: Locator, text: String },
    /// Wait until an element matching the locator exists
    WaitForElement {
        locator: Locator,
        timeout_ms: Option<u64>,
    },
}

/// Variant data of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Ordered group of child nodes
    Container {
        #[serde(default)]
        stop_on_failure: bool,
    },
    /// Runs its children only when `condition` holds
    Expression {
        condition: String,
        #[serde(default)]
        stop_on_failure: bool,
    },
    /// Runs its children `iterations` times
    Looper {
        iterations: u32,
        index_variable: Option<String>,
        #[serde(default)]
        stop_on_failure: bool,
    },
    /// Runs the root of another saved scenario
    RunSubScenario { path: PathBuf },
    /// Writes a run variable
    SetVariable {
        name: String,
        value: Value,
        #[serde(default = "default_force")]
        force: bool,
    },
    WebAction { action: WebAction },
    /// Logs the current variables
    DebugInfo,
}

fn default_force() -> bool {
    true
}

impl NodeKind {
    /// Registry name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::Container { .. } => "container",
            Self::Expression { .. } => "expression",
            Self::Looper { .. } => "looper",
            Self::RunSubScenario { .. } => "run_sub_scenario",
            Self::SetVariable { .. } => "set_variable",
            Self::WebAction { .. } => "web_action",
            Self::DebugInfo => "debug_info",
        }
    }

    /// Whether nodes of this kind may own children
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Container { .. } | Self::Expression { .. } | Self::Looper { .. }
        )
    }

    /// Whether a failing child stops the remaining siblings
    pub fn stop_on_failure(&self) -> bool {
        match self {
            Self::Container { stop_on_failure }
            | Self::Expression {
                stop_on_failure, ..
            }
            | Self::Looper {
                stop_on_failure, ..
            } => *stop_on_failure,
            _ => false,
        }
    }
}

/// One executable unit in the scenario tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) id: NodeId,
    #[serde(skip)]
    pub(crate) parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) children: Vec<NodeId>,
    pub description: String,
    pub marked_for_execution: bool,
    #[serde(default)]
    pub actual_result: TestCaseResult,
    #[serde(default)]
    pub run_state: TestRunState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<LogEntry>,
    pub kind: NodeKind,
}

impl Node {
    /// New unattached node, marked for execution
    pub fn new(kind: NodeKind, description: impl Into<String>) -> Self {
        Self {
            id: NodeId(0),
            parent: None,
            children: Vec::new(),
            description: description.into(),
            marked_for_execution: true,
            actual_result: TestCaseResult::NotRun,
            run_state: TestRunState::Idle,
            log: Vec::new(),
            kind,
        }
    }

    pub fn container(description: impl Into<String>) -> Self {
        Self::new(
            NodeKind::Container {
                stop_on_failure: false,
            },
            description,
        )
    }

    pub fn web(action: WebAction, description: impl Into<String>) -> Self {
        Self::new(NodeKind::WebAction { action }, description)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Clear result, state and log left by a previous run
    pub fn reset_execution(&mut self) {
        self.actual_result = TestCaseResult::NotRun;
        self.run_state = TestRunState::Idle;
        self.log.clear();
    }

    /// Read a property by name
    ///
    /// `description` and `marked_for_execution` are shared by all nodes; any
    /// other name is a dotted path into the kind data, e.g. `condition` or
    /// `action.locator.value`.
    pub fn property(&self, name: &str) -> Result<Value> {
        match name {
            "description" => Ok(Value::String(self.description.clone())),
            "marked_for_execution" => Ok(Value::Bool(self.marked_for_execution)),
            _ => {
                let data = serde_json::to_value(&self.kind)?;
                lookup(&data, name)
                    .cloned()
                    .ok_or_else(|| unknown_property(name, &self.kind))
            }
        }
    }

    /// Assign a property, returning the previous value
    ///
    /// The node is left untouched when the name is unknown or the value has
    /// the wrong type.
    pub fn set_property(&mut self, name: &str, value: Value) -> Result<Value> {
        match name {
            "description" => {
                let Value::String(text) = value else {
                    return Err(Error::invalid_property(name, "expected a string"));
                };
                Ok(Value::String(std::mem::replace(&mut self.description, text)))
            }
            "marked_for_execution" => {
                let Value::Bool(flag) = value else {
                    return Err(Error::invalid_property(name, "expected a boolean"));
                };
                Ok(Value::Bool(std::mem::replace(
                    &mut self.marked_for_execution,
                    flag,
                )))
            }
            _ => {
                if name.split('.').any(|segment| segment == "type") {
                    return Err(Error::invalid_property(name, "the node type cannot be changed"));
                }
                let mut data = serde_json::to_value(&self.kind)?;
                let slot =
                    lookup_mut(&mut data, name).ok_or_else(|| unknown_property(name, &self.kind))?;
                let old = std::mem::replace(slot, value);
                let kind: NodeKind = serde_json::from_value(data)
                    .map_err(|e| Error::invalid_property(name, e.to_string()))?;
                self.kind = kind;
                Ok(old)
            }
        }
    }
}

fn unknown_property(name: &str, kind: &NodeKind) -> Error {
    Error::invalid_property(name, format!("no such property on a {} node", kind.name()))
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object_mut()?.get_mut(segment))
}
