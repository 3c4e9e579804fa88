//! Node type registry
//!
//! Lists the node kinds a scenario may contain and the factories that create
//! fresh nodes for them. The registry is passed explicitly to whoever needs
//! it (editor, persistence, runner); there is no global instance.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde_json::Value;

use super::node::{Locator, Node, NodeKind, WebAction};
use super::Tree;
use crate::common::{Error, Result};

/// Metadata and constructor for one creatable node
#[derive(Debug, Clone, Copy)]
pub struct NodeFactory {
    /// Unique identifier (e.g., "click", "looper")
    pub id: &'static str,
    /// Display name for toolboxes
    pub name: &'static str,
    /// Grouping for toolboxes
    pub category: &'static str,
    /// Brief description
    pub description: &'static str,
    create: fn() -> Node,
}

impl NodeFactory {
    pub const fn new(
        id: &'static str,
        name: &'static str,
        category: &'static str,
        description: &'static str,
        create: fn() -> Node,
    ) -> Self {
        Self {
            id,
            name,
            category,
            description,
            create,
        }
    }

    /// Build a new node with default settings
    pub fn create(&self) -> Node {
        (self.create)()
    }

    /// Kind of the nodes this factory creates
    pub fn kind_name(&self) -> &'static str {
        self.create().kind.name()
    }
}

/// Built-in node factories
static BUILTIN: &[NodeFactory] = &[
    NodeFactory::new(
        "folder",
        "Folder",
        "General",
        "Groups test cases that run in order",
        || Node::container("Folder"),
    ),
    NodeFactory::new(
        "expression",
        "Expression",
        "General",
        "Runs its children only when a condition holds",
        || {
            Node::new(
                NodeKind::Expression {
                    condition: "true".to_string(),
                    stop_on_failure: false,
                },
                "Run when condition holds",
            )
        },
    ),
    NodeFactory::new(
        "looper",
        "Looper",
        "General",
        "Runs its children a number of times",
        || {
            Node::new(
                NodeKind::Looper {
                    iterations: 1,
                    index_variable: None,
                    stop_on_failure: false,
                },
                "Repeat test cases",
            )
        },
    ),
    NodeFactory::new(
        "run_scenario",
        "Run scenario",
        "General",
        "Runs another saved scenario in the current run",
        || {
            Node::new(
                NodeKind::RunSubScenario {
                    path: PathBuf::new(),
                },
                "Run a scenario",
            )
        },
    ),
    NodeFactory::new(
        "set_variable",
        "Set variable",
        "General",
        "Stores a value for later test cases",
        || {
            Node::new(
                NodeKind::SetVariable {
                    name: "variable".to_string(),
                    value: Value::Null,
                    force: true,
                },
                "Set a variable",
            )
        },
    ),
    NodeFactory::new(
        "navigate",
        "Navigate",
        "Web",
        "Loads a URL in the browser",
        || {
            Node::web(
                WebAction::Navigate {
                    url: "about:blank".to_string(),
                },
                "Navigate to a page",
            )
        },
    ),
    NodeFactory::new(
        "click",
        "Click element",
        "Web",
        "Clicks the first web element based on the search results",
        || {
            Node::web(
                WebAction::Click {
                    locator: Locator::css(""),
                },
                "Click a particular web element",
            )
        },
    ),
    NodeFactory::new(
        "type_text",
        "Type text",
        "Web",
        "Types text into the first web element based on the search results",
        || {
            Node::web(
                WebAction::TypeText {
                    locator: Locator::css(""),
                    text: String::new(),
                },
                "Type into a web element",
            )
        },
    ),
    NodeFactory::new(
        "wait_for_element",
        "Wait for element",
        "Web",
        "Waits until a web element appears",
        || {
            Node::web(
                WebAction::WaitForElement {
                    locator: Locator::css(""),
                    timeout_ms: None,
                },
                "Wait for a web element",
            )
        },
    ),
];

#[cfg(debug_assertions)]
static DEBUG_FACTORY: NodeFactory = NodeFactory::new(
    "debug_info",
    "Debug info",
    "Debug",
    "Logs every variable of the current run",
    || Node::new(NodeKind::DebugInfo, "Print debug information"),
);

/// Set of node kinds legal in a scenario
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    factories: BTreeMap<&'static str, NodeFactory>,
    kinds: BTreeSet<&'static str>,
}

impl NodeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in node type
    ///
    /// The debug node is only available in debug builds.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for factory in BUILTIN {
            registry.register(*factory);
        }
        #[cfg(debug_assertions)]
        registry.register(DEBUG_FACTORY);
        registry
    }

    /// Add a factory; returns false if its id was already registered
    pub fn register(&mut self, factory: NodeFactory) -> bool {
        if self.factories.contains_key(factory.id) {
            return false;
        }
        self.kinds.insert(factory.kind_name());
        self.factories.insert(factory.id, factory);
        true
    }

    /// Create a node from the factory with the given id
    pub fn create(&self, id: &str) -> Option<Node> {
        self.factories.get(id).map(NodeFactory::create)
    }

    pub fn factory(&self, id: &str) -> Option<&NodeFactory> {
        self.factories.get(id)
    }

    pub fn factories(&self) -> impl Iterator<Item = &NodeFactory> {
        self.factories.values()
    }

    /// Whether nodes of this kind may appear in a scenario
    pub fn allows(&self, kind: &NodeKind) -> bool {
        self.kinds.contains(kind.name())
    }

    /// Check that every node in `tree` has a registered kind
    pub fn validate(&self, tree: &Tree) -> Result<()> {
        for id in tree.walk() {
            let node = tree.node(id)?;
            if !self.allows(&node.kind) {
                return Err(Error::UnknownNodeKind(node.kind.name().to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_creates_every_factory() {
        let registry = NodeRegistry::with_builtin();
        for factory in registry.factories() {
            let node = registry.create(factory.id).unwrap();
            assert!(node.marked_for_execution);
            assert!(registry.allows(&node.kind));
        }
        assert!(registry.create("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_registration_is_refused() {
        let mut registry = NodeRegistry::with_builtin();
        let folder = *registry.factory("folder").unwrap();
        assert!(!registry.register(folder));
    }

    #[test]
    fn test_validate_rejects_unregistered_kinds() {
        let mut registry = NodeRegistry::new();
        registry.register(BUILTIN[0]);

        let mut tree = Tree::new(Node::container("root"));
        assert!(registry.validate(&tree).is_ok());

        let root = tree.root();
        let click = tree.allocate(NodeRegistry::with_builtin().create("click").unwrap());
        tree.attach(root, 0, click).unwrap();
        assert!(matches!(
            registry.validate(&tree),
            Err(Error::UnknownNodeKind(kind)) if kind == "web_action"
        ));
    }
}
