//! Arena-backed test-case tree
//!
//! Nodes are stored by [`NodeId`] with explicit parent and child links.
//! Cloning a subtree walks the arena and relabels every id, so a clone never
//! shares identity with its source.
//!
//! Structural mutation (`attach`/`detach`) is crate-private: outside code
//! edits a tree through [`crate::scenario::Scenario`], which records every
//! change for undo.

pub mod node;
pub mod registry;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

pub use node::{By, Locator, Node, NodeId, NodeKind, TestCaseResult, TestRunState, WebAction};
pub use registry::{NodeFactory, NodeRegistry};

/// A subtree removed from (or about to be added to) a tree
///
/// Nodes keep their ids; `nodes` is in depth-first order with the root first.
#[derive(Debug, Clone, PartialEq)]
pub struct Detached {
    pub(crate) root: NodeId,
    pub(crate) nodes: Vec<Node>,
}

impl Detached {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Composite of test-case nodes with a single root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "TreeRepr", try_from = "TreeRepr")]
pub struct Tree {
    root: NodeId,
    next_id: u64,
    nodes: BTreeMap<NodeId, Node>,
}

/// Trees are equal when they hold the same nodes; the id counter is ignored
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.nodes == other.nodes
    }
}

/// On-disk form: nodes listed depth-first, links carried by `children`
#[derive(Serialize, Deserialize)]
struct TreeRepr {
    root: NodeId,
    nodes: Vec<Node>,
}

impl From<Tree> for TreeRepr {
    fn from(tree: Tree) -> Self {
        let order = tree.walk();
        let mut nodes = tree.nodes;
        Self {
            root: tree.root,
            nodes: order.iter().filter_map(|id| nodes.remove(id)).collect(),
        }
    }
}

impl TryFrom<TreeRepr> for Tree {
    type Error = Error;

    fn try_from(repr: TreeRepr) -> Result<Self> {
        let mut nodes = BTreeMap::new();
        for node in repr.nodes {
            let id = node.id;
            if nodes.insert(id, node).is_some() {
                return Err(Error::invalid_property("nodes", format!("duplicate node id {}", id)));
            }
        }
        if !nodes.contains_key(&repr.root) {
            return Err(Error::NodeNotFound(repr.root.0));
        }
        if let Some(leaf) = nodes
            .values()
            .find(|n| !n.children.is_empty() && !n.kind.is_container())
        {
            return Err(Error::NotAContainer(leaf.id.0));
        }

        // Rebuild parent links from the child lists
        let links: Vec<(NodeId, NodeId)> = nodes
            .values()
            .flat_map(|n| n.children.iter().map(move |c| (n.id, *c)))
            .collect();
        for (parent, child) in links {
            let node = nodes.get_mut(&child).ok_or(Error::NodeNotFound(child.0))?;
            if node.parent.is_some() || child == repr.root {
                return Err(Error::invalid_property(
                    "children",
                    format!("node {} has more than one parent", child),
                ));
            }
            node.parent = Some(parent);
        }

        let next_id = nodes.keys().next_back().map(|id| id.0 + 1).unwrap_or(0);
        let tree = Self {
            root: repr.root,
            next_id,
            nodes,
        };
        if tree.walk().len() != tree.nodes.len() {
            return Err(Error::invalid_property(
                "nodes",
                "some nodes are not reachable from the root",
            ));
        }
        Ok(tree)
    }
}

impl Tree {
    /// Create a tree holding only `root`
    pub fn new(mut root: Node) -> Self {
        root.id = NodeId(0);
        root.parent = None;
        root.children.clear();
        let mut nodes = BTreeMap::new();
        nodes.insert(root.id, root);
        Self {
            root: NodeId(0),
            next_id: 1,
            nodes,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &Node {
        &self.nodes[&self.root]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Like [`Tree::get`] but reports a missing node as an error
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(Error::NodeNotFound(id.0))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id.0))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids, depth-first, each container before its children
    pub fn walk(&self) -> Vec<NodeId> {
        self.walk_from(self.root)
    }

    /// Depth-first ids of the subtree rooted at `start`
    pub fn walk_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                order.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// Whether `ancestor` is `node` or lies on its path to the root
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Number of edges between `id` and the root
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        depth
    }

    /// Index of `node` within its parent's children
    pub fn position(&self, parent: NodeId, node: NodeId) -> Result<usize> {
        self.node(parent)?
            .children
            .iter()
            .position(|c| *c == node)
            .ok_or(Error::NotAChild {
                parent: parent.0,
                node: node.0,
            })
    }

    /// Deep copy of the whole tree with fresh ids
    pub fn deep_clone(&self) -> Tree {
        // Root always exists, so the clone cannot fail
        self.clone_subtree(self.root)
            .unwrap_or_else(|_| Tree::new(self.root_node().clone()))
    }

    /// Deep copy of the subtree at `id` as a standalone tree
    ///
    /// Ids are relabeled depth-first starting at zero; data is equal.
    pub fn clone_subtree(&self, id: NodeId) -> Result<Tree> {
        let mut counter = 0;
        let detached = self.relabel(id, || {
            let next = NodeId(counter);
            counter += 1;
            next
        })?;
        let next_id = counter;
        Ok(Tree {
            root: detached.root,
            next_id,
            nodes: detached.nodes.into_iter().map(|n| (n.id, n)).collect(),
        })
    }

    /// Copy the subtree at `id` of `other` into fresh ids of this tree
    ///
    /// The result is not attached; pass it to an insert change.
    pub fn import(&mut self, other: &Tree, id: NodeId) -> Result<Detached> {
        let mut next = self.next_id;
        let detached = other.relabel(id, || {
            let id = NodeId(next);
            next += 1;
            id
        })?;
        self.next_id = next;
        Ok(detached)
    }

    /// Give a lone node a fresh id of this tree
    pub fn allocate(&mut self, mut node: Node) -> Detached {
        node.id = NodeId(self.next_id);
        self.next_id += 1;
        node.parent = None;
        node.children.clear();
        Detached {
            root: node.id,
            nodes: vec![node],
        }
    }

    /// Reset result, state and log on every node
    pub fn reset_execution(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset_execution();
        }
    }

    fn relabel(&self, start: NodeId, mut next: impl FnMut() -> NodeId) -> Result<Detached> {
        self.node(start)?;
        let order = self.walk_from(start);
        let map: HashMap<NodeId, NodeId> = order.iter().map(|old| (*old, next())).collect();

        let nodes = order
            .iter()
            .map(|old| {
                let mut node = self.nodes[old].clone();
                node.id = map[old];
                node.parent = if *old == start {
                    None
                } else {
                    node.parent.map(|p| map[&p])
                };
                node.children = node.children.iter().map(|c| map[c]).collect();
                node
            })
            .collect();

        Ok(Detached {
            root: map[&start],
            nodes,
        })
    }

    /// Copy of the subtree at `id`, ids unchanged
    pub(crate) fn snapshot(&self, id: NodeId) -> Result<Detached> {
        let mut nodes: Vec<Node> = self
            .walk_from(id)
            .iter()
            .map(|n| self.nodes[n].clone())
            .collect();
        match nodes.first_mut() {
            Some(root) => root.parent = None,
            None => return Err(Error::NodeNotFound(id.0)),
        }
        Ok(Detached { root: id, nodes })
    }

    /// Insert `subtree` under `parent` at `index` (clamped to the child count)
    pub(crate) fn attach(&mut self, parent: NodeId, index: usize, subtree: Detached) -> Result<()> {
        let parent_node = self.node(parent)?;
        if !parent_node.kind.is_container() {
            return Err(Error::NotAContainer(parent.0));
        }
        if let Some(clash) = subtree.nodes.iter().find(|n| self.nodes.contains_key(&n.id)) {
            return Err(Error::invalid_property(
                "id",
                format!("node {} already exists in the tree", clash.id),
            ));
        }

        let index = index.min(parent_node.children.len());
        let root = subtree.root;
        for mut node in subtree.nodes {
            if node.id == root {
                node.parent = Some(parent);
            }
            self.next_id = self.next_id.max(node.id.0 + 1);
            self.nodes.insert(node.id, node);
        }
        self.node_mut(parent)?.children.insert(index, root);
        Ok(())
    }

    /// Remove `node` and its subtree from `parent`
    ///
    /// Returns the index it occupied and the detached subtree.
    pub(crate) fn detach(&mut self, parent: NodeId, node: NodeId) -> Result<(usize, Detached)> {
        if node == self.root {
            return Err(Error::CannotRemoveRoot);
        }
        let index = self.position(parent, node)?;
        let order = self.walk_from(node);

        self.node_mut(parent)?.children.remove(index);
        let mut nodes: Vec<Node> = order
            .iter()
            .filter_map(|id| self.nodes.remove(id))
            .collect();
        if let Some(root) = nodes.first_mut() {
            root.parent = None;
        }

        Ok((index, Detached { root: node, nodes }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Node {
        Node::web(
            WebAction::Click {
                locator: Locator::id(name),
            },
            name,
        )
    }

    /// root -> [a -> [a1, a2], b]
    fn sample() -> (Tree, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new(Node::container("root"));
        let root = tree.root();
        let a = tree.allocate(Node::container("a"));
        let a_id = a.root();
        tree.attach(root, 0, a).unwrap();
        let a1 = tree.allocate(leaf("a1"));
        let a1_id = a1.root();
        tree.attach(a_id, 0, a1).unwrap();
        let a2 = tree.allocate(leaf("a2"));
        tree.attach(a_id, 1, a2).unwrap();
        let b = tree.allocate(leaf("b"));
        let b_id = b.root();
        tree.attach(root, 10, b).unwrap();
        (tree, root, a_id, a1_id, b_id)
    }

    fn descriptions(tree: &Tree) -> Vec<String> {
        tree.walk()
            .iter()
            .map(|id| tree.get(*id).unwrap().description.clone())
            .collect()
    }

    #[test]
    fn test_walk_is_depth_first_container_first() {
        let (tree, ..) = sample();
        assert_eq!(descriptions(&tree), vec!["root", "a", "a1", "a2", "b"]);
    }

    #[test]
    fn test_attach_to_leaf_is_rejected() {
        let (mut tree, _, _, a1, _) = sample();
        let extra = tree.allocate(leaf("x"));
        let before = tree.len();
        assert!(matches!(tree.attach(a1, 0, extra), Err(Error::NotAContainer(_))));
        assert_eq!(tree.len(), before);
    }

    #[test]
    fn test_detach_and_reattach_restores_tree() {
        let (mut tree, root, a, _, _) = sample();
        let original = tree.clone();

        let (index, subtree) = tree.detach(root, a).unwrap();
        assert_eq!(index, 0);
        assert_eq!(subtree.len(), 3);
        assert_eq!(descriptions(&tree), vec!["root", "b"]);

        tree.attach(root, index, subtree).unwrap();
        assert_eq!(tree, original);
    }

    #[test]
    fn test_root_cannot_be_detached() {
        let (mut tree, root, ..) = sample();
        assert!(matches!(tree.detach(root, root), Err(Error::CannotRemoveRoot)));
    }

    #[test]
    fn test_clone_relabels_but_keeps_data() {
        let (tree, _, a, _, _) = sample();
        let clone = tree.clone_subtree(a).unwrap();
        assert_eq!(clone.root(), NodeId(0));
        assert_eq!(descriptions(&clone), vec!["a", "a1", "a2"]);
        assert!(clone.root_node().parent().is_none());
        for id in clone.walk() {
            for child in clone.get(id).unwrap().children() {
                assert_eq!(clone.get(*child).unwrap().parent(), Some(id));
            }
        }
    }

    #[test]
    fn test_import_uses_fresh_ids() {
        let (mut tree, root, a, _, _) = sample();
        let source = tree.clone();
        let copy = tree.import(&source, a).unwrap();
        assert!(copy.nodes.iter().all(|n| !tree.contains(n.id)));
        tree.attach(root, 1, copy).unwrap();
        assert_eq!(
            descriptions(&tree),
            vec!["root", "a", "a1", "a2", "a", "a1", "a2", "b"]
        );
    }

    #[test]
    fn test_ancestry_and_depth() {
        let (tree, root, a, a1, b) = sample();
        assert!(tree.is_ancestor(a, a1));
        assert!(tree.is_ancestor(root, b));
        assert!(!tree.is_ancestor(a1, a));
        assert_eq!(tree.depth(a1), 2);
        assert_eq!(tree.depth(root), 0);
    }

    #[test]
    fn test_serde_round_trip_rebuilds_links() {
        let (tree, ..) = sample();
        let json = serde_json::to_string(&tree).unwrap();
        let back: Tree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_deserialize_rejects_shared_child() {
        let json = r#"{
            "root": 0,
            "nodes": [
                {"id": 0, "children": [1, 1], "description": "root",
                 "marked_for_execution": true, "kind": {"type": "container"}},
                {"id": 1, "description": "leaf", "marked_for_execution": true,
                 "kind": {"type": "debug_info"}}
            ]
        }"#;
        assert!(serde_json::from_str::<Tree>(json).is_err());
    }

    #[test]
    fn test_deserialize_rejects_leaf_with_children() {
        let json = r#"{
            "root": 0,
            "nodes": [
                {"id": 0, "children": [1], "description": "root",
                 "marked_for_execution": true, "kind": {"type": "container"}},
                {"id": 1, "children": [2], "description": "dump",
                 "marked_for_execution": true, "kind": {"type": "debug_info"}},
                {"id": 2, "description": "hidden", "marked_for_execution": true,
                 "kind": {"type": "debug_info"}}
            ]
        }"#;
        let err = serde_json::from_str::<Tree>(json).unwrap_err();
        assert!(err.to_string().contains("cannot hold children"), "{}", err);
    }
}
