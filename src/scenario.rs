//! Test scenarios
//!
//! A [`Scenario`] is the root container of a test tree together with its
//! edit history and scenario-level settings. Every edit goes through the
//! change log so it can be undone.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::changes::{Change, ChangeLog, ChangeSet};
use crate::common::{Error, Result};
use crate::driver::BrowserKind;
use crate::tree::{Node, NodeId, Tree};

/// Family of scenario, used to pick a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    #[default]
    Web,
}

/// Scenario-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScenarioSettings {
    /// Driver the runner should acquire
    #[serde(default)]
    pub browser: BrowserKind,
    /// Page loaded before the first node runs
    #[serde(default)]
    pub url: Option<String>,
}

/// Root container plus edit history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    kind: ScenarioKind,
    #[serde(default)]
    settings: ScenarioSettings,
    tree: Tree,
    #[serde(skip)]
    changes: ChangeLog,
    #[serde(skip)]
    dirty: bool,
    #[serde(skip)]
    location: Option<PathBuf>,
}

impl Scenario {
    /// New scenario whose root container is called `name`
    pub fn new(name: impl Into<String>, settings: ScenarioSettings) -> Self {
        Self::from_tree(Tree::new(Node::container(name)), settings)
    }

    /// Wrap an existing tree
    pub fn from_tree(tree: Tree, settings: ScenarioSettings) -> Self {
        Self {
            kind: ScenarioKind::Web,
            settings,
            tree,
            changes: ChangeLog::new(),
            dirty: false,
            location: None,
        }
    }

    /// Replace the change log with one bounded to `limit` change sets
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.changes = ChangeLog::with_limit(limit);
        self
    }

    pub fn name(&self) -> &str {
        &self.tree.root_node().description
    }

    pub fn kind(&self) -> ScenarioKind {
        self.kind
    }

    pub fn settings(&self) -> &ScenarioSettings {
        &self.settings
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Direct tree access for run bookkeeping, bypassing the change log
    pub(crate) fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    /// Stop recording edits (loading, running)
    pub fn pause_changes(&mut self) {
        self.changes.pause();
    }

    pub fn resume_changes(&mut self) {
        self.changes.resume();
    }

    /// Forget the whole edit history
    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Remember where the scenario is stored; it is clean afterwards
    pub fn set_location(&mut self, location: impl Into<PathBuf>) {
        self.location = Some(location.into());
        self.dirty = false;
    }

    /// Insert `node` under `parent` at `index`, or append when `None`
    pub fn add_child(&mut self, parent: NodeId, node: Node, index: Option<usize>) -> Result<NodeId> {
        let description = format!("Add {}", node.description);
        let subtree = self.tree.allocate(node);
        let id = subtree.root();
        let index = index.unwrap_or(usize::MAX);
        self.commit(
            vec![Change::Insert {
                parent,
                index,
                subtree,
            }],
            description,
        )?;
        Ok(id)
    }

    /// Detach `node` (and everything it owns) from `parent`
    pub fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
        let change = self.remove_change(parent, node)?;
        let description = format!("Remove {}", self.tree.node(node)?.description);
        self.commit(vec![change], description)
    }

    /// Assign a node property by name
    pub fn set_property(&mut self, node: NodeId, name: &str, value: Value) -> Result<()> {
        let old = self.tree.node(node)?.property(name)?;
        self.commit(
            vec![Change::SetProperty {
                node,
                property: name.to_string(),
                old,
                new: value,
            }],
            format!("Set {}", name),
        )
    }

    /// Replace the scenario settings
    pub fn set_settings(&mut self, settings: ScenarioSettings) -> Result<()> {
        let change = Change::Settings {
            old: self.settings.clone(),
            new: settings,
        };
        self.commit(vec![change], "Change scenario settings")
    }

    pub fn set_url(&mut self, url: Option<String>) -> Result<()> {
        let settings = ScenarioSettings {
            url,
            ..self.settings.clone()
        };
        self.set_settings(settings)
    }

    pub fn set_browser(&mut self, browser: BrowserKind) -> Result<()> {
        let settings = ScenarioSettings {
            browser,
            ..self.settings.clone()
        };
        self.set_settings(settings)
    }

    /// Move `node` under `new_parent` at `index`
    ///
    /// `index` is interpreted after `node` has been taken out of its old
    /// position.
    pub fn move_node(&mut self, node: NodeId, new_parent: NodeId, index: Option<usize>) -> Result<()> {
        if self.tree.is_ancestor(node, new_parent) {
            return Err(Error::CyclicMove {
                node: node.0,
                target: new_parent.0,
            });
        }
        if !self.tree.node(new_parent)?.kind.is_container() {
            return Err(Error::NotAContainer(new_parent.0));
        }
        let parent = self
            .tree
            .node(node)?
            .parent()
            .ok_or(Error::CannotRemoveRoot)?;
        let remove = self.remove_change(parent, node)?;
        let insert = Change::Insert {
            parent: new_parent,
            index: index.unwrap_or(usize::MAX),
            subtree: self.tree.snapshot(node)?,
        };
        let description = format!("Move {}", self.tree.node(node)?.description);
        self.commit(vec![remove, insert], description)
    }

    /// Copy of the subtree at `node`, for the clipboard
    pub fn copy(&self, node: NodeId) -> Result<Tree> {
        self.tree.clone_subtree(node)
    }

    /// Copy the subtree at `node`, then remove it
    pub fn cut(&mut self, node: NodeId) -> Result<Tree> {
        let clip = self.copy(node)?;
        let parent = self
            .tree
            .node(node)?
            .parent()
            .ok_or(Error::CannotRemoveRoot)?;
        let change = self.remove_change(parent, node)?;
        self.commit(vec![change], "Cut")?;
        Ok(clip)
    }

    /// Insert a copy of `clip` under `parent`
    pub fn paste(&mut self, parent: NodeId, clip: &Tree, index: Option<usize>) -> Result<NodeId> {
        if !self.tree.node(parent)?.kind.is_container() {
            return Err(Error::NotAContainer(parent.0));
        }
        let subtree = self.tree.import(clip, clip.root())?;
        let id = subtree.root();
        self.commit(
            vec![Change::Insert {
                parent,
                index: index.unwrap_or(usize::MAX),
                subtree,
            }],
            "Paste",
        )?;
        Ok(id)
    }

    /// Revert the latest edit; returns its description
    pub fn undo(&mut self) -> Result<Option<String>> {
        let undone = self.changes.undo(&mut self.tree, &mut self.settings)?;
        if undone.is_some() {
            self.dirty = true;
        }
        Ok(undone)
    }

    /// Reapply the latest undone edit; returns its description
    pub fn redo(&mut self) -> Result<Option<String>> {
        let redone = self.changes.redo(&mut self.tree, &mut self.settings)?;
        if redone.is_some() {
            self.dirty = true;
        }
        Ok(redone)
    }

    pub fn can_undo(&self) -> bool {
        self.changes.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.changes.can_redo()
    }

    /// Independent copy for a run: fresh ids, no history, execution fields reset
    pub fn clone_for_run(&self) -> Scenario {
        let mut tree = self.tree.deep_clone();
        tree.reset_execution();
        Scenario {
            kind: self.kind,
            settings: self.settings.clone(),
            tree,
            changes: ChangeLog::new(),
            dirty: false,
            location: self.location.clone(),
        }
    }

    fn remove_change(&self, parent: NodeId, node: NodeId) -> Result<Change> {
        if node == self.tree.root() {
            return Err(Error::CannotRemoveRoot);
        }
        let index = self.tree.position(parent, node)?;
        let subtree = self.tree.snapshot(node)?;
        Ok(Change::Remove {
            parent,
            index,
            subtree,
        })
    }

    /// Apply `changes` in order and record them as one set
    ///
    /// If any change fails, the ones already applied are reverted and the
    /// scenario is unchanged.
    fn commit(&mut self, changes: Vec<Change>, description: impl Into<String>) -> Result<()> {
        let set = ChangeSet::from_changes(changes, description);
        if let Err(e) = set.redo(&mut self.tree, &mut self.settings) {
            tracing::debug!(error = %e, "Rejected scenario edit");
            return Err(e);
        }
        self.changes.add_change_set(set);
        self.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Locator, NodeKind, WebAction};
    use serde_json::json;

    fn click(name: &str) -> Node {
        Node::web(
            WebAction::Click {
                locator: Locator::id(name),
            },
            name,
        )
    }

    fn descriptions(scenario: &Scenario) -> Vec<String> {
        let tree = scenario.tree();
        tree.walk()
            .iter()
            .map(|id| tree.get(*id).unwrap().description.clone())
            .collect()
    }

    /// root -> [folder -> [a, b], c]
    fn sample() -> (Scenario, NodeId, NodeId, NodeId, NodeId) {
        let mut scenario = Scenario::new("login", ScenarioSettings::default());
        let root = scenario.root();
        let folder = scenario.add_child(root, Node::container("folder"), None).unwrap();
        let a = scenario.add_child(folder, click("a"), None).unwrap();
        scenario.add_child(folder, click("b"), None).unwrap();
        let c = scenario.add_child(root, click("c"), None).unwrap();
        (scenario, root, folder, a, c)
    }

    #[test]
    fn test_add_child_respects_index() {
        let (mut scenario, root, ..) = sample();
        scenario.add_child(root, click("first"), Some(0)).unwrap();
        assert_eq!(
            descriptions(&scenario),
            vec!["login", "first", "folder", "a", "b", "c"]
        );
    }

    #[test]
    fn test_every_edit_is_undoable() {
        let (mut scenario, root, folder, _, c) = sample();
        let start = scenario.tree().clone();

        scenario.remove_child(root, folder).unwrap();
        scenario.set_property(c, "description", json!("renamed")).unwrap();
        scenario.move_node(c, root, Some(0)).unwrap();
        let clip = scenario.copy(c).unwrap();
        scenario.paste(root, &clip, None).unwrap();
        scenario.set_url(Some("https://example.com".into())).unwrap();

        while scenario.can_undo() {
            scenario.undo().unwrap();
        }
        // the four adds from sample() are undone as well
        assert_eq!(descriptions(&scenario), vec!["login"]);

        for _ in 0..4 {
            scenario.redo().unwrap();
        }
        assert_eq!(scenario.tree(), &start);
        assert_eq!(scenario.settings().url, None);
    }

    #[test]
    fn test_redo_after_undo_reproduces_state() {
        let (mut scenario, root, folder, ..) = sample();
        scenario.move_node(folder, root, None).unwrap();
        let moved = scenario.tree().clone();

        scenario.undo().unwrap();
        assert_ne!(scenario.tree(), &moved);
        scenario.redo().unwrap();
        assert_eq!(scenario.tree(), &moved);
    }

    #[test]
    fn test_edit_after_undo_discards_redo() {
        let (mut scenario, _, _, a, _) = sample();
        scenario.set_property(a, "description", json!("x")).unwrap();
        scenario.undo().unwrap();
        assert!(scenario.can_redo());
        scenario.set_property(a, "description", json!("y")).unwrap();
        assert!(!scenario.can_redo());
    }

    #[test]
    fn test_invalid_edits_change_nothing() {
        let (mut scenario, root, folder, a, c) = sample();
        let before = scenario.tree().clone();
        let history = scenario.changes().undo_len();

        assert!(matches!(
            scenario.add_child(a, click("x"), None),
            Err(Error::NotAContainer(_))
        ));
        let clip = scenario.copy(a).unwrap();
        assert!(matches!(
            scenario.paste(c, &clip, None),
            Err(Error::NotAContainer(_))
        ));
        assert!(matches!(
            scenario.move_node(folder, a, None),
            Err(Error::CyclicMove { .. })
        ));
        assert!(matches!(
            scenario.move_node(folder, folder, None),
            Err(Error::CyclicMove { .. })
        ));
        assert!(matches!(
            scenario.remove_child(root, root),
            Err(Error::CannotRemoveRoot)
        ));
        assert!(matches!(
            scenario.remove_child(folder, c),
            Err(Error::NotAChild { .. })
        ));
        assert!(scenario.set_property(a, "action.locator.by", json!("nope")).is_err());

        assert_eq!(scenario.tree(), &before);
        assert_eq!(scenario.changes().undo_len(), history);
    }

    #[test]
    fn test_cut_and_paste_is_one_step_each() {
        let (mut scenario, root, folder, ..) = sample();
        let before = scenario.tree().clone();

        let clip = scenario.cut(folder).unwrap();
        assert_eq!(clip.len(), 3);
        assert_eq!(descriptions(&scenario), vec!["login", "c"]);

        scenario.paste(root, &clip, Some(0)).unwrap();
        assert_eq!(
            descriptions(&scenario),
            vec!["login", "folder", "a", "b", "c"]
        );

        scenario.undo().unwrap();
        scenario.undo().unwrap();
        assert_eq!(scenario.tree(), &before);
    }

    #[test]
    fn test_paused_edits_apply_but_are_not_undoable() {
        let (mut scenario, root, ..) = sample();
        let history = scenario.changes().undo_len();
        scenario.pause_changes();
        scenario.add_child(root, click("late"), None).unwrap();
        assert_eq!(scenario.changes().undo_len(), history);
        assert!(descriptions(&scenario).contains(&"late".to_string()));
    }

    #[test]
    fn test_clone_for_run_is_independent() {
        let (mut scenario, _, _, a, _) = sample();
        let run = scenario.clone_for_run();
        assert_eq!(descriptions(&run), descriptions(&scenario));
        assert!(!run.can_undo());
        assert!(!run.is_dirty());

        scenario.set_property(a, "description", json!("edited")).unwrap();
        assert!(!descriptions(&run).contains(&"edited".to_string()));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut scenario = Scenario::new("s", ScenarioSettings::default());
        assert!(!scenario.is_dirty());
        scenario
            .add_child(
                scenario.root(),
                Node::new(NodeKind::DebugInfo, "debug"),
                None,
            )
            .unwrap();
        assert!(scenario.is_dirty());
        scenario.set_location("/tmp/s.wts");
        assert!(!scenario.is_dirty());
    }

    #[test]
    fn test_zero_history_limit_keeps_no_undo() {
        let mut scenario =
            Scenario::new("s", ScenarioSettings::default()).with_history_limit(0);
        let root = scenario.root();
        let node = scenario.add_child(root, click("a"), None).unwrap();
        scenario.set_property(node, "description", json!("b")).unwrap();
        assert_eq!(descriptions(&scenario), vec!["s", "b"]);
        assert!(scenario.is_dirty());
        assert!(!scenario.can_undo());
        assert_eq!(scenario.undo().unwrap(), None);
    }
}
