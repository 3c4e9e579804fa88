//! Undo/redo change log
//!
//! A [`Change`] is one reversible mutation of a scenario. Changes are grouped
//! into [`ChangeSet`]s, the unit of undo and redo: undo reverts a set's
//! changes last-to-first, redo reapplies them first-to-last.
//!
//! The log can be paused. While paused nothing is recorded, which is how
//! scenario loading and live runs keep their mutations out of the history.

use std::collections::VecDeque;

use serde_json::Value;

use crate::common::Result;
use crate::scenario::ScenarioSettings;
use crate::tree::{Detached, NodeId, Tree};

/// A single reversible mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// `subtree` is attached under `parent` at `index`
    Insert {
        parent: NodeId,
        index: usize,
        subtree: Detached,
    },
    /// `subtree` (currently at `index` under `parent`) is detached
    Remove {
        parent: NodeId,
        index: usize,
        subtree: Detached,
    },
    /// A node property goes from `old` to `new`
    SetProperty {
        node: NodeId,
        property: String,
        old: Value,
        new: Value,
    },
    /// Scenario-level settings go from `old` to `new`
    Settings {
        old: ScenarioSettings,
        new: ScenarioSettings,
    },
}

impl Change {
    /// Apply the change in the forward direction
    pub(crate) fn apply(&self, tree: &mut Tree, settings: &mut ScenarioSettings) -> Result<()> {
        match self {
            Change::Insert {
                parent,
                index,
                subtree,
            } => tree.attach(*parent, *index, subtree.clone()),
            Change::Remove {
                parent, subtree, ..
            } => tree.detach(*parent, subtree.root()).map(|_| ()),
            Change::SetProperty {
                node,
                property,
                new,
                ..
            } => tree
                .node_mut(*node)?
                .set_property(property, new.clone())
                .map(|_| ()),
            Change::Settings { new, .. } => {
                *settings = new.clone();
                Ok(())
            }
        }
    }

    /// Apply the inverse of the change
    pub(crate) fn revert(&self, tree: &mut Tree, settings: &mut ScenarioSettings) -> Result<()> {
        match self {
            Change::Insert {
                parent, subtree, ..
            } => tree.detach(*parent, subtree.root()).map(|_| ()),
            Change::Remove {
                parent,
                index,
                subtree,
            } => tree.attach(*parent, *index, subtree.clone()),
            Change::SetProperty {
                node,
                property,
                old,
                ..
            } => tree
                .node_mut(*node)?
                .set_property(property, old.clone())
                .map(|_| ()),
            Change::Settings { old, .. } => {
                *settings = old.clone();
                Ok(())
            }
        }
    }
}

/// Ordered group of changes undone and redone together
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    description: String,
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(change: Change, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            changes: vec![change],
        }
    }

    /// Build a set from several changes, in application order
    pub fn from_changes(changes: Vec<Change>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            changes,
        }
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Revert every change, last to first
    ///
    /// All or nothing: on failure the changes already reverted are applied
    /// again, leaving the tree as it was.
    pub(crate) fn undo(&self, tree: &mut Tree, settings: &mut ScenarioSettings) -> Result<()> {
        for (done, change) in self.changes.iter().rev().enumerate() {
            if let Err(e) = change.revert(tree, settings) {
                let reverted = &self.changes[self.changes.len() - done..];
                for change in reverted {
                    rollback(change.apply(tree, settings));
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Apply every change, first to last; all or nothing like [`ChangeSet::undo`]
    pub(crate) fn redo(&self, tree: &mut Tree, settings: &mut ScenarioSettings) -> Result<()> {
        for (done, change) in self.changes.iter().enumerate() {
            if let Err(e) = change.apply(tree, settings) {
                for change in self.changes[..done].iter().rev() {
                    rollback(change.revert(tree, settings));
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Rollback steps invert changes that just succeeded on the same tree
fn rollback(result: Result<()>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Could not roll back a partially applied change set");
    }
}

/// Undo and redo stacks of change sets
#[derive(Debug, Clone)]
pub struct ChangeLog {
    undo: VecDeque<ChangeSet>,
    redo: Vec<ChangeSet>,
    paused: bool,
    limit: usize,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that keeps at most `limit` undoable change sets
    ///
    /// A limit of zero disables history.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            paused: false,
            limit,
        }
    }

    /// Record an already-applied change as its own set
    ///
    /// Returns `None` while paused. Recording discards everything that could
    /// have been redone.
    pub fn add_change(&mut self, change: Change, description: &str) -> Option<&ChangeSet> {
        self.add_change_set(ChangeSet::new(change, description))
    }

    /// Record an already-applied change set
    pub fn add_change_set(&mut self, set: ChangeSet) -> Option<&ChangeSet> {
        if self.paused || self.limit == 0 {
            return None;
        }
        self.redo.clear();
        if self.undo.len() == self.limit {
            self.undo.pop_front();
        }
        self.undo.push_back(set);
        self.undo.back()
    }

    /// Revert the most recent change set
    ///
    /// Returns its description, or `None` if there was nothing to undo.
    pub fn undo(
        &mut self,
        tree: &mut Tree,
        settings: &mut ScenarioSettings,
    ) -> Result<Option<String>> {
        let Some(set) = self.undo.pop_back() else {
            return Ok(None);
        };
        if let Err(e) = set.undo(tree, settings) {
            self.undo.push_back(set);
            return Err(e);
        }
        let description = set.description.clone();
        self.redo.push(set);
        Ok(Some(description))
    }

    /// Reapply the most recently undone change set
    pub fn redo(
        &mut self,
        tree: &mut Tree,
        settings: &mut ScenarioSettings,
    ) -> Result<Option<String>> {
        let Some(set) = self.redo.pop() else {
            return Ok(None);
        };
        if let Err(e) = set.redo(tree, settings) {
            self.redo.push(set);
            return Err(e);
        }
        let description = set.description.clone();
        self.undo.push_back(set);
        Ok(Some(description))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Description of the set [`ChangeLog::undo`] would revert
    pub fn undo_description(&self) -> Option<&str> {
        self.undo.back().map(ChangeSet::description)
    }

    /// Description of the set [`ChangeLog::redo`] would reapply
    pub fn redo_description(&self) -> Option<&str> {
        self.redo.last().map(ChangeSet::description)
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Stop recording changes
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Start recording changes again
    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
