//! Result record of a run
//!
//! A [`TestResultModel`] wraps the cloned scenario a run executes. While the
//! run is in flight the record is owned by a dedicated task: the worker sends
//! [`StateWrite`]s through a [`ResultHandle`] and observers follow progress
//! through a `watch` receiver. Writes are applied in the order they were sent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

use crate::common::logging::LogEntry;
use crate::common::{Error, Result};
use crate::scenario::Scenario;
use crate::tree::{NodeId, TestCaseResult, TestRunState, Tree};

/// Scenario clone carrying the outcome of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResultModel {
    scenario: Scenario,
    #[serde(skip)]
    dirty: bool,
    #[serde(skip)]
    location: Option<PathBuf>,
}

impl TestResultModel {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            dirty: false,
            location: None,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn tree(&self) -> &Tree {
        self.scenario.tree()
    }

    /// Outcome recorded on the root node
    pub fn outcome(&self) -> TestCaseResult {
        self.tree().root_node().actual_result
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

    /// Remember where the record is stored; it is clean afterwards
    pub fn set_location(&mut self, location: impl Into<PathBuf>) {
        self.location = Some(location.into());
        self.dirty = false;
    }

    fn apply(&mut self, write: &StateWrite) -> Result<()> {
        write.apply(self.scenario.tree_mut())?;
        self.dirty = true;
        Ok(())
    }
}

/// A single mutation of run state
#[derive(Debug, Clone, PartialEq)]
pub enum StateWrite {
    RunState { node: NodeId, state: TestRunState },
    Outcome { node: NodeId, result: TestCaseResult },
    Log { node: NodeId, entry: LogEntry },
}

impl StateWrite {
    /// Apply the write to `tree`
    pub fn apply(&self, tree: &mut Tree) -> Result<()> {
        match self {
            StateWrite::RunState { node, state } => tree.node_mut(*node)?.run_state = *state,
            StateWrite::Outcome { node, result } => tree.node_mut(*node)?.actual_result = *result,
            StateWrite::Log { node, entry } => tree.node_mut(*node)?.log.push(entry.clone()),
        }
        Ok(())
    }
}

enum OwnerCommand {
    Write(StateWrite, Option<oneshot::Sender<()>>),
    Flush(oneshot::Sender<()>),
}

/// Sending side of a result record owned by its own task
#[derive(Debug, Clone)]
pub struct ResultHandle {
    tx: mpsc::UnboundedSender<OwnerCommand>,
    state: watch::Receiver<TestResultModel>,
}

/// Move `model` into a new owner task
///
/// The task stops once every handle has been dropped; receivers keep the
/// last state.
pub fn spawn_owner(model: TestResultModel) -> ResultHandle {
    let (state_tx, state) = watch::channel(model);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(own(rx, state_tx));
    ResultHandle { tx, state }
}

async fn own(mut rx: mpsc::UnboundedReceiver<OwnerCommand>, state: watch::Sender<TestResultModel>) {
    while let Some(command) = rx.recv().await {
        match command {
            OwnerCommand::Write(write, ack) => {
                state.send_modify(|model| {
                    if let Err(e) = model.apply(&write) {
                        tracing::warn!(error = %e, ?write, "Dropped result write");
                    }
                });
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            OwnerCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("Result owner finished");
}

impl ResultHandle {
    /// Queue a write without waiting for it
    pub fn apply(&self, write: StateWrite) {
        if self.tx.send(OwnerCommand::Write(write, None)).is_err() {
            tracing::warn!("Result owner is gone, write dropped");
        }
    }

    /// Queue a write and wait until it has been applied
    pub async fn apply_and_wait(&self, write: StateWrite) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(OwnerCommand::Write(write, Some(ack)))
            .map_err(|_| Error::ResultClosed)?;
        done.await.map_err(|_| Error::ResultClosed)
    }

    /// Wait until every write queued so far has been applied
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(OwnerCommand::Flush(ack))
            .map_err(|_| Error::ResultClosed)?;
        done.await.map_err(|_| Error::ResultClosed)
    }

    /// Live view of the record
    pub fn subscribe(&self) -> watch::Receiver<TestResultModel> {
        self.state.clone()
    }

    /// Root of the recorded tree
    pub fn root(&self) -> NodeId {
        self.state.borrow().tree().root()
    }

    /// Copy of the record as of now
    pub fn snapshot(&self) -> TestResultModel {
        self.state.borrow().clone()
    }
}
