//! Node execution
//!
//! The worker walks its own copy of the run tree depth-first. Every state
//! change is applied to that copy and, for the top-level scenario, mirrored
//! to the result owner. Errors stop at the node that raised them: they are
//! logged on the node and turn it `Failed`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::time::Instant;

use super::Shared;
use crate::common::logging::LogEntry;
use crate::common::{Error, Result};
use crate::driver::Driver;
use crate::expr;
use crate::persist;
use crate::results::{ResultHandle, StateWrite};
use crate::tree::{Locator, NodeId, NodeKind, TestCaseResult, TestRunState, Tree, WebAction};
use crate::variables::SetOutcome;

/// Where a (sub-)tree executes
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    /// Result owner receiving a copy of every write
    pub mirror: Option<&'a ResultHandle>,
    /// Sub-scenario nesting level
    pub depth: usize,
    /// Directory relative sub-scenario paths are resolved against
    pub base_dir: Option<&'a Path>,
}

pub(crate) struct Executor<'a> {
    pub shared: &'a Shared,
    pub driver: &'a dyn Driver,
}

impl Executor<'_> {
    /// Load `url` (if any), then execute the tree from `root`
    ///
    /// A navigation failure fails the root without running anything.
    pub async fn run_root(
        &self,
        tree: &mut Tree,
        root: NodeId,
        url: Option<&str>,
        scope: Scope<'_>,
    ) -> TestCaseResult {
        if let Some(url) = url {
            tracing::info!(url, "Opening start page");
            if let Err(e) = self.driver.navigate(url).await {
                let entry = LogEntry::exception(format!("Could not open '{}': {}", url, e));
                self.log(tree, scope, root, entry);
                self.finish(tree, scope, root, TestCaseResult::Failed);
                return TestCaseResult::Failed;
            }
        }
        self.run_node(tree, root, scope).await
    }

    /// Execute one node and its subtree
    ///
    /// Unmarked nodes, and every node once a stop was requested, are skipped
    /// without touching their state.
    pub fn run_node<'b>(
        &'b self,
        tree: &'b mut Tree,
        id: NodeId,
        scope: Scope<'b>,
    ) -> BoxFuture<'b, TestCaseResult> {
        Box::pin(async move {
            let (kind, children, description) = match tree.get(id) {
                Some(node) if node.marked_for_execution => (
                    node.kind.clone(),
                    node.children.clone(),
                    node.description.clone(),
                ),
                _ => return TestCaseResult::NotRun,
            };
            if self.shared.stop_requested() {
                return TestCaseResult::NotRun;
            }

            tracing::debug!(node = %id, kind = kind.name(), %description, "Executing");
            self.write(
                tree,
                scope,
                StateWrite::RunState {
                    node: id,
                    state: TestRunState::Running,
                },
            );

            let result = match self.execute(tree, id, &kind, &children, scope).await {
                Ok(result) => result,
                Err(e) => {
                    let entry = LogEntry::exception(format!("{}: {}", description, e));
                    self.log(tree, scope, id, entry);
                    TestCaseResult::Failed
                }
            };

            self.finish(tree, scope, id, result);
            result
        })
    }

    async fn execute(
        &self,
        tree: &mut Tree,
        id: NodeId,
        kind: &NodeKind,
        children: &[NodeId],
        scope: Scope<'_>,
    ) -> Result<TestCaseResult> {
        match kind {
            NodeKind::Container { stop_on_failure } => {
                Ok(self.run_children(tree, children, *stop_on_failure, scope).await)
            }
            NodeKind::Expression {
                condition,
                stop_on_failure,
            } => {
                let holds = {
                    let vars = self.shared.variables.lock();
                    expr::evaluate(condition, &vars)?
                };
                if holds {
                    Ok(self.run_children(tree, children, *stop_on_failure, scope).await)
                } else {
                    let entry = LogEntry::info(format!(
                        "Condition '{}' is false, children skipped",
                        condition
                    ));
                    self.log(tree, scope, id, entry);
                    Ok(TestCaseResult::Passed)
                }
            }
            NodeKind::Looper {
                iterations,
                index_variable,
                stop_on_failure,
            } => {
                let mut failed = false;
                for i in 0..*iterations {
                    if self.shared.stop_requested() {
                        break;
                    }
                    if let Some(name) = index_variable {
                        self.shared.variables.lock().set(name, Value::from(i), true);
                    }
                    if self.run_children(tree, children, *stop_on_failure, scope).await
                        == TestCaseResult::Failed
                    {
                        failed = true;
                        if *stop_on_failure {
                            break;
                        }
                    }
                }
                Ok(outcome(failed))
            }
            NodeKind::RunSubScenario { path } => {
                self.run_sub_scenario(tree, id, path, scope).await
            }
            NodeKind::SetVariable { name, value, force } => {
                let outcome = {
                    let mut vars = self.shared.variables.lock();
                    let value = match value {
                        Value::String(text) => Value::String(expr::interpolate(text, &vars)?),
                        other => other.clone(),
                    };
                    vars.set(name, value, *force)
                };
                if outcome == SetOutcome::Kept {
                    let entry = LogEntry::warn(format!(
                        "Variable '{}' already exists and was not overwritten",
                        name
                    ));
                    self.log(tree, scope, id, entry);
                }
                Ok(TestCaseResult::Passed)
            }
            NodeKind::WebAction { action } => {
                self.web_action(action).await?;
                Ok(TestCaseResult::Passed)
            }
            NodeKind::DebugInfo => {
                let dump = self.shared.variables.lock().dump();
                self.log(tree, scope, id, LogEntry::info(dump));
                Ok(TestCaseResult::Passed)
            }
        }
    }

    async fn run_children(
        &self,
        tree: &mut Tree,
        children: &[NodeId],
        stop_on_failure: bool,
        scope: Scope<'_>,
    ) -> TestCaseResult {
        let mut failed = false;
        for child in children {
            if self.shared.stop_requested() {
                break;
            }
            if self.run_node(tree, *child, scope).await == TestCaseResult::Failed {
                failed = true;
                if stop_on_failure {
                    break;
                }
            }
        }
        outcome(failed)
    }

    async fn run_sub_scenario(
        &self,
        tree: &mut Tree,
        id: NodeId,
        path: &Path,
        scope: Scope<'_>,
    ) -> Result<TestCaseResult> {
        let limit = self.shared.config.max_subscenario_depth;
        if scope.depth >= limit {
            return Err(Error::NestingTooDeep(limit));
        }
        let path = resolve(path, scope.base_dir);
        let mut sub = persist::open_scenario(&path, &self.shared.registry)?.clone_for_run();
        let root = sub.root();
        let entry = LogEntry::info(format!("Running '{}' from {}", sub.name(), path.display()));
        self.log(tree, scope, id, entry);

        let sub_scope = Scope {
            mirror: None,
            depth: scope.depth + 1,
            base_dir: path.parent(),
        };
        let result = self.run_node(sub.tree_mut(), root, sub_scope).await;

        let sub_tree = sub.tree();
        let failed: Vec<&str> = sub_tree
            .walk()
            .into_iter()
            .filter_map(|n| sub_tree.get(n))
            .filter(|n| n.actual_result == TestCaseResult::Failed && n.children().is_empty())
            .map(|n| n.description.as_str())
            .collect();
        if !failed.is_empty() {
            let entry = LogEntry::warn(format!(
                "Failed in '{}': {}",
                sub.name(),
                failed.join(", ")
            ));
            self.log(tree, scope, id, entry);
        }
        Ok(match result {
            TestCaseResult::Failed => TestCaseResult::Failed,
            _ => TestCaseResult::Passed,
        })
    }

    async fn web_action(&self, action: &WebAction) -> Result<()> {
        match action {
            WebAction::Navigate { url } => {
                let url = self.interpolate(url)?;
                self.driver.navigate(&url).await
            }
            WebAction::Click { locator } => {
                let element = self.driver.find_element(&self.locator(locator)?).await?;
                self.driver.click(&element).await
            }
            WebAction::TypeText { locator, text } => {
                let text = self.interpolate(text)?;
                let element = self.driver.find_element(&self.locator(locator)?).await?;
                self.driver.send_keys(&element, &text).await
            }
            WebAction::WaitForElement {
                locator,
                timeout_ms,
            } => {
                let locator = self.locator(locator)?;
                let config = &self.shared.config;
                let timeout =
                    Duration::from_millis(timeout_ms.unwrap_or(config.default_wait_timeout_ms));
                let poll = Duration::from_millis(config.poll_interval_ms.max(1));
                let deadline = Instant::now() + timeout;
                loop {
                    match self.driver.find_element(&locator).await {
                        Ok(_) => return Ok(()),
                        Err(e) if Instant::now() >= deadline => {
                            tracing::debug!(error = %e, %locator, "Gave up waiting");
                            return Err(Error::ElementNotFound(locator.to_string()));
                        }
                        Err(_) => tokio::time::sleep(poll).await,
                    }
                }
            }
        }
    }

    fn interpolate(&self, text: &str) -> Result<String> {
        expr::interpolate(text, &self.shared.variables.lock())
    }

    fn locator(&self, locator: &Locator) -> Result<Locator> {
        Ok(Locator::new(locator.by, self.interpolate(&locator.value)?))
    }

    fn log(&self, tree: &mut Tree, scope: Scope<'_>, node: NodeId, entry: LogEntry) {
        self.shared.sink.log(&entry);
        self.write(tree, scope, StateWrite::Log { node, entry });
    }

    /// Record the outcome and mark the node done
    fn finish(&self, tree: &mut Tree, scope: Scope<'_>, node: NodeId, result: TestCaseResult) {
        self.write(tree, scope, StateWrite::Outcome { node, result });
        self.write(
            tree,
            scope,
            StateWrite::RunState {
                node,
                state: TestRunState::Done,
            },
        );
    }

    fn write(&self, tree: &mut Tree, scope: Scope<'_>, write: StateWrite) {
        if let Some(mirror) = scope.mirror {
            mirror.apply(write.clone());
        }
        if let Err(e) = write.apply(tree) {
            tracing::warn!(error = %e, "Run state write failed");
        }
    }
}

fn outcome(failed: bool) -> TestCaseResult {
    if failed {
        TestCaseResult::Failed
    } else {
        TestCaseResult::Passed
    }
}

fn resolve(path: &Path, base: Option<&Path>) -> PathBuf {
    match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}
