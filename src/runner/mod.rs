//! Scenario runner
//!
//! A [`Runner`] executes one scenario at a time on a background tokio task.
//! `initialize` clones the scenario into a result record, hands the record to
//! its owner task and spawns the worker; the caller gets a [`RunHandle`] and
//! can follow the run through [`RunEvent`]s or the record's watch channel.
//!
//! Each run gets its own artifact folder named by a timestamp id under the
//! configured results directory; the final record is written there as
//! `result.json`.

mod exec;
pub mod registry;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::common::config::RunnerConfig;
use crate::common::logging::{LogEntry, LogSink, TracingSink};
use crate::common::paths::RESULT_FILE_NAME;
use crate::common::{Error, Result};
use crate::driver::{Driver, DriverFactory};
use crate::persist;
use crate::results::{self, ResultHandle, StateWrite, TestResultModel};
use crate::scenario::Scenario;
use crate::tree::{NodeId, NodeRegistry, TestCaseResult, TestRunState};
use crate::variables::{SetOutcome, Variable, VariableStore};

use exec::{Executor, Scope};

pub use registry::RunnerRegistry;

/// Snapshot of a runner sent along with run events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerStatus {
    pub unique_id: Option<String>,
    pub run_folder: Option<PathBuf>,
    pub is_running: bool,
}

/// Lifecycle notifications of a run
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A result record exists; observers may switch to it
    ResultCreated(watch::Receiver<TestResultModel>),
    /// The worker started, before any node executes
    Started(RunnerStatus),
    /// The run finished with the root's outcome
    Ended(RunnerStatus, TestCaseResult),
}

/// Per-run bindings, cleared by [`Runner::clean_up`]
#[derive(Default)]
struct Bindings {
    unique_id: Option<String>,
    run_folder: Option<PathBuf>,
    driver: Option<Arc<dyn Driver>>,
    result: Option<ResultHandle>,
}

pub(crate) struct Shared {
    factory: Arc<dyn DriverFactory>,
    pub(crate) registry: NodeRegistry,
    pub(crate) config: RunnerConfig,
    pub(crate) sink: Arc<dyn LogSink>,
    is_running: AtomicBool,
    stop: AtomicBool,
    pub(crate) variables: Mutex<VariableStore>,
    bindings: Mutex<Bindings>,
    events: broadcast::Sender<RunEvent>,
}

impl Shared {
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Executes scenarios against drivers from a [`DriverFactory`]
///
/// Cloning is cheap; clones share the same run state.
#[derive(Clone)]
pub struct Runner {
    shared: Arc<Shared>,
}

/// Handle to a run in flight
pub struct RunHandle {
    task: JoinHandle<TestCaseResult>,
    result: watch::Receiver<TestResultModel>,
}

impl RunHandle {
    /// Live view of the result record
    pub fn result(&self) -> watch::Receiver<TestResultModel> {
        self.result.clone()
    }

    /// Wait for the run (including cleanup) to finish and return the record
    pub async fn wait(self) -> Result<TestResultModel> {
        self.task
            .await
            .map_err(|e| Error::RunAborted(e.to_string()))?;
        let model = self.result.borrow().clone();
        Ok(model)
    }
}

impl Runner {
    pub fn new(factory: Arc<dyn DriverFactory>, config: RunnerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                factory,
                registry: NodeRegistry::with_builtin(),
                config,
                sink: Arc::new(TracingSink),
                is_running: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                variables: Mutex::new(Default::default()),
                bindings: Mutex::new(Bindings::default()),
                events,
            }),
        }
    }

    /// Report run log entries to `sink` instead of `tracing`
    ///
    /// Only effective before the runner is first cloned.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.sink = sink;
        }
        self
    }

    /// Node kinds allowed in sub-scenarios
    ///
    /// Only effective before the runner is first cloned.
    pub fn with_registry(mut self, registry: NodeRegistry) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.registry = registry;
        }
        self
    }

    /// Start running a copy of `scenario`
    ///
    /// Returns `None` without side effects when a run is already in flight.
    /// Must be called within a tokio runtime.
    pub fn initialize(&self, scenario: &Scenario) -> Option<RunHandle> {
        if self
            .shared
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(scenario = %scenario.name(), "Run requested while another run is active");
            return None;
        }
        self.shared.stop.store(false, Ordering::Release);

        let mut run = scenario.clone_for_run();
        run.pause_changes();
        let mut model = TestResultModel::new(run.clone());
        model.set_dirty(false);

        let results = results::spawn_owner(model);
        let view = results.subscribe();
        self.shared.bindings.lock().result = Some(results.clone());
        let _ = self
            .shared
            .events
            .send(RunEvent::ResultCreated(view.clone()));

        let runner = self.clone();
        let task = tokio::spawn(async move { runner.back_run(run, results).await });
        Some(RunHandle { task, result: view })
    }

    /// Not supported; runs cannot be paused
    pub fn pause(&self) -> Result<()> {
        Err(Error::Unsupported("pause"))
    }

    /// Not supported; runs cannot be paused
    pub fn resume(&self) -> Result<()> {
        Err(Error::Unsupported("resume"))
    }

    /// Not supported; use [`RunHandle::wait`]
    pub fn wait(&self) -> Result<()> {
        Err(Error::Unsupported("wait"))
    }

    /// Ask the run to stop before its next node
    ///
    /// Nodes that have not started keep `NotRun`.
    pub fn stop(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        self.shared.stop.store(true, Ordering::Release);
        tracing::info!("Stop requested");
        Ok(())
    }

    /// Store a run variable; without `force` an existing value is kept
    ///
    /// A kept value is reported as a warning, on the root of the run's record
    /// too while a run is bound.
    pub fn add_variable(&self, variable: Variable, force: bool) -> SetOutcome {
        let outcome = self
            .shared
            .variables
            .lock()
            .set(&variable.name, variable.value, force);
        if outcome == SetOutcome::Kept {
            let entry = LogEntry::warn(format!(
                "Variable '{}' already exists and was not overwritten",
                variable.name
            ));
            self.shared.sink.log(&entry);
            let result = self.shared.bindings.lock().result.clone();
            if let Some(result) = result {
                result.apply(StateWrite::Log {
                    node: result.root(),
                    entry,
                });
            }
        }
        outcome
    }

    pub fn get_variable(&self, name: &str) -> Option<Variable> {
        self.shared.variables.lock().get(name).cloned()
    }

    /// Remove every run variable
    pub fn clear(&self) {
        self.shared.variables.lock().clear();
    }

    /// Log and return a dump of every run variable
    pub fn print_debug(&self) -> String {
        let dump = self.shared.variables.lock().dump();
        self.shared.sink.log(&LogEntry::info(dump.clone()));
        dump
    }

    /// Quit the driver and drop the run's driver and result bindings
    ///
    /// The id and folder of the last run stay available.
    pub async fn clean_up(&self) {
        let driver = {
            let mut bindings = self.shared.bindings.lock();
            bindings.result = None;
            bindings.driver.take()
        };
        if let Some(driver) = driver {
            if let Err(e) = driver.quit().await {
                tracing::warn!(error = %e, "Driver did not quit cleanly");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::Acquire)
    }

    /// Id of the current (or last) run
    pub fn unique_id(&self) -> Option<String> {
        self.shared.bindings.lock().unique_id.clone()
    }

    /// Artifact folder of the current (or last) run
    pub fn run_folder(&self) -> Option<PathBuf> {
        self.shared.bindings.lock().run_folder.clone()
    }

    pub fn driver(&self) -> Option<Arc<dyn Driver>> {
        self.shared.bindings.lock().driver.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.shared.events.subscribe()
    }

    /// Live view of the record of the run in flight
    pub fn current_result(&self) -> Option<watch::Receiver<TestResultModel>> {
        self.shared
            .bindings
            .lock()
            .result
            .as_ref()
            .map(ResultHandle::subscribe)
    }

    fn status(&self) -> RunnerStatus {
        let bindings = self.shared.bindings.lock();
        RunnerStatus {
            unique_id: bindings.unique_id.clone(),
            run_folder: bindings.run_folder.clone(),
            is_running: self.is_running(),
        }
    }

    /// Worker task; a panic in the run body fails the root and cleanup
    /// still runs
    #[tracing::instrument(skip_all, fields(scenario = %run.name()))]
    async fn back_run(self, run: Scenario, results: ResultHandle) -> TestCaseResult {
        let _ = self.shared.events.send(RunEvent::Started(self.status()));
        let root = run.root();

        let outcome = match AssertUnwindSafe(self.run_body(run, &results))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(%reason, "Run body panicked");
                self.fail_root(&results, root, format!("Run aborted: {}", reason))
                    .await;
                TestCaseResult::Failed
            }
        };

        if let Err(e) = results.flush().await {
            tracing::warn!(error = %e, "Could not flush the result record");
        }
        self.write_result_file(&results);
        tracing::info!(%outcome, "Run finished");
        let _ = self
            .shared
            .events
            .send(RunEvent::Ended(self.status(), outcome));

        self.clean_up().await;
        self.shared.is_running.store(false, Ordering::Release);
        outcome
    }

    async fn run_body(&self, mut run: Scenario, results: &ResultHandle) -> TestCaseResult {
        let root = run.root();
        let url = run_url(&run);

        match self.start(&run).await {
            Ok(driver) => {
                let executor = Executor {
                    shared: &self.shared,
                    driver: driver.as_ref(),
                };
                let base_dir = run.location().and_then(Path::parent).map(Path::to_path_buf);
                let scope = Scope {
                    mirror: Some(results),
                    depth: 0,
                    base_dir: base_dir.as_deref(),
                };
                executor.run_root(run.tree_mut(), root, url.as_deref(), scope).await
            }
            Err(e) => {
                self.fail_root(results, root, format!("Could not start the run: {}", e))
                    .await;
                TestCaseResult::Failed
            }
        }
    }

    /// Create the artifact folder, reset variables and acquire a driver
    async fn start(&self, run: &Scenario) -> Result<Arc<dyn Driver>> {
        let (unique_id, folder) = create_run_folder(&self.shared.config.results_dir()).await?;
        tracing::info!(id = %unique_id, folder = %folder.display(), "Run folder created");
        {
            let mut bindings = self.shared.bindings.lock();
            bindings.unique_id = Some(unique_id);
            bindings.run_folder = Some(folder);
        }
        self.clear();

        let browser = run.settings().browser;
        let driver = self.shared.factory.create(browser).await?;
        self.shared.bindings.lock().driver = Some(driver.clone());
        Ok(driver)
    }

    /// Log `message` at high priority and finish the root as failed
    async fn fail_root(&self, results: &ResultHandle, root: NodeId, message: String) {
        let entry = LogEntry::exception(message);
        self.shared.sink.log(&entry);
        results.apply(StateWrite::Log { node: root, entry });
        results.apply(StateWrite::Outcome {
            node: root,
            result: TestCaseResult::Failed,
        });
        let done = StateWrite::RunState {
            node: root,
            state: TestRunState::Done,
        };
        if let Err(e) = results.apply_and_wait(done).await {
            tracing::warn!(error = %e, "Could not mark the run as done");
        }
    }

    fn write_result_file(&self, results: &ResultHandle) {
        let Some(folder) = self.run_folder() else {
            return;
        };
        let path = folder.join(RESULT_FILE_NAME);
        if let Err(e) = persist::save_result(&results.snapshot(), &path) {
            self.shared.sink.log(&LogEntry::warn(format!(
                "Could not write '{}': {}",
                path.display(),
                e
            )));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn run_url(run: &Scenario) -> Option<String> {
    run.settings().url.clone().filter(|url| !url.is_empty())
}

/// Timestamp id with sub-microsecond resolution
fn timestamp_id() -> String {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}{:09}", elapsed.as_secs(), elapsed.subsec_nanos())
}

/// Create a fresh folder under `base`, retrying while the id is taken
async fn create_run_folder(base: &Path) -> Result<(String, PathBuf)> {
    tokio::fs::create_dir_all(base).await?;
    loop {
        let id = timestamp_id();
        let folder = base.join(&id);
        match tokio::fs::create_dir(&folder).await {
            Ok(()) => return Ok((id, folder)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(id = %id, "Run id taken, retrying");
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DryRunFactory;

    fn runner() -> Runner {
        Runner::new(Arc::new(DryRunFactory::new()), RunnerConfig::default())
    }

    #[test]
    fn test_unsupported_controls() {
        let runner = runner();
        assert!(matches!(runner.pause(), Err(Error::Unsupported("pause"))));
        assert!(matches!(runner.resume(), Err(Error::Unsupported("resume"))));
        assert!(matches!(runner.wait(), Err(Error::Unsupported("wait"))));
        assert!(matches!(runner.stop(), Err(Error::NotRunning)));
    }

    #[test]
    fn test_variables_outside_a_run() {
        let runner = runner();
        assert_eq!(
            runner.add_variable(Variable::new("user", "alice"), true),
            SetOutcome::Inserted
        );
        assert_eq!(
            runner.add_variable(Variable::new("user", "bob"), false),
            SetOutcome::Kept
        );
        assert_eq!(
            runner.get_variable("user").unwrap().value,
            serde_json::json!("alice")
        );
        assert!(runner.print_debug().contains("user = \"alice\""));
        runner.clear();
        assert!(runner.get_variable("user").is_none());
    }

    #[tokio::test]
    async fn test_run_folders_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let (a, folder_a) = create_run_folder(dir.path()).await.unwrap();
        let (b, folder_b) = create_run_folder(dir.path()).await.unwrap();
        assert_ne!(a, b);
        assert!(folder_a.is_dir());
        assert!(folder_b.is_dir());
    }
}
