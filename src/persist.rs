//! Saving and loading scenarios and results
//!
//! Both are stored as JSON. The [`NodeRegistry`] decides which node kinds a
//! loaded file may contain. [`ScenarioStore`] wraps the fallible functions
//! for callers that only want a success flag; it reports failures to a
//! [`LogSink`].

use std::path::Path;
use std::sync::Arc;

use crate::common::logging::{LogEntry, LogSink};
use crate::common::paths::SCENARIO_EXTENSION;
use crate::common::{Error, Result};
use crate::results::TestResultModel;
use crate::scenario::Scenario;
use crate::tree::NodeRegistry;

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

/// Write `scenario` to `path`
pub fn save_scenario(scenario: &Scenario, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(scenario)?;
    std::fs::write(path, json)?;
    tracing::debug!(path = %path.display(), nodes = scenario.tree().len(), "Saved scenario");
    Ok(())
}

/// Load a scenario, rejecting node kinds missing from `registry`
///
/// The loaded scenario has no edit history, is clean and remembers `path`.
pub fn open_scenario(path: &Path, registry: &NodeRegistry) -> Result<Scenario> {
    let mut scenario: Scenario = serde_json::from_str(&read(path)?)?;
    registry.validate(scenario.tree())?;
    scenario.clear_changes();
    scenario.set_location(path);
    Ok(scenario)
}

/// Write a result record to `path`
pub fn save_result(model: &TestResultModel, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(model)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load a result record
pub fn open_result(path: &Path, registry: &NodeRegistry) -> Result<TestResultModel> {
    let mut model: TestResultModel = serde_json::from_str(&read(path)?)?;
    registry.validate(model.tree())?;
    model.set_location(path);
    Ok(model)
}

/// Whether `path` is an existing scenario file
pub fn validate_content_type(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SCENARIO_EXTENSION))
}

/// Scenario persistence that logs failures instead of returning them
pub struct ScenarioStore {
    registry: NodeRegistry,
    sink: Arc<dyn LogSink>,
    history_limit: Option<usize>,
}

impl ScenarioStore {
    pub fn new(registry: NodeRegistry, sink: Arc<dyn LogSink>) -> Self {
        Self {
            registry,
            sink,
            history_limit: None,
        }
    }

    /// Bound the undo history of opened scenarios
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Save and remember the location; `false` (and a logged error) on failure
    pub fn save(&self, scenario: &mut Scenario, path: &Path) -> bool {
        match save_scenario(scenario, path) {
            Ok(()) => {
                scenario.set_location(path);
                true
            }
            Err(e) => {
                self.report("save", path, &e);
                false
            }
        }
    }

    pub fn open(&self, path: &Path) -> Option<Scenario> {
        match open_scenario(path, &self.registry) {
            Ok(scenario) => Some(match self.history_limit {
                Some(limit) => scenario.with_history_limit(limit),
                None => scenario,
            }),
            Err(e) => {
                self.report("open", path, &e);
                None
            }
        }
    }

    pub fn save_result(&self, model: &mut TestResultModel, path: &Path) -> bool {
        match save_result(model, path) {
            Ok(()) => {
                model.set_location(path);
                true
            }
            Err(e) => {
                self.report("save results to", path, &e);
                false
            }
        }
    }

    pub fn open_result(&self, path: &Path) -> Option<TestResultModel> {
        open_result(path, &self.registry)
            .map_err(|e| self.report("open results from", path, &e))
            .ok()
    }

    fn report(&self, action: &str, path: &Path, error: &Error) {
        self.sink.log(&LogEntry::exception(format!(
            "Could not {} '{}': {}",
            action,
            path.display(),
            error
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logging::{LogPriority, MemorySink};
    use crate::scenario::ScenarioSettings;
    use crate::tree::{Locator, Node, NodeKind, WebAction};
    use serde_json::json;

    fn sample() -> Scenario {
        let mut scenario = Scenario::new(
            "search",
            ScenarioSettings {
                url: Some("https://example.com".into()),
                ..Default::default()
            },
        );
        let root = scenario.root();
        let folder = scenario.add_child(root, Node::container("steps"), None).unwrap();
        scenario
            .add_child(
                folder,
                Node::web(
                    WebAction::TypeText {
                        locator: Locator::id("q"),
                        text: "${term}".into(),
                    },
                    "Type the search term",
                ),
                None,
            )
            .unwrap();
        scenario
            .add_child(
                root,
                Node::new(
                    NodeKind::SetVariable {
                        name: "term".into(),
                        value: json!("rust"),
                        force: true,
                    },
                    "Pick a term",
                ),
                Some(0),
            )
            .unwrap();
        scenario
    }

    #[test]
    fn test_scenario_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.wts");
        let scenario = sample();
        save_scenario(&scenario, &path).unwrap();

        let loaded = open_scenario(&path, &NodeRegistry::with_builtin()).unwrap();
        assert_eq!(loaded.tree(), scenario.tree());
        assert_eq!(loaded.settings(), scenario.settings());
        assert_eq!(loaded.location(), Some(path.as_path()));
        assert!(!loaded.is_dirty());
        assert!(!loaded.can_undo());
        assert!(validate_content_type(&path));
    }

    #[test]
    fn test_unregistered_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.wts");
        save_scenario(&sample(), &path).unwrap();

        let mut registry = NodeRegistry::new();
        registry.register(*NodeRegistry::with_builtin().factory("folder").unwrap());
        assert!(matches!(
            open_scenario(&path, &registry),
            Err(Error::UnknownNodeKind(_))
        ));
    }

    #[test]
    fn test_store_logs_failures_at_high_priority() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        let store = ScenarioStore::new(NodeRegistry::with_builtin(), sink.clone());

        assert!(store.open(&dir.path().join("missing.wts")).is_none());
        let mut scenario = sample();
        assert!(!store.save(&mut scenario, &dir.path().join("no/such/dir/x.wts")));

        let entries = sink.with_priority(LogPriority::High);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].message.contains("missing.wts"));
    }

    #[test]
    fn test_store_save_sets_location() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScenarioStore::new(NodeRegistry::with_builtin(), MemorySink::new())
            .with_history_limit(5);
        let path = dir.path().join("s.wts");
        let mut scenario = sample();
        assert!(scenario.is_dirty());
        assert!(store.save(&mut scenario, &path));
        assert!(!scenario.is_dirty());
        assert_eq!(scenario.location(), Some(path.as_path()));
        assert!(store.open(&path).is_some());
    }

    #[test]
    fn test_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("notes.txt");
        std::fs::write(&other, "x").unwrap();
        assert!(!validate_content_type(&other));
        assert!(!validate_content_type(&dir.path().join("absent.wts")));
    }
}
