//! Runner lookup by scenario kind

use std::collections::HashMap;

use super::Runner;
use crate::scenario::{Scenario, ScenarioKind};

/// Explicit mapping from scenario kind to the runner that executes it
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: HashMap<ScenarioKind, Runner>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `runner` for `kind`, returning the runner it replaces
    pub fn register(&mut self, kind: ScenarioKind, runner: Runner) -> Option<Runner> {
        self.runners.insert(kind, runner)
    }

    pub fn get(&self, kind: ScenarioKind) -> Option<&Runner> {
        self.runners.get(&kind)
    }

    /// Runner able to execute `scenario`
    pub fn runner_for(&self, scenario: &Scenario) -> Option<&Runner> {
        self.get(scenario.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::RunnerConfig;
    use crate::driver::DryRunFactory;
    use crate::scenario::ScenarioSettings;
    use std::sync::Arc;

    #[test]
    fn test_lookup_by_kind() {
        let mut registry = RunnerRegistry::new();
        let scenario = Scenario::new("s", ScenarioSettings::default());
        assert!(registry.runner_for(&scenario).is_none());

        let runner = Runner::new(Arc::new(DryRunFactory::new()), RunnerConfig::default());
        assert!(registry.register(ScenarioKind::Web, runner).is_none());
        assert!(registry.runner_for(&scenario).is_some());
    }
}
