//! Run-scoped variable store
//!
//! Variables live only for the duration of one run: the runner clears the
//! store before every run and nothing here is persisted with the scenario.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named value set during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// What happened to the store on [`VariableStore::set`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// No variable with that name existed
    Inserted,
    /// An existing variable was overwritten
    Replaced,
    /// A variable with that name existed and `force` was false
    Kept,
}

/// Mapping from variable name to value, exact and case-sensitive
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    vars: BTreeMap<String, Variable>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `name`.
    ///
    /// With `force` an existing variable is replaced; without it the existing
    /// value is kept and [`SetOutcome::Kept`] tells the caller to warn.
    pub fn set(&mut self, name: &str, value: Value, force: bool) -> SetOutcome {
        match self.vars.get_mut(name) {
            Some(existing) if force => {
                existing.value = value;
                SetOutcome::Replaced
            }
            Some(_) => SetOutcome::Kept,
            None => {
                self.vars
                    .insert(name.to_string(), Variable::new(name, value));
                SetOutcome::Inserted
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(|v| &v.value)
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values()
    }

    /// Human-readable dump of every variable, one per line
    pub fn dump(&self) -> String {
        let mut out = String::from("Dumping variables from the current run...\n");
        for var in self.vars.values() {
            out.push_str(&var.to_string());
            out.push('\n');
        }
        out.push_str("Dump complete...");
        out
    }
}
