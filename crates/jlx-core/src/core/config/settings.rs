use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub no_input: bool,
    pub root: Option<PathBuf>,
}

/// Process environment captured once, so lookups stay consistent for a run.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set and not blank.
    #[must_use]
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.var(key).filter(|value| !value.trim().is_empty())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Owned lookup for helpers that take a closure.
    #[must_use]
    pub fn lookup(&self) -> impl Fn(&str) -> Option<String> + '_ {
        move |key: &str| self.var(key).map(ToOwned::to_owned)
    }

    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}
