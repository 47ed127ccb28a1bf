use std::collections::HashMap;

use serde::Serialize;

/// Busy flags keyed by operation name. A missing key reads as not loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadingTracker {
    states: HashMap<String, bool>,
}

impl LoadingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_loading(&mut self, name: &str, value: bool) {
        self.states.insert(name.to_string(), value);
    }

    pub fn is_loading(&self, name: &str) -> bool {
        self.states.get(name).copied().unwrap_or(false)
    }

    pub fn any_loading(&self) -> bool {
        self.states.values().any(|v| *v)
    }

    /// Names currently flagged as busy, sorted.
    pub fn active(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .states
            .iter()
            .filter(|(_, busy)| **busy)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}
