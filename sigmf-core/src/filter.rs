//! Glob filter for annotation keys.

use serde::{Deserialize, Serialize};
use wildmatch::WildMatch;

use crate::value::MetaMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Remove matching keys from the existing segment before merging
    Clear,
    /// Leave existing keys alone
    #[default]
    Keep,
}

/// `*` matches any run of characters, `?` exactly one. An empty pattern
/// matches every key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyFilter {
    pub mode: FilterMode,
    #[serde(default)]
    pub pattern: String,
}

impl KeyFilter {
    pub fn keep() -> Self {
        Self::default()
    }

    pub fn clear(pattern: &str) -> Self {
        Self {
            mode: FilterMode::Clear,
            pattern: pattern.to_string(),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.pattern.is_empty() || WildMatch::new(&self.pattern).matches(key)
    }

    /// Apply the filter to one segment's keys; returns how many were removed
    pub fn apply(&self, keys: &mut MetaMap) -> usize {
        if self.mode == FilterMode::Keep {
            return 0;
        }
        let matcher = WildMatch::new(&self.pattern);
        let before = keys.len();
        keys.retain(|k, _| !(self.pattern.is_empty() || matcher.matches(k)));
        before - keys.len()
    }
}
