//! Named-entry matching for headers, query parameters, and cookies.
//!
//! One compiled matcher covers all three multimap-shaped request fields;
//! header names are lowercased at compile time to mirror request ingest.

use super::string_matcher::{CompiledStringMatch, StringMatch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One-or-more value matchers for a single named entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ValueMatch {
    Single(StringMatch),
    Many(Vec<StringMatch>),
}

impl ValueMatch {
    pub fn matchers(&self) -> &[StringMatch] {
        match self {
            ValueMatch::Single(matcher) => std::slice::from_ref(matcher),
            ValueMatch::Many(matchers) => matchers,
        }
    }
}

/// Compiled matcher for one named entry.
#[derive(Debug, Clone)]
pub struct CompiledFieldMatcher {
    pub name: String,
    matchers: Vec<CompiledStringMatch>,
}

impl CompiledFieldMatcher {
    /// Compile one entry. `lowercase_name` is set for headers, whose names
    /// are case-insensitive on the wire.
    pub fn compile(
        name: &str,
        value: &ValueMatch,
        lowercase_name: bool,
    ) -> Result<Self, regex::Error> {
        let name = if lowercase_name {
            name.to_lowercase()
        } else {
            name.to_string()
        };
        let matchers = value
            .matchers()
            .iter()
            .map(CompiledStringMatch::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { name, matchers })
    }

    /// Subset match against a multimap entry: the name must be present and
    /// every listed matcher must be satisfied by at least one of its values.
    pub fn matches_values(&self, values: Option<&Vec<String>>) -> bool {
        let Some(values) = values else {
            return false;
        };
        self.matchers
            .iter()
            .all(|matcher| values.iter().any(|value| matcher.matches(value)))
    }

    /// Match against a single-valued map entry (cookies).
    pub fn matches_value(&self, value: Option<&String>) -> bool {
        let Some(value) = value else {
            return false;
        };
        self.matchers.iter().all(|matcher| matcher.matches(value))
    }
}

/// Compile a matcher-spec map into a list of compiled entries.
pub fn compile_entries(
    entries: &HashMap<String, ValueMatch>,
    lowercase_names: bool,
) -> Result<Vec<CompiledFieldMatcher>, regex::Error> {
    entries
        .iter()
        .map(|(name, value)| CompiledFieldMatcher::compile(name, value, lowercase_names))
        .collect()
}
