//! Single-value string matching: exact (optionally case-insensitive) or
//! regex.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_case_sensitive() -> bool {
    true
}

/// String matcher specification.
///
/// A bare string is an exact, case-sensitive match; `{"regex": ...}` is a
/// full-anchor-free regex match; `{"equals": ..., "caseSensitive": false}`
/// opts out of case sensitivity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StringMatch {
    Exact(String),
    Regex { regex: String },
    Equals {
        equals: String,
        #[serde(rename = "caseSensitive", default = "default_case_sensitive")]
        case_sensitive: bool,
    },
}

impl StringMatch {
    pub fn exact(value: impl Into<String>) -> Self {
        StringMatch::Exact(value.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        StringMatch::Regex {
            regex: pattern.into(),
        }
    }

    /// The literal value, when this matcher is an exact comparison.
    pub fn exact_value(&self) -> Option<&str> {
        match self {
            StringMatch::Exact(value) => Some(value),
            StringMatch::Equals { equals, .. } => Some(equals),
            StringMatch::Regex { .. } => None,
        }
    }
}

/// A string value with its lowercase form cached at compile time, so
/// case-insensitive comparisons never re-lowercase the pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub value: String,
    pub lower: String,
}

impl CachedValue {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let lower = value.to_lowercase();
        Self { value, lower }
    }

    #[inline]
    pub fn equals(&self, candidate: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            candidate == self.value
        } else {
            candidate.to_lowercase() == self.lower
        }
    }
}

/// Compiled string matcher for runtime evaluation.
#[derive(Debug, Clone)]
pub enum CompiledStringMatch {
    Exact {
        value: CachedValue,
        case_sensitive: bool,
    },
    Regex(Arc<Regex>),
}

impl CompiledStringMatch {
    pub fn compile(spec: &StringMatch) -> Result<Self, regex::Error> {
        match spec {
            StringMatch::Exact(value) => Ok(CompiledStringMatch::Exact {
                value: CachedValue::new(value),
                case_sensitive: true,
            }),
            StringMatch::Equals {
                equals,
                case_sensitive,
            } => Ok(CompiledStringMatch::Exact {
                value: CachedValue::new(equals),
                case_sensitive: *case_sensitive,
            }),
            StringMatch::Regex { regex } => {
                Ok(CompiledStringMatch::Regex(Arc::new(Regex::new(regex)?)))
            }
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            CompiledStringMatch::Exact {
                value,
                case_sensitive,
            } => value.equals(candidate, *case_sensitive),
            CompiledStringMatch::Regex(regex) => regex.is_match(candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_is_case_sensitive() {
        let matcher = CompiledStringMatch::compile(&StringMatch::exact("GET")).unwrap();
        assert!(matcher.matches("GET"));
        assert!(!matcher.matches("get"));
    }

    #[test]
    fn test_equals_case_insensitive() {
        let spec: StringMatch =
            serde_json::from_str(r#"{"equals": "Value", "caseSensitive": false}"#).unwrap();
        let matcher = CompiledStringMatch::compile(&spec).unwrap();
        assert!(matcher.matches("value"));
        assert!(matcher.matches("VALUE"));
    }

    #[test]
    fn test_regex_match() {
        let matcher =
            CompiledStringMatch::compile(&StringMatch::regex(r"^/api/v\d+/users$")).unwrap();
        assert!(matcher.matches("/api/v1/users"));
        assert!(!matcher.matches("/api/users"));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        assert!(CompiledStringMatch::compile(&StringMatch::regex("[unclosed")).is_err());
    }

    #[test]
    fn test_untagged_wire_forms() {
        let bare: StringMatch = serde_json::from_str(r#""/somePath""#).unwrap();
        assert_eq!(bare, StringMatch::exact("/somePath"));

        let regex: StringMatch = serde_json::from_str(r#"{"regex": "/some.*"}"#).unwrap();
        assert_eq!(regex, StringMatch::regex("/some.*"));
    }

    #[test]
    fn test_exact_value() {
        assert_eq!(StringMatch::exact("/a").exact_value(), Some("/a"));
        assert_eq!(StringMatch::regex(".*").exact_value(), None);
    }
}
