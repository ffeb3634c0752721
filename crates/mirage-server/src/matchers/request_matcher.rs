//! The unified request matcher: the identity of every expectation and the
//! scope of every clear/retrieve/verify operation.

use super::body_matcher::{BodyMatch, CompiledBodyMatch};
use super::field_matcher::{compile_entries, CompiledFieldMatcher, ValueMatch};
use super::string_matcher::{CompiledStringMatch, StringMatch};
use crate::model::HttpRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Predicate specification over request fields. Absent fields match anything.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<StringMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<StringMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string_parameters: Option<HashMap<String, ValueMatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, ValueMatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<HashMap<String, ValueMatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

impl RequestMatcher {
    /// Matcher over an exact path only — the most common case.
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(StringMatch::exact(path)),
            ..Default::default()
        }
    }

    /// Matcher over method + exact path.
    pub fn method_and_path(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: Some(StringMatch::exact(method)),
            path: Some(StringMatch::exact(path)),
            ..Default::default()
        }
    }
}

/// Compiled matcher for data-plane evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRequestMatcher {
    spec: RequestMatcher,
    method: Option<CompiledStringMatch>,
    path: Option<CompiledStringMatch>,
    query: Vec<CompiledFieldMatcher>,
    headers: Vec<CompiledFieldMatcher>,
    cookies: Vec<CompiledFieldMatcher>,
    body: Option<CompiledBodyMatch>,
    secure: Option<bool>,
}

impl CompiledRequestMatcher {
    pub fn compile(spec: &RequestMatcher) -> Result<Self, regex::Error> {
        let method = spec
            .method
            .as_ref()
            .map(CompiledStringMatch::compile)
            .transpose()?;
        let path = spec
            .path
            .as_ref()
            .map(CompiledStringMatch::compile)
            .transpose()?;
        let query = spec
            .query_string_parameters
            .as_ref()
            .map(|entries| compile_entries(entries, false))
            .transpose()?
            .unwrap_or_default();
        let headers = spec
            .headers
            .as_ref()
            .map(|entries| compile_entries(entries, true))
            .transpose()?
            .unwrap_or_default();
        let cookies = spec
            .cookies
            .as_ref()
            .map(|entries| compile_entries(entries, false))
            .transpose()?
            .unwrap_or_default();
        let body = spec
            .body
            .as_ref()
            .map(CompiledBodyMatch::compile)
            .transpose()?;

        Ok(Self {
            spec: spec.clone(),
            method,
            path,
            query,
            headers,
            cookies,
            body,
            secure: spec.secure,
        })
    }

    /// The specification this matcher was compiled from.
    pub fn spec(&self) -> &RequestMatcher {
        &self.spec
    }

    /// Pure predicate: does the request satisfy every present field?
    pub fn matches(&self, request: &HttpRequest) -> bool {
        if let Some(method) = &self.method {
            if !method.matches(&request.method) {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if !path.matches(&request.path) {
                return false;
            }
        }
        if let Some(secure) = self.secure {
            if request.secure != secure {
                return false;
            }
        }
        for entry in &self.query {
            if !entry.matches_values(request.query_string_parameters.get(&entry.name)) {
                return false;
            }
        }
        for entry in &self.headers {
            if !entry.matches_values(request.headers.get(&entry.name)) {
                return false;
            }
        }
        for entry in &self.cookies {
            if !entry.matches_value(request.cookies.get(&entry.name)) {
                return false;
            }
        }
        if let Some(body) = &self.body {
            if !body.matches(request.body.as_deref().unwrap_or("")) {
                return false;
            }
        }
        true
    }

    /// Synthesize a request from the matcher's exact-valued fields.
    ///
    /// Used to give `clear`/`retrieve` their data-plane scoping: a stored
    /// expectation falls inside a filter when the filter matches the request
    /// this expectation most literally describes. Regex and absent fields
    /// contribute nothing.
    pub fn probe_request(&self) -> HttpRequest {
        let spec = &self.spec;
        let mut probe = HttpRequest::default();
        if let Some(method) = spec.method.as_ref().and_then(StringMatch::exact_value) {
            probe.method = method.to_string();
        }
        if let Some(path) = spec.path.as_ref().and_then(StringMatch::exact_value) {
            probe.path = path.to_string();
        }
        if let Some(entries) = &spec.query_string_parameters {
            probe.query_string_parameters = exact_multimap(entries, false);
        }
        if let Some(entries) = &spec.headers {
            probe.headers = exact_multimap(entries, true);
        }
        if let Some(entries) = &spec.cookies {
            probe.cookies = entries
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .matchers()
                        .first()
                        .and_then(StringMatch::exact_value)
                        .map(|v| (name.clone(), v.to_string()))
                })
                .collect();
        }
        if let Some(BodyMatch::Equals(body)) = &spec.body {
            probe.body = Some(body.clone());
        }
        if let Some(secure) = spec.secure {
            probe.secure = secure;
        }
        probe
    }
}

fn exact_multimap(
    entries: &HashMap<String, ValueMatch>,
    lowercase_names: bool,
) -> HashMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(name, value)| {
            let name = if lowercase_names {
                name.to_lowercase()
            } else {
                name.clone()
            };
            let values = value
                .matchers()
                .iter()
                .filter_map(StringMatch::exact_value)
                .map(str::to_string)
                .collect();
            (name, values)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(spec: RequestMatcher) -> CompiledRequestMatcher {
        CompiledRequestMatcher::compile(&spec).unwrap()
    }

    #[test]
    fn test_empty_matcher_matches_everything() {
        let matcher = compile(RequestMatcher::default());
        assert!(matcher.matches(&HttpRequest::with_path("/anything")));
    }

    #[test]
    fn test_path_exact() {
        let matcher = compile(RequestMatcher::path("/somePath"));
        assert!(matcher.matches(&HttpRequest::with_path("/somePath")));
        assert!(!matcher.matches(&HttpRequest::with_path("/otherPath")));
    }

    #[test]
    fn test_path_regex() {
        let mut spec = RequestMatcher::default();
        spec.path = Some(StringMatch::regex(r"^/users/\d+$"));
        let matcher = compile(spec);
        assert!(matcher.matches(&HttpRequest::with_path("/users/42")));
        assert!(!matcher.matches(&HttpRequest::with_path("/users/jane")));
    }

    #[test]
    fn test_method_must_match_when_present() {
        let matcher = compile(RequestMatcher::method_and_path("POST", "/orders"));
        let mut request = HttpRequest::with_path("/orders");
        assert!(!matcher.matches(&request));
        request.method = "POST".to_string();
        assert!(matcher.matches(&request));
    }

    #[test]
    fn test_header_subset_semantics() {
        let mut spec = RequestMatcher::path("/api");
        spec.headers = Some(
            [(
                "X-Api-Key".to_string(),
                ValueMatch::Single(StringMatch::exact("secret")),
            )]
            .into(),
        );
        let matcher = compile(spec);

        let mut request = HttpRequest::with_path("/api");
        request
            .headers
            .insert("x-api-key".to_string(), vec!["secret".to_string()]);
        request
            .headers
            .insert("accept".to_string(), vec!["*/*".to_string()]);
        // Unmentioned headers are ignored
        assert!(matcher.matches(&request));

        request.headers.remove("x-api-key");
        assert!(!matcher.matches(&request));
    }

    #[test]
    fn test_query_parameter_any_value_matches() {
        let mut spec = RequestMatcher::path("/search");
        spec.query_string_parameters = Some(
            [(
                "tag".to_string(),
                ValueMatch::Single(StringMatch::exact("rust")),
            )]
            .into(),
        );
        let matcher = compile(spec);

        let mut request = HttpRequest::with_path("/search");
        request
            .query_string_parameters
            .insert("tag".to_string(), vec!["go".to_string(), "rust".to_string()]);
        assert!(matcher.matches(&request));
    }

    #[test]
    fn test_secure_flag() {
        let mut spec = RequestMatcher::path("/tls");
        spec.secure = Some(true);
        let matcher = compile(spec);

        let mut request = HttpRequest::with_path("/tls");
        assert!(!matcher.matches(&request));
        request.secure = true;
        assert!(matcher.matches(&request));
    }

    #[test]
    fn test_cookie_match() {
        let mut spec = RequestMatcher::default();
        spec.cookies = Some(
            [(
                "session".to_string(),
                ValueMatch::Single(StringMatch::regex("[a-f0-9]{6}")),
            )]
            .into(),
        );
        let matcher = compile(spec);

        let mut request = HttpRequest::with_path("/");
        request
            .cookies
            .insert("session".to_string(), "abc123".to_string());
        assert!(matcher.matches(&request));
    }

    #[test]
    fn test_all_present_fields_are_anded() {
        let mut spec = RequestMatcher::method_and_path("GET", "/a");
        spec.body = Some(BodyMatch::Equals("payload".to_string()));
        let matcher = compile(spec);

        let mut request = HttpRequest::with_path("/a");
        request.body = Some("payload".to_string());
        assert!(matcher.matches(&request));
        request.body = Some("other".to_string());
        assert!(!matcher.matches(&request));
    }

    #[test]
    fn test_probe_request_reflects_exact_fields() {
        let matcher = compile(RequestMatcher::method_and_path("PUT", "/thing"));
        let probe = matcher.probe_request();
        assert_eq!(probe.method, "PUT");
        assert_eq!(probe.path, "/thing");
    }

    #[test]
    fn test_probe_request_skips_regex_fields() {
        let mut spec = RequestMatcher::default();
        spec.path = Some(StringMatch::regex("/users/.*"));
        let matcher = compile(spec);
        assert_eq!(matcher.probe_request().path, "");
    }

    #[test]
    fn test_invalid_regex_fails_compilation() {
        let mut spec = RequestMatcher::default();
        spec.path = Some(StringMatch::regex("[broken"));
        assert!(CompiledRequestMatcher::compile(&spec).is_err());
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{
            "method": "GET",
            "path": "/somePath",
            "headers": {"Accept": "application/json"},
            "secure": false
        }"#;
        let spec: RequestMatcher = serde_json::from_str(json).unwrap();
        assert_eq!(spec.method, Some(StringMatch::exact("GET")));
        assert_eq!(spec.path, Some(StringMatch::exact("/somePath")));
        assert!(spec.headers.is_some());
    }
}
