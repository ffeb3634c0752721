//! Inbound request representation.
//!
//! Requests arrive pre-parsed from the connection layer; this type is the
//! shape the match engine, log store, and serializers all share.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_method() -> String {
    "GET".to_string()
}

/// A fully parsed inbound HTTP request.
///
/// Header names are lowercased on ingest so matching and retrieval are
/// case-insensitive on names, as HTTP requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub query_string_parameters: HashMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cookies: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self {
            method: default_method(),
            path: String::new(),
            query_string_parameters: HashMap::new(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            body: None,
            secure: false,
            client_address: None,
        }
    }
}

impl HttpRequest {
    /// Shorthand used pervasively in tests: a GET request for `path`.
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Build from hyper request parts once the body has been collected.
    pub fn from_parts(
        method: &hyper::Method,
        uri: &hyper::Uri,
        headers: &hyper::HeaderMap,
        body: Option<String>,
        secure: bool,
        client_address: Option<String>,
    ) -> Self {
        let mut header_map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in headers {
            header_map
                .entry(name.as_str().to_lowercase())
                .or_default()
                .push(value.to_str().unwrap_or("").to_string());
        }

        let cookies = header_map
            .get("cookie")
            .map(|values| parse_cookies(values))
            .unwrap_or_default();

        Self {
            method: method.to_string(),
            path: uri.path().to_string(),
            query_string_parameters: parse_query_string(uri.query().unwrap_or("")),
            headers: header_map,
            cookies,
            body,
            secure,
            client_address,
        }
    }

    /// First value of a header, by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Rebuild the query string for upstream forwarding.
    pub fn query_string(&self) -> Option<String> {
        if self.query_string_parameters.is_empty() {
            return None;
        }
        let mut pairs: Vec<(&String, &String)> = self
            .query_string_parameters
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| (name, value)))
            .collect();
        // Deterministic ordering for upstream URLs and tests
        pairs.sort();
        Some(
            pairs
                .into_iter()
                .map(|(name, value)| {
                    format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
                })
                .collect::<Vec<_>>()
                .join("&"),
        )
    }
}

/// Parse a raw query string into a decoded name → values multimap.
pub fn parse_query_string(query: &str) -> HashMap<String, Vec<String>> {
    let mut parameters: HashMap<String, Vec<String>> = HashMap::new();
    for pair in query.split('&').filter(|s| !s.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let name = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        let name = urlencoding::decode(name).unwrap_or_default().into_owned();
        let value = urlencoding::decode(value).unwrap_or_default().into_owned();
        parameters.entry(name).or_default().push(value);
    }
    parameters
}

/// Parse `Cookie` header values into a name → value map.
///
/// Later occurrences of a name win, matching how user agents send a single
/// effective value per cookie name.
fn parse_cookies(header_values: &[String]) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header_value in header_values {
        for pair in header_value.split(';') {
            let mut parts = pair.splitn(2, '=');
            let name = parts.next().unwrap_or("").trim();
            if name.is_empty() {
                continue;
            }
            let value = parts.next().unwrap_or("").trim();
            cookies.insert(name.to_string(), value.to_string());
        }
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("a=1&b=2&a=3");
        assert_eq!(params.get("a").unwrap(), &vec!["1".to_string(), "3".to_string()]);
        assert_eq!(params.get("b").unwrap(), &vec!["2".to_string()]);
    }

    #[test]
    fn test_parse_query_string_decodes() {
        let params = parse_query_string("name=hello%20world");
        assert_eq!(params.get("name").unwrap(), &vec!["hello world".to_string()]);
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies(&["session=abc123; theme=dark".to_string()]);
        assert_eq!(cookies.get("session").unwrap(), "abc123");
        assert_eq!(cookies.get("theme").unwrap(), "dark");
    }

    #[test]
    fn test_query_string_round_trip() {
        let mut request = HttpRequest::with_path("/search");
        request
            .query_string_parameters
            .insert("q".to_string(), vec!["rust lang".to_string()]);
        assert_eq!(request.query_string().unwrap(), "q=rust%20lang");
    }

    #[test]
    fn test_query_string_empty() {
        assert!(HttpRequest::with_path("/x").query_string().is_none());
    }

    #[test]
    fn test_serialization_shape() {
        let request = HttpRequest::with_path("/somePath");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["path"], "/somePath");
        assert_eq!(json["method"], "GET");
        assert_eq!(json["secure"], false);
        // Empty maps are omitted from the wire form
        assert!(json.get("headers").is_none());
    }
}
