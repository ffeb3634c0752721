//! Upstream forwarding.
//!
//! Relays the (already decrypted) inbound request to a real upstream and
//! propagates the reply verbatim. Connect, read, and overall-deadline
//! failures all surface as `GatewayFailure`; a stub response is never
//! substituted.

use crate::error::ProcessingError;
use crate::model::{ForwardAction, HttpRequest, HttpResponse, Scheme};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Response headers that are connection-scoped and must not be relayed.
const HOP_BY_HOP_HEADERS: [&str; 5] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "proxy-authenticate",
    "proxy-authorization",
];

pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // Stale pooled connections surface as spurious gateway errors
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }

    /// Forward to the action's configured target.
    pub async fn forward(
        &self,
        request: &HttpRequest,
        action: &ForwardAction,
    ) -> Result<HttpResponse, ProcessingError> {
        let scheme = match action.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        let path = match &action.path_rewrite {
            Some(rewrite) => rewrite.apply(&request.path),
            None => request.path.clone(),
        };
        let url = build_url(scheme, &action.host, action.port, &path, request);
        self.send(request, &url, &action.override_headers).await
    }

    /// Proxy-mode default policy: forward to the request's original
    /// destination, taken from its Host header.
    pub async fn forward_transparent(
        &self,
        request: &HttpRequest,
    ) -> Result<HttpResponse, ProcessingError> {
        let host = request.header("host").ok_or_else(|| {
            ProcessingError::GatewayFailure("no Host header to forward to".to_string())
        })?;
        let scheme = if request.secure { "https" } else { "http" };
        let url = format!(
            "{scheme}://{host}{}{}",
            request.path,
            request
                .query_string()
                .map(|q| format!("?{q}"))
                .unwrap_or_default()
        );
        self.send(request, &url, &HashMap::new()).await
    }

    async fn send(
        &self,
        request: &HttpRequest,
        url: &str,
        override_headers: &HashMap<String, String>,
    ) -> Result<HttpResponse, ProcessingError> {
        let method: reqwest::Method = request.method.parse().map_err(|_| {
            ProcessingError::GatewayFailure(format!("invalid method: {}", request.method))
        })?;

        let mut outbound = self.client.request(method, url);
        for (name, values) in &request.headers {
            // Host and content-length are derived from the outbound request
            if name == "host" || name == "content-length" {
                continue;
            }
            for value in values {
                outbound = outbound.header(name, value);
            }
        }
        for (name, value) in override_headers {
            outbound = outbound.header(name, value);
        }
        if let Some(body) = &request.body {
            outbound = outbound.body(body.clone());
        }

        // The client carries the same timeout; this outer deadline also
        // bounds connect + body read as one unit, discarding partial reads.
        let response = tokio::time::timeout(self.timeout, outbound.send())
            .await
            .map_err(|_| {
                warn!(url, "upstream deadline exceeded");
                ProcessingError::GatewayFailure(format!("upstream {url} timed out"))
            })?
            .map_err(|e| {
                warn!(url, "upstream request failed: {e}");
                ProcessingError::GatewayFailure(format!("upstream {url} failed: {e}"))
            })?;

        response_from_upstream(response, self.timeout).await
    }
}

/// Convert an upstream reply into a response template, relaying everything
/// except hop-by-hop headers.
pub(super) async fn response_from_upstream(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<HttpResponse, ProcessingError> {
    let status_code = response.status().as_u16();

    let mut headers: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in response.headers() {
        let name = name.as_str().to_lowercase();
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers
            .entry(name)
            .or_default()
            .push(value.to_str().unwrap_or("").to_string());
    }

    let body_bytes = tokio::time::timeout(timeout, response.bytes())
        .await
        .map_err(|_| ProcessingError::GatewayFailure("upstream body read timed out".to_string()))?
        .map_err(|e| ProcessingError::GatewayFailure(format!("upstream body read failed: {e}")))?;

    let body = if body_bytes.is_empty() {
        None
    } else {
        Some(serde_json::Value::String(
            String::from_utf8_lossy(&body_bytes).to_string(),
        ))
    };

    Ok(HttpResponse {
        status_code,
        headers,
        body,
        ..Default::default()
    })
}

fn build_url(scheme: &str, host: &str, port: u16, path: &str, request: &HttpRequest) -> String {
    format!(
        "{scheme}://{host}:{port}{path}{}",
        request
            .query_string()
            .map(|q| format!("?{q}"))
            .unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let mut request = HttpRequest::with_path("/api/users");
        request
            .query_string_parameters
            .insert("page".to_string(), vec!["2".to_string()]);
        assert_eq!(
            build_url("http", "upstream.local", 8080, "/api/users", &request),
            "http://upstream.local:8080/api/users?page=2"
        );
    }

    #[test]
    fn test_build_url_without_query() {
        let request = HttpRequest::with_path("/plain");
        assert_eq!(
            build_url("https", "example.com", 443, "/plain", &request),
            "https://example.com:443/plain"
        );
    }

    #[test]
    fn test_path_rewrite_replaces_first_occurrence() {
        let rewrite = crate::model::PathRewrite {
            from: "/v1".to_string(),
            to: "/v2".to_string(),
        };
        assert_eq!(rewrite.apply("/v1/users"), "/v2/users");
        assert_eq!(rewrite.apply("/other"), "/other");
    }

    #[tokio::test]
    async fn test_transparent_forward_requires_host_header() {
        let forwarder = Forwarder::new(Duration::from_millis(200));
        let err = forwarder
            .forward_transparent(&HttpRequest::with_path("/no-host"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::GatewayFailure(_)));
    }
}
