//! Wire types and response helpers for the control plane.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Ports the server has bound; reported by `/status`, requested via `/bind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortBinding {
    pub ports: Vec<u16>,
}

impl PortBinding {
    pub fn new(ports: Vec<u16>) -> Self {
        Self { ports }
    }
}

/// Build a response with the given status and body.
pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| {
            Response::new(Full::new(Bytes::from_static(b"Internal Server Error")))
        })
}

/// Build a JSON response.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| {
            Response::new(Full::new(Bytes::from_static(b"Internal Server Error")))
        })
}

/// Report a processing error as its response, with the description as body.
pub fn error_response(error: &crate::error::ProcessingError) -> Response<Full<Bytes>> {
    build_response(error.status_code(), error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;

    #[test]
    fn test_port_binding_wire_format() {
        let binding = PortBinding::new(vec![1080, 1443]);
        let json = serde_json::to_string(&binding).unwrap();
        assert_eq!(json, r#"{"ports":[1080,1443]}"#);
    }

    #[test]
    fn test_error_response_carries_description() {
        let response = error_response(&ProcessingError::MalformedInput("bad json".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_json_response_content_type() {
        let response = json_response(StatusCode::OK, &serde_json::json!({"ok": true}));
        assert_eq!(response.headers().get("content-type").unwrap(), "application/json");
    }
}
