//! Response templates and delays.

use bytes::Bytes;
use http_body_util::Full;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_status_code() -> u16 {
    200
}

/// A response template attached to an expectation, or built from an upstream
/// reply.
///
/// The body may be a plain string or structured JSON; structured bodies are
/// rendered with their JSON serialization, strings verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_phrase: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// "text" (default) or "binary"; binary bodies are base64-encoded on the
    /// wire.
    #[serde(default, skip_serializing_if = "is_text_mode")]
    pub mode: ResponseMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
}

/// Body handling mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Text,
    Binary,
}

fn is_text_mode(mode: &ResponseMode) -> bool {
    *mode == ResponseMode::Text
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self {
            status_code: default_status_code(),
            reason_phrase: None,
            headers: HashMap::new(),
            body: None,
            mode: ResponseMode::Text,
            delay: None,
        }
    }
}

impl HttpResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(serde_json::Value::String(body.into()));
        self
    }

    /// Fixed response used by mock mode when no expectation matches.
    pub fn not_found() -> Self {
        Self::new(404)
    }

    /// Render the body as the bytes that go on the wire.
    pub fn body_string(&self) -> String {
        match &self.body {
            None => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
        }
    }

    /// The bytes that go on the wire, base64-decoding binary bodies.
    pub fn body_bytes(&self) -> Bytes {
        let rendered = self.body_string();
        match self.mode {
            ResponseMode::Text => Bytes::from(rendered),
            ResponseMode::Binary => {
                use base64::Engine;
                match base64::engine::general_purpose::STANDARD.decode(&rendered) {
                    Ok(decoded) => Bytes::from(decoded),
                    Err(_) => Bytes::from(rendered),
                }
            }
        }
    }

    /// Convert into a hyper response.
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.body_bytes();
        let mut builder = hyper::Response::builder().status(status);
        for (name, values) in &self.headers {
            for value in values {
                builder = builder.header(name, value);
            }
        }
        builder.body(Full::new(body)).unwrap_or_else(|_| {
            hyper::Response::new(Full::new(Bytes::from_static(b"Internal Server Error")))
        })
    }
}

/// Suspension applied before a stubbed response is returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Delay {
    pub time_unit: TimeUnit,
    pub value: u64,
}

impl Delay {
    pub fn milliseconds(value: u64) -> Self {
        Self {
            time_unit: TimeUnit::Milliseconds,
            value,
        }
    }

    pub fn to_duration(&self) -> Duration {
        match self.time_unit {
            TimeUnit::Milliseconds => Duration::from_millis(self.value),
            TimeUnit::Seconds => Duration::from_secs(self.value),
            TimeUnit::Minutes => Duration::from_secs(self.value * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
}
