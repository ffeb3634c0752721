//! Expectations: a request matcher paired with an action and consumption
//! limits.
//!
//! The wire form carries exactly one of `httpResponse`, `httpForward`,
//! `httpCallback`, or `httpError` next to the `httpRequest` matcher; the
//! in-memory form collapses those into the closed [`Action`] sum type.

use super::response::{HttpResponse, TimeUnit};
use crate::matchers::RequestMatcher;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A registered rule: match `http_request`, perform `action`, limited by
/// `times` and `time_to_live`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ExpectationRaw", into = "ExpectationOut")]
pub struct Expectation {
    pub http_request: RequestMatcher,
    pub action: Action,
    pub times: Times,
    pub time_to_live: TimeToLive,
}

impl Expectation {
    /// Start building an expectation for the given matcher.
    pub fn when(http_request: RequestMatcher) -> Self {
        Self {
            http_request,
            action: Action::Respond(HttpResponse::default()),
            times: Times::unlimited(),
            time_to_live: TimeToLive::unlimited(),
        }
    }

    pub fn then_respond(mut self, response: HttpResponse) -> Self {
        self.action = Action::Respond(response);
        self
    }

    pub fn then_forward(mut self, forward: ForwardAction) -> Self {
        self.action = Action::Forward(forward);
        self
    }

    pub fn then_callback(mut self, callback: CallbackAction) -> Self {
        self.action = Action::Callback(callback);
        self
    }

    pub fn then_close(mut self, close: CloseAction) -> Self {
        self.action = Action::Close(close);
        self
    }

    pub fn with_times(mut self, times: Times) -> Self {
        self.times = times;
        self
    }

    pub fn with_time_to_live(mut self, time_to_live: TimeToLive) -> Self {
        self.time_to_live = time_to_live;
        self
    }
}

/// The effect triggered when an expectation matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Answer with a literal response template.
    Respond(HttpResponse),
    /// Relay the request to a real upstream.
    Forward(ForwardAction),
    /// Hand the request to an external handler and relay its reply.
    Callback(CallbackAction),
    /// Drop the connection without answering.
    Close(CloseAction),
}

fn default_forward_port() -> u16 {
    80
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForwardAction {
    pub host: String,
    #[serde(default = "default_forward_port")]
    pub port: u16,
    #[serde(default)]
    pub scheme: Scheme,
    /// Headers set on the outbound request, overriding inbound values.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub override_headers: HashMap<String, String>,
    /// Rewrite applied to the request path before forwarding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_rewrite: Option<PathRewrite>,
}

/// First-occurrence path substitution for forwarded requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathRewrite {
    pub from: String,
    pub to: String,
}

impl PathRewrite {
    pub fn apply(&self, path: &str) -> String {
        path.replacen(&self.from, &self.to, 1)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAction {
    /// Endpoint the serialized request is posted to.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CloseAction {
    #[serde(default)]
    pub drop_policy: DropPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DropPolicy {
    /// Abort without writing anything, letting the peer see EOF.
    #[default]
    NoResponse,
    /// Abort signalling a connection reset.
    Reset,
}

// ============================================================================
// Times / TimeToLive
// ============================================================================

/// Remaining permitted match count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", from = "TimesRaw")]
pub struct Times {
    pub remaining_times: u32,
    pub unlimited: bool,
}

impl Times {
    pub fn unlimited() -> Self {
        Self {
            remaining_times: 0,
            unlimited: true,
        }
    }

    pub fn exactly(count: u32) -> Self {
        Self {
            remaining_times: count,
            unlimited: false,
        }
    }

    pub fn once() -> Self {
        Self::exactly(1)
    }

    pub fn is_exhausted(&self) -> bool {
        !self.unlimited && self.remaining_times == 0
    }

    /// Consume one permitted match. No-op when unlimited.
    pub fn use_one(&mut self) {
        if !self.unlimited {
            self.remaining_times = self.remaining_times.saturating_sub(1);
        }
    }
}

impl Default for Times {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Raw wire form: a bare `{"remainingTimes": n}` means a bounded count, a
/// missing block means unlimited.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimesRaw {
    #[serde(default)]
    remaining_times: Option<u32>,
    #[serde(default)]
    unlimited: Option<bool>,
}

impl From<TimesRaw> for Times {
    fn from(raw: TimesRaw) -> Self {
        match (raw.remaining_times, raw.unlimited) {
            (None, None) => Times::unlimited(),
            (Some(count), None) => Times::exactly(count),
            (None, Some(true)) => Times::unlimited(),
            (None, Some(false)) => Times::exactly(0),
            (Some(count), Some(unlimited)) => Times {
                remaining_times: count,
                unlimited,
            },
        }
    }
}

/// Absolute expiry budget for an expectation.
///
/// The deadline instant is computed once at registration; expiry is checked
/// lazily on match and retrieval, never by a background sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", from = "TimeToLiveRaw")]
pub struct TimeToLive {
    pub time_unit: TimeUnit,
    pub time_to_live: u64,
    pub unlimited: bool,
}

impl TimeToLive {
    pub fn unlimited() -> Self {
        Self {
            time_unit: TimeUnit::Seconds,
            time_to_live: 0,
            unlimited: true,
        }
    }

    pub fn bounded(time_unit: TimeUnit, time_to_live: u64) -> Self {
        Self {
            time_unit,
            time_to_live,
            unlimited: false,
        }
    }

    /// The live duration, or `None` when unlimited.
    pub fn duration(&self) -> Option<Duration> {
        if self.unlimited {
            return None;
        }
        let duration = match self.time_unit {
            TimeUnit::Milliseconds => Duration::from_millis(self.time_to_live),
            TimeUnit::Seconds => Duration::from_secs(self.time_to_live),
            TimeUnit::Minutes => Duration::from_secs(self.time_to_live * 60),
        };
        Some(duration)
    }
}

impl Default for TimeToLive {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeToLiveRaw {
    #[serde(default)]
    time_unit: Option<TimeUnit>,
    #[serde(default)]
    time_to_live: Option<u64>,
    #[serde(default)]
    unlimited: Option<bool>,
}

impl From<TimeToLiveRaw> for TimeToLive {
    fn from(raw: TimeToLiveRaw) -> Self {
        match (raw.time_to_live, raw.unlimited) {
            (None, None) | (None, Some(true)) => TimeToLive::unlimited(),
            (Some(value), unlimited) => TimeToLive {
                time_unit: raw.time_unit.unwrap_or(TimeUnit::Seconds),
                time_to_live: value,
                unlimited: unlimited.unwrap_or(false),
            },
            (None, Some(false)) => TimeToLive::bounded(TimeUnit::Seconds, 0),
        }
    }
}

// ============================================================================
// Wire conversion
// ============================================================================

/// Raw deserialization type: one action field among `httpResponse`,
/// `httpForward`, `httpCallback`, `httpError`. When several are present the
/// first in that order wins; when none is, the expectation answers with an
/// empty 200.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpectationRaw {
    #[serde(default)]
    http_request: RequestMatcher,
    #[serde(default)]
    http_response: Option<HttpResponse>,
    #[serde(default)]
    http_forward: Option<ForwardAction>,
    #[serde(default)]
    http_callback: Option<CallbackAction>,
    #[serde(default)]
    http_error: Option<CloseAction>,
    #[serde(default)]
    times: Option<Times>,
    #[serde(default)]
    time_to_live: Option<TimeToLive>,
}

impl From<ExpectationRaw> for Expectation {
    fn from(raw: ExpectationRaw) -> Self {
        let action = if let Some(response) = raw.http_response {
            Action::Respond(response)
        } else if let Some(forward) = raw.http_forward {
            Action::Forward(forward)
        } else if let Some(callback) = raw.http_callback {
            Action::Callback(callback)
        } else if let Some(close) = raw.http_error {
            Action::Close(close)
        } else {
            Action::Respond(HttpResponse::default())
        };

        Expectation {
            http_request: raw.http_request,
            action,
            times: raw.times.unwrap_or_default(),
            time_to_live: raw.time_to_live.unwrap_or_default(),
        }
    }
}

/// Serialization type: splits the action back into its wire field.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpectationOut {
    http_request: RequestMatcher,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_response: Option<HttpResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_forward: Option<ForwardAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_callback: Option<CallbackAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_error: Option<CloseAction>,
    times: Times,
    time_to_live: TimeToLive,
}

impl From<Expectation> for ExpectationOut {
    fn from(expectation: Expectation) -> Self {
        let mut out = ExpectationOut {
            http_request: expectation.http_request,
            http_response: None,
            http_forward: None,
            http_callback: None,
            http_error: None,
            times: expectation.times,
            time_to_live: expectation.time_to_live,
        };
        match expectation.action {
            Action::Respond(response) => out.http_response = Some(response),
            Action::Forward(forward) => out.http_forward = Some(forward),
            Action::Callback(callback) => out.http_callback = Some(callback),
            Action::Close(close) => out.http_error = Some(close),
        }
        out
    }
}
