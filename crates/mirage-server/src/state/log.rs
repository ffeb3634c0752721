//! Append-only event log for inbound requests and expectation matches.
//!
//! Appends happen under a short lock so data-plane traffic is never stalled
//! behind retrieval; every retrieval reconstructs a fresh sequence at call
//! time (no cursors, no subscriptions).

use crate::error::ProcessingError;
use crate::matchers::CompiledRequestMatcher;
use crate::model::{Expectation, HttpRequest};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One recorded event, ordered by arrival.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LogEntry {
    #[serde(rename_all = "camelCase")]
    RequestReceived {
        request: HttpRequest,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ExpectationMatched {
        request: HttpRequest,
        expectation: Expectation,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl LogEntry {
    pub fn request_received(request: HttpRequest) -> Self {
        LogEntry::RequestReceived {
            request,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn expectation_matched(request: HttpRequest, expectation: Expectation) -> Self {
        LogEntry::ExpectationMatched {
            request,
            expectation,
            timestamp: chrono::Utc::now(),
        }
    }

    /// The inbound request embedded in this entry.
    pub fn request(&self) -> &HttpRequest {
        match self {
            LogEntry::RequestReceived { request, .. } => request,
            LogEntry::ExpectationMatched { request, .. } => request,
        }
    }
}

/// What a `/retrieve` call reconstructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveType {
    Logs,
    Requests,
    RecordedExpectations,
    ActiveExpectations,
}

impl FromStr for RetrieveType {
    type Err = ProcessingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "LOGS" => Ok(RetrieveType::Logs),
            "REQUESTS" => Ok(RetrieveType::Requests),
            "RECORDED_EXPECTATIONS" => Ok(RetrieveType::RecordedExpectations),
            "ACTIVE_EXPECTATIONS" => Ok(RetrieveType::ActiveExpectations),
            other => Err(ProcessingError::MalformedInput(format!(
                "unknown retrieve type: {other}"
            ))),
        }
    }
}

/// Append-only, bounded, thread-safe event store.
pub struct EventLog {
    entries: Mutex<Vec<LogEntry>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Append an entry in arrival order. Fails only when the configured
    /// capacity is exhausted; the failure is fatal to this operation alone.
    pub fn append(&self, entry: LogEntry) -> Result<(), ProcessingError> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            return Err(ProcessingError::ResourceExhaustion("event log is full"));
        }
        entries.push(entry);
        Ok(())
    }

    /// All entries whose embedded request satisfies the filter, in arrival
    /// order.
    pub fn entries(&self, filter: Option<&CompiledRequestMatcher>) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| matches_filter(filter, entry.request()))
            .cloned()
            .collect()
    }

    /// All logged inbound requests (matched or not), in arrival order.
    pub fn requests(&self, filter: Option<&CompiledRequestMatcher>) -> Vec<HttpRequest> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::RequestReceived { request, .. }
                    if matches_filter(filter, request) =>
                {
                    Some(request.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Expectations reconstructed from match events — the history of what
    /// actually fired, distinct from the repository's live contents.
    pub fn recorded_expectations(
        &self,
        filter: Option<&CompiledRequestMatcher>,
    ) -> Vec<Expectation> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::ExpectationMatched {
                    request,
                    expectation,
                    ..
                } if matches_filter(filter, request) => Some(expectation.clone()),
                _ => None,
            })
            .collect()
    }

    /// Remove entries whose embedded request matches; `None` clears all.
    pub fn clear(&self, filter: Option<&CompiledRequestMatcher>) {
        let mut entries = self.entries.lock();
        match filter {
            None => entries.clear(),
            Some(matcher) => entries.retain(|entry| !matcher.matches(entry.request())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn matches_filter(filter: Option<&CompiledRequestMatcher>, request: &HttpRequest) -> bool {
    filter.map_or(true, |matcher| matcher.matches(request))
}
