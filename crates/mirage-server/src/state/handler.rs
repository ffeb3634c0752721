//! Process-wide state handler.
//!
//! Exclusively owns the expectation repository and the event log; everything
//! else — control router and action dispatcher included — goes through this
//! type, which keeps compound operations (clear spans both stores) in one
//! place.

use super::log::{EventLog, LogEntry, RetrieveType};
use super::repository::{compile_filter, ExpectationRepository};
use super::verify::{Verification, VerificationSequence};
use crate::error::ProcessingError;
use crate::matchers::RequestMatcher;
use crate::model::{Expectation, HttpRequest};
use tracing::{debug, warn};

pub struct StateHandler {
    repository: ExpectationRepository,
    log: EventLog,
}

impl StateHandler {
    pub fn new(max_expectations: usize, max_log_entries: usize) -> Self {
        Self {
            repository: ExpectationRepository::new(max_expectations),
            log: EventLog::new(max_log_entries),
        }
    }

    /// Register an expectation.
    pub fn add(&self, expectation: Expectation) -> Result<(), ProcessingError> {
        self.repository.add(expectation)
    }

    /// Clear expectations and log entries in the matcher's scope; `None`
    /// clears everything.
    pub fn clear(&self, matcher: Option<&RequestMatcher>) -> Result<(), ProcessingError> {
        let filter = compile_filter(matcher)?;
        self.repository.clear(filter.as_ref());
        self.log.clear(filter.as_ref());
        debug!("state cleared");
        Ok(())
    }

    /// Clear everything unconditionally.
    pub fn reset(&self) {
        self.repository.clear(None);
        self.log.clear(None);
        debug!("state reset");
    }

    /// Serialize the requested view of state.
    pub fn retrieve(
        &self,
        retrieve_type: RetrieveType,
        matcher: Option<&RequestMatcher>,
    ) -> Result<serde_json::Value, ProcessingError> {
        let filter = compile_filter(matcher)?;
        let serialized = match retrieve_type {
            RetrieveType::Logs => serde_json::to_value(self.log.entries(filter.as_ref())),
            RetrieveType::Requests => serde_json::to_value(self.log.requests(filter.as_ref())),
            RetrieveType::RecordedExpectations => {
                serde_json::to_value(self.log.recorded_expectations(filter.as_ref()))
            }
            RetrieveType::ActiveExpectations => {
                serde_json::to_value(self.repository.retrieve_active(filter.as_ref()))
            }
        };
        serialized.map_err(|e| ProcessingError::MalformedInput(format!("serialization failed: {e}")))
    }

    /// Record an inbound data-plane request.
    pub fn log_request(&self, request: HttpRequest) -> Result<(), ProcessingError> {
        self.log.append(LogEntry::request_received(request))
    }

    /// Atomically select-and-consume the winning expectation for a request.
    pub fn first_matching_expectation(&self, request: &HttpRequest) -> Option<Expectation> {
        self.repository.first_matching_expectation(request)
    }

    /// Record a match event. Called after the consume succeeded and before
    /// the action's response is returned, so the log and repository never
    /// disagree about what fired.
    pub fn log_match(&self, request: HttpRequest, expectation: Expectation) {
        if let Err(e) = self
            .log
            .append(LogEntry::expectation_matched(request, expectation))
        {
            // The match itself already happened; losing the log entry must
            // not fail the dispatch.
            warn!("failed to record match event: {e}");
        }
    }

    /// Assert how many logged requests satisfy a matcher.
    pub fn verify(&self, verification: &Verification) -> Result<(), String> {
        verification.check(&self.log.requests(None))
    }

    /// Assert that logged requests contain an in-order subsequence matching
    /// each given matcher.
    pub fn verify_sequence(&self, sequence: &VerificationSequence) -> Result<(), String> {
        sequence.check(&self.log.requests(None))
    }

    pub fn repository(&self) -> &ExpectationRepository {
        &self.repository
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }
}
