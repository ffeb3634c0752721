//! The authoritative set of registered expectations.
//!
//! All four operations share one mutex so that match-and-consume is a single
//! indivisible critical section: under N concurrent requests racing for the
//! last remaining use of an expectation, exactly one wins. Expired entries
//! are pruned lazily on access; there is no background sweep.

use crate::error::ProcessingError;
use crate::matchers::{CompiledRequestMatcher, RequestMatcher};
use crate::model::{Expectation, HttpRequest};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::debug;

struct StoredExpectation {
    expectation: Expectation,
    matcher: CompiledRequestMatcher,
    deadline: Option<Instant>,
}

impl StoredExpectation {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Ordered, bounded expectation store. Most recently added ranks first.
pub struct ExpectationRepository {
    inner: Mutex<Vec<StoredExpectation>>,
    capacity: usize,
}

impl ExpectationRepository {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Register an expectation. Does not deduplicate: expectations with
    /// identical matchers coexist and are consumed independently, newest
    /// first.
    pub fn add(&self, expectation: Expectation) -> Result<(), ProcessingError> {
        let matcher = CompiledRequestMatcher::compile(&expectation.http_request)
            .map_err(|e| ProcessingError::MalformedInput(format!("invalid matcher: {e}")))?;
        let deadline = expectation
            .time_to_live
            .duration()
            .map(|ttl| Instant::now() + ttl);

        let mut inner = self.inner.lock();
        if inner.len() >= self.capacity {
            return Err(ProcessingError::ResourceExhaustion(
                "expectation repository is full",
            ));
        }
        inner.push(StoredExpectation {
            expectation,
            matcher,
            deadline,
        });
        debug!(total = inner.len(), "expectation registered");
        Ok(())
    }

    /// Select the highest-ranked eligible expectation matching the request
    /// and consume one use of it, atomically.
    ///
    /// Returns a snapshot taken after the decrement; exhausted expectations
    /// are removed so the next caller falls through to the next-ranked match
    /// or none.
    pub fn first_matching_expectation(&self, request: &HttpRequest) -> Option<Expectation> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.retain(|stored| !stored.is_expired(now));

        let index = inner
            .iter()
            .rposition(|stored| stored.matcher.matches(request))?;

        inner[index].expectation.times.use_one();
        let snapshot = inner[index].expectation.clone();
        if snapshot.times.is_exhausted() {
            inner.remove(index);
            debug!("expectation exhausted and removed");
        }
        Some(snapshot)
    }

    /// Currently eligible expectations falling inside the filter, newest
    /// first (matching rank order).
    pub fn retrieve_active(&self, filter: Option<&CompiledRequestMatcher>) -> Vec<Expectation> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.retain(|stored| !stored.is_expired(now));

        inner
            .iter()
            .rev()
            .filter(|stored| in_scope(filter, stored))
            .map(|stored| stored.expectation.clone())
            .collect()
    }

    /// Remove every expectation falling inside the filter; `None` clears
    /// all. Expiry is not evaluated here — already-expired entries the
    /// filter covers are simply removed along the way.
    pub fn clear(&self, filter: Option<&CompiledRequestMatcher>) {
        let mut inner = self.inner.lock();
        match filter {
            None => inner.clear(),
            Some(matcher) => {
                inner.retain(|stored| !in_scope(Some(matcher), stored));
            }
        }
        debug!(remaining = inner.len(), "expectations cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// An expectation is in a filter's scope when the specs are structurally
/// equal or the filter matches the request the expectation literally
/// describes — the same data-plane semantics matching uses.
fn in_scope(filter: Option<&CompiledRequestMatcher>, stored: &StoredExpectation) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter.spec() == stored.matcher.spec() || filter.matches(&stored.matcher.probe_request())
}

/// Convenience for callers holding a plain spec.
pub fn compile_filter(
    spec: Option<&RequestMatcher>,
) -> Result<Option<CompiledRequestMatcher>, ProcessingError> {
    spec.map(|spec| {
        CompiledRequestMatcher::compile(spec)
            .map_err(|e| ProcessingError::MalformedInput(format!("invalid matcher: {e}")))
    })
    .transpose()
}
