//! Verification of recorded traffic against expectations.
//!
//! `verify` asserts how many logged requests satisfy a matcher;
//! `verifySequence` asserts that a list of matchers is satisfied by the log
//! in order (as a subsequence, other traffic interleaved freely).

use crate::matchers::{CompiledRequestMatcher, RequestMatcher};
use crate::model::HttpRequest;
use serde::{Deserialize, Serialize};

fn default_count() -> u32 {
    1
}

/// Expected match count for a verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationTimes {
    #[serde(default = "default_count")]
    pub count: u32,
    /// `true` requires exactly `count` matches, otherwise at least `count`.
    #[serde(default)]
    pub exact: bool,
}

impl Default for VerificationTimes {
    fn default() -> Self {
        Self {
            count: default_count(),
            exact: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub http_request: RequestMatcher,
    #[serde(default)]
    pub times: VerificationTimes,
}

impl Verification {
    /// Check the logged requests; `Err` carries the mismatch description.
    pub fn check(&self, requests: &[HttpRequest]) -> Result<(), String> {
        let matcher = CompiledRequestMatcher::compile(&self.http_request)
            .map_err(|e| format!("invalid matcher: {e}"))?;
        let found = requests
            .iter()
            .filter(|request| matcher.matches(request))
            .count() as u32;

        let satisfied = if self.times.exact {
            found == self.times.count
        } else {
            found >= self.times.count
        };
        if satisfied {
            Ok(())
        } else {
            let quantifier = if self.times.exact { "exactly" } else { "at least" };
            Err(format!(
                "Request not found {} {} times, expected {} but was {}",
                quantifier,
                self.times.count,
                serde_json::to_string(&self.http_request).unwrap_or_default(),
                found
            ))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSequence {
    pub http_requests: Vec<RequestMatcher>,
}

impl VerificationSequence {
    /// Check that the matchers are satisfied in order by the logged
    /// requests.
    pub fn check(&self, requests: &[HttpRequest]) -> Result<(), String> {
        let matchers = self
            .http_requests
            .iter()
            .map(CompiledRequestMatcher::compile)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid matcher: {e}"))?;

        let mut position = 0;
        for (index, matcher) in matchers.iter().enumerate() {
            match requests[position..]
                .iter()
                .position(|request| matcher.matches(request))
            {
                Some(offset) => position += offset + 1,
                None => {
                    return Err(format!(
                        "Request sequence not found, expected request {} of {} matching {}",
                        index + 1,
                        matchers.len(),
                        serde_json::to_string(&self.http_requests[index]).unwrap_or_default()
                    ));
                }
            }
        }
        Ok(())
    }
}
