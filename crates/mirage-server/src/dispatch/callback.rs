//! External callback invocation.
//!
//! The matched request is POSTed, serialized, to the callback endpoint; the
//! handler's reply becomes the response for the inbound connection. The wait
//! is bounded: expiry yields `CallbackTimeout`, transport failure
//! `GatewayFailure`.

use super::forward::response_from_upstream;
use crate::error::ProcessingError;
use crate::model::{CallbackAction, HttpRequest, HttpResponse};
use std::time::Duration;
use tracing::warn;

pub struct CallbackClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl CallbackClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }

    pub async fn invoke(
        &self,
        request: &HttpRequest,
        action: &CallbackAction,
    ) -> Result<HttpResponse, ProcessingError> {
        let outbound = self.client.post(&action.url).json(request);

        let response = tokio::time::timeout(self.timeout, outbound.send())
            .await
            .map_err(|_| {
                warn!(url = %action.url, "callback deadline exceeded");
                ProcessingError::CallbackTimeout(format!(
                    "callback {} did not respond within {:?}",
                    action.url, self.timeout
                ))
            })?
            .map_err(|e| {
                if e.is_timeout() {
                    ProcessingError::CallbackTimeout(format!(
                        "callback {} did not respond within {:?}",
                        action.url, self.timeout
                    ))
                } else {
                    warn!(url = %action.url, "callback failed: {e}");
                    ProcessingError::GatewayFailure(format!("callback {} failed: {e}", action.url))
                }
            })?;

        response_from_upstream(response, self.timeout)
            .await
            .map_err(|e| match e {
                // A stalled body read is still the handler not answering in time
                ProcessingError::GatewayFailure(message) if message.contains("timed out") => {
                    ProcessingError::CallbackTimeout(message)
                }
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_callback_is_gateway_failure() {
        let client = CallbackClient::new(Duration::from_millis(300));
        let action = CallbackAction {
            // Reserved TEST-NET address: connection fails, it does not hang
            url: "http://192.0.2.1:81/handler".to_string(),
        };
        let err = client
            .invoke(&HttpRequest::with_path("/cb"), &action)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::GatewayFailure(_) | ProcessingError::CallbackTimeout(_)
        ));
    }
}
