//! Action dispatch: execute the matched expectation's action, or the ambient
//! mode's default policy when nothing matched.
//!
//! Dispatch never holds a lock on the repository or the log: by the time an
//! action runs, the match has already been consumed and recorded, so slow
//! upstreams and callbacks only ever block their own connection.

mod callback;
mod forward;

pub use callback::CallbackClient;
pub use forward::Forwarder;

use crate::config::ServerMode;
use crate::error::ProcessingError;
use crate::model::{Action, DropPolicy, Expectation, HttpRequest, HttpResponse};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

/// Per-connection context handed to dispatch alongside the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionContext {
    pub client_address: Option<SocketAddr>,
    pub secure: bool,
}

/// What the connection layer should do with the outcome.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Write this response.
    Response(HttpResponse),
    /// Drop the connection without writing anything.
    Close(DropPolicy),
}

pub struct ActionDispatcher {
    mode: ServerMode,
    forwarder: Forwarder,
    callback: CallbackClient,
}

impl ActionDispatcher {
    pub fn new(mode: ServerMode, forward_timeout: Duration, callback_timeout: Duration) -> Self {
        Self {
            mode,
            forwarder: Forwarder::new(forward_timeout),
            callback: CallbackClient::new(callback_timeout),
        }
    }

    /// Execute the matched action and produce the outcome.
    ///
    /// Errors are per-request: `GatewayFailure` and `CallbackTimeout` map to
    /// 502/504-shaped responses at the connection layer and never touch
    /// shared state.
    pub async fn dispatch(
        &self,
        request: &HttpRequest,
        matched: Option<&Expectation>,
        _ctx: &ConnectionContext,
    ) -> Result<DispatchOutcome, ProcessingError> {
        let Some(expectation) = matched else {
            return self.no_match_policy(request).await;
        };

        match &expectation.action {
            Action::Respond(response) => {
                if let Some(delay) = &response.delay {
                    // Suspends only this dispatch; unrelated connections
                    // proceed.
                    tokio::time::sleep(delay.to_duration()).await;
                }
                Ok(DispatchOutcome::Response(response.clone()))
            }
            Action::Forward(forward) => {
                debug!(host = %forward.host, port = forward.port, "forwarding to upstream");
                let response = self.forwarder.forward(request, forward).await?;
                Ok(DispatchOutcome::Response(response))
            }
            Action::Callback(callback) => {
                debug!(url = %callback.url, "invoking callback");
                let response = self.callback.invoke(request, callback).await?;
                Ok(DispatchOutcome::Response(response))
            }
            Action::Close(close) => Ok(DispatchOutcome::Close(close.drop_policy)),
        }
    }

    /// No-match is a policy decision, not an error: mock mode answers with a
    /// fixed 404, proxy mode relays to the request's original destination.
    async fn no_match_policy(
        &self,
        request: &HttpRequest,
    ) -> Result<DispatchOutcome, ProcessingError> {
        match self.mode {
            ServerMode::Mock => Ok(DispatchOutcome::Response(HttpResponse::not_found())),
            ServerMode::Proxy => {
                let response = self.forwarder.forward_transparent(request).await?;
                Ok(DispatchOutcome::Response(response))
            }
        }
    }
}
