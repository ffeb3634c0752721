//! Request routing: control operations first, everything else to the data
//! plane.

use super::types::{build_response, error_response, json_response, PortBinding};
use crate::dispatch::{ActionDispatcher, ConnectionContext, DispatchOutcome};
use crate::error::ProcessingError;
use crate::matchers::RequestMatcher;
use crate::model::{DropPolicy, Expectation, HttpRequest};
use crate::state::{RetrieveType, StateHandler};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

/// The complete set of control operations, keyed by request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOperation {
    Expectation,
    Clear,
    Reset,
    Retrieve,
    Verify,
    VerifySequence,
    Status,
    Bind,
    Stop,
}

impl ControlOperation {
    /// Finite dispatch table. Only these paths are control plane; every
    /// other request is application traffic.
    pub fn parse(path: &str) -> Option<Self> {
        match path {
            "/expectation" => Some(ControlOperation::Expectation),
            "/clear" => Some(ControlOperation::Clear),
            "/reset" => Some(ControlOperation::Reset),
            "/retrieve" => Some(ControlOperation::Retrieve),
            "/verify" => Some(ControlOperation::Verify),
            "/verifySequence" => Some(ControlOperation::VerifySequence),
            "/status" => Some(ControlOperation::Status),
            "/bind" => Some(ControlOperation::Bind),
            "/stop" => Some(ControlOperation::Stop),
            _ => None,
        }
    }
}

/// Signal to the connection layer that the socket must be dropped without a
/// response.
#[derive(Debug, thiserror::Error)]
#[error("connection dropped ({policy:?})")]
pub struct ConnectionDropped {
    pub policy: DropPolicy,
}

pub struct ControlRouter {
    state: Arc<StateHandler>,
    dispatcher: ActionDispatcher,
    ports: Vec<u16>,
}

impl ControlRouter {
    pub fn new(state: Arc<StateHandler>, dispatcher: ActionDispatcher, ports: Vec<u16>) -> Self {
        Self {
            state,
            dispatcher,
            ports,
        }
    }

    /// Entry point for every inbound request on every listener.
    pub async fn route(
        &self,
        request: Request<Incoming>,
        ctx: ConnectionContext,
    ) -> Result<Response<Full<Bytes>>, ConnectionDropped> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let headers = request.headers().clone();

        let body = match request.into_body().collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                if bytes.is_empty() {
                    None
                } else {
                    Some(String::from_utf8_lossy(&bytes).to_string())
                }
            }
            Err(e) => {
                warn!("failed to read request body: {e}");
                None
            }
        };

        if let Some(operation) = ControlOperation::parse(uri.path()) {
            debug!(path = uri.path(), "control operation");
            return Ok(self.handle_control(operation, uri.query(), body.as_deref()));
        }

        let http_request = HttpRequest::from_parts(
            &method,
            &uri,
            &headers,
            body,
            ctx.secure,
            ctx.client_address.map(|addr| addr.to_string()),
        );
        self.handle_data_plane(http_request, ctx).await
    }

    /// Control operations run synchronously against the state handler.
    fn handle_control(
        &self,
        operation: ControlOperation,
        query: Option<&str>,
        body: Option<&str>,
    ) -> Response<Full<Bytes>> {
        let result = match operation {
            ControlOperation::Expectation => self.handle_add(body),
            ControlOperation::Clear => self.handle_clear(body),
            ControlOperation::Reset => {
                self.state.reset();
                Ok(build_response(StatusCode::OK, Bytes::new()))
            }
            ControlOperation::Retrieve => self.handle_retrieve(query, body),
            ControlOperation::Verify => self.handle_verify(body),
            ControlOperation::VerifySequence => self.handle_verify_sequence(body),
            ControlOperation::Status => Ok(json_response(
                StatusCode::OK,
                &PortBinding::new(self.ports.clone()),
            )),
            ControlOperation::Bind => self.handle_bind(body),
            ControlOperation::Stop => Err(ProcessingError::NotImplemented("stop")),
        };
        result.unwrap_or_else(|error| report(&error))
    }

    fn handle_add(&self, body: Option<&str>) -> Result<Response<Full<Bytes>>, ProcessingError> {
        let body = body.ok_or_else(|| {
            ProcessingError::MalformedInput("expectation body is required".to_string())
        })?;
        let expectation: Expectation = serde_json::from_str(body)
            .map_err(|e| ProcessingError::MalformedInput(format!("invalid expectation: {e}")))?;
        self.state.add(expectation)?;
        Ok(build_response(StatusCode::CREATED, Bytes::new()))
    }

    fn handle_clear(&self, body: Option<&str>) -> Result<Response<Full<Bytes>>, ProcessingError> {
        let matcher = parse_optional_matcher(body)?;
        self.state.clear(matcher.as_ref())?;
        Ok(build_response(StatusCode::OK, Bytes::new()))
    }

    fn handle_retrieve(
        &self,
        query: Option<&str>,
        body: Option<&str>,
    ) -> Result<Response<Full<Bytes>>, ProcessingError> {
        let retrieve_type = retrieve_type_from_query(query)?;
        let matcher = parse_optional_matcher(body)?;
        let serialized = self.state.retrieve(retrieve_type, matcher.as_ref())?;
        Ok(json_response(StatusCode::OK, &serialized))
    }

    fn handle_verify(&self, body: Option<&str>) -> Result<Response<Full<Bytes>>, ProcessingError> {
        let body = body.ok_or_else(|| {
            ProcessingError::MalformedInput("verification body is required".to_string())
        })?;
        let verification: crate::state::Verification = serde_json::from_str(body)
            .map_err(|e| ProcessingError::MalformedInput(format!("invalid verification: {e}")))?;
        match self.state.verify(&verification) {
            Ok(()) => Ok(build_response(StatusCode::ACCEPTED, Bytes::new())),
            Err(mismatch) => Ok(build_response(StatusCode::NOT_ACCEPTABLE, mismatch)),
        }
    }

    fn handle_verify_sequence(
        &self,
        body: Option<&str>,
    ) -> Result<Response<Full<Bytes>>, ProcessingError> {
        let body = body.ok_or_else(|| {
            ProcessingError::MalformedInput("verification body is required".to_string())
        })?;
        let sequence: crate::state::VerificationSequence = serde_json::from_str(body)
            .map_err(|e| {
                ProcessingError::MalformedInput(format!("invalid verification sequence: {e}"))
            })?;
        match self.state.verify_sequence(&sequence) {
            Ok(()) => Ok(build_response(StatusCode::ACCEPTED, Bytes::new())),
            Err(mismatch) => Ok(build_response(StatusCode::NOT_ACCEPTABLE, mismatch)),
        }
    }

    /// Port binding belongs to the network-listener layer; the core reports
    /// it as unimplemented rather than silently ignoring it.
    fn handle_bind(&self, body: Option<&str>) -> Result<Response<Full<Bytes>>, ProcessingError> {
        if let Some(body) = body {
            let _: PortBinding = serde_json::from_str(body)
                .map_err(|e| ProcessingError::MalformedInput(format!("invalid port binding: {e}")))?;
        }
        Err(ProcessingError::NotImplemented("bind"))
    }

    /// Data plane: log, match-and-consume, record the match, dispatch.
    async fn handle_data_plane(
        &self,
        request: HttpRequest,
        ctx: ConnectionContext,
    ) -> Result<Response<Full<Bytes>>, ConnectionDropped> {
        if let Err(error) = self.state.log_request(request.clone()) {
            // Append failure is fatal to this request only
            warn!("request log append failed: {error}");
            return Ok(error_response(&error));
        }

        let matched = self.state.first_matching_expectation(&request);
        if let Some(expectation) = &matched {
            self.state.log_match(request.clone(), expectation.clone());
        }

        match self.dispatcher.dispatch(&request, matched.as_ref(), &ctx).await {
            Ok(DispatchOutcome::Response(response)) => Ok(response.into_hyper()),
            Ok(DispatchOutcome::Close(policy)) => Err(ConnectionDropped { policy }),
            Err(error) => {
                debug!("dispatch failed: {error}");
                Ok(error_response(&error))
            }
        }
    }
}

fn report(error: &ProcessingError) -> Response<Full<Bytes>> {
    // 501s answer with an empty body, matching the advertised contract
    if matches!(error, ProcessingError::NotImplemented(_)) {
        build_response(StatusCode::NOT_IMPLEMENTED, Bytes::new())
    } else {
        error_response(error)
    }
}

fn parse_optional_matcher(body: Option<&str>) -> Result<Option<RequestMatcher>, ProcessingError> {
    match body {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|e| ProcessingError::MalformedInput(format!("invalid request matcher: {e}"))),
    }
}

fn retrieve_type_from_query(query: Option<&str>) -> Result<RetrieveType, ProcessingError> {
    let Some(query) = query else {
        return Ok(RetrieveType::Requests);
    };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("type=") {
            return value.parse();
        }
    }
    Ok(RetrieveType::Requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerMode;
    use std::time::Duration;

    fn router() -> ControlRouter {
        let state = Arc::new(StateHandler::new(1000, 1000));
        let dispatcher =
            ActionDispatcher::new(ServerMode::Mock, Duration::from_secs(5), Duration::from_secs(5));
        ControlRouter::new(state, dispatcher, vec![1080])
    }

    #[test]
    fn test_add_expectation_returns_201() {
        let router = router();
        let body = r#"{"httpRequest": {"path": "/somePath"}, "httpResponse": {"body": "response_one"}}"#;
        let response = router.handle_control(ControlOperation::Expectation, None, Some(body));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(router.state.repository().len(), 1);
    }

    #[test]
    fn test_add_with_malformed_body_is_400() {
        let router = router();
        let response =
            router.handle_control(ControlOperation::Expectation, None, Some("{not json"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_clear_and_reset_return_200() {
        let router = router();
        let response = router.handle_control(ControlOperation::Clear, None, None);
        assert_eq!(response.status(), StatusCode::OK);
        let response = router.handle_control(ControlOperation::Reset, None, None);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_verify_statuses() {
        let router = router();
        router
            .state
            .log_request(HttpRequest::with_path("/seen"))
            .unwrap();

        let hit = router.handle_control(
            ControlOperation::Verify,
            None,
            Some(r#"{"httpRequest": {"path": "/seen"}}"#),
        );
        assert_eq!(hit.status(), StatusCode::ACCEPTED);

        let miss = router.handle_control(
            ControlOperation::Verify,
            None,
            Some(r#"{"httpRequest": {"path": "/never"}}"#),
        );
        assert_eq!(miss.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn test_verify_sequence_statuses() {
        let router = router();
        router
            .state
            .log_request(HttpRequest::with_path("/first"))
            .unwrap();
        router
            .state
            .log_request(HttpRequest::with_path("/second"))
            .unwrap();

        let in_order = router.handle_control(
            ControlOperation::VerifySequence,
            None,
            Some(r#"{"httpRequests": [{"path": "/first"}, {"path": "/second"}]}"#),
        );
        assert_eq!(in_order.status(), StatusCode::ACCEPTED);

        let out_of_order = router.handle_control(
            ControlOperation::VerifySequence,
            None,
            Some(r#"{"httpRequests": [{"path": "/second"}, {"path": "/first"}]}"#),
        );
        assert_eq!(out_of_order.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn test_status_reports_bound_ports() {
        let router = router();
        let response = router.handle_control(ControlOperation::Status, None, None);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_bind_and_stop_are_not_implemented() {
        let router = router();
        let bind = router.handle_control(
            ControlOperation::Bind,
            None,
            Some(r#"{"ports": [1090]}"#),
        );
        assert_eq!(bind.status(), StatusCode::NOT_IMPLEMENTED);

        let stop = router.handle_control(ControlOperation::Stop, None, None);
        assert_eq!(stop.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn test_retrieve_returns_serialized_sequence() {
        let router = router();
        router
            .state
            .log_request(HttpRequest::with_path("request_one"))
            .unwrap();
        let response =
            router.handle_control(ControlOperation::Retrieve, Some("type=REQUESTS"), None);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_control_table_is_exhaustive() {
        assert_eq!(
            ControlOperation::parse("/expectation"),
            Some(ControlOperation::Expectation)
        );
        assert_eq!(ControlOperation::parse("/clear"), Some(ControlOperation::Clear));
        assert_eq!(ControlOperation::parse("/reset"), Some(ControlOperation::Reset));
        assert_eq!(
            ControlOperation::parse("/retrieve"),
            Some(ControlOperation::Retrieve)
        );
        assert_eq!(ControlOperation::parse("/verify"), Some(ControlOperation::Verify));
        assert_eq!(
            ControlOperation::parse("/verifySequence"),
            Some(ControlOperation::VerifySequence)
        );
        assert_eq!(ControlOperation::parse("/status"), Some(ControlOperation::Status));
        assert_eq!(ControlOperation::parse("/bind"), Some(ControlOperation::Bind));
        assert_eq!(ControlOperation::parse("/stop"), Some(ControlOperation::Stop));
    }

    #[test]
    fn test_application_paths_are_not_control() {
        assert!(ControlOperation::parse("/somePath").is_none());
        assert!(ControlOperation::parse("/").is_none());
        assert!(ControlOperation::parse("/expectation/extra").is_none());
        assert!(ControlOperation::parse("request_one").is_none());
    }

    #[test]
    fn test_retrieve_type_from_query() {
        assert_eq!(retrieve_type_from_query(None).unwrap(), RetrieveType::Requests);
        assert_eq!(
            retrieve_type_from_query(Some("type=ACTIVE_EXPECTATIONS")).unwrap(),
            RetrieveType::ActiveExpectations
        );
        assert_eq!(
            retrieve_type_from_query(Some("format=json&type=LOGS")).unwrap(),
            RetrieveType::Logs
        );
        assert!(retrieve_type_from_query(Some("type=WRONG")).is_err());
    }

    #[test]
    fn test_parse_optional_matcher() {
        assert!(parse_optional_matcher(None).unwrap().is_none());
        assert!(parse_optional_matcher(Some("  ")).unwrap().is_none());
        let matcher = parse_optional_matcher(Some(r#"{"path": "/x"}"#))
            .unwrap()
            .unwrap();
        assert_eq!(matcher, RequestMatcher::path("/x"));
        assert!(parse_optional_matcher(Some("{broken")).is_err());
    }
}
