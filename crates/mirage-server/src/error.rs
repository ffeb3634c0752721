//! Error taxonomy for request processing.
//!
//! Every per-request failure is contained to that request and surfaced in its
//! response; none of these variants may corrupt or block shared state.

use hyper::StatusCode;

/// Errors produced while processing a single request.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// Unparseable control-plane body or invalid matcher pattern.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// Upstream connect/read/write failure during a forward action.
    #[error("upstream failure: {0}")]
    GatewayFailure(String),
    /// External callback handler did not respond in time.
    #[error("callback timed out: {0}")]
    CallbackTimeout(String),
    /// Control operation advertised but not implemented by the in-process core.
    #[error("{0} is not implemented by this server")]
    NotImplemented(&'static str),
    /// Log or repository capacity exceeded; the operation fails, the process
    /// continues serving other requests.
    #[error("capacity exhausted: {0}")]
    ResourceExhaustion(&'static str),
}

impl ProcessingError {
    /// HTTP status the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProcessingError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            ProcessingError::GatewayFailure(_) => StatusCode::BAD_GATEWAY,
            ProcessingError::CallbackTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProcessingError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ProcessingError::ResourceExhaustion(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            ProcessingError::MalformedInput("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProcessingError::GatewayFailure("refused".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProcessingError::CallbackTimeout("10s".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProcessingError::NotImplemented("bind").status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            ProcessingError::ResourceExhaustion("log").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
