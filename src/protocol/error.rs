//! Protocol errors and the JSON-RPC form of every failure

use serde_json::json;
use thiserror::Error;

use super::error_codes;
use super::types::{JsonRpcError, JsonRpcId};
use crate::classify::ValidationError;
use crate::error::ErrorKind;
use crate::pipeline::PipelineError;
use crate::session::SessionState;

/// Message-level failures; the session stays open
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Request id {0} is already pending on this session")]
    DuplicateRequestId(JsonRpcId),

    #[error("Session is {0}; only initialize is accepted before the handshake")]
    NotInitialized(SessionState),

    #[error("Session is {0}")]
    SessionNotActive(SessionState),
}

impl ProtocolError {
    pub fn code(&self) -> i32 {
        match self {
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) | Self::UnknownTool(_) => error_codes::INVALID_PARAMS,
            Self::DuplicateRequestId(_) => error_codes::DUPLICATE_REQUEST_ID,
            Self::NotInitialized(_) | Self::SessionNotActive(_) => error_codes::SESSION_NOT_ACTIVE,
        }
    }
}

fn with_kind(code: i32, message: String, kind: ErrorKind) -> JsonRpcError {
    JsonRpcError::new(code, message).with_data(json!({ "kind": kind }))
}

impl From<&ProtocolError> for JsonRpcError {
    fn from(e: &ProtocolError) -> Self {
        with_kind(e.code(), e.to_string(), ErrorKind::ProtocolError)
    }
}

impl From<&ValidationError> for JsonRpcError {
    fn from(e: &ValidationError) -> Self {
        with_kind(error_codes::INVALID_PARAMS, e.to_string(), ErrorKind::ValidationError)
    }
}

impl From<&PipelineError> for JsonRpcError {
    fn from(e: &PipelineError) -> Self {
        let code = match e {
            PipelineError::Fetch(_) => error_codes::FETCH_ERROR,
            PipelineError::Validation(_) => error_codes::INVALID_PARAMS,
            PipelineError::Extraction(_) => error_codes::EXTRACTION_ERROR,
            PipelineError::Timeout(_) => error_codes::TIMEOUT_ERROR,
        };
        with_kind(code, e.to_string(), e.kind())
    }
}

/// Errors produced while decoding carry no kind yet
pub(crate) fn tag_decode_error(error: JsonRpcError) -> JsonRpcError {
    let message = error.message.clone();
    with_kind(error.code, message, ErrorKind::ProtocolError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use std::time::Duration;

    #[test]
    fn test_pipeline_error_codes_and_kinds() {
        let e = PipelineError::Fetch(FetchError::NotFound("/x.pdf".to_string()));
        let rpc = JsonRpcError::from(&e);
        assert_eq!(rpc.code, error_codes::FETCH_ERROR);
        assert_eq!(rpc.data.unwrap()["kind"], "FetchError");

        let e = PipelineError::Validation(ValidationError::ZeroPage);
        let rpc = JsonRpcError::from(&e);
        assert_eq!(rpc.code, error_codes::INVALID_PARAMS);
        assert_eq!(rpc.data.unwrap()["kind"], "ValidationError");

        let e = PipelineError::Timeout(Duration::from_secs(3));
        let rpc = JsonRpcError::from(&e);
        assert_eq!(rpc.code, error_codes::TIMEOUT_ERROR);
        assert_eq!(rpc.message, "Extraction timed out after 3s");
    }

    #[test]
    fn test_protocol_error_kind() {
        let e = ProtocolError::DuplicateRequestId(JsonRpcId::Number(4));
        let rpc = JsonRpcError::from(&e);
        assert_eq!(rpc.code, error_codes::DUPLICATE_REQUEST_ID);
        assert_eq!(rpc.data.unwrap()["kind"], "ProtocolError");
    }
}
