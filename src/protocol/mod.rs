//! MCP JSON-RPC protocol
//!
//! Message types, decoding, error codes and the one tool this server offers.
//! Transport-independent: both the SSE and the stdio transports feed raw
//! message text into the dispatcher, which uses this module to make sense
//! of it.

mod error;
mod tools;
mod types;

use serde_json::{json, Value};

pub use error::ProtocolError;
pub(crate) use error::tag_decode_error;
pub use tools::{
    is_extract_tool, parse_extract_arguments, parse_tool_call, tool_definitions, tool_result,
    ToolCall, LEGACY_TOOL_NAME, TOOL_NAME,
};
pub use types::{
    decode, DecodeFailure, Incoming, JsonRpcError, JsonRpcId, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JSONRPC_VERSION,
};

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "pdf_extraction";

/// Protocol revisions this server speaks, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

/// JSON-RPC error codes
pub mod error_codes {
    // Standard JSON-RPC 2.0 error codes
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Server specific (-32010 to -32019)
    /// Source could not be fetched
    pub const FETCH_ERROR: i32 = -32010;
    /// Text layer or OCR engine failed
    pub const EXTRACTION_ERROR: i32 = -32011;
    /// Extraction exceeded the request timeout
    pub const TIMEOUT_ERROR: i32 = -32012;
    /// A request with the same id is still pending
    pub const DUPLICATE_REQUEST_ID: i32 = -32013;
    /// Session has not completed the handshake or is closing
    pub const SESSION_NOT_ACTIVE: i32 = -32014;
}

/// MCP method names
pub mod methods {
    // Lifecycle
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const SHUTDOWN: &str = "shutdown";

    // Tools
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";

    // Notifications
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const SESSION_CLOSED: &str = "notifications/session/closed";
}

/// Pick the protocol version for a client's `initialize`
///
/// A supported requested version is echoed back; anything else gets the
/// newest version this server speaks.
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|v| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|s| **s == v).copied())
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

/// `initialize` result
pub fn initialize_result(protocol_version: &str) -> Value {
    json!({
        "protocolVersion": protocol_version,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
