//! Session transports
//!
//! Both transports do the same job: open a session on the dispatcher, feed
//! it raw inbound messages and forward its outbound messages to the client.
//!
//! - [`sse`]: many sessions over HTTP; one SSE stream per session for
//!   server→client traffic, `POST /messages` for client→server
//! - [`stdio`]: a single session over newline-delimited JSON on
//!   stdin/stdout

pub mod sse;
pub mod stdio;

/// Header carrying the session id on SSE responses and client POSTs
pub const SESSION_HEADER: &str = "mcp-session-id";
