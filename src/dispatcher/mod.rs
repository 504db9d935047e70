//! Dispatcher Module
//!
//! Routes JSON-RPC messages from every session to the right handler and
//! owns the session state machine:
//!
//! ```text
//! Connecting --initialize--> Active --shutdown/idle/disconnect--> Closing --> Closed
//! ```
//!
//! Tool calls run in their own tasks so a slow OCR job never blocks other
//! requests of the same session. Every request gets exactly one response,
//! unless it was cancelled or its session closed first.

mod service;

pub use service::Dispatcher;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}
