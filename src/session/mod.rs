//! Session Registry
//!
//! One entry per client connection: identity, timestamps, request counter,
//! protocol state and the requests currently in flight. The dispatcher is
//! the only writer; metrics and the health routes only read snapshots.

mod registry;
mod types;

pub use registry::SessionRegistry;
pub use types::{
    CloseReason, PendingRequest, RegistryError, Session, SessionId, SessionState, SessionView,
};
