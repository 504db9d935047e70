//! Session types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::fetch::ResourceSet;
use crate::protocol::JsonRpcId;

/// Opaque per-connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Transport open, handshake not yet done
    Connecting,
    /// Handshake done; tool calls accepted
    Active,
    /// Draining in-flight requests; no new ones accepted
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Still able to receive messages
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    /// Explicit `shutdown` or DELETE from the client
    Client,
    /// No activity within the idle timeout
    Idle,
    /// Server shutting down
    Shutdown,
    /// The client's stream went away
    Transport,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Idle => "idle",
            Self::Shutdown => "shutdown",
            Self::Transport => "transport",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight tool invocation
#[derive(Debug)]
pub struct PendingRequest {
    pub tool: String,
    pub started_at: Instant,
    /// Temp files owned by the request
    pub resources: ResourceSet,
    pub(crate) abort: Option<AbortHandle>,
}

impl PendingRequest {
    pub(crate) fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            started_at: Instant::now(),
            resources: ResourceSet::new(),
            abort: None,
        }
    }

    /// Stop the task and delete whatever it still owns
    pub(crate) fn abandon(self) -> usize {
        if let Some(handle) = &self.abort {
            handle.abort();
        }
        self.resources.purge()
    }
}

/// One client connection
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_activity: Instant,
    pub last_activity_at: DateTime<Utc>,
    pub request_count: u64,
    pub state: SessionState,
    pub protocol_version: Option<String>,
    pub pending: HashMap<JsonRpcId, PendingRequest>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            created_at: Utc::now(),
            last_activity: Instant::now(),
            last_activity_at: Utc::now(),
            request_count: 0,
            state: SessionState::Connecting,
            protocol_version: None,
            pending: HashMap::new(),
        }
    }

    pub(crate) fn mark_activity(&mut self) {
        self.last_activity = Instant::now();
        self.last_activity_at = Utc::now();
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            state: self.state,
            created_at: self.created_at,
            last_activity: self.last_activity_at,
            request_count: self.request_count,
            in_flight: self.pending.len(),
            protocol_version: self.protocol_version.clone(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only copy of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: SessionId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub request_count: u64,
    pub in_flight: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
}

/// Why a request could not be registered
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session {id} is {state}")]
    NotActive { id: SessionId, state: SessionState },

    #[error("Request id {0} is already pending")]
    DuplicateRequest(JsonRpcId),
}
