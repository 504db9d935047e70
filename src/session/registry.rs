//! Session Registry
//!
//! Tracks every open session with:
//! - One lock per session, so operations on a session are serialized while
//!   different sessions proceed independently
//! - The pending requests of each session and the temp files they own
//! - Idle detection for the background sweeper

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::AbortHandle;

use super::types::{
    PendingRequest, RegistryError, Session, SessionId, SessionState, SessionView,
};
use crate::fetch::ResourceSet;
use crate::protocol::JsonRpcId;

// ============================================================================
// Session Registry
// ============================================================================

/// Registry of open sessions
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<SessionRegistryInner>,
}

#[derive(Default)]
struct SessionRegistryInner {
    /// Open sessions indexed by ID
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        self.inner.sessions.read().get(id).cloned()
    }

    /// Run `f` on a live session; `None` when it is unknown or closed
    fn with_session<R>(&self, id: &SessionId, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let session = self.get(id)?;
        let mut session = session.lock();
        if session.state == SessionState::Closed {
            return None;
        }
        Some(f(&mut session))
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Register a new session in `Connecting`
    pub fn open(&self) -> SessionId {
        let session = Session::new();
        let id = session.id;
        self.inner
            .sessions
            .write()
            .insert(id, Arc::new(Mutex::new(session)));

        tracing::info!(session_id = %id, "Session opened");
        id
    }

    /// Complete the handshake: `Connecting` → `Active`
    ///
    /// Re-initializing an active session just updates the version. Returns
    /// false for unknown or closing sessions.
    pub fn activate(&self, id: &SessionId, protocol_version: &str) -> bool {
        self.with_session(id, |session| {
            if !session.state.is_open() {
                return false;
            }
            session.state = SessionState::Active;
            session.protocol_version = Some(protocol_version.to_string());
            session.mark_activity();
            tracing::info!(session_id = %id, protocol_version, "Session active");
            true
        })
        .unwrap_or(false)
    }

    pub fn state(&self, id: &SessionId) -> Option<SessionState> {
        self.with_session(id, |session| session.state)
    }

    /// Record a request: bumps the counter and the activity time
    ///
    /// Returns false when the session is gone; callers treat that as
    /// already closed.
    pub fn touch(&self, id: &SessionId) -> bool {
        self.with_session(id, |session| {
            session.request_count += 1;
            session.mark_activity();
        })
        .is_some()
    }

    /// Record activity without counting a request (notifications)
    pub fn note_activity(&self, id: &SessionId) -> bool {
        self.with_session(id, Session::mark_activity).is_some()
    }

    /// Start closing: `Connecting`/`Active` → `Closing`
    ///
    /// Returns true only for the call that made the transition.
    pub fn begin_close(&self, id: &SessionId) -> bool {
        self.with_session(id, |session| {
            if session.state.is_open() {
                session.state = SessionState::Closing;
                true
            } else {
                false
            }
        })
        .unwrap_or(false)
    }

    /// Remove a session, abandoning whatever is still in flight
    ///
    /// Pending tasks are aborted and their temp files deleted; the returned
    /// view counts them in `in_flight`. Idempotent: `None` when the session
    /// was already gone.
    pub fn close(&self, id: &SessionId) -> Option<SessionView> {
        let session = self.inner.sessions.write().remove(id)?;
        let mut session = session.lock();

        session.state = SessionState::Closed;
        let view = session.view();
        let dropped: Vec<(JsonRpcId, PendingRequest)> = session.pending.drain().collect();
        drop(session);

        let mut purged = 0;
        for (request_id, pending) in dropped {
            tracing::warn!(
                session_id = %id,
                request_id = %request_id,
                tool = %pending.tool,
                elapsed_ms = pending.started_at.elapsed().as_millis() as u64,
                "Abandoning in-flight request on close"
            );
            purged += pending.abandon();
        }

        tracing::info!(
            session_id = %id,
            requests = view.request_count,
            purged_files = purged,
            "Session closed"
        );

        Some(view)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Register an in-flight request
    ///
    /// Returns the resource set the request's temp files go into.
    pub fn begin_request(
        &self,
        id: &SessionId,
        request_id: &JsonRpcId,
        tool: &str,
    ) -> Result<ResourceSet, RegistryError> {
        self.with_session(id, |session| {
            if session.state != SessionState::Active {
                return Err(RegistryError::NotActive {
                    id: *id,
                    state: session.state,
                });
            }
            if session.pending.contains_key(request_id) {
                return Err(RegistryError::DuplicateRequest(request_id.clone()));
            }

            let pending = PendingRequest::new(tool);
            let resources = pending.resources.clone();
            session.pending.insert(request_id.clone(), pending);
            Ok(resources)
        })
        .unwrap_or(Err(RegistryError::NotFound(*id)))
    }

    /// Attach the task running a request so it can be aborted
    ///
    /// A request that already finished is left alone.
    pub fn attach_abort(&self, id: &SessionId, request_id: &JsonRpcId, handle: AbortHandle) {
        self.with_session(id, |session| {
            if let Some(pending) = session.pending.get_mut(request_id) {
                pending.abort = Some(handle);
            }
        });
    }

    /// Mark a request terminal
    ///
    /// Returns the request only to the first caller; a cancelled request or
    /// a closed session yields `None` and the result must not be delivered.
    pub fn finish_request(&self, id: &SessionId, request_id: &JsonRpcId) -> Option<PendingRequest> {
        self.with_session(id, |session| session.pending.remove(request_id))
            .flatten()
    }

    /// Cancel an in-flight request: abort it and delete its files
    pub fn cancel_request(&self, id: &SessionId, request_id: &JsonRpcId) -> bool {
        let Some(pending) = self.finish_request(id, request_id) else {
            return false;
        };
        let elapsed_ms = pending.started_at.elapsed().as_millis() as u64;
        let purged = pending.abandon();
        tracing::info!(
            session_id = %id,
            request_id = %request_id,
            elapsed_ms,
            purged_files = purged,
            "Request cancelled"
        );
        true
    }

    /// Whether a request id is taken by an in-flight request
    pub fn is_pending(&self, id: &SessionId, request_id: &JsonRpcId) -> bool {
        self.with_session(id, |session| session.pending.contains_key(request_id))
            .unwrap_or(false)
    }

    pub fn in_flight(&self, id: &SessionId) -> usize {
        self.with_session(id, |session| session.pending.len())
            .unwrap_or(0)
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    pub fn view(&self, id: &SessionId) -> Option<SessionView> {
        self.with_session(id, |session| session.view())
    }

    /// Read-only view of every session
    pub fn snapshot(&self) -> Vec<SessionView> {
        let sessions: Vec<Arc<Mutex<Session>>> =
            self.inner.sessions.read().values().cloned().collect();
        let mut views: Vec<SessionView> = sessions.iter().map(|s| s.lock().view()).collect();
        views.sort_by_key(|v| v.created_at);
        views
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.inner.sessions.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Idle Detection
    // ========================================================================

    /// Open sessions with no activity for `timeout`
    ///
    /// A session with requests still in flight is busy, not idle.
    pub fn idle_sessions(&self, timeout: Duration) -> Vec<SessionId> {
        let sessions: Vec<Arc<Mutex<Session>>> =
            self.inner.sessions.read().values().cloned().collect();

        sessions
            .iter()
            .filter_map(|session| {
                let session = session.lock();
                let idle = session.state.is_open()
                    && session.pending.is_empty()
                    && session.last_activity.elapsed() >= timeout;
                idle.then_some(session.id)
            })
            .collect()
    }

    /// Start background idle sweeping
    ///
    /// Every `interval`, each idle session is handed to `on_idle`, which is
    /// expected to close it.
    pub fn start_idle_sweeper<F, Fut>(
        &self,
        idle_timeout: Duration,
        interval: Duration,
        on_idle: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(SessionId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let idle = registry.idle_sessions(idle_timeout);
                if idle.is_empty() {
                    continue;
                }

                tracing::info!(count = idle.len(), "Closing idle sessions");
                for id in idle {
                    on_idle(id).await;
                }
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
