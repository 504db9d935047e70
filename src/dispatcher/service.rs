//! Request dispatcher

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use super::DispatchError;
use crate::config::SessionConfig;
use crate::metrics::Metrics;
use crate::pipeline::Pipeline;
use crate::protocol::{
    self, decode, is_extract_tool, methods, parse_extract_arguments, parse_tool_call,
    tool_definitions, tool_result, Incoming, JsonRpcError, JsonRpcId, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ProtocolError,
};
use crate::session::{CloseReason, RegistryError, SessionId, SessionRegistry, SessionState};

/// How long a close notice may wait for room in a full outbound buffer
const NOTICE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outbound side of one session
#[derive(Clone)]
struct SessionChannel {
    tx: mpsc::Sender<Value>,
    /// Signalled whenever one of the session's requests becomes terminal
    drained: Arc<Notify>,
    /// Held while a tool result or the close notice is enqueued, so a
    /// result whose request left the registry is always queued ahead of
    /// the notice
    outbound: Arc<Mutex<()>>,
}

/// Routes decoded messages of every session
///
/// Cheap to clone; all clones share the same registry, metrics and
/// pipeline.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    registry: SessionRegistry,
    metrics: Metrics,
    pipeline: Arc<Pipeline>,
    channels: RwLock<HashMap<SessionId, SessionChannel>>,
    config: SessionConfig,
}

impl Dispatcher {
    pub fn new(
        registry: SessionRegistry,
        metrics: Metrics,
        pipeline: Arc<Pipeline>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                metrics,
                pipeline,
                channels: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Open a session; the receiver yields every outbound message for it
    ///
    /// The receiver ends after the close notice has been queued.
    pub fn connect(&self) -> (SessionId, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(self.inner.config.outbound_buffer.max(1));
        let id = self.inner.registry.open();
        self.inner.channels.write().insert(
            id,
            SessionChannel {
                tx,
                drained: Arc::new(Notify::new()),
                outbound: Arc::new(Mutex::new(())),
            },
        );
        (id, rx)
    }

    /// Close a session: drain, notify the client, release everything
    ///
    /// In-flight requests get up to the drain timeout to finish; whatever is
    /// left after that is aborted and its temp files deleted. Returns false
    /// when the session was unknown or already closing.
    pub async fn close_session(&self, id: &SessionId, reason: CloseReason) -> bool {
        if !self.inner.registry.begin_close(id) {
            return false;
        }

        tracing::info!(session_id = %id, reason = %reason, "Closing session");

        let channel = self.channel(id);
        if let Some(drained) = channel.as_ref().map(|c| c.drained.clone()) {
            let deadline = Instant::now() + self.inner.config.drain_timeout;
            loop {
                let notified = drained.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.inner.registry.in_flight(id) == 0 {
                    break;
                }
                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    tracing::warn!(
                        session_id = %id,
                        dropped = self.inner.registry.in_flight(id),
                        drain_timeout_ms = self.inner.config.drain_timeout.as_millis() as u64,
                        "Drain timeout elapsed, dropping in-flight requests"
                    );
                    break;
                }
            }
        }

        // Leftover requests leave the registry before the notice, so none
        // of their results can follow it
        if let Some(view) = self.inner.registry.close(id) {
            for _ in 0..view.in_flight {
                self.inner.metrics.record_request_end(id, false, 0);
            }
        }
        self.inner.metrics.remove_session(id);

        let notice = JsonRpcNotification::new(
            methods::SESSION_CLOSED,
            Some(json!({ "sessionId": id, "reason": reason })),
        );
        if let (Some(channel), Ok(value)) = (channel, serde_json::to_value(&notice)) {
            match tokio::time::timeout(NOTICE_TIMEOUT, channel.tx.reserve()).await {
                Ok(Ok(permit)) => {
                    let _outbound = channel.outbound.lock();
                    permit.send(value);
                }
                _ => tracing::debug!(session_id = %id, "Close notice not delivered"),
            }
        }

        // Dropping the sender ends the client's stream
        self.inner.channels.write().remove(id);
        true
    }

    /// Close every session, e.g. on server shutdown
    pub async fn shutdown(&self) {
        let ids = self.inner.registry.ids();
        tracing::info!(sessions = ids.len(), "Closing all sessions");

        futures::future::join_all(
            ids.iter()
                .map(|id| self.close_session(id, CloseReason::Shutdown)),
        )
        .await;

        let snapshot = self.inner.metrics.snapshot();
        tracing::info!(
            total_requests = snapshot.total_requests,
            total_errors = snapshot.total_errors,
            uptime_secs = snapshot.uptime_secs,
            "Final request counters"
        );
        self.inner.metrics.reset();
    }

    /// Start closing sessions that stay idle past the configured timeout
    pub fn start_idle_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        self.inner.registry.start_idle_sweeper(
            self.inner.config.idle_timeout,
            self.inner.config.sweep_interval,
            move |id| {
                let dispatcher = dispatcher.clone();
                async move {
                    dispatcher.close_session(&id, CloseReason::Idle).await;
                }
            },
        )
    }

    // ========================================================================
    // Inbound Messages
    // ========================================================================

    /// Handle one raw message from a session's transport
    ///
    /// Tool calls are started in their own task; this returns as soon as
    /// the call is registered. Malformed messages are answered with an
    /// error and the session stays open.
    pub async fn handle_message(&self, id: &SessionId, raw: &str) -> Result<(), DispatchError> {
        if !self.inner.channels.read().contains_key(id) {
            return Err(DispatchError::SessionNotFound(id.to_string()));
        }
        let Some(state) = self.inner.registry.state(id) else {
            return Err(DispatchError::SessionNotFound(id.to_string()));
        };

        match decode(raw) {
            Ok(Incoming::Request(request)) => self.handle_request(id, state, request).await,
            Ok(Incoming::Notification(notification)) => {
                self.handle_notification(id, notification);
            }
            Ok(Incoming::Response(response_id)) => {
                self.inner.registry.note_activity(id);
                tracing::debug!(session_id = %id, response_id = ?response_id, "Ignoring client response");
            }
            Err(failure) => self.reject(id, failure.id, failure.error).await,
        }

        Ok(())
    }

    /// Answer a message the transport could not even hand over, e.g. an
    /// oversized line
    pub async fn reject_message(&self, id: &SessionId, error: JsonRpcError) {
        self.reject(id, None, error).await;
    }

    async fn reject(&self, id: &SessionId, request_id: Option<JsonRpcId>, error: JsonRpcError) {
        self.inner.registry.touch(id);
        self.inner.metrics.record_request_start(id);
        self.inner.metrics.record_request_end(id, false, 0);
        tracing::debug!(
            session_id = %id,
            code = error.code,
            error = %error.message,
            "Malformed message"
        );
        let error = protocol::tag_decode_error(error);
        self.send(id, &JsonRpcResponse::error(request_id, error)).await;
    }

    async fn handle_request(&self, id: &SessionId, state: SessionState, request: JsonRpcRequest) {
        let started = Instant::now();
        self.inner.registry.touch(id);
        self.inner.metrics.record_request_start(id);

        tracing::debug!(
            session_id = %id,
            request_id = %request.id,
            method = %request.method,
            "Request received"
        );

        // An id stays reserved until its tool call is terminal, whatever
        // method reuses it
        if self.inner.registry.is_pending(id, &request.id) {
            let error = ProtocolError::DuplicateRequestId(request.id.clone());
            tracing::debug!(session_id = %id, request_id = %request.id, error = %error, "Request rejected");
            self.inner
                .metrics
                .record_request_end(id, false, started.elapsed().as_millis() as u64);
            self.send(id, &JsonRpcResponse::error(Some(request.id), JsonRpcError::from(&error)))
                .await;
            return;
        }

        if request.method == methods::TOOLS_CALL {
            self.start_tool_call(id, request, started).await;
            return;
        }

        let outcome = self.handle_simple(id, state, &request);
        let success = outcome.is_ok();
        self.inner
            .metrics
            .record_request_end(id, success, started.elapsed().as_millis() as u64);

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(Some(request.id), result),
            Err(error) => JsonRpcResponse::error(Some(request.id), error),
        };
        self.send(id, &response).await;

        if request.method == methods::SHUTDOWN && success {
            // After the response, so the client sees it before the notice
            let dispatcher = self.clone();
            let id = *id;
            tokio::spawn(async move {
                dispatcher.close_session(&id, CloseReason::Client).await;
            });
        }
    }

    /// Everything except `tools/call`: answered inline
    fn handle_simple(
        &self,
        id: &SessionId,
        state: SessionState,
        request: &JsonRpcRequest,
    ) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            methods::INITIALIZE => {
                let requested = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(Value::as_str);
                let version = protocol::negotiate_version(requested);

                if !self.inner.registry.activate(id, version) {
                    return Err(JsonRpcError::from(&ProtocolError::SessionNotActive(state)));
                }
                Ok(protocol::initialize_result(version))
            }
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => {
                require_active(state)?;
                Ok(tool_definitions())
            }
            methods::SHUTDOWN => {
                if !state.is_open() {
                    return Err(JsonRpcError::from(&ProtocolError::SessionNotActive(state)));
                }
                Ok(json!({}))
            }
            other => Err(JsonRpcError::from(&ProtocolError::MethodNotFound(
                other.to_string(),
            ))),
        }
    }

    fn handle_notification(&self, id: &SessionId, notification: JsonRpcNotification) {
        self.inner.registry.note_activity(id);

        match notification.method.as_str() {
            methods::INITIALIZED => {
                tracing::debug!(session_id = %id, "Client initialized");
            }
            methods::CANCELLED => {
                let request_id = notification
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .cloned()
                    .and_then(|v| serde_json::from_value::<JsonRpcId>(v).ok());

                let Some(request_id) = request_id else {
                    tracing::debug!(session_id = %id, "Cancel notice without a usable requestId");
                    return;
                };

                if self.inner.registry.cancel_request(id, &request_id) {
                    self.inner.metrics.record_request_end(id, false, 0);
                    self.notify_drained(id);
                } else {
                    tracing::debug!(
                        session_id = %id,
                        request_id = %request_id,
                        "Cancel for a request that is not pending"
                    );
                }
            }
            other => {
                tracing::debug!(session_id = %id, method = other, "Ignoring notification");
            }
        }
    }

    // ========================================================================
    // Tool Calls
    // ========================================================================

    async fn start_tool_call(&self, id: &SessionId, request: JsonRpcRequest, started: Instant) {
        let tool = request
            .params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        // Registering first makes a duplicate id a protocol error before
        // anything else is looked at
        let resources = match self.inner.registry.begin_request(id, &request.id, &tool) {
            Ok(resources) => resources,
            Err(e) => {
                let error = match e {
                    RegistryError::DuplicateRequest(rid) => ProtocolError::DuplicateRequestId(rid),
                    RegistryError::NotActive {
                        state: SessionState::Connecting,
                        ..
                    } => ProtocolError::NotInitialized(SessionState::Connecting),
                    RegistryError::NotActive { state, .. } => ProtocolError::SessionNotActive(state),
                    RegistryError::NotFound(_) => ProtocolError::SessionNotActive(SessionState::Closed),
                };
                tracing::debug!(session_id = %id, request_id = %request.id, error = %error, "Tool call rejected");
                self.inner
                    .metrics
                    .record_request_end(id, false, started.elapsed().as_millis() as u64);
                self.send(id, &JsonRpcResponse::error(Some(request.id), JsonRpcError::from(&error)))
                    .await;
                return;
            }
        };

        let extract = parse_tool_call(request.params.as_ref())
            .map_err(|e| JsonRpcError::from(&e))
            .and_then(|call| {
                if !is_extract_tool(&call.name) {
                    return Err(JsonRpcError::from(&ProtocolError::UnknownTool(call.name)));
                }
                parse_extract_arguments(call.arguments.as_ref()).map_err(|e| JsonRpcError::from(&e))
            });

        let extract = match extract {
            Ok(extract) => extract,
            Err(error) => {
                self.complete(id, &request.id, Err(error), started).await;
                return;
            }
        };

        tracing::info!(
            session_id = %id,
            request_id = %request.id,
            source = %extract.source,
            pages = %extract.pages,
            "Starting extraction"
        );

        let dispatcher = self.clone();
        let session_id = *id;
        let request_id = request.id.clone();
        let task = tokio::spawn(async move {
            let outcome = dispatcher
                .inner
                .pipeline
                .extract(&extract, &resources)
                .await
                .map(|result| tool_result(&result))
                .map_err(|e| JsonRpcError::from(&e));
            dispatcher
                .complete(&session_id, &request_id, outcome, started)
                .await;
        });

        self.inner
            .registry
            .attach_abort(id, &request.id, task.abort_handle());
    }

    /// Deliver the terminal response of a tool call, at most once
    async fn complete(
        &self,
        id: &SessionId,
        request_id: &JsonRpcId,
        outcome: Result<Value, JsonRpcError>,
        started: Instant,
    ) {
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // Room in the outbound buffer comes first: the request counts as in
        // flight, and holds off a draining close, until its result is queued
        let channel = self.channel(id);
        let permit = match &channel {
            Some(channel) => channel.tx.reserve().await.ok(),
            None => None,
        };
        let outbound = channel.as_ref().map(|c| c.outbound.lock());

        if self.inner.registry.finish_request(id, request_id).is_none() {
            tracing::debug!(
                session_id = %id,
                request_id = %request_id,
                "Request no longer pending, dropping its result"
            );
            return;
        }

        self.inner
            .metrics
            .record_request_end(id, outcome.is_ok(), elapsed_ms);

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(Some(request_id.clone()), result),
            Err(error) => {
                tracing::debug!(
                    session_id = %id,
                    request_id = %request_id,
                    code = error.code,
                    error = %error.message,
                    "Tool call failed"
                );
                JsonRpcResponse::error(Some(request_id.clone()), error)
            }
        };

        match (permit, serde_json::to_value(&response)) {
            (Some(permit), Ok(value)) => permit.send(value),
            (None, _) => {
                tracing::debug!(session_id = %id, "Client stream closed, dropping outbound message");
            }
            (_, Err(e)) => {
                tracing::error!(session_id = %id, error = %e, "Failed to serialize outbound message");
            }
        }
        drop(outbound);

        if let Some(channel) = channel {
            channel.drained.notify_waiters();
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    fn channel(&self, id: &SessionId) -> Option<SessionChannel> {
        self.inner.channels.read().get(id).cloned()
    }

    fn sender(&self, id: &SessionId) -> Option<mpsc::Sender<Value>> {
        self.inner.channels.read().get(id).map(|c| c.tx.clone())
    }

    fn notify_drained(&self, id: &SessionId) {
        if let Some(channel) = self.inner.channels.read().get(id) {
            channel.drained.notify_waiters();
        }
    }

    async fn send<T: serde::Serialize>(&self, id: &SessionId, message: &T) {
        let Some(tx) = self.sender(id) else {
            tracing::debug!(session_id = %id, "Session gone, dropping outbound message");
            return;
        };

        match serde_json::to_value(message) {
            Ok(value) => {
                if tx.send(value).await.is_err() {
                    tracing::debug!(session_id = %id, "Client stream closed, dropping outbound message");
                }
            }
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Failed to serialize outbound message");
            }
        }
    }
}

fn require_active(state: SessionState) -> Result<(), JsonRpcError> {
    match state {
        SessionState::Active => Ok(()),
        SessionState::Connecting => Err(JsonRpcError::from(&ProtocolError::NotInitialized(state))),
        other => Err(JsonRpcError::from(&ProtocolError::SessionNotActive(other))),
    }
}

// ============================================================================
// Tests
// ============================================================================
