//! Process-wide request counters

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::session::SessionId;

/// Counters kept per session until it closes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub requests: u64,
    pub errors: u64,
    pub in_flight: u64,
    pub total_duration_ms: u64,
    pub last_duration_ms: Option<u64>,
}

/// Immutable point-in-time copy of every counter
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub in_flight: u64,
    pub sessions: HashMap<SessionId, SessionStats>,
}

/// Metrics Aggregator
///
/// Totals only grow; per-session entries disappear when their session
/// closes. A fresh [`MetricsSnapshot`] is built on every read.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Mutex<MetricsInner>>,
}

struct MetricsInner {
    started_at: DateTime<Utc>,
    started: Instant,
    total_requests: u64,
    total_errors: u64,
    in_flight: u64,
    sessions: HashMap<SessionId, SessionStats>,
}

impl MetricsInner {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            total_requests: 0,
            total_errors: 0,
            in_flight: 0,
            sessions: HashMap::new(),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsInner::new())),
        }
    }

    pub fn record_request_start(&self, session: &SessionId) {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;
        inner.in_flight += 1;

        let stats = inner.sessions.entry(*session).or_default();
        stats.requests += 1;
        stats.in_flight += 1;
    }

    pub fn record_request_end(&self, session: &SessionId, success: bool, duration_ms: u64) {
        let mut inner = self.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if !success {
            inner.total_errors += 1;
        }

        // The session may have closed while the request ran
        if let Some(stats) = inner.sessions.get_mut(session) {
            stats.in_flight = stats.in_flight.saturating_sub(1);
            stats.total_duration_ms += duration_ms;
            stats.last_duration_ms = Some(duration_ms);
            if !success {
                stats.errors += 1;
            }
        }
    }

    /// Forget a closed session's counters
    pub fn remove_session(&self, session: &SessionId) -> Option<SessionStats> {
        self.inner.lock().sessions.remove(session)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot {
            taken_at: Utc::now(),
            started_at: inner.started_at,
            uptime_secs: inner.started.elapsed().as_secs(),
            total_requests: inner.total_requests,
            total_errors: inner.total_errors,
            in_flight: inner.in_flight,
            sessions: inner.sessions.clone(),
        }
    }

    /// Start over from zero; used at shutdown and between test runs
    pub fn reset(&self) {
        *self.inner.lock() = MetricsInner::new();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
