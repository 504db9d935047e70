//! Metrics Aggregator
//!
//! Request and error counters shared by every session, plus process
//! resource sampling for the `/metrics` route.

mod aggregator;
mod resources;

pub use aggregator::{Metrics, MetricsSnapshot, SessionStats};
pub use resources::{ProcfsSampler, ResourceSampler, ResourceUsage};
