//! Push-based observability.
//!
//! No HTTP server, no incoming requests: metrics are gathered in-process
//! and rendered on demand (e.g. for a periodic structured log line).

pub mod metrics;

pub use metrics::Metrics;
