//! Firestore metrics collection.
//!
//! Request counters and latency histograms per operation, retry counters,
//! and conflict counters for the optimistic ledger transaction loop.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total Firestore requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "firestore_requests_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "firestore_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "firestore_latency_seconds";

    /// Conditional commits that lost to a concurrent writer, by collection.
    pub const TXN_CONFLICTS_TOTAL: &str = "firestore_txn_conflicts_total";

    /// Transactions abandoned after exhausting all attempts, by collection.
    pub const TXN_EXHAUSTED_TOTAL: &str = "firestore_txn_exhausted_total";
}

/// Record metrics for a completed Firestore request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    let status_str = status.to_string();

    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status_str
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a lost conditional commit (stale updateTime or create race).
pub fn record_txn_conflict(collection: &str) {
    counter!(
        names::TXN_CONFLICTS_TOTAL,
        "collection" => collection.to_string()
    )
    .increment(1);
}

/// Record a transaction that gave up after its last attempt.
pub fn record_txn_exhausted(collection: &str) {
    counter!(
        names::TXN_EXHAUSTED_TOTAL,
        "collection" => collection.to_string()
    )
    .increment(1);
}
