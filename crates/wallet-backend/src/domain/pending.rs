//! Pending call table.
//!
//! Maps correlation IDs to callers waiting on a backend reply. Every entry
//! is removed exactly once: by its reply, by expiry, by a link failure or by
//! cancellation. Whichever path removes it owns the one-shot sender, so a
//! caller can never be completed twice.

use crate::domain::correlation::{CorrelationId, CorrelationIdGenerator};
use crate::domain::error::BridgeError;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use wallet_telemetry::{
    BACKEND_REPLIES, BACKEND_TIMEOUTS, PENDING_CALLS, REQUEST_DURATION, UNKNOWN_REPLIES,
};

/// What a waiting caller eventually receives.
pub type CallOutcome = Result<Value, BridgeError>;

struct PendingCall {
    sender: oneshot::Sender<CallOutcome>,
    created_at: Instant,
    operation: String,
    timeout: Duration,
}

/// Counters for the pending call table
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    /// Entries removed by `cancel` or whose caller stopped waiting
    pub total_cancelled: AtomicU64,
    /// Entries failed because the link dropped or the client shut down
    pub total_failed: AtomicU64,
    /// Replies that matched no entry
    pub total_unknown: AtomicU64,
}

/// Correlation table for in-flight backend calls.
///
/// Flow:
/// 1. The router calls `register()` and gets an ID and a receiver
/// 2. The router sends the command frame carrying that ID
/// 3. The receive loop calls `complete()` with the matching reply
/// 4. The sweeper calls `remove_expired()`, which completes overdue calls
///    with `BridgeError::Timeout`
pub struct PendingCallTable {
    pending: DashMap<CorrelationId, PendingCall>,
    ids: CorrelationIdGenerator,
    default_timeout: Duration,
    stats: Arc<PendingStats>,
}

impl PendingCallTable {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ids: CorrelationIdGenerator::new(),
            default_timeout,
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Register a call and get the receiver its outcome will arrive on.
    pub fn register(
        &self,
        operation: &str,
        timeout: Option<Duration>,
    ) -> (CorrelationId, oneshot::Receiver<CallOutcome>) {
        let correlation_id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();

        let call = PendingCall {
            sender: tx,
            created_at: Instant::now(),
            operation: operation.to_string(),
            timeout: timeout.unwrap_or(self.default_timeout),
        };

        self.pending.insert(correlation_id, call);
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        self.update_gauge();

        debug!(
            correlation_id = %correlation_id,
            operation = operation,
            "Registered pending call"
        );

        (correlation_id, rx)
    }

    /// Complete a pending call with its reply.
    ///
    /// Returns false when no call was pending under `correlation_id`: it was
    /// never issued, already answered, or already expired. Such replies are
    /// dropped.
    pub fn complete(&self, correlation_id: CorrelationId, outcome: CallOutcome) -> bool {
        let Some((_, call)) = self.pending.remove(&correlation_id) else {
            self.stats.total_unknown.fetch_add(1, Ordering::Relaxed);
            UNKNOWN_REPLIES.inc();
            warn!(
                correlation_id = %correlation_id,
                "Reply for unknown or already completed correlation ID"
            );
            return false;
        };
        self.update_gauge();

        let elapsed = call.created_at.elapsed();
        REQUEST_DURATION.observe(elapsed.as_secs_f64());
        let label = if outcome.is_ok() { "ok" } else { "error" };
        BACKEND_REPLIES.with_label_values(&[label]).inc();

        match call.sender.send(outcome) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    operation = call.operation,
                    outcome = label,
                    response_time_ms = elapsed.as_millis(),
                    "Completed pending call"
                );
            }
            Err(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    operation = call.operation,
                    "Caller stopped waiting before the reply arrived"
                );
            }
        }
        true
    }

    /// Complete every overdue call with `BridgeError::Timeout`.
    ///
    /// Returns the IDs of the calls that timed out.
    pub fn remove_expired(&self) -> Vec<CorrelationId> {
        let now = Instant::now();
        let overdue: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|entry| now.duration_since(entry.created_at) > entry.timeout)
            .map(|entry| *entry.key())
            .collect();

        let mut removed = Vec::new();
        for id in overdue {
            // Re-check under the shard lock: a reply may have raced us here.
            let Some((_, call)) = self
                .pending
                .remove_if(&id, |_, call| now.duration_since(call.created_at) > call.timeout)
            else {
                continue;
            };

            warn!(
                correlation_id = %id,
                operation = call.operation,
                timeout_ms = call.timeout.as_millis(),
                "Pending call timed out"
            );
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            BACKEND_TIMEOUTS.inc();
            let _ = call.sender.send(Err(BridgeError::Timeout {
                operation: call.operation,
                after: call.timeout,
            }));
            removed.push(id);
        }

        if !removed.is_empty() {
            self.update_gauge();
        }
        removed
    }

    /// Fail every outstanding call, e.g. when the link drops.
    ///
    /// Returns the IDs of the calls failed.
    pub fn fail_all(&self, error: BridgeError) -> Vec<CorrelationId> {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, call)) = self.pending.remove(&id) {
                let _ = call.sender.send(Err(error.clone()));
                failed.push(id);
            }
        }

        if !failed.is_empty() {
            self.stats.total_failed.fetch_add(failed.len() as u64, Ordering::Relaxed);
            self.update_gauge();
            debug!(failed = failed.len(), error = %error, "Failed outstanding calls");
        }
        failed
    }

    /// Drop a pending call without completing it. Its caller sees
    /// `BridgeError::Shutdown`.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            self.update_gauge();
            true
        } else {
            false
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn update_gauge(&self) {
        PENDING_CALLS.set(self.pending.len() as f64);
    }
}
