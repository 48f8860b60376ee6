//! Pending call table: the client-side bookkeeping that turns an
//! asynchronous reply queue into a per-call result.
//!
//! Flow:
//! 1. `register()` allocates a correlation id and a oneshot receiver
//! 2. the caller publishes the request carrying that id
//! 3. the reply processor hands each reply to `resolve()`
//! 4. the caller awaits the receiver, bounded by its deadline
//!
//! Every exit path removes the entry: resolution, `cancel()`, the sweeper
//! (`expire()`), or the caller dropping its [`PendingGuard`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::RpcError;
use crate::message::{CorrelationId, ReplyEnvelope};

/// What a pending call eventually resolves to
pub type CallOutcome = std::result::Result<serde_json::Value, RpcError>;

/// One in-flight request
#[derive(Debug)]
struct PendingCall {
    service: String,
    pattern: String,
    created_at: Instant,
    deadline: Instant,
    result_tx: oneshot::Sender<CallOutcome>,
}

impl PendingCall {
    fn timeout_ms(&self) -> u64 {
        self.deadline.duration_since(self.created_at).as_millis() as u64
    }
}

/// Counters for monitoring
#[derive(Debug, Default)]
struct Counters {
    registered: AtomicU64,
    resolved: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    unmatched: AtomicU64,
}

/// Snapshot of the table's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PendingStats {
    pub in_flight: usize,
    pub registered: u64,
    pub resolved: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub unmatched: u64,
}

#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<CorrelationId, PendingCall>>,
    counters: Counters,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and get the receiver its outcome will arrive on.
    ///
    /// The returned id is unique among the calls currently in the table.
    pub fn register(
        &self,
        service: &str,
        pattern: &str,
        timeout: Duration,
    ) -> (CorrelationId, oneshot::Receiver<CallOutcome>) {
        let (result_tx, result_rx) = oneshot::channel();
        let now = Instant::now();

        let mut calls = self.calls.lock();
        let correlation_id = loop {
            let candidate = CorrelationId::new();
            if !calls.contains_key(&candidate) {
                break candidate;
            }
        };
        calls.insert(
            correlation_id,
            PendingCall {
                service: service.to_string(),
                pattern: pattern.to_string(),
                created_at: now,
                deadline: now + timeout,
                result_tx,
            },
        );
        drop(calls);

        self.counters.registered.fetch_add(1, Ordering::Relaxed);
        debug!(%correlation_id, service, pattern, "Registered pending call");

        (correlation_id, result_rx)
    }

    /// Hand a reply to the call it answers.
    ///
    /// Returns false when no call is waiting for the id: the call already
    /// timed out, was cancelled, or this is a duplicate delivery. Such replies
    /// are dropped and never touch other entries.
    pub fn resolve(&self, reply: ReplyEnvelope) -> bool {
        let correlation_id = reply.correlation_id;
        let Some(call) = self.calls.lock().remove(&correlation_id) else {
            self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
            warn!(%correlation_id, "Dropping reply for unknown, expired or already resolved call");
            return false;
        };

        let outcome = reply.into_outcome(&call.pattern);
        debug!(
            %correlation_id,
            service = call.service,
            pattern = call.pattern,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            "Resolved pending call"
        );
        if call.result_tx.send(outcome).is_err() {
            debug!(%correlation_id, "Caller went away before its reply arrived");
        }
        self.counters.resolved.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove a call without resolving it; the caller observes `Cancelled`
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        let removed = self.calls.lock().remove(correlation_id).is_some();
        if removed {
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(%correlation_id, "Cancelled pending call");
        }
        removed
    }

    /// Resolve every call whose deadline has passed with `Timeout`.
    ///
    /// Returns the number of calls purged.
    pub fn expire(&self, now: Instant) -> usize {
        let expired: Vec<(CorrelationId, PendingCall)> = {
            let mut calls = self.calls.lock();
            let overdue: Vec<CorrelationId> = calls
                .iter()
                .filter(|(_, call)| call.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            overdue
                .into_iter()
                .filter_map(|id| calls.remove(&id).map(|call| (id, call)))
                .collect()
        };

        let count = expired.len();
        for (correlation_id, call) in expired {
            let timeout_ms = call.timeout_ms();
            warn!(
                %correlation_id,
                service = call.service,
                pattern = call.pattern,
                timeout_ms,
                "Expired pending call"
            );
            let _ = call.result_tx.send(Err(RpcError::Timeout { timeout_ms }));
        }
        self.counters
            .timed_out
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Purge a single call that hit its deadline on the caller's side
    pub(crate) fn time_out(&self, correlation_id: &CorrelationId) -> bool {
        let removed = self.calls.lock().remove(correlation_id).is_some();
        if removed {
            self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.calls.lock().contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub fn stats(&self) -> PendingStats {
        PendingStats {
            in_flight: self.len(),
            registered: self.counters.registered.load(Ordering::Relaxed),
            resolved: self.counters.resolved.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            unmatched: self.counters.unmatched.load(Ordering::Relaxed),
        }
    }

    /// Guard that cancels the call when dropped
    pub fn guard(&self, correlation_id: CorrelationId) -> PendingGuard<'_> {
        PendingGuard {
            calls: self,
            correlation_id,
        }
    }
}

/// Removes its call from the table on drop.
///
/// Held across the caller's await so that an aborted inbound request
/// (its future dropped) does not leave an entry behind.
#[derive(Debug)]
pub struct PendingGuard<'a> {
    calls: &'a PendingCalls,
    correlation_id: CorrelationId,
}

impl PendingGuard<'_> {
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.calls.cancel(&self.correlation_id);
    }
}
