//! Correlation table: turns "response frame with id X arrived" into "the call
//! waiting on X returns".
//!
//! Flow:
//! 1. The caller registers a fresh correlation id and gets a [`PendingCall`].
//! 2. The caller writes the request.
//! 3. The connection reader calls [`CorrelationTable::fulfill`] per response.
//! 4. The caller awaits [`CorrelationTable::wait`] with its timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Result, RpcError};
use crate::protocol::Response;

/// Receiving half of a registered call.
#[derive(Debug)]
pub struct PendingCall {
    id: String,
    rx: oneshot::Receiver<Response>,
}

impl PendingCall {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Lifetime counters, shareable between tables.
#[derive(Debug, Default)]
pub struct CorrelationStats {
    registered: AtomicU64,
    fulfilled: AtomicU64,
    timed_out: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`CorrelationStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationSnapshot {
    pub registered: u64,
    pub fulfilled: u64,
    pub timed_out: u64,
    /// Responses nobody was waiting for, plus calls failed by connection loss.
    pub dropped: u64,
}

impl CorrelationStats {
    pub fn snapshot(&self) -> CorrelationSnapshot {
        CorrelationSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            fulfilled: self.fulfilled.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Pending calls keyed by correlation id.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: DashMap<String, oneshot::Sender<Response>>,
    stats: Arc<CorrelationStats>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that reports into shared counters.
    pub fn with_stats(stats: Arc<CorrelationStats>) -> Self {
        Self {
            pending: DashMap::new(),
            stats,
        }
    }

    /// Start tracking `id`.
    pub fn register(&self, id: impl Into<String>) -> Result<PendingCall> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => return Err(RpcError::DuplicateCorrelation(id)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        debug!(correlation_id = %id, "registered pending call");
        Ok(PendingCall { id, rx })
    }

    /// Wait for the response to `pending`.
    ///
    /// The entry is gone when this returns, whatever the outcome.
    pub async fn wait(&self, pending: PendingCall, timeout: Duration) -> Result<Response> {
        let PendingCall { id, rx } = pending;
        let outcome = tokio::time::timeout(timeout, rx).await;
        self.pending.remove(&id);

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RpcError::Connection(format!(
                "connection lost while call {id} was pending"
            ))),
            Err(_) => {
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %id, timeout_ms = timeout.as_millis(), "pending call timed out");
                Err(RpcError::Timeout(timeout))
            }
        }
    }

    /// Deliver `response` to the call waiting on `id`.
    ///
    /// Returns `false` when nobody is waiting (unknown id, already fulfilled,
    /// or the caller gave up); the response is dropped.
    pub fn fulfill(&self, id: &str, response: Response) -> bool {
        let Some((_, tx)) = self.pending.remove(id) else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(correlation_id = %id, "response for unknown or expired correlation id");
            return false;
        };

        if tx.send(response).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %id, "pending call receiver dropped");
            return false;
        }
        self.stats.fulfilled.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Stop tracking `id`. Idempotent.
    pub fn release(&self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Fail every pending call with a connection error. Returns how many
    /// calls were failed.
    pub fn fail_all(&self) -> usize {
        let mut failed = 0usize;
        self.pending.retain(|_, _| {
            failed += 1;
            false
        });
        self.stats
            .dropped
            .fetch_add(failed as u64, Ordering::Relaxed);
        failed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn stats(&self) -> CorrelationSnapshot {
        self.stats.snapshot()
    }
}
