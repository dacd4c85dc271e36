//! Pending-result table.
//!
//! The reader loop files every `Result` frame here under its correlation id.
//! The session that issued the matching command claims it exactly once.
//! Results nobody claims, typically because the session timed out, are
//! evicted after a TTL by [`eviction_task`].

use crate::message::ResultMessage;
use crate::shutdown::Shutdown;
use crate::wire::{CorrelationId, ResultEnvelope};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PendingError {
    /// A result for this id is already waiting to be claimed.
    #[error("a result for correlation id {0} is already pending")]
    Duplicate(CorrelationId),
}

#[derive(Debug)]
struct PendingEntry {
    result: ResultMessage,
    received_at: Instant,
}

/// Counters for the table, readable while the bridge runs.
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Results inserted
    pub filed: AtomicU64,
    /// Results handed to a session
    pub claimed: AtomicU64,
    /// Inserts rejected because the id was still pending
    pub duplicates: AtomicU64,
    /// Results dropped by the TTL sweep or superseded by a resend of their id
    pub evicted: AtomicU64,
}

impl PendingStats {
    pub fn filed(&self) -> u64 {
        self.filed.load(Ordering::Relaxed)
    }

    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

/// Correlation id → result, filed by the reader and claimed by sessions.
#[derive(Debug, Default)]
pub struct PendingResults {
    entries: Mutex<HashMap<CorrelationId, PendingEntry>>,
    arrived: Notify,
    stats: PendingStats,
}

impl PendingResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a result and wake every waiter.
    ///
    /// At most one entry per id exists at a time: a second result for an id
    /// that has not been claimed yet is rejected and the first one is kept.
    pub fn file(&self, envelope: ResultEnvelope) -> Result<(), PendingError> {
        let ResultEnvelope { id, result } = envelope;
        {
            let mut entries = self.entries.lock();
            if entries.contains_key(&id) {
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                return Err(PendingError::Duplicate(id));
            }
            entries.insert(
                id,
                PendingEntry {
                    result,
                    received_at: Instant::now(),
                },
            );
        }
        self.stats.filed.fetch_add(1, Ordering::Relaxed);
        debug!(correlation_id = %id, "Filed result");
        self.arrived.notify_waiters();
        Ok(())
    }

    /// Remove and return the result for `id`, if it has arrived.
    pub fn take(&self, id: CorrelationId) -> Option<ResultMessage> {
        let entry = self.entries.lock().remove(&id)?;
        self.stats.claimed.fetch_add(1, Ordering::Relaxed);
        debug!(
            correlation_id = %id,
            waited_ms = entry.received_at.elapsed().as_millis() as u64,
            "Claimed result"
        );
        Some(entry.result)
    }

    /// Drop a result for `id` that arrived before its command was sent.
    ///
    /// Counted as evicted, not claimed. Returns whether anything was removed.
    pub fn discard(&self, id: CorrelationId) -> bool {
        let Some(entry) = self.entries.lock().remove(&id) else {
            return false;
        };
        self.stats.evicted.fetch_add(1, Ordering::Relaxed);
        warn!(
            correlation_id = %id,
            age_ms = entry.received_at.elapsed().as_millis() as u64,
            "Discarding stale result for an id about to be reused"
        );
        true
    }

    /// Wait until the result for `id` arrives and claim it.
    ///
    /// Wakes on every arrival and at least once per `poll`. Never returns on
    /// its own if the result never comes, so callers bound it with a timeout.
    /// Dropping the future leaves the table untouched.
    pub async fn wait_for(&self, id: CorrelationId, poll: Duration) -> ResultMessage {
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            // Register before checking so an arrival in between is not lost.
            notified.as_mut().enable();

            if let Some(result) = self.take(id) {
                return result;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// Drop entries older than `ttl`. Returns how many were removed.
    pub fn remove_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.lock().retain(|id, entry| {
            let age = now.duration_since(entry.received_at);
            if age >= ttl {
                warn!(
                    correlation_id = %id,
                    age_ms = age.as_millis() as u64,
                    "Evicting unclaimed result"
                );
                removed += 1;
                false
            } else {
                true
            }
        });

        self.stats
            .evicted
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

/// Periodically evict unclaimed results until shutdown.
pub async fn eviction_task(
    table: Arc<PendingResults>,
    ttl: Duration,
    every: Duration,
    mut shutdown: Shutdown,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let removed = table.remove_expired(ttl);
                if removed > 0 {
                    debug!(removed, "Evicted unclaimed results");
                }
            }
        }
    }
    debug!("Eviction task stopped");
}
