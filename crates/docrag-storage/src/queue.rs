//! Work queue trait and delivery types.
//!
//! Delivery is at least once. A received message stays in the queue under
//! a lease; if the lease is not acknowledged before it expires the message
//! becomes visible again and its receive count grows on the next delivery.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::StorageError;

/// Ownership of one delivered message until acknowledged or expired.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lease {
    pub sequence: u64,
    /// Unique per delivery; stale receipts are rejected
    pub receipt: String,
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub lease: Lease,
    /// Deliveries so far, including this one
    pub receive_count: u32,
}

/// A message parked after exhausting its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub sequence: u64,
    pub body: Vec<u8>,
    pub receive_count: u32,
    pub reason: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Visible and waiting for a consumer
    pub ready: usize,
    /// Leased and not yet acknowledged
    pub in_flight: usize,
    pub dead_lettered: usize,
}

/// Queue body as stored, with its delivery history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredMessage {
    pub body: Vec<u8>,
    pub receive_count: u32,
    pub enqueued_at_ms: i64,
}

impl StoredMessage {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            receive_count: 0,
            enqueued_at_ms: Utc::now().timestamp_millis(),
        }
    }
}

/// At-least-once work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a message, returning its sequence number.
    async fn send(&self, body: Vec<u8>) -> Result<u64, StorageError>;

    /// Lease up to `max` visible messages, waiting up to `wait` for the
    /// first one to appear. Returns an empty batch on timeout.
    ///
    /// Dropping the future abandons the wait without side effects.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>, StorageError>;

    /// Remove a leased message for good.
    async fn acknowledge(&self, lease: &Lease) -> Result<(), StorageError>;

    /// Move a leased message to the dead-letter store.
    async fn dead_letter(&self, lease: &Lease, reason: &str) -> Result<(), StorageError>;

    async fn stats(&self) -> Result<QueueStats, StorageError>;

    /// Oldest dead letters first.
    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, StorageError>;
}

/// Poll `try_receive` until it yields messages or `wait` elapses.
///
/// Sleeps until a send notifies `notify`, the earliest lease expires, or
/// the deadline passes, whichever comes first.
pub(crate) async fn long_poll<R, E>(
    notify: &Notify,
    wait: Duration,
    mut try_receive: R,
    mut next_expiry: E,
) -> Result<Vec<Delivery>, StorageError>
where
    R: FnMut() -> Result<Vec<Delivery>, StorageError>,
    E: FnMut() -> Result<Option<Instant>, StorageError>,
{
    let deadline = Instant::now() + wait;

    loop {
        // Registered before the check so a concurrent send cannot be missed
        let notified = notify.notified();

        let batch = try_receive()?;
        if !batch.is_empty() {
            return Ok(batch);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(batch);
        }

        let wake = match next_expiry()? {
            Some(expiry) => expiry.min(deadline),
            None => deadline,
        };

        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep_until(wake) => {}
        }
    }
}
