//! Process-local work queue with the same lease semantics as
//! [`RocksQueue`](crate::RocksQueue). Contents are lost on drop.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

use crate::error::StorageError;
use crate::lease::LeaseTable;
use crate::queue::{long_poll, DeadLetter, Delivery, Lease, QueueStats, StoredMessage, WorkQueue};

struct Inner {
    next_sequence: u64,
    messages: BTreeMap<u64, StoredMessage>,
    dead: Vec<DeadLetter>,
    leases: LeaseTable,
}

pub struct InMemoryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_sequence: 0,
                messages: BTreeMap::new(),
                dead: Vec::new(),
                leases: LeaseTable::new(visibility_timeout),
            }),
            notify: Notify::new(),
        }
    }

    /// Forget every lease, as a restart of a durable queue would.
    pub fn expire_all_leases(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock()?;
        let sequences: Vec<u64> = inner.messages.keys().copied().collect();
        for sequence in sequences {
            inner.leases.release(sequence);
        }
        Ok(())
    }

    fn try_receive(&self, max: usize) -> Result<Vec<Delivery>, StorageError> {
        let now = Instant::now();
        let mut guard = self.inner.lock()?;
        let inner = &mut *guard;

        let mut batch = Vec::new();
        for (&sequence, stored) in inner.messages.iter_mut() {
            if batch.len() >= max {
                break;
            }
            if !inner.leases.is_visible(sequence, now) {
                continue;
            }
            stored.receive_count += 1;
            batch.push(Delivery {
                body: stored.body.clone(),
                lease: inner.leases.grant(sequence, now),
                receive_count: stored.receive_count,
            });
        }
        Ok(batch)
    }

    fn next_expiry(&self) -> Result<Option<Instant>, StorageError> {
        Ok(self.inner.lock()?.leases.next_expiry(Instant::now()))
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn send(&self, body: Vec<u8>) -> Result<u64, StorageError> {
        let sequence = {
            let mut inner = self.inner.lock()?;
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.messages.insert(sequence, StoredMessage::new(body));
            sequence
        };
        self.notify.notify_waiters();
        Ok(sequence)
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>, StorageError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        long_poll(
            &self.notify,
            wait,
            || self.try_receive(max),
            || self.next_expiry(),
        )
        .await
    }

    async fn acknowledge(&self, lease: &Lease) -> Result<(), StorageError> {
        let mut inner = self.inner.lock()?;
        inner.leases.check(lease)?;
        inner.messages.remove(&lease.sequence);
        inner.leases.release(lease.sequence);
        Ok(())
    }

    async fn dead_letter(&self, lease: &Lease, reason: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock()?;
        inner.leases.check(lease)?;
        let stored = inner
            .messages
            .remove(&lease.sequence)
            .ok_or(StorageError::LeaseLost(lease.sequence))?;
        inner.leases.release(lease.sequence);

        warn!(sequence = lease.sequence, reason, "Message dead-lettered");
        inner.dead.push(DeadLetter {
            sequence: lease.sequence,
            body: stored.body,
            receive_count: stored.receive_count,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats, StorageError> {
        let inner = self.inner.lock()?;
        let in_flight = inner.leases.in_flight(Instant::now());
        Ok(QueueStats {
            ready: inner.messages.len().saturating_sub(in_flight),
            in_flight,
            dead_lettered: inner.dead.len(),
        })
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, StorageError> {
        Ok(self.inner.lock()?.dead.iter().take(limit).cloned().collect())
    }
}
