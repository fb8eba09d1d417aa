//! RocksDB-backed durable work queue.
//!
//! Messages and their receive counts survive restarts; leases do not, so
//! everything unacknowledged is redelivered after a restart.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::column_families::{build_cf_descriptors, CF_QUEUE_DEAD_LETTER, CF_QUEUE_MESSAGES};
use crate::error::StorageError;
use crate::keys::MessageKey;
use crate::lease::LeaseTable;
use crate::queue::{long_poll, DeadLetter, Delivery, Lease, QueueStats, StoredMessage, WorkQueue};

pub struct RocksQueue {
    db: DB,
    sequence: AtomicU64,
    leases: Mutex<LeaseTable>,
    notify: Notify,
}

impl RocksQueue {
    pub fn open(path: &Path, visibility_timeout: Duration) -> Result<Self, StorageError> {
        info!(path = ?path, "Opening queue");

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        let sequence = Self::load_sequence(&db)?;
        debug!(next_sequence = sequence, "Queue sequence restored");

        Ok(Self {
            db,
            sequence: AtomicU64::new(sequence),
            leases: Mutex::new(LeaseTable::new(visibility_timeout)),
            notify: Notify::new(),
        })
    }

    /// Next sequence: one past the highest key in either column family.
    fn load_sequence(db: &DB) -> Result<u64, StorageError> {
        let mut next = 0;
        for name in [CF_QUEUE_MESSAGES, CF_QUEUE_DEAD_LETTER] {
            let cf = db
                .cf_handle(name)
                .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))?;
            if let Some(item) = db.iterator_cf(cf, IteratorMode::End).next() {
                let (key, _) = item?;
                next = next.max(MessageKey::from_bytes(&key)?.sequence + 1);
            }
        }
        Ok(next)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn try_receive(&self, max: usize) -> Result<Vec<Delivery>, StorageError> {
        let now = Instant::now();
        let mut leases = self.leases.lock()?;
        let cf = self.cf(CF_QUEUE_MESSAGES)?;

        let mut batch = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            if batch.len() >= max {
                break;
            }
            let (key, value) = item?;
            let sequence = MessageKey::from_bytes(&key)?.sequence;
            if !leases.is_visible(sequence, now) {
                continue;
            }

            let mut stored: StoredMessage = bincode::deserialize(&value)?;
            stored.receive_count += 1;
            self.db.put_cf(cf, &key, bincode::serialize(&stored)?)?;

            let lease = leases.grant(sequence, now);
            debug!(sequence, receive_count = stored.receive_count, "Leased message");
            batch.push(Delivery {
                body: stored.body,
                lease,
                receive_count: stored.receive_count,
            });
        }

        Ok(batch)
    }

    fn next_expiry(&self) -> Result<Option<Instant>, StorageError> {
        Ok(self.leases.lock()?.next_expiry(Instant::now()))
    }

    fn count(&self, name: &str) -> Result<usize, StorageError> {
        Ok(self.db.iterator_cf(self.cf(name)?, IteratorMode::Start).count())
    }
}

#[async_trait]
impl WorkQueue for RocksQueue {
    async fn send(&self, body: Vec<u8>) -> Result<u64, StorageError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let stored = StoredMessage::new(body);

        self.db.put_cf(
            self.cf(CF_QUEUE_MESSAGES)?,
            MessageKey::new(sequence).to_bytes(),
            bincode::serialize(&stored)?,
        )?;
        self.notify.notify_waiters();

        debug!(sequence, "Enqueued message");
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
        let mut leases = self.leases.lock()?;
        leases.check(lease)?;

        self.db.delete_cf(
            self.cf(CF_QUEUE_MESSAGES)?,
            MessageKey::new(lease.sequence).to_bytes(),
        )?;
        leases.release(lease.sequence);

        debug!(sequence = lease.sequence, "Acknowledged message");
        Ok(())
    }

    async fn dead_letter(&self, lease: &Lease, reason: &str) -> Result<(), StorageError> {
        let mut leases = self.leases.lock()?;
        leases.check(lease)?;

        let messages = self.cf(CF_QUEUE_MESSAGES)?;
        let dead = self.cf(CF_QUEUE_DEAD_LETTER)?;
        let key = MessageKey::new(lease.sequence).to_bytes();

        let value = self
            .db
            .get_cf(messages, &key)?
            .ok_or(StorageError::LeaseLost(lease.sequence))?;
        let stored: StoredMessage = bincode::deserialize(&value)?;

        let record = DeadLetter {
            sequence: lease.sequence,
            body: stored.body,
            receive_count: stored.receive_count,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(dead, &key, bincode::serialize(&record)?);
        batch.delete_cf(messages, &key);
        self.db.write(batch)?;
        leases.release(lease.sequence);

        warn!(
            sequence = lease.sequence,
            receive_count = record.receive_count,
            reason,
            "Message dead-lettered"
        );
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats, StorageError> {
        let total = self.count(CF_QUEUE_MESSAGES)?;
        let in_flight = self.leases.lock()?.in_flight(Instant::now());
        Ok(QueueStats {
            ready: total.saturating_sub(in_flight),
            in_flight,
            dead_lettered: self.count(CF_QUEUE_DEAD_LETTER)?,
        })
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, StorageError> {
        let mut records = Vec::new();
        for item in self
            .db
            .iterator_cf(self.cf(CF_QUEUE_DEAD_LETTER)?, IteratorMode::Start)
            .take(limit)
        {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }
}
