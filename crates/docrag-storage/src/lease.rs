//! In-memory lease bookkeeping shared by the queue implementations.
//!
//! Leases are not persisted: after a restart every stored message is
//! visible again.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use ulid::Ulid;

use crate::error::StorageError;
use crate::queue::Lease;

#[derive(Debug, Clone)]
struct LeaseState {
    receipt: String,
    expires_at: Instant,
}

#[derive(Debug)]
pub(crate) struct LeaseTable {
    visibility_timeout: Duration,
    leases: HashMap<u64, LeaseState>,
}

impl LeaseTable {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            leases: HashMap::new(),
        }
    }

    pub fn is_visible(&self, sequence: u64, now: Instant) -> bool {
        self.leases
            .get(&sequence)
            .map_or(true, |state| state.expires_at <= now)
    }

    /// Issue a fresh lease, replacing any expired one.
    pub fn grant(&mut self, sequence: u64, now: Instant) -> Lease {
        let receipt = Ulid::new().to_string();
        self.leases.insert(
            sequence,
            LeaseState {
                receipt: receipt.clone(),
                expires_at: now + self.visibility_timeout,
            },
        );
        Lease { sequence, receipt }
    }

    /// The lease is current if no later delivery replaced it. An expired
    /// lease that was never re-granted is still accepted.
    pub fn check(&self, lease: &Lease) -> Result<(), StorageError> {
        match self.leases.get(&lease.sequence) {
            Some(state) if state.receipt == lease.receipt => Ok(()),
            _ => Err(StorageError::LeaseLost(lease.sequence)),
        }
    }

    pub fn release(&mut self, sequence: u64) {
        self.leases.remove(&sequence);
    }

    pub fn in_flight(&self, now: Instant) -> usize {
        self.leases.values().filter(|s| s.expires_at > now).count()
    }

    /// Earliest future expiry, when an invisible message comes back.
    pub fn next_expiry(&self, now: Instant) -> Option<Instant> {
        self.leases
            .values()
            .map(|s| s.expires_at)
            .filter(|t| *t > now)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_hides_until_expiry() {
        let mut table = LeaseTable::new(Duration::from_secs(30));
        let now = Instant::now();
        assert!(table.is_visible(1, now));

        table.grant(1, now);
        assert!(!table.is_visible(1, now + Duration::from_secs(29)));
        assert!(table.is_visible(1, now + Duration::from_secs(30)));
    }

    #[test]
    fn test_regrant_invalidates_old_receipt() {
        let mut table = LeaseTable::new(Duration::from_secs(1));
        let now = Instant::now();
        let first = table.grant(7, now);
        let second = table.grant(7, now + Duration::from_secs(2));

        assert!(matches!(table.check(&first), Err(StorageError::LeaseLost(7))));
        assert!(table.check(&second).is_ok());
    }

    #[test]
    fn test_expired_but_not_regranted_is_accepted() {
        let mut table = LeaseTable::new(Duration::from_millis(1));
        let now = Instant::now();
        let lease = table.grant(3, now);
        assert!(table.is_visible(3, now + Duration::from_secs(1)));
        assert!(table.check(&lease).is_ok());
        assert_eq!(table.in_flight(now + Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_next_expiry() {
        let mut table = LeaseTable::new(Duration::from_secs(10));
        let now = Instant::now();
        assert_eq!(table.next_expiry(now), None);
        table.grant(1, now);
        table.grant(2, now + Duration::from_secs(5));
        assert_eq!(table.next_expiry(now), Some(now + Duration::from_secs(10)));
    }
}
