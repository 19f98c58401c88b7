use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// TTL value meaning the record never expires.
pub const NEVER_DIE: u64 = 0;

/// One stored entry: the payload plus its time-to-live and last-access stamp.
///
/// `created_at` is refreshed on every successful read, so expiry measures
/// idle time rather than age. The stamp is atomic so reads can refresh it
/// while holding only the shard's read lock.
#[derive(Debug, Serialize, Deserialize)]
pub struct Record {
    data: Bytes,
    ttl: u64,
    created_at: AtomicU64,
}

impl Record {
    pub fn new(data: Bytes, ttl: u64, now: u64) -> Record {
        Record {
            data,
            ttl,
            created_at: AtomicU64::new(now),
        }
    }

    /// A record is alive while its idle time is below the TTL.
    pub fn alive(&self, now: u64) -> bool {
        self.ttl == NEVER_DIE || now.saturating_sub(self.created_at.load(Ordering::Acquire)) < self.ttl
    }

    /// Refreshes the last-access stamp and hands out the payload.
    pub fn visit(&self, now: u64) -> Bytes {
        self.created_at.store(now, Ordering::Release);
        self.data.clone()
    }

    /// Payload without touching the access stamp. Used by bookkeeping.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    #[cfg(test)]
    pub(crate) fn created_at(&self) -> u64 {
        self.created_at.load(Ordering::Acquire)
    }
}
