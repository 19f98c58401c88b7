use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::{CacheError, Result};
use super::options::CacheOptions;
use super::status::Status;
use super::timer::Timer;
use super::value::Record;

/// Map and counters of one shard. Kept separate from [`Shard`] so a snapshot
/// can serialize it directly while the runtime state (lock, options, timer)
/// is rebuilt on recovery.
#[derive(Serialize, Deserialize)]
pub(crate) struct ShardInner {
    pub(crate) data: HashMap<Vec<u8>, Record>,
    pub(crate) status: Status,
}

impl ShardInner {
    fn with_capacity(capacity: usize) -> ShardInner {
        ShardInner {
            data: HashMap::with_capacity(capacity),
            status: Status::new(),
        }
    }
}

/// One lock-protected partition of the cache.
///
/// Readers share the lock; `Record::visit` refreshes last-access atomically
/// so `get` never has to upgrade to a writer for a live entry.
pub(crate) struct Shard {
    inner: RwLock<ShardInner>,
    options: Arc<CacheOptions>,
    timer: Arc<dyn Timer>,
}

impl Shard {
    pub(crate) fn new(options: Arc<CacheOptions>, timer: Arc<dyn Timer>) -> Shard {
        let capacity = options.shard_map_capacity;
        Shard {
            inner: RwLock::new(ShardInner::with_capacity(capacity)),
            options,
            timer,
        }
    }

    /// Rebuilds a shard around state decoded from a dump.
    pub(crate) fn from_inner(
        inner: ShardInner,
        options: Arc<CacheOptions>,
        timer: Arc<dyn Timer>,
    ) -> Shard {
        Shard {
            inner: RwLock::new(inner),
            options,
            timer,
        }
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Bytes> {
        let now = self.timer.timestamp();
        {
            let inner = self.inner.read();
            match inner.data.get(key) {
                Some(record) if record.alive(now) => return Some(record.visit(now)),
                Some(_) => {}
                None => return None,
            }
        }

        // The entry was present but expired. Retake the lock as a writer and
        // recheck: a concurrent set may have replaced it in the meantime.
        let mut guard = self.inner.write();
        let ShardInner { data, status } = &mut *guard;
        let expired = data.get(key).map(|record| !record.alive(now)).unwrap_or(false);
        if expired {
            if let Some((stored_key, record)) = data.remove_entry(key) {
                status.sub_entry(&stored_key, record.data());
            }
        }
        None
    }

    pub(crate) fn set(&self, key: &[u8], value: &[u8], ttl: u64) -> Result<()> {
        let now = self.timer.timestamp();
        let capacity = self.options.shard_capacity();

        let mut guard = self.inner.write();
        let ShardInner { data, status } = &mut *guard;

        // Forget the old entry's footprint first so replacing a value with an
        // equal-or-smaller one always succeeds.
        if let Some(old) = data.get(key) {
            status.sub_entry(key, old.data());
        }

        if status.entry_size() + (key.len() + value.len()) as u64 > capacity {
            if let Some(old) = data.get(key) {
                status.add_entry(key, old.data());
            }
            return Err(CacheError::EntryTooLarge);
        }

        status.add_entry(key, value);
        data.insert(
            key.to_vec(),
            Record::new(Bytes::copy_from_slice(value), ttl, now),
        );
        Ok(())
    }

    pub(crate) fn delete(&self, key: &[u8]) {
        let mut guard = self.inner.write();
        let ShardInner { data, status } = &mut *guard;
        if let Some((stored_key, record)) = data.remove_entry(key) {
            status.sub_entry(&stored_key, record.data());
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.inner.read().status
    }

    /// Drops expired entries, at most `max_gc_per_cycle` per pass. Map order
    /// is unspecified; entries missed this cycle go on the next one.
    pub(crate) fn gc(&self) -> usize {
        let now = self.timer.timestamp();
        let mut guard = self.inner.write();
        let ShardInner { data, status } = &mut *guard;

        let mut expired: Vec<Vec<u8>> = Vec::new();
        for (key, record) in data.iter() {
            if !record.alive(now) {
                expired.push(key.clone());
                if expired.len() >= self.options.max_gc_per_cycle {
                    break;
                }
            }
        }

        for key in &expired {
            if let Some((stored_key, record)) = data.remove_entry(&key[..]) {
                status.sub_entry(&stored_key, record.data());
            }
        }
        expired.len()
    }

    /// Read access for the snapshot codec. Callers must only hold this while
    /// mutators are quiesced by the dumping flag.
    pub(crate) fn read_inner(&self) -> parking_lot::RwLockReadGuard<'_, ShardInner> {
        self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::timer::mock::MockTimer;

    fn shard_with(max_entry_size: u64, timer: Arc<MockTimer>) -> Shard {
        let options = Arc::new(CacheOptions {
            max_entry_size,
            shard_count: 1,
            ..CacheOptions::default()
        });
        Shard::new(options, timer)
    }

    fn counters_match(shard: &Shard) {
        let inner = shard.read_inner();
        let mut expected = Status::new();
        for (key, record) in inner.data.iter() {
            expected.add_entry(key, record.data());
        }
        assert_eq!(inner.status, expected);
    }

    #[test]
    fn set_get_round_trip() {
        let timer = Arc::new(MockTimer::new());
        let shard = shard_with(1 << 30, timer);

        shard.set(b"foo", b"bar", 0).unwrap();
        assert_eq!(shard.get(b"foo"), Some(Bytes::from_static(b"bar")));
        assert_eq!(shard.get(b"missing"), None);

        let status = shard.status();
        assert_eq!(status.count, 1);
        assert_eq!(status.key_bytes, 3);
        assert_eq!(status.value_bytes, 3);
        counters_match(&shard);
    }

    #[test]
    fn capacity_rejection_leaves_state_untouched() {
        let timer = Arc::new(MockTimer::new());
        // One byte of capacity in total.
        let shard = shard_with(1, timer);

        shard.set(b"a", b"", 0).unwrap();
        assert_eq!(shard.set(b"b", b"", 0), Err(CacheError::EntryTooLarge));
        assert_eq!(shard.get(b"b"), None);

        let status = shard.status();
        assert_eq!(status.count, 1);
        assert_eq!(status.key_bytes, 1);
        assert_eq!(status.value_bytes, 0);
        counters_match(&shard);
    }

    #[test]
    fn equal_size_replacement_fits_in_a_full_shard() {
        let timer = Arc::new(MockTimer::new());
        let shard = shard_with(6, timer);

        shard.set(b"foo", b"bar", 0).unwrap();
        shard.set(b"foo", b"baz", 0).unwrap();
        assert_eq!(shard.get(b"foo"), Some(Bytes::from_static(b"baz")));
        assert_eq!(shard.status().count, 1);
        counters_match(&shard);
    }

    #[test]
    fn oversized_replacement_keeps_the_old_value() {
        let timer = Arc::new(MockTimer::new());
        let shard = shard_with(6, timer);

        shard.set(b"foo", b"bar", 0).unwrap();
        assert_eq!(
            shard.set(b"foo", b"too big", 0),
            Err(CacheError::EntryTooLarge)
        );
        assert_eq!(shard.get(b"foo"), Some(Bytes::from_static(b"bar")));
        counters_match(&shard);
    }

    #[test]
    fn delete_is_idempotent() {
        let timer = Arc::new(MockTimer::new());
        let shard = shard_with(1 << 30, timer);

        shard.set(b"foo", b"bar", 0).unwrap();
        shard.delete(b"foo");
        shard.delete(b"foo");
        assert_eq!(shard.get(b"foo"), None);
        assert_eq!(shard.status(), Status::new());
    }

    #[test]
    fn expired_entry_is_removed_on_get() {
        let timer = Arc::new(MockTimer::new());
        let shard = shard_with(1 << 30, timer.clone());

        shard.set(b"k", b"v", 1).unwrap();
        assert_eq!(shard.get(b"k"), Some(Bytes::from_static(b"v")));

        timer.advance(2);
        assert_eq!(shard.get(b"k"), None);
        assert_eq!(shard.status().count, 0);
        counters_match(&shard);
    }

    #[test]
    fn reads_keep_an_idle_entry_alive() {
        let timer = Arc::new(MockTimer::new());
        let shard = shard_with(1 << 30, timer.clone());

        shard.set(b"k", b"v", 3).unwrap();
        for _ in 0..5 {
            timer.advance(2);
            assert_eq!(shard.get(b"k"), Some(Bytes::from_static(b"v")));
        }
    }

    #[test]
    fn gc_is_bounded_per_cycle() {
        let timer = Arc::new(MockTimer::new());
        let options = Arc::new(CacheOptions {
            max_gc_per_cycle: 2,
            shard_count: 1,
            ..CacheOptions::default()
        });
        let shard = Shard::new(options, timer.clone());

        for key in [b"a", b"b", b"c"] {
            shard.set(key, b"v", 1).unwrap();
        }
        timer.advance(2);

        assert_eq!(shard.gc(), 2);
        assert_eq!(shard.status().count, 1);
        assert_eq!(shard.gc(), 1);
        assert_eq!(shard.status().count, 0);
        counters_match(&shard);
    }

    #[test]
    fn gc_spares_live_entries() {
        let timer = Arc::new(MockTimer::new());
        let shard = shard_with(1 << 30, timer.clone());

        shard.set(b"old", b"v", 1).unwrap();
        shard.set(b"fresh", b"v", 0).unwrap();
        timer.advance(5);

        assert_eq!(shard.gc(), 1);
        assert_eq!(shard.get(b"fresh"), Some(Bytes::from_static(b"v")));
        assert_eq!(shard.get(b"old"), None);
    }
}
