use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::error::{CacheError, Result};

/// Tunables of the cache engine. One instance is shared by every shard, and a
/// copy rides along in each dump file so a snapshot is self-describing.
///
/// `max_entry_size` is kept in bytes; the CLI converts from human-readable
/// units. The ceiling applies to the whole cache and is enforced per shard as
/// `max_entry_size / shard_count`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Ceiling for `key_bytes + value_bytes` across the whole cache.
    pub max_entry_size: u64,
    /// Most entries one shard may drop in a single gc pass.
    pub max_gc_per_cycle: usize,
    /// Minutes between background gc passes.
    pub gc_interval_mins: u64,
    /// Snapshot destination.
    pub dump_file: PathBuf,
    /// Minutes between background snapshots.
    pub dump_interval_mins: u64,
    /// Initial capacity of each shard's map.
    pub shard_map_capacity: usize,
    /// Number of shards; must be a power of two so the placement digest can
    /// be masked instead of divided.
    pub shard_count: usize,
    /// Microseconds slept between checks while a snapshot quiesces mutators.
    pub cas_sleep_micros: u64,
}

impl Default for CacheOptions {
    fn default() -> CacheOptions {
        CacheOptions {
            max_entry_size: 4 << 30,
            max_gc_per_cycle: 1000,
            gc_interval_mins: 60,
            dump_file: PathBuf::from("rcache.dump"),
            dump_interval_mins: 30,
            shard_map_capacity: 256,
            shard_count: 256,
            cas_sleep_micros: 1000,
        }
    }
}

impl CacheOptions {
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 || !self.shard_count.is_power_of_two() {
            return Err(CacheError::InvalidOptions(format!(
                "shard_count must be a power of two, got {}",
                self.shard_count
            )));
        }
        Ok(())
    }

    /// The slice of the global ceiling one shard is allowed to use.
    pub fn shard_capacity(&self) -> u64 {
        self.max_entry_size / self.shard_count as u64
    }
}
