use serde::{Deserialize, Serialize};

/// Bookkeeping for one shard (or, when aggregated, the whole cache): entry
/// count plus the bytes occupied by keys and values.
///
/// The counters are adjusted before the owning shard releases its lock, so
/// within one shard they always equal the exact sums over present records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub count: u64,
    pub key_bytes: u64,
    pub value_bytes: u64,
}

impl Status {
    pub fn new() -> Status {
        Status::default()
    }

    /// Records one inserted entry.
    pub fn add_entry(&mut self, key: &[u8], value: &[u8]) {
        self.count += 1;
        self.key_bytes += key.len() as u64;
        self.value_bytes += value.len() as u64;
    }

    /// Forgets one removed entry.
    pub fn sub_entry(&mut self, key: &[u8], value: &[u8]) {
        self.count -= 1;
        self.key_bytes -= key.len() as u64;
        self.value_bytes -= value.len() as u64;
    }

    /// Total bytes occupied by keys and values together.
    pub fn entry_size(&self) -> u64 {
        self.key_bytes + self.value_bytes
    }

    /// Folds another status into this one. Used when summing shards.
    pub fn merge(&mut self, other: &Status) {
        self.count += other.count;
        self.key_bytes += other.key_bytes;
        self.value_bytes += other.value_bytes;
    }
}
