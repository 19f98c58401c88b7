use fnv::FnvHasher;
use std::collections::BTreeMap;
use std::hash::Hasher;

/// Consistent-hash ring over the current member set.
///
/// Each member contributes `virtual_node_count` points, hashed from the label
/// `"{member}#{index}"`. Lookups walk clockwise to the first point at or past
/// the key's hash, wrapping to the smallest point. The point hash (FNV-1a 64)
/// and the label format are fixed per deployment so every node resolves the
/// same owner; the member-name format is `host:port`.
#[derive(Debug, Default)]
pub struct HashRing {
    virtual_node_count: usize,
    points: BTreeMap<u64, String>,
}

fn ring_hash(data: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(data);
    hasher.finish()
}

impl HashRing {
    pub fn new(virtual_node_count: usize) -> HashRing {
        HashRing {
            virtual_node_count,
            points: BTreeMap::new(),
        }
    }

    /// Replaces the whole ring with `members` in one step.
    pub fn set_members<S: AsRef<str>>(&mut self, members: &[S]) {
        let mut points = BTreeMap::new();
        for member in members {
            let member = member.as_ref();
            for index in 0..self.virtual_node_count {
                let label = format!("{}#{}", member, index);
                points.insert(ring_hash(label.as_bytes()), member.to_string());
            }
        }
        self.points = points;
    }

    /// The member owning `key`, or `None` on an empty ring.
    pub fn lookup(&self, key: &[u8]) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let hash = ring_hash(key);
        self.points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, member)| member.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}
