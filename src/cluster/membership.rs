use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Read side of the cluster-membership transport.
///
/// The gossip layer that discovers peers is an external collaborator; the
/// core only ever asks it for the list of live member names (`host:port`)
/// and tolerates the answer changing between calls.
pub trait Membership: Send + Sync {
    fn members(&self) -> Vec<String>;
}

/// Membership backed by a static seed list plus this node itself.
///
/// Stands in for the gossip transport: the member set starts as
/// `seeds ∪ {self}` and can be replaced at any time through [`update`],
/// which is the hook a real transport drives asynchronously.
///
/// [`update`]: SeedMembership::update
pub struct SeedMembership {
    members: RwLock<BTreeSet<String>>,
}

impl SeedMembership {
    pub fn new(self_address: String, seeds: &[String]) -> SeedMembership {
        let mut members: BTreeSet<String> = seeds.iter().cloned().collect();
        members.insert(self_address);
        SeedMembership {
            members: RwLock::new(members),
        }
    }

    /// Replaces the member set. Callers observe the change on their next
    /// ring refresh at the latest.
    pub fn update(&self, members: Vec<String>) {
        *self.members.write() = members.into_iter().collect();
    }
}

impl Membership for SeedMembership {
    fn members(&self) -> Vec<String> {
        self.members.read().iter().cloned().collect()
    }
}
