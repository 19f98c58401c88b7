use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::debug;

use super::membership::Membership;
use super::ring::HashRing;
use super::ClusterError;

/// This node's view of the cluster: its own address, the live member list,
/// and the consistent-hash ring built from it.
///
/// The ring is read-mostly. Rebuilds assemble a fresh ring outside the lock
/// and install it with an O(1) replace, so lookups racing an update see
/// either the old or the new ring; a stale answer costs one extra client hop.
pub struct ClusterNode {
    self_address: String,
    ring: RwLock<HashRing>,
    membership: Arc<dyn Membership>,
    update_interval: Duration,
    virtual_node_count: usize,
}

impl ClusterNode {
    /// Builds the node and performs the first ring update synchronously, so
    /// lookups work as soon as construction returns.
    pub fn new(
        self_address: String,
        virtual_node_count: usize,
        update_ring_interval_secs: u64,
        membership: Arc<dyn Membership>,
    ) -> Arc<ClusterNode> {
        let node = Arc::new(ClusterNode {
            self_address,
            ring: RwLock::new(HashRing::new(virtual_node_count)),
            membership,
            update_interval: Duration::from_secs(update_ring_interval_secs),
            virtual_node_count,
        });
        node.update_ring();
        node
    }

    /// Rebuilds the ring from the current member list.
    pub fn update_ring(&self) {
        let members = self.membership.members();
        let mut fresh = HashRing::new(self.virtual_node_count);
        fresh.set_members(&members);
        debug!(
            "ring updated with {} members ({} points)",
            members.len(),
            fresh.len()
        );
        *self.ring.write() = fresh;
    }

    /// Starts the periodic ring refresh. Runs for the life of the process.
    pub fn auto_update_ring(self: &Arc<Self>) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let start = Instant::now() + node.update_interval;
            let mut ticker = interval_at(start, node.update_interval);
            loop {
                ticker.tick().await;
                node.update_ring();
            }
        });
    }

    /// The member owning `key` under the current ring.
    pub fn owner_of(&self, key: &[u8]) -> Result<String, ClusterError> {
        self.ring
            .read()
            .lookup(key)
            .map(|owner| owner.to_string())
            .ok_or(ClusterError::EmptyRing)
    }

    pub fn is_self(&self, address: &str) -> bool {
        self.self_address == address
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    pub fn members(&self) -> Vec<String> {
        self.membership.members()
    }
}
