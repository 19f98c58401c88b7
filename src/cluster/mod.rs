pub mod membership;
pub mod node;
pub mod ring;

pub use membership::{Membership, SeedMembership};
pub use node::ClusterNode;
pub use ring::HashRing;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("cluster ring is empty")]
    EmptyRing,
}
