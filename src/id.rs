//! Node Identity
//!
//! Every process picks a random 64-bit node id at startup. The id is not
//! persisted: a restarted node joins the cluster as a brand-new writer, and
//! chunks written under its previous id stay attributed to that id.
//!
//! Peers are addressed by their configured `host:port`; the gossip client
//! derives a stable numeric id from that string to key its acknowledgement
//! cache.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Node identifier used as a vector clock key and chunk origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Generate a fresh random node id
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    /// Derive the id used to track what a configured peer has acknowledged.
    ///
    /// Two processes dialing the same address string agree on the id.
    pub fn from_peer_address(address: &str) -> Self {
        Self(crc32fast::hash(address.trim().as_bytes()) as u64)
    }

    /// Get the raw u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u64 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_is_stable() {
        let a = NodeId::from_peer_address("10.0.0.2:3100");
        let b = NodeId::from_peer_address("10.0.0.2:3100");
        let c = NodeId::from_peer_address("10.0.0.3:3100");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_peer_id_ignores_surrounding_whitespace() {
        assert_eq!(
            NodeId::from_peer_address(" node-2:3100 "),
            NodeId::from_peer_address("node-2:3100"),
        );
    }

    #[test]
    fn test_random_ids_differ() {
        // 64 random bits; a collision here means the generator is broken
        assert_ne!(NodeId::random(), NodeId::random());
    }

    #[test]
    fn test_conversions() {
        let id = NodeId::from(42u64);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(u64::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }
}
