//! Replication Module
//!
//! Anti-entropy between nodes. Every node serves its database to peers
//! (`ReplicaService`) and runs, for each configured peer, a push loop that
//! streams the chunks the peer has not acknowledged and a pull loop that
//! collects the peer's per-key clocks (`GossipClient`).

pub mod protocol;
mod gossip;
mod service;

pub use protocol::{ErrorCode, FrameHeader, Message};
pub use gossip::GossipClient;
pub use service::ReplicaService;

use std::time::Duration;

/// Configuration for the gossip loops
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Fixed interval between attempts of each loop, in milliseconds
    pub interval_ms: u64,
    /// Payload bytes carried by one publish message before a key's delta is
    /// split across several
    pub batch_bytes: usize,
}

impl GossipConfig {
    /// Interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            batch_bytes: FrameHeader::MAX_BODY / 2,
        }
    }
}
