//! Remote Clocks
//!
//! Per-peer, per-key high-water mark of what each peer has told us it holds.
//! The push loop uses it to send only the chunks a peer is missing. Entries
//! only ever grow; a stale acknowledgement arriving late cannot lower them.

use std::collections::HashMap;
use tokio::sync::Mutex;

use super::clock::VectorClock;
use crate::id::NodeId;

/// Acknowledged clocks, keyed by peer then by key
#[derive(Default)]
pub struct RemoteClocks {
    clocks: Mutex<HashMap<NodeId, HashMap<String, VectorClock>>>,
}

impl RemoteClocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last clock a peer acknowledged for a key
    pub async fn get(&self, peer: NodeId, key: &str) -> Option<VectorClock> {
        let clocks = self.clocks.lock().await;
        clocks.get(&peer).and_then(|keys| keys.get(key)).cloned()
    }

    /// Record an acknowledgement, merging with what is already known
    pub async fn accept(&self, peer: NodeId, key: &str, clock: VectorClock) {
        let mut clocks = self.clocks.lock().await;
        let keys = clocks.entry(peer).or_default();
        match keys.get_mut(key) {
            Some(existing) => *existing = existing.merge(&clock),
            None => {
                keys.insert(key.to_string(), clock);
            }
        }
    }

    /// Copy of every clock acknowledged by a peer
    pub async fn snapshot(&self, peer: NodeId) -> HashMap<String, VectorClock> {
        let clocks = self.clocks.lock().await;
        clocks.get(&peer).cloned().unwrap_or_default()
    }
}
