//! Gossip Client
//!
//! For every configured peer, two independent loops run for the life of the
//! process:
//!
//! - push: each tick, open a Publish stream and send, per key, the chunks the
//!   peer has not acknowledged yet together with our clock for the key.
//! - pull: each tick, open an Ack stream and fold the peer's per-key clocks
//!   into `RemoteClocks`.
//!
//! A failed attempt is logged and retried on the next tick. The push loop
//! relies on the pull loop to learn what a peer holds; until an ack arrives
//! it keeps resending, which merges as a no-op on the peer.

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::GossipConfig;
use crate::id::NodeId;
use crate::network::NetworkClient;
use crate::store::{Chunk, Database, RemoteClocks, VectorClock};
use crate::error::{Error, Result};

/// Drives push and pull anti-entropy against configured peers
pub struct GossipClient {
    /// Local database
    database: Arc<Database>,
    /// What each peer has acknowledged
    remote_clocks: Arc<RemoteClocks>,
    /// Dialer
    network: Arc<NetworkClient>,
    /// Loop configuration
    config: GossipConfig,
}

impl GossipClient {
    /// Create a new gossip client
    pub fn new(database: Arc<Database>, network: Arc<NetworkClient>, config: GossipConfig) -> Self {
        Self {
            database,
            remote_clocks: Arc::new(RemoteClocks::new()),
            network,
            config,
        }
    }

    pub fn remote_clocks(&self) -> &Arc<RemoteClocks> {
        &self.remote_clocks
    }

    /// Spawn the push and pull loops for every peer
    pub fn spawn(self: &Arc<Self>, peers: &[String], shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(peers.len() * 2);
        for peer in peers {
            tracing::info!("Gossiping with {} every {}ms", peer, self.config.interval_ms);

            let client = Arc::clone(self);
            let address = peer.clone();
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                client.run_push_loop(&address, token).await;
            }));

            let client = Arc::clone(self);
            let address = peer.clone();
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                client.run_pull_loop(&address, token).await;
            }));
        }
        handles
    }

    /// Push deltas to a peer until cancelled
    pub async fn run_push_loop(&self, address: &str, shutdown: CancellationToken) {
        self.run_with_retry("publish", address, &shutdown, || self.push_once(address))
            .await;
    }

    /// Pull a peer's clocks until cancelled
    pub async fn run_pull_loop(&self, address: &str, shutdown: CancellationToken) {
        self.run_with_retry("ack", address, &shutdown, || self.pull_once(address))
            .await;
    }

    /// One push attempt; returns the number of messages sent
    pub async fn push_once(&self, address: &str) -> Result<usize> {
        let peer = NodeId::from_peer_address(address);
        let acknowledged = self.remote_clocks.snapshot(peer).await;

        let mut deltas: Vec<(String, Vec<(VectorClock, Vec<Chunk>)>)> = Vec::new();
        self.database
            .range(|key, record| {
                let acked = acknowledged.get(key);
                let chunks = match acked {
                    Some(clock) => record.chunks_since(clock),
                    None => record.chunks().to_vec(),
                };
                if !chunks.is_empty() {
                    let batches = split_delta(acked, record.clock(), chunks, self.config.batch_bytes);
                    deltas.push((key.to_string(), batches));
                }
                Ok(())
            })
            .await?;

        let mut stream = self.network.publish(address).await?;
        for (key, batches) in deltas {
            for (clock, chunks) in batches {
                match stream.send(key.clone(), clock, chunks).await {
                    Ok(()) => {}
                    Err(Error::FrameTooLarge(size)) => {
                        tracing::warn!(
                            "Not publishing the rest of {} to {}: {} byte message exceeds the frame limit",
                            key,
                            address,
                            size
                        );
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        stream.close().await
    }

    /// One pull attempt; returns the number of clocks received
    pub async fn pull_once(&self, address: &str) -> Result<usize> {
        let peer = NodeId::from_peer_address(address);
        let mut stream = self.network.ack(address).await?;

        let mut received = 0;
        while let Some((key, clock)) = stream.next().await? {
            self.remote_clocks.accept(peer, &key, clock).await;
            received += 1;
        }
        Ok(received)
    }

    async fn run_with_retry<F, Fut>(
        &self,
        stream: &'static str,
        address: &str,
        shutdown: &CancellationToken,
        mut attempt: F,
    ) where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<usize>>,
    {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tracing::trace!("Starting {} stream for {}", stream, address);
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = timeout(self.network.request_timeout(), attempt()) => {
                    result.unwrap_or_else(|_| Err(Error::ConnectionTimeout(address.to_string())))
                }
            };

            match result {
                Ok(count) => tracing::trace!("{} stream to {} finished ({} keys)", stream, address, count),
                Err(e) => tracing::warn!("Failed to stream {} with {}: {}", stream, address, e),
            }
        }

        tracing::debug!("{} loop for {} stopped", stream, address);
    }
}

/// Cut a key's delta into messages carrying at most `batch_bytes` of payload.
///
/// A delta that fits goes out whole with the record's clock. Otherwise
/// chunks are grouped by origin node in version order, and every message but
/// the last carries a clock covering only what was acknowledged or already
/// sent, so a peer adopting it never counts an unsent chunk as seen. The last
/// message carries the full clock.
fn split_delta(
    acked: Option<&VectorClock>,
    clock: &VectorClock,
    mut chunks: Vec<Chunk>,
    batch_bytes: usize,
) -> Vec<(VectorClock, Vec<Chunk>)> {
    let total: usize = chunks.iter().map(|c| c.payload().len()).sum();
    if total <= batch_bytes {
        return vec![(clock.clone(), chunks)];
    }
    chunks.sort_by_key(|c| (c.origin_node(), c.origin_version()));

    let mut covered: VectorClock = match acked {
        Some(acked) => clock
            .iter()
            .map(|(node, version)| (node, version.min(acked.get(node))))
            .collect(),
        None => VectorClock::new(),
    };

    let mut batches = Vec::new();
    let mut batch = Vec::new();
    let mut batch_size = 0;
    for chunk in chunks {
        let size = chunk.payload().len();
        if !batch.is_empty() && batch_size + size > batch_bytes {
            batches.push((covered.clone(), std::mem::take(&mut batch)));
            batch_size = 0;
        }
        covered.set(chunk.origin_node(), chunk.origin_version());
        batch_size += size;
        batch.push(chunk);
    }
    batches.push((clock.clone(), batch));
    batches
}
