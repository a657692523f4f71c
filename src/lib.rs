//! WolfKV - Eventually Consistent Replicated Key-Value Store
//!
//! Every node accepts writes for any key and keeps, per key, the full history
//! of chunks ever written, ordered by write time and tagged with a vector
//! clock. Nodes exchange what their peers are missing through gossip, so any
//! set of nodes that can reach each other converges to the same history.
//!
//! # Architecture
//!
//! - `store`: vector clocks, records and the causal merge, the in-memory
//!   database and the per-peer table of acknowledged clocks
//! - `replication`: the wire protocol, the service every node runs and the
//!   gossip client driving push and pull loops
//! - `network`: framed TCP (optionally TLS) calls
//! - `api`: HTTP access to the local database
//!
//! # Features
//!
//! - Writes accepted by every node, no leader
//! - Delta propagation based on per-peer acknowledgements
//! - Stable, write-time ordered merge of concurrent histories
//! - Optional TLS between nodes and clients

pub mod config;
pub mod error;
pub mod id;
pub mod store;
pub mod replication;
pub mod network;
pub mod api;

pub use config::WolfKvConfig;
pub use error::{Error, Result};
pub use id::NodeId;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfKvConfig;
    pub use crate::error::{Error, Result};
    pub use crate::id::NodeId;
    pub use crate::store::{Causality, Chunk, Database, Record, RemoteClocks, VectorClock};
    pub use crate::replication::{GossipClient, Message, ReplicaService};
    pub use crate::network::{NetworkClient, NetworkServer};
}
