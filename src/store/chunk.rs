//! Chunk
//!
//! An immutable fragment of a key's write history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// One write to a key, tagged with the writer's per-key version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    origin_node: NodeId,
    origin_version: u64,
    write_time: DateTime<Utc>,
    payload: Vec<u8>,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(
        origin_node: NodeId,
        origin_version: u64,
        write_time: DateTime<Utc>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            origin_node,
            origin_version,
            write_time,
            payload: payload.into(),
        }
    }

    /// Node that wrote this chunk
    pub fn origin_node(&self) -> NodeId {
        self.origin_node
    }

    /// Writer's per-key counter at write time
    pub fn origin_version(&self) -> u64 {
        self.origin_version
    }

    /// Wall-clock write time; orders chunks, never used for causality
    pub fn write_time(&self) -> DateTime<Utc> {
        self.write_time
    }

    /// Position of this chunk in a record: write time, then origin node and
    /// version, so every replica orders equal timestamps the same way
    pub fn order_key(&self) -> (DateTime<Utc>, NodeId, u64) {
        (self.write_time, self.origin_node, self.origin_version)
    }

    /// Write time as unix milliseconds, clamped at zero
    pub fn write_time_millis(&self) -> u64 {
        self.write_time.timestamp_millis().max(0) as u64
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}
