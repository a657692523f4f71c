//! Replication Protocol
//!
//! Defines the wire protocol spoken between nodes and clients.
//!
//! Every call is one connection. The first message selects the call; the
//! rest of the conversation follows that call's shape:
//!
//! - `PutRequest` -> `PutResponse`
//! - `GetRequest` -> `GetResponse`* `StreamEnd`
//! - `PublishRequest`* `PublishClose` -> `PublishResponse`
//! - `AckRequest` -> `AckResponse`* `StreamEnd`
//!
//! Any call may be answered with `Error` instead, which ends it.

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::store::{Chunk, VectorClock};

/// Protocol messages for node communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    // ========== Client Key-Value ==========
    /// Local write
    PutRequest {
        key: String,
        data: Vec<u8>,
    },

    /// Write accepted
    PutResponse {
        node_id: NodeId,
        version: u64,
    },

    /// Read every chunk of a key
    GetRequest {
        key: String,
    },

    /// One chunk of a key, in record order
    GetResponse {
        data: Vec<u8>,
        write_time_millis: u64,
        version: u64,
        node_id: NodeId,
    },

    // ========== Gossip Push ==========
    /// Chunks a peer is missing for one key, with the sender's clock
    PublishRequest {
        key: String,
        clock: VectorClock,
        chunks: Vec<Chunk>,
    },

    /// Sender finished publishing
    PublishClose,

    /// Publish stream merged
    PublishResponse,

    // ========== Gossip Pull ==========
    /// Ask a peer for its clock of every key
    AckRequest,

    /// A peer's clock for one key
    AckResponse {
        key: String,
        clock: VectorClock,
    },

    // ========== Stream Control ==========
    /// Server-side stream finished
    StreamEnd,

    /// Error response
    Error {
        code: ErrorCode,
        message: String,
    },
}

/// Error codes for protocol errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Key not found
    NotFound,
    /// Remote snapshot could not be merged
    CausalMerge,
    /// Malformed or unexpected message
    BadRequest,
    /// Internal error
    Internal,
}

impl Message {
    /// Serialize message to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Build an error reply from a local error
    pub fn error(err: &crate::Error) -> Self {
        Message::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Get the message type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::PutRequest { .. } => "PutRequest",
            Message::PutResponse { .. } => "PutResponse",
            Message::GetRequest { .. } => "GetRequest",
            Message::GetResponse { .. } => "GetResponse",
            Message::PublishRequest { .. } => "PublishRequest",
            Message::PublishClose => "PublishClose",
            Message::PublishResponse => "PublishResponse",
            Message::AckRequest => "AckRequest",
            Message::AckResponse { .. } => "AckResponse",
            Message::StreamEnd => "StreamEnd",
            Message::Error { .. } => "Error",
        }
    }
}

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Message length
    pub length: u32,
    /// Message checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Largest body accepted from the wire
    pub const MAX_BODY: usize = 64 * 1024 * 1024;

    /// Create a new frame header
    pub fn new(data: &[u8]) -> Self {
        Self {
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let [l0, l1, l2, l3, c0, c1, c2, c3] = *bytes;
        Self {
            length: u32::from_le_bytes([l0, l1, l2, l3]),
            checksum: u32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}
