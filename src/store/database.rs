//! Database
//!
//! In-memory map from key to `Record`. One lock serializes every read, local
//! write and remote merge across the whole key space; nothing is awaited while
//! it is held.

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::chunk::Chunk;
use super::clock::VectorClock;
use super::record::Record;
use crate::id::NodeId;
use crate::error::Result;

/// Replicated key-value database owned by one node
pub struct Database {
    /// This node's identity, used as the origin of local writes
    local_id: NodeId,
    /// Key -> record
    records: Mutex<HashMap<String, Record>>,
}

impl Database {
    /// Create an empty database for a node
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Snapshot of a key's record
    pub async fn get(&self, key: &str) -> Option<Record> {
        self.records.lock().await.get(key).cloned()
    }

    /// Append a local write to a key and return the new local version.
    ///
    /// A new key starts at version 1; later writes take the next version
    /// after this node's current counter for the key.
    pub async fn put(&self, key: &str, payload: impl Into<Vec<u8>>, write_time: DateTime<Utc>) -> u64 {
        let mut records = self.records.lock().await;
        match records.get_mut(key) {
            Some(record) => {
                let version = record.version(self.local_id) + 1;
                record.update(self.local_id, version, write_time, payload);
                version
            }
            None => {
                let clock = VectorClock::single(self.local_id, 1);
                let chunk = Chunk::new(self.local_id, 1, write_time, payload);
                records.insert(key.to_string(), Record::from_chunk(clock, chunk));
                1
            }
        }
    }

    /// Visit every entry, stopping at the first visitor error.
    ///
    /// Entries visited before the failure stay visited; the error is returned
    /// as-is.
    pub async fn range<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, &Record) -> Result<()>,
    {
        let records = self.records.lock().await;
        for (key, record) in records.iter() {
            visit(key, record)?;
        }
        Ok(())
    }

    /// Fold a remote snapshot of a key into the local record
    pub async fn merge(&self, key: &str, remote_clock: &VectorClock, remote_chunks: &[Chunk]) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(key) {
            return record.merge(remote_clock, remote_chunks);
        }

        let mut record = Record::default();
        record.merge(remote_clock, remote_chunks)?;
        if !record.is_empty() {
            records.insert(key.to_string(), record);
        }
        Ok(())
    }

    /// Number of keys held
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}
