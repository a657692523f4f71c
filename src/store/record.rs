//! Record
//!
//! The replicated state of one key: a vector clock plus every chunk this node
//! has accepted for the key, ordered by write time.

use chrono::{DateTime, Utc};

use super::chunk::Chunk;
use super::clock::{Causality, VectorClock};
use crate::id::NodeId;
use crate::error::{Error, Result};

/// Clock and chunk log for a single key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    clock: VectorClock,
    chunks: Vec<Chunk>,
}

impl Record {
    /// Create a record from a clock and an already-ordered chunk log
    pub fn new(clock: VectorClock, chunks: Vec<Chunk>) -> Self {
        Self { clock, chunks }
    }

    /// Create a record holding a single locally written chunk
    pub fn from_chunk(clock: VectorClock, chunk: Chunk) -> Self {
        Self::new(clock, vec![chunk])
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// This key's counter for a node
    pub fn version(&self, node: NodeId) -> u64 {
        self.clock.get(node)
    }

    /// True when the record holds neither history nor data
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.clock.is_empty()
    }

    /// Insert a locally written chunk and advance `node` to `version`.
    ///
    /// The chunk lands before the first chunk that orders after it; equal
    /// write times fall back to origin node, then version.
    pub fn update(&mut self, node: NodeId, version: u64, write_time: DateTime<Utc>, payload: impl Into<Vec<u8>>) {
        self.insert_ordered(Chunk::new(node, version, write_time, payload));
        self.clock.set(node, version);
    }

    /// Chunks whose `(origin, version)` is not covered by `other`
    pub fn chunks_since(&self, other: &VectorClock) -> Vec<Chunk> {
        self.chunks
            .iter()
            .filter(|c| c.origin_version() > other.get(c.origin_node()))
            .cloned()
            .collect()
    }

    /// Reconcile this record with a remote snapshot of the same key.
    ///
    /// Stale and identical snapshots are discarded, newer ones are adopted,
    /// and concurrent ones are interleaved by write time. Remote chunks
    /// already covered by the local clock are never re-added, which makes
    /// repeated merges of the same snapshot a no-op.
    pub fn merge(&mut self, remote_clock: &VectorClock, remote_chunks: &[Chunk]) -> Result<()> {
        validate_snapshot(remote_clock, remote_chunks)?;

        match self.clock.compare(remote_clock) {
            Causality::After | Causality::Equal => Ok(()),
            Causality::Before => {
                let mut incoming: Vec<&Chunk> = remote_chunks
                    .iter()
                    .filter(|c| self.is_new(c))
                    .collect();
                incoming.sort_by_key(|c| c.order_key());
                for chunk in incoming {
                    self.insert_ordered(chunk.clone());
                }
                self.clock = remote_clock.clone();
                Ok(())
            }
            Causality::Concurrent => {
                let mut remote: Vec<&Chunk> = remote_chunks.iter().collect();
                remote.sort_by_key(|c| c.order_key());

                let local = std::mem::take(&mut self.chunks);
                let mut merged = Vec::with_capacity(local.len() + remote.len());
                let mut local_iter = local.into_iter().peekable();
                let mut remote_iter = remote.into_iter().peekable();

                loop {
                    let take_local = match (local_iter.peek(), remote_iter.peek()) {
                        (Some(l), Some(r)) => l.order_key() <= r.order_key(),
                        (Some(_), None) => true,
                        (None, Some(_)) => false,
                        (None, None) => break,
                    };
                    if take_local {
                        merged.extend(local_iter.next());
                    } else if let Some(chunk) = remote_iter.next() {
                        if self.is_new(chunk) {
                            merged.push(chunk.clone());
                        }
                    }
                }

                self.chunks = merged;
                self.clock = self.clock.merge(remote_clock);
                Ok(())
            }
        }
    }

    /// True when the local clock has not yet seen this chunk
    fn is_new(&self, chunk: &Chunk) -> bool {
        chunk.origin_version() > self.clock.get(chunk.origin_node())
    }

    fn insert_ordered(&mut self, chunk: Chunk) {
        let pos = self
            .chunks
            .iter()
            .position(|c| c.order_key() > chunk.order_key())
            .unwrap_or(self.chunks.len());
        self.chunks.insert(pos, chunk);
    }
}

/// Reject snapshots carrying chunks their own clock does not account for
fn validate_snapshot(clock: &VectorClock, chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        let covered = clock.get(chunk.origin_node());
        if chunk.origin_version() == 0 || chunk.origin_version() > covered {
            return Err(Error::CausalMerge(format!(
                "chunk ({}, {}) is not covered by remote clock {}",
                chunk.origin_node(),
                chunk.origin_version(),
                clock
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const NODE: NodeId = NodeId(101);
    const OTHER: NodeId = NodeId(102);

    fn vc(entries: &[(NodeId, u64)]) -> VectorClock {
        entries.iter().copied().collect()
    }

    fn at(base: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        base + Duration::seconds(secs)
    }

    #[test]
    fn test_accept_new_chunks_into_empty_record() {
        let mut record = Record::default();
        let chunks = vec![Chunk::new(NODE, 1, Utc::now(), "test-data")];
        let clock = vc(&[(NODE, 1)]);

        record.merge(&clock, &chunks).unwrap();

        assert_eq!(record.chunks(), chunks.as_slice());
        assert_eq!(record.clock(), &clock);
    }

    #[test]
    fn test_merge_equal_clock_keeps_original_chunk() {
        let clock = vc(&[(NODE, 1)]);
        let chunks = vec![Chunk::new(NODE, 1, Utc::now(), "test-data")];
        let mut record = Record::new(clock.clone(), chunks.clone());

        record
            .merge(&clock, &[Chunk::new(NODE, 1, Utc::now(), "different-data")])
            .unwrap();

        assert_eq!(record.chunks(), chunks.as_slice());
        assert_eq!(record.clock().compare(&clock), Causality::Equal);
    }

    #[test]
    fn test_reject_outdated_snapshot() {
        let clock = vc(&[(NODE, 2)]);
        let now = Utc::now();
        let chunks = vec![
            Chunk::new(NODE, 1, now, "one"),
            Chunk::new(NODE, 2, at(now, 1), "two"),
        ];
        let mut record = Record::new(clock.clone(), chunks.clone());

        record
            .merge(&vc(&[(NODE, 1)]), &[Chunk::new(NODE, 1, now, "stale")])
            .unwrap();

        assert_eq!(record.chunks(), chunks.as_slice());
        assert_eq!(record.clock(), &clock);
    }

    #[test]
    fn test_merge_newer_data_from_same_node() {
        let now = Utc::now();
        let first = Chunk::new(NODE, 1, now, "test-data");
        let mut record = Record::from_chunk(vc(&[(NODE, 1)]), first.clone());

        let second = Chunk::new(NODE, 2, at(now, 1), "more-data");
        let new_clock = vc(&[(NODE, 2)]);
        record.merge(&new_clock, &[second.clone()]).unwrap();

        assert_eq!(record.chunks(), &[first, second]);
        assert_eq!(record.clock(), &new_clock);
    }

    #[test]
    fn test_merge_repeated_data_skips_known_chunks() {
        let now = Utc::now();
        let first = Chunk::new(NODE, 1, at(now, 1), "test-data");
        let mut record = Record::from_chunk(vc(&[(NODE, 1)]), first.clone());

        let second = Chunk::new(NODE, 2, at(now, 2), "more-data");
        let remote = vec![first.clone(), second.clone()];
        let new_clock = vc(&[(NODE, 2)]);
        record.merge(&new_clock, &remote).unwrap();

        assert_eq!(record.chunks(), remote.as_slice());
        assert_eq!(record.clock(), &new_clock);
    }

    #[test]
    fn test_merge_after_keeps_local_chunks_remote_lacked() {
        let now = Utc::now();
        let local = Chunk::new(NODE, 1, at(now, 1), "local");
        let mut record = Record::from_chunk(vc(&[(NODE, 1)]), local.clone());

        // Remote saw our chunk and added one of its own, but only sends the delta
        let remote_chunk = Chunk::new(OTHER, 1, at(now, 2), "remote");
        let remote_clock = vc(&[(NODE, 1), (OTHER, 1)]);
        record.merge(&remote_clock, &[remote_chunk.clone()]).unwrap();

        assert_eq!(record.chunks(), &[local, remote_chunk]);
        assert_eq!(record.clock(), &remote_clock);
    }

    #[test]
    fn test_merge_adopted_chunks_stay_time_ordered() {
        let now = Utc::now();
        let local = Chunk::new(NODE, 1, at(now, 5), "local");
        let mut record = Record::from_chunk(vc(&[(NODE, 1)]), local.clone());

        let earlier = Chunk::new(OTHER, 1, at(now, 1), "earlier");
        record
            .merge(&vc(&[(NODE, 1), (OTHER, 1)]), &[earlier.clone()])
            .unwrap();

        assert_eq!(record.chunks(), &[earlier, local]);
    }

    #[test]
    fn test_merge_concurrent_clocks_interleaves_by_write_time() {
        let now = Utc::now();
        let local = vec![
            Chunk::new(NODE, 1, at(now, 1), "test-data"),
            Chunk::new(NODE, 2, at(now, 3), "test-data-2"),
            Chunk::new(NODE, 3, at(now, 5), "test-data-3"),
        ];
        let mut record = Record::new(vc(&[(NODE, 3)]), local.clone());

        let remote = vec![
            Chunk::new(OTHER, 1, at(now, 2), "more-data"),
            Chunk::new(OTHER, 2, at(now, 4), "more-data-2"),
        ];
        record.merge(&vc(&[(OTHER, 2)]), &remote).unwrap();

        assert_eq!(record.clock(), &vc(&[(NODE, 3), (OTHER, 2)]));
        assert_eq!(
            record.chunks(),
            &[
                local[0].clone(),
                remote[0].clone(),
                local[1].clone(),
                remote[1].clone(),
                local[2].clone(),
            ]
        );
    }

    #[test]
    fn test_merge_concurrent_drops_subsumed_remote_chunks() {
        let now = Utc::now();
        let shared = Chunk::new(OTHER, 1, at(now, 1), "shared");
        let mine = Chunk::new(NODE, 1, at(now, 2), "mine");
        let mut record = Record::new(
            vc(&[(NODE, 1), (OTHER, 1)]),
            vec![shared.clone(), mine.clone()],
        );

        let theirs = Chunk::new(OTHER, 2, at(now, 3), "theirs");
        record
            .merge(&vc(&[(OTHER, 2)]), &[shared.clone(), theirs.clone()])
            .unwrap();

        assert_eq!(record.chunks(), &[shared, mine, theirs]);
        assert_eq!(record.clock(), &vc(&[(NODE, 1), (OTHER, 2)]));
    }

    #[test]
    fn test_merge_concurrent_tie_orders_the_same_on_both_sides() {
        let now = Utc::now();
        let mine = Chunk::new(OTHER, 1, now, "from-other");
        let theirs = Chunk::new(NODE, 1, now, "from-node");

        let mut here = Record::from_chunk(vc(&[(OTHER, 1)]), mine.clone());
        here.merge(&vc(&[(NODE, 1)]), &[theirs.clone()]).unwrap();

        let mut there = Record::from_chunk(vc(&[(NODE, 1)]), theirs.clone());
        there.merge(&vc(&[(OTHER, 1)]), &[mine.clone()]).unwrap();

        assert_eq!(here, there);
        assert_eq!(here.chunks(), &[theirs, mine]);
    }

    #[test]
    fn test_adopted_tie_matches_concurrent_tie() {
        let now = Utc::now();
        let a = Chunk::new(NODE, 1, now, "a");
        let b = Chunk::new(OTHER, 1, now, "b");
        let full = vc(&[(NODE, 1), (OTHER, 1)]);

        // Holds b, then adopts a newer snapshot that adds a
        let mut adopted = Record::from_chunk(vc(&[(OTHER, 1)]), b.clone());
        adopted.merge(&full, &[a.clone()]).unwrap();

        // Holds a, then merges b concurrently
        let mut merged = Record::from_chunk(vc(&[(NODE, 1)]), a.clone());
        merged.merge(&vc(&[(OTHER, 1)]), &[b.clone()]).unwrap();

        assert_eq!(adopted, merged);
        assert_eq!(adopted.chunks(), &[a, b]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let now = Utc::now();
        let mut record = Record::from_chunk(vc(&[(NODE, 1)]), Chunk::new(NODE, 1, now, "a"));
        let remote_clock = vc(&[(OTHER, 2)]);
        let remote = vec![
            Chunk::new(OTHER, 1, at(now, -1), "b"),
            Chunk::new(OTHER, 2, at(now, 1), "c"),
        ];

        record.merge(&remote_clock, &remote).unwrap();
        let once = record.clone();
        record.merge(&remote_clock, &remote).unwrap();

        assert_eq!(record, once);
        assert_eq!(record.chunks().len(), 3);
    }

    #[test]
    fn test_merge_rejects_inconsistent_snapshot() {
        let mut record = Record::default();
        let err = record
            .merge(&vc(&[(NODE, 1)]), &[Chunk::new(NODE, 2, Utc::now(), "x")])
            .unwrap_err();

        assert!(matches!(err, Error::CausalMerge(_)));
        assert!(record.is_empty());
    }

    #[test]
    fn test_update_keeps_write_time_order() {
        let now = Utc::now();
        let mut record = Record::from_chunk(vc(&[(NODE, 1)]), Chunk::new(NODE, 1, at(now, 10), "late"));

        record.update(NODE, 2, at(now, 5), "early");
        record.update(NODE, 3, at(now, 10), "same-time");

        let payloads: Vec<&[u8]> = record.chunks().iter().map(|c| c.payload()).collect();
        assert_eq!(payloads, vec![&b"early"[..], &b"late"[..], &b"same-time"[..]]);
        assert_eq!(record.version(NODE), 3);
    }

    #[test]
    fn test_chunks_since() {
        let now = Utc::now();
        let mut record = Record::default();
        record.update(NODE, 1, now, "a");
        record.update(NODE, 2, at(now, 1), "b");
        record.update(OTHER, 1, at(now, 2), "c");

        assert_eq!(record.chunks_since(&VectorClock::new()).len(), 3);

        let delta = record.chunks_since(&vc(&[(NODE, 1)]));
        let payloads: Vec<&[u8]> = delta.iter().map(|c| c.payload()).collect();
        assert_eq!(payloads, vec![&b"b"[..], &b"c"[..]]);

        assert!(record.chunks_since(record.clock()).is_empty());
    }
}
