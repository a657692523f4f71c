//! Vector Clock
//!
//! One logical counter per node. A missing entry reads as version 0, so
//! `{a: 1}` and `{a: 1, b: 0}` compare as equal.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Causal relationship between two clocks, from the left clock's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Causality {
    /// Left happened before right
    Before,
    /// Left happened after right
    After,
    /// Neither dominates
    Concurrent,
    /// Identical histories
    Equal,
}

impl std::fmt::Display for Causality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Causality::Before => write!(f, "BEFORE"),
            Causality::After => write!(f, "AFTER"),
            Causality::Concurrent => write!(f, "CONCURRENT"),
            Causality::Equal => write!(f, "EQUAL"),
        }
    }
}

/// Per-node version counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    entries: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    /// Create an empty clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock holding a single entry
    pub fn single(node: NodeId, version: u64) -> Self {
        let mut clock = Self::new();
        clock.set(node, version);
        clock
    }

    /// Version recorded for a node (0 if absent)
    pub fn get(&self, node: NodeId) -> u64 {
        self.entries.get(&node).copied().unwrap_or(0)
    }

    /// Advance a node's counter in place.
    ///
    /// Callers must pass a version no lower than the current one.
    pub fn set(&mut self, node: NodeId, version: u64) {
        debug_assert!(
            version >= self.get(node),
            "vector clock regression for node {}: {} -> {}",
            node,
            self.get(node),
            version
        );
        self.entries.insert(node, version);
    }

    /// Pointwise maximum over the union of node ids
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.entries.clone();
        for (&node, &version) in &other.entries {
            let entry = merged.entry(node).or_insert(0);
            *entry = (*entry).max(version);
        }
        Self { entries: merged }
    }

    /// Compare two clocks over the union of their node ids
    pub fn compare(&self, other: &Self) -> Causality {
        let mut self_ahead = false;
        let mut other_ahead = false;

        for (&node, &version) in &self.entries {
            let theirs = other.get(node);
            if version > theirs {
                self_ahead = true;
            } else if version < theirs {
                other_ahead = true;
            }
        }
        for (&node, &version) in &other.entries {
            if !self.entries.contains_key(&node) && version > 0 {
                other_ahead = true;
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::After,
            (false, true) => Causality::Before,
            (true, true) => Causality::Concurrent,
        }
    }

    /// True when no node has a non-zero counter
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|&v| v == 0)
    }

    /// Iterate `(node, version)` pairs in node order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, u64)> + '_ {
        self.entries.iter().map(|(&n, &v)| (n, v))
    }
}

impl FromIterator<(NodeId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (NodeId, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (node, version)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", node, version)?;
        }
        write!(f, "}}")
    }
}
