//! Memoization caches for the recursive diagram operations.
//!
//! Two shapes, one per-operation-per-level instance each:
//!
//! - [`OpCache`]: fixed arity, keyed by one to three node indices.
//! - [`TupleCache`]: variable arity, keyed by an index tuple with or
//!   without a distinguished leading node index. Used by the N-ary
//!   operations (`apply`, `select`).
//!
//! Both are pure memoization structures: a fixed-size bucket array with
//! separate chaining, no eviction beyond a full [`clear`](OpCache::clear),
//! and no resizing. Staleness is the forest's responsibility — it flushes a
//! level's caches whenever compaction renumbers that level.
//!
//! A hit requires full key equality (arity, then pointwise index equality),
//! never hash equality alone. Bucket selection folds the key through the
//! pairing functions; only performance, not correctness, depends on it.

use std::cell::Cell;

use crate::types::NodeIdx;
use crate::utils::{pairing2, pairing3, pairing_seq};

/// Bucket count of every cache. Fixed; collisions chain.
pub const INIT_SIZE: usize = 1009;

/// Sentinel for an absent optional key component (distinct from index 0).
const ABSENT: NodeIdx = -1;

struct OpEntry {
    p: NodeIdx,
    q: NodeIdx,
    s: NodeIdx,
    r: NodeIdx,
}

/// Fixed-arity cache: `(p[, q[, s]]) -> r`.
pub struct OpCache {
    buckets: Vec<Vec<OpEntry>>,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl Default for OpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OpCache {
    pub fn new() -> Self {
        Self {
            buckets: (0..INIT_SIZE).map(|_| Vec::new()).collect(),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Number of cache hits.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }
    /// Number of cache misses.
    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    fn bucket_index(p: NodeIdx, q: NodeIdx, s: NodeIdx) -> usize {
        assert!(p >= 0, "Negative primary cache key {}", p);
        let h = if q < 0 {
            p as u64
        } else if s < 0 {
            pairing2(p as u64, q as u64)
        } else {
            pairing3(p as u64, q as u64, s as u64)
        };
        (h % INIT_SIZE as u64) as usize
    }

    fn probe(&self, p: NodeIdx, q: NodeIdx, s: NodeIdx) -> Option<NodeIdx> {
        let bucket = &self.buckets[Self::bucket_index(p, q, s)];
        for entry in bucket {
            if entry.p == p && entry.q == q && entry.s == s {
                self.hits.set(self.hits.get() + 1);
                return Some(entry.r);
            }
        }
        self.misses.set(self.misses.get() + 1);
        None
    }

    fn insert(&mut self, r: NodeIdx, p: NodeIdx, q: NodeIdx, s: NodeIdx) {
        let b = Self::bucket_index(p, q, s);
        self.buckets[b].push(OpEntry { p, q, s, r });
    }

    pub fn hit1(&self, p: NodeIdx) -> Option<NodeIdx> {
        self.probe(p, ABSENT, ABSENT)
    }

    pub fn hit2(&self, p: NodeIdx, q: NodeIdx) -> Option<NodeIdx> {
        assert!(q >= 0, "Negative secondary cache key {}", q);
        self.probe(p, q, ABSENT)
    }

    pub fn hit3(&self, p: NodeIdx, q: NodeIdx, s: NodeIdx) -> Option<NodeIdx> {
        assert!(q >= 0, "Negative secondary cache key {}", q);
        assert!(s >= 0, "Negative ternary cache key {}", s);
        self.probe(p, q, s)
    }

    /// Callers insert only after a confirmed miss; duplicates never arise.
    pub fn add1(&mut self, r: NodeIdx, p: NodeIdx) {
        self.insert(r, p, ABSENT, ABSENT);
    }

    pub fn add2(&mut self, r: NodeIdx, p: NodeIdx, q: NodeIdx) {
        assert!(q >= 0, "Negative secondary cache key {}", q);
        self.insert(r, p, q, ABSENT);
    }

    pub fn add3(&mut self, r: NodeIdx, p: NodeIdx, q: NodeIdx, s: NodeIdx) {
        assert!(q >= 0, "Negative secondary cache key {}", q);
        assert!(s >= 0, "Negative ternary cache key {}", s);
        self.insert(r, p, q, s);
    }

    /// Drop every entry. Must run before any hit once cached indices could
    /// have gone stale (compaction renumbered a level).
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

struct TupleEntry {
    p: NodeIdx,
    vals: Vec<NodeIdx>,
    r: NodeIdx,
}

/// Variable-arity cache: `(p, vals[..]) -> r` or `(vals[..]) -> r`.
pub struct TupleCache {
    buckets: Vec<Vec<TupleEntry>>,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl Default for TupleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TupleCache {
    pub fn new() -> Self {
        Self {
            buckets: (0..INIT_SIZE).map(|_| Vec::new()).collect(),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.get()
    }
    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    fn bucket_index(p: NodeIdx, vals: &[NodeIdx]) -> usize {
        // ABSENT folds to 0 so keyless tuples get a well-defined bucket.
        let lead = (p + 1) as u64;
        let h = pairing2(lead, pairing_seq(vals.iter().map(|&v| v as u64)));
        (h % INIT_SIZE as u64) as usize
    }

    fn probe(&self, p: NodeIdx, vals: &[NodeIdx]) -> Option<NodeIdx> {
        let bucket = &self.buckets[Self::bucket_index(p, vals)];
        for entry in bucket {
            if entry.p == p && entry.vals == vals {
                self.hits.set(self.hits.get() + 1);
                return Some(entry.r);
            }
        }
        self.misses.set(self.misses.get() + 1);
        None
    }

    pub fn hit(&self, vals: &[NodeIdx]) -> Option<NodeIdx> {
        self.probe(ABSENT, vals)
    }

    pub fn hit_with(&self, p: NodeIdx, vals: &[NodeIdx]) -> Option<NodeIdx> {
        assert!(p >= 0, "Negative primary cache key {}", p);
        self.probe(p, vals)
    }

    pub fn add(&mut self, r: NodeIdx, vals: &[NodeIdx]) {
        let b = Self::bucket_index(ABSENT, vals);
        self.buckets[b].push(TupleEntry {
            p: ABSENT,
            vals: vals.to_vec(),
            r,
        });
    }

    pub fn add_with(&mut self, r: NodeIdx, p: NodeIdx, vals: &[NodeIdx]) {
        assert!(p >= 0, "Negative primary cache key {}", p);
        let b = Self::bucket_index(p, vals);
        self.buckets[b].push(TupleEntry {
            p,
            vals: vals.to_vec(),
            r,
        });
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}
