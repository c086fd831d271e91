//! Per-level canonical table (hash-consing).
//!
//! One `UniqueTable` per level maps a node's structural content to a single
//! canonical arena slot, so structural equality implies index equality. The
//! table is a power-of-two bucket array; collision chains run *through* the
//! node records themselves via their `next` link (0 terminates a chain, the
//! zero-node sentinel never being chained).
//!
//! The defining invariant: no two distinct indices reachable from the
//! buckets compare structurally equal under [`LevelArena::nodes_equal`].

use crate::arena::LevelArena;
use crate::types::NodeIdx;

/// Outcome of probing the table with a freshly built node.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CheckIn {
    /// The node had no structural twin and is now registered as canonical.
    Fresh,
    /// A canonical twin already exists; the probed node must be discarded.
    Existing(NodeIdx),
}

pub struct UniqueTable {
    buckets: Vec<NodeIdx>,
    bitmask: u64,
}

impl UniqueTable {
    /// Create a table with `2^bits` buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Bucket bits should be in the range 0..=31");
        let size = 1usize << bits;
        Self {
            buckets: vec![0; size],
            bitmask: (size - 1) as u64,
        }
    }

    fn bucket_index(&self, arena: &LevelArena, p: NodeIdx) -> usize {
        (arena.hash_node(p) & self.bitmask) as usize
    }

    /// The canonicalization gate: probe for a structural twin of `p`.
    ///
    /// On a miss, `p` is chained into its bucket, marked checked-in, and
    /// [`CheckIn::Fresh`] is returned. On a hit the table is left untouched
    /// and the caller is responsible for discarding `p`.
    pub fn canonicalize(&mut self, arena: &mut LevelArena, p: NodeIdx) -> CheckIn {
        assert!(arena.is_live(p), "Canonicalizing dead node {}", p);
        assert!(
            !arena.node(p).checked_in,
            "Node {} is already canonical",
            p
        );

        let b = self.bucket_index(arena, p);
        let mut idx = self.buckets[b];
        while idx != 0 {
            if arena.nodes_equal(idx, p) {
                return CheckIn::Existing(idx);
            }
            idx = arena.node(idx).next;
        }

        let head = self.buckets[b];
        let node = arena.node_mut(p);
        node.next = head;
        node.checked_in = true;
        self.buckets[b] = p;
        CheckIn::Fresh
    }

    /// Unlink a canonical node from its bucket chain. Must be called before
    /// the node's arc block is released, while its hash is still computable.
    pub fn remove(&mut self, arena: &mut LevelArena, p: NodeIdx) {
        if !arena.node(p).checked_in {
            return;
        }
        let b = self.bucket_index(arena, p);
        let after = arena.node(p).next;
        let mut idx = self.buckets[b];
        if idx == p {
            self.buckets[b] = after;
        } else {
            while idx != 0 {
                let next = arena.node(idx).next;
                if next == p {
                    arena.node_mut(idx).next = after;
                    break;
                }
                idx = next;
            }
            assert_ne!(idx, 0, "Node {} not found in its bucket chain", p);
        }
        let node = arena.node_mut(p);
        node.next = 0;
        node.checked_in = false;
    }

    /// Re-chain every live canonical node. Used after compaction, when every
    /// surviving node changed index and chain links were reset.
    pub fn rebuild(&mut self, arena: &mut LevelArena) {
        self.buckets.fill(0);
        for p in 1..arena.len() as NodeIdx {
            if !arena.is_live(p) || !arena.node(p).checked_in {
                continue;
            }
            let b = self.bucket_index(arena, p);
            let head = self.buckets[b];
            arena.node_mut(p).next = head;
            self.buckets[b] = p;
        }
    }

    /// Number of canonical nodes currently chained.
    pub fn len(&self, arena: &LevelArena) -> usize {
        let mut count = 0;
        for &head in &self.buckets {
            let mut idx = head;
            while idx != 0 {
                count += 1;
                idx = arena.node(idx).next;
            }
        }
        count
    }
}
