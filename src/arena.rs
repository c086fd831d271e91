//! Per-level storage for node records, arc records, and arc labels.
//!
//! Each level of the forest owns one `LevelArena`: a slot vector of [`Node`]
//! records, a growable arc array the node blocks point into, a parallel label
//! array, and a free list of reusable node slots. The arena owns physical
//! memory and never decides identity — canonicalization lives in
//! [`crate::unique`].
//!
//! Slot 0 of every arena is a reserved sentinel: the implicit zero node
//! (empty sub-diagram). Arc slots holding 0 mean "default child".
//!
//! Arc blocks are append-only: freeing a node leaves a hole in the arc array
//! until [`LevelArena::rebuild_compacted`] relocates the survivors.

use crate::node::{Encoding, Node};
use crate::types::{NodeIdx, RuleId, Value};
use crate::utils::{pairing2, pairing_seq};

pub struct LevelArena {
    nodes: Vec<Node>,
    arcs: Vec<NodeIdx>,
    /// Rule labels, parallel to `arcs`. A label annotates the arc record at
    /// the same offset and is cleared when the arc is overwritten or freed.
    labels: Vec<Vec<RuleId>>,
    free: Vec<NodeIdx>,
    max_val: Value,
}

impl LevelArena {
    pub fn new(max_val: Value) -> Self {
        assert!(max_val >= 0, "Domain must contain at least the value 0");

        // Slot 0 is the zero-node sentinel; it is never handed out.
        let mut sentinel = Node::default();
        sentinel.checked_in = true;

        Self {
            nodes: vec![sentinel],
            arcs: Vec::new(),
            labels: Vec::new(),
            free: Vec::new(),
            max_val,
        }
    }

    pub fn max_val(&self) -> Value {
        self.max_val
    }

    pub fn domain_size(&self) -> Value {
        self.max_val + 1
    }

    /// Grow the level's domain. Shrinking is a contract violation: existing
    /// dense blocks would silently lose arcs.
    pub fn set_max_val(&mut self, max_val: Value) {
        assert!(
            max_val >= self.max_val,
            "Domain of a level can only grow (have {}, asked {})",
            self.max_val,
            max_val
        );
        self.max_val = max_val;
    }

    /// Number of node slots, including slot 0 and freed holes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Number of arc slots, including holes.
    pub fn arcs_len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_live(&self, p: NodeIdx) -> bool {
        p > 0 && (p as usize) < self.nodes.len() && !self.nodes[p as usize].deleted
    }

    pub fn node(&self, p: NodeIdx) -> &Node {
        assert!(p >= 0, "Negative node index {}", p);
        &self.nodes[p as usize]
    }

    pub fn node_mut(&mut self, p: NodeIdx) -> &mut Node {
        assert!(p > 0, "Node index {} is not mutable", p);
        &mut self.nodes[p as usize]
    }

    /// Indices of live nodes, in slot order.
    pub fn iter_live(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        (1..self.nodes.len() as NodeIdx).filter(|&p| !self.nodes[p as usize].deleted)
    }

    pub fn live_count(&self) -> usize {
        self.iter_live().count()
    }

    /// Allocate a blank node slot, reusing a freed one if available.
    pub fn alloc(&mut self) -> NodeIdx {
        if let Some(p) = self.free.pop() {
            self.nodes[p as usize] = Node::default();
            return p;
        }
        let p = self.nodes.len() as NodeIdx;
        self.nodes.push(Node::default());
        p
    }

    /// Return a slot to the free list. The node's arc block becomes a hole.
    pub fn free_slot(&mut self, p: NodeIdx) {
        assert!(p > 0, "Cannot free the zero node");
        let node = self.nodes[p as usize];
        assert!(!node.deleted, "Double free of node {}", p);
        self.clear_block_labels(&node);
        self.nodes[p as usize].deleted = true;
        self.free.push(p);
    }

    fn clear_block_labels(&mut self, node: &Node) {
        if node.down < 0 {
            return;
        }
        let start = node.down as usize;
        for off in start..start + block_len(node) {
            self.labels[off].clear();
        }
    }

    // -- Arc records --------------------------------------------------------

    /// Append `count` zeroed arc slots and return the offset of the first.
    pub fn alloc_arcs(&mut self, count: usize) -> i32 {
        let down = self.arcs.len() as i32;
        self.arcs.resize(self.arcs.len() + count, 0);
        self.labels.resize_with(self.labels.len() + count, Vec::new);
        down
    }

    pub fn arc(&self, offset: i32) -> NodeIdx {
        self.arcs[offset as usize]
    }

    pub fn set_arc_raw(&mut self, offset: i32, child: NodeIdx) {
        self.arcs[offset as usize] = child;
    }

    pub fn label(&self, offset: i32) -> &[RuleId] {
        &self.labels[offset as usize]
    }

    pub fn push_label(&mut self, offset: i32, rule: RuleId) {
        self.labels[offset as usize].push(rule);
    }

    pub fn clear_label(&mut self, offset: i32) {
        self.labels[offset as usize].clear();
    }

    /// Offset of the arc record holding node `p`'s child pointer for value
    /// `i` under the dense layout.
    pub fn full_arc_offset(&self, p: NodeIdx, i: Value) -> i32 {
        let node = self.node(p);
        assert_eq!(node.encoding, Encoding::Dense);
        assert!(i >= 0 && i < node.size, "Arc {} outside node {}", i, p);
        node.down + i
    }

    pub fn full_arc(&self, p: NodeIdx, i: Value) -> NodeIdx {
        self.arcs[self.full_arc_offset(p, i) as usize]
    }

    pub fn sparse_value(&self, p: NodeIdx, i: i32) -> Value {
        let node = self.node(p);
        assert_eq!(node.encoding, Encoding::Sparse);
        assert!(i >= 0 && i < node.size, "Pair {} outside node {}", i, p);
        self.arcs[(node.down + 2 * i) as usize]
    }

    pub fn sparse_child(&self, p: NodeIdx, i: i32) -> NodeIdx {
        let node = self.node(p);
        assert_eq!(node.encoding, Encoding::Sparse);
        assert!(i >= 0 && i < node.size, "Pair {} outside node {}", i, p);
        self.arcs[(node.down + 2 * i + 1) as usize]
    }

    /// Offset of the arc record holding node `p`'s child for value `v`, or
    /// `None` when the value is absent (implicitly the default child).
    pub fn offset_for_value(&self, p: NodeIdx, v: Value) -> Option<i32> {
        assert!(v >= 0 && v <= self.max_val, "Value {} out of domain", v);
        if p == 0 {
            return None;
        }
        let node = self.node(p);
        match node.encoding {
            Encoding::Dense => {
                if v < node.size {
                    Some(node.down + v)
                } else {
                    None
                }
            }
            Encoding::Sparse => (0..node.size)
                .find(|&i| self.arcs[(node.down + 2 * i) as usize] == v)
                .map(|i| node.down + 2 * i + 1),
        }
    }

    /// Child reached from node `p` by value `v`, regardless of encoding.
    /// Absent values map to the default child 0.
    pub fn arc_for_value(&self, p: NodeIdx, v: Value) -> NodeIdx {
        match self.offset_for_value(p, v) {
            Some(off) => self.arcs[off as usize],
            None => 0,
        }
    }

    /// Materialize a dense view of node `p` over the whole current domain.
    ///
    /// This is the abstraction boundary that lets traversals ignore the
    /// dense/sparse distinction.
    pub fn unpack(&self, p: NodeIdx) -> Vec<NodeIdx> {
        let mut full = vec![0; self.domain_size() as usize];
        if p == 0 {
            return full;
        }
        let node = self.node(p);
        assert!(!node.deleted, "Unpacking deleted node {}", p);
        match node.encoding {
            Encoding::Dense => {
                for i in 0..node.size {
                    full[i as usize] = self.arcs[(node.down + i) as usize];
                }
            }
            Encoding::Sparse => {
                for i in 0..node.size {
                    let v = self.arcs[(node.down + 2 * i) as usize];
                    full[v as usize] = self.arcs[(node.down + 2 * i + 1) as usize];
                }
            }
        }
        full
    }

    // -- Construction support ----------------------------------------------

    /// Make sure node `p` has a dense block spanning the current domain,
    /// relocating a smaller block if the domain grew since allocation.
    pub fn ensure_dense_block(&mut self, p: NodeIdx) {
        let domain = self.domain_size();
        let node = *self.node(p);
        assert_eq!(node.encoding, Encoding::Dense);

        if node.down < 0 {
            let down = self.alloc_arcs(domain as usize);
            let n = self.node_mut(p);
            n.down = down;
            n.size = domain;
            return;
        }

        if node.size < domain {
            let down = self.alloc_arcs(domain as usize);
            for i in 0..node.size {
                let child = self.arcs[(node.down + i) as usize];
                self.arcs[(down + i) as usize] = child;
                let label = std::mem::take(&mut self.labels[(node.down + i) as usize]);
                self.labels[(down + i) as usize] = label;
            }
            let n = self.node_mut(p);
            n.down = down;
            n.size = domain;
        }
    }

    /// Drop trailing default arcs of a dense node under construction.
    pub fn trim_trailing_defaults(&mut self, p: NodeIdx) {
        let node = *self.node(p);
        assert_eq!(node.encoding, Encoding::Dense);
        let mut size = node.size;
        while size > 0 && self.arcs[(node.down + size - 1) as usize] == 0 {
            self.labels[(node.down + size - 1) as usize].clear();
            size -= 1;
        }
        self.node_mut(p).size = size;
    }

    /// Number of non-default arcs of a dense node.
    pub fn nonzero_arcs(&self, p: NodeIdx) -> i32 {
        let node = self.node(p);
        assert_eq!(node.encoding, Encoding::Dense);
        (0..node.size)
            .filter(|&i| self.arcs[(node.down + i) as usize] != 0)
            .count() as i32
    }

    /// Re-encode a dense node as `(value, child)` pairs in ascending value
    /// order. The old block becomes a hole.
    pub fn to_sparse(&mut self, p: NodeIdx) {
        let node = *self.node(p);
        assert_eq!(node.encoding, Encoding::Dense);
        let pairs = self.nonzero_arcs(p);
        let down = self.alloc_arcs(2 * pairs as usize);
        let mut at = down;
        for i in 0..node.size {
            let child = self.arcs[(node.down + i) as usize];
            if child != 0 {
                self.arcs[at as usize] = i;
                self.arcs[(at + 1) as usize] = child;
                let label = std::mem::take(&mut self.labels[(node.down + i) as usize]);
                self.labels[(at + 1) as usize] = label;
                at += 2;
            }
        }
        let n = self.node_mut(p);
        n.encoding = Encoding::Sparse;
        n.down = down;
        n.size = pairs;
    }

    // -- Structural identity -----------------------------------------------

    /// Hash of node `p`'s content: encoding, arc count, and the raw arc
    /// block. Children being already canonical, structurally identical
    /// sub-diagrams hash identically here.
    pub fn hash_node(&self, p: NodeIdx) -> u64 {
        let node = self.node(p);
        let tag = match node.encoding {
            Encoding::Dense => 1,
            Encoding::Sparse => 2,
        };
        let start = node.down.max(0) as usize;
        let block = &self.arcs[start..start + block_len(node)];
        pairing2(
            pairing2(tag, node.size as u64),
            pairing_seq(block.iter().map(|&a| a as u64)),
        )
    }

    /// Structural equality: same encoding, same arc count, pointwise-equal
    /// arc records.
    pub fn nodes_equal(&self, p: NodeIdx, q: NodeIdx) -> bool {
        let a = self.node(p);
        let b = self.node(q);
        if a.encoding != b.encoding || a.size != b.size {
            return false;
        }
        let sa = a.down.max(0) as usize;
        let sb = b.down.max(0) as usize;
        let len = block_len(a);
        self.arcs[sa..sa + len] == self.arcs[sb..sb + len]
    }

    // -- Compaction ---------------------------------------------------------

    /// Relocate live nodes to contiguous low indices and rebuild the arc
    /// array without holes. Returns the remap (`old index -> new index`,
    /// -1 for freed slots). Canonical-table chain links are reset; the
    /// caller rebuilds the table.
    pub fn rebuild_compacted(&mut self) -> Vec<NodeIdx> {
        let mut remap = vec![-1; self.nodes.len()];
        remap[0] = 0;

        let mut nodes = vec![self.nodes[0]];
        let mut arcs = Vec::new();
        let mut labels: Vec<Vec<RuleId>> = Vec::new();

        for old in 1..self.nodes.len() {
            let node = self.nodes[old];
            if node.deleted {
                continue;
            }
            let new = nodes.len() as NodeIdx;
            remap[old] = new;

            let mut relocated = node;
            relocated.next = 0;
            if node.down >= 0 {
                let start = node.down as usize;
                let len = block_len(&node);
                relocated.down = arcs.len() as i32;
                arcs.extend_from_slice(&self.arcs[start..start + len]);
                for off in start..start + len {
                    labels.push(std::mem::take(&mut self.labels[off]));
                }
            }
            nodes.push(relocated);
        }

        self.nodes = nodes;
        self.arcs = arcs;
        self.labels = labels;
        self.free.clear();
        remap
    }

    /// Apply a lower level's remap to every arc of this level.
    pub fn remap_children(&mut self, remap: &[NodeIdx]) {
        for p in 1..self.nodes.len() as NodeIdx {
            let node = self.nodes[p as usize];
            if node.deleted || node.down < 0 {
                continue;
            }
            match node.encoding {
                Encoding::Dense => {
                    for i in 0..node.size {
                        let off = (node.down + i) as usize;
                        let child = self.arcs[off];
                        if child != 0 {
                            let new = remap[child as usize];
                            assert!(new >= 0, "Live arc into freed node {}", child);
                            self.arcs[off] = new;
                        }
                    }
                }
                Encoding::Sparse => {
                    for i in 0..node.size {
                        let off = (node.down + 2 * i + 1) as usize;
                        let child = self.arcs[off];
                        let new = remap[child as usize];
                        assert!(new >= 0, "Live arc into freed node {}", child);
                        self.arcs[off] = new;
                    }
                }
            }
        }
    }
}

fn block_len(node: &Node) -> usize {
    if node.down < 0 {
        return 0;
    }
    match node.encoding {
        Encoding::Dense => node.size as usize,
        Encoding::Sparse => 2 * node.size as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_node(arena: &mut LevelArena, children: &[NodeIdx]) -> NodeIdx {
        let p = arena.alloc();
        arena.ensure_dense_block(p);
        for (i, &c) in children.iter().enumerate() {
            let off = arena.full_arc_offset(p, i as Value);
            arena.set_arc_raw(off, c);
        }
        p
    }

    #[test]
    fn test_alloc_and_reuse() {
        let mut arena = LevelArena::new(3);
        let p = arena.alloc();
        let q = arena.alloc();
        assert_eq!(p, 1);
        assert_eq!(q, 2);
        arena.free_slot(p);
        assert!(!arena.is_live(p));
        assert_eq!(arena.alloc(), p);
        assert!(arena.is_live(p));
    }

    #[test]
    fn test_unpack_dense() {
        let mut arena = LevelArena::new(3);
        let p = dense_node(&mut arena, &[5, 0, 7, 0]);
        assert_eq!(arena.unpack(p), vec![5, 0, 7, 0]);
        assert_eq!(arena.arc_for_value(p, 0), 5);
        assert_eq!(arena.arc_for_value(p, 1), 0);
        assert_eq!(arena.arc_for_value(p, 2), 7);
    }

    #[test]
    fn test_unpack_zero_node() {
        let arena = LevelArena::new(2);
        assert_eq!(arena.unpack(0), vec![0, 0, 0]);
    }

    #[test]
    fn test_trim_and_sparse() {
        let mut arena = LevelArena::new(7);
        let p = dense_node(&mut arena, &[0, 9, 0, 0, 0, 0, 0, 0]);
        arena.trim_trailing_defaults(p);
        assert_eq!(arena.node(p).size, 2);

        arena.to_sparse(p);
        let node = arena.node(p);
        assert_eq!(node.encoding, Encoding::Sparse);
        assert_eq!(node.size, 1);
        assert_eq!(arena.sparse_value(p, 0), 1);
        assert_eq!(arena.sparse_child(p, 0), 9);
        assert_eq!(arena.arc_for_value(p, 1), 9);
        assert_eq!(arena.arc_for_value(p, 0), 0);
        assert_eq!(arena.unpack(p), vec![0, 9, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_structural_identity() {
        let mut arena = LevelArena::new(3);
        let p = dense_node(&mut arena, &[1, 1, 2, 2]);
        let q = dense_node(&mut arena, &[1, 1, 2, 2]);
        let r = dense_node(&mut arena, &[1, 1, 2, 0]);
        assert_eq!(arena.hash_node(p), arena.hash_node(q));
        assert!(arena.nodes_equal(p, q));
        assert!(!arena.nodes_equal(p, r));
    }

    #[test]
    fn test_domain_growth_keeps_dense_nodes() {
        let mut arena = LevelArena::new(1);
        let p = dense_node(&mut arena, &[3, 4]);
        arena.set_max_val(3);
        // The old block is untouched; new values default to 0.
        assert_eq!(arena.unpack(p), vec![3, 4, 0, 0]);
        // A further write relocates the block over the grown domain.
        arena.ensure_dense_block(p);
        let off = arena.full_arc_offset(p, 3);
        arena.set_arc_raw(off, 8);
        assert_eq!(arena.unpack(p), vec![3, 4, 0, 8]);
    }

    #[test]
    fn test_rebuild_compacted() {
        let mut arena = LevelArena::new(2);
        let p = dense_node(&mut arena, &[4, 0, 0]);
        let q = dense_node(&mut arena, &[0, 5, 0]);
        let r = dense_node(&mut arena, &[0, 0, 6]);
        arena.trim_trailing_defaults(p);
        arena.trim_trailing_defaults(q);
        arena.trim_trailing_defaults(r);
        arena.free_slot(q);

        let remap = arena.rebuild_compacted();
        assert_eq!(remap[p as usize], 1);
        assert_eq!(remap[q as usize], -1);
        assert_eq!(remap[r as usize], 2);
        assert_eq!(arena.unpack(1), vec![4, 0, 0]);
        assert_eq!(arena.unpack(2), vec![0, 0, 6]);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    #[should_panic(expected = "can only grow")]
    fn test_domain_shrink_panics() {
        let mut arena = LevelArena::new(3);
        arena.set_max_val(2);
    }
}
