//! The forest: orchestration of arenas, canonical tables, and caches.
//!
//! A `Forest` stores many MDDs over `K` ordered levels with node sharing.
//! Level `K` is the root-most level, level 0 the terminal level; a "node
//! index" at level 0 is the terminal value itself, and index 0 at every
//! level is the implicit zero node.
//!
//! This module is the memory and identity engine: node construction
//! ([`new_node`](Forest::new_node), [`set_arc`](Forest::set_arc)),
//! canonicalization ([`check_in`](Forest::check_in)), reference counting
//! with strict or lazy collection, and compaction. The recursive set
//! operations built from these primitives live in [`crate::ops`].
//!
//! Construction protocol, which every operation follows: allocate with
//! `new_node`, populate with `set_arc`, then finalize with `check_in`. A
//! checked-in node is canonical and immutable; `check_in` either registers
//! the node or folds it into its structural twin. Between compactions an
//! index is a stable name for a node.
//!
//! The forest is single-threaded and non-reentrant; collection is
//! cooperative (it runs inside engine calls, never concurrently).

use log::debug;

use crate::arena::LevelArena;
use crate::cache::{OpCache, TupleCache};
use crate::handle::MddHandle;
use crate::types::{GarbageAlgorithm, Level, MddError, NodeIdx, RuleId, Value};
use crate::unique::{CheckIn, UniqueTable};

/// Bucket bits of each per-level canonical table.
const UNIQUE_BITS: usize = 14;

/// Default number of unreachable nodes a level tolerates before a lazy
/// sweep.
const DEFAULT_GC_THRESHOLD: usize = 128;

pub struct Forest {
    /// Number of non-terminal levels.
    k: Level,
    /// Per-level storage, `[0]` being a stub carrying the terminal domain.
    pub(crate) arenas: Vec<LevelArena>,
    unique: Vec<UniqueTable>,

    // One cache per embedded operation and level.
    pub(crate) max_cache: Vec<OpCache>,
    pub(crate) min_cache: Vec<OpCache>,
    pub(crate) complement_cache: Vec<OpCache>,
    pub(crate) bcomplement_cache: Vec<OpCache>,
    pub(crate) less_than_cache: Vec<OpCache>,
    pub(crate) val_restrict_cache: Vec<OpCache>,
    pub(crate) replace_cache: Vec<OpCache>,
    pub(crate) replace_strict_cache: Vec<OpCache>,
    pub(crate) shift_cache: Vec<OpCache>,
    pub(crate) project_onto_cache: Vec<OpCache>,
    pub(crate) apply_cache: Vec<TupleCache>,
    pub(crate) select_cache: Vec<TupleCache>,

    /// Root registry: the node index behind each live external handle.
    roots: Vec<Option<NodeIdx>>,
    free_roots: Vec<usize>,

    sparse_enabled: bool,
    gc: GarbageAlgorithm,
    gc_threshold: usize,
    /// Per-level count of nodes that went unreachable since the last sweep.
    unreachable: Vec<usize>,
    /// Last compaction remap per level (`old -> new`, -1 for freed).
    remap: Vec<Vec<NodeIdx>>,
}

impl Forest {
    /// Build a forest of `num_levels` non-terminal levels. `max_vals[k]` is
    /// the largest value of level `k`'s domain (`max_vals[0]` bounds the
    /// terminal values).
    pub fn new(num_levels: usize, max_vals: &[Value]) -> Self {
        assert!(num_levels >= 1, "A forest needs at least one level");
        assert_eq!(
            max_vals.len(),
            num_levels + 1,
            "One domain bound per level, terminal included"
        );

        let levels = num_levels + 1;
        Self {
            k: num_levels,
            arenas: max_vals.iter().map(|&m| LevelArena::new(m)).collect(),
            unique: (0..levels).map(|_| UniqueTable::new(UNIQUE_BITS)).collect(),
            max_cache: (0..levels).map(|_| OpCache::new()).collect(),
            min_cache: (0..levels).map(|_| OpCache::new()).collect(),
            complement_cache: (0..levels).map(|_| OpCache::new()).collect(),
            bcomplement_cache: (0..levels).map(|_| OpCache::new()).collect(),
            less_than_cache: (0..levels).map(|_| OpCache::new()).collect(),
            val_restrict_cache: (0..levels).map(|_| OpCache::new()).collect(),
            replace_cache: (0..levels).map(|_| OpCache::new()).collect(),
            replace_strict_cache: (0..levels).map(|_| OpCache::new()).collect(),
            shift_cache: (0..levels).map(|_| OpCache::new()).collect(),
            project_onto_cache: (0..levels).map(|_| OpCache::new()).collect(),
            apply_cache: (0..levels).map(|_| TupleCache::new()).collect(),
            select_cache: (0..levels).map(|_| TupleCache::new()).collect(),
            roots: Vec::new(),
            free_roots: Vec::new(),
            sparse_enabled: false,
            gc: GarbageAlgorithm::Lazy,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            unreachable: vec![0; levels],
            remap: vec![Vec::new(); levels],
        }
    }

    // -- Introspection -------------------------------------------------------

    /// Number of non-terminal levels (`K`).
    pub fn num_levels(&self) -> usize {
        self.k
    }

    /// Largest domain value of level `k` (level 0 = terminal values).
    pub fn max_val(&self, k: Level) -> Value {
        assert!(k <= self.k, "Level {} outside [0, {}]", k, self.k);
        self.arenas[k].max_val()
    }

    /// Number of node slots ever allocated at level `k` (holes included).
    pub fn last(&self, k: Level) -> usize {
        self.assert_nonterminal(k);
        self.arenas[k].len()
    }

    /// Number of live nodes at level `k`.
    pub fn node_count(&self, k: Level) -> usize {
        self.assert_nonterminal(k);
        self.arenas[k].live_count()
    }

    pub fn is_live(&self, k: Level, p: NodeIdx) -> bool {
        self.assert_nonterminal(k);
        self.arenas[k].is_live(p)
    }

    /// Incoming-reference count of node `<k:p>`.
    pub fn incoming(&self, k: Level, p: NodeIdx) -> i32 {
        self.assert_nonterminal(k);
        self.arenas[k].node(p).incoming
    }

    fn assert_nonterminal(&self, k: Level) {
        assert!(k >= 1 && k <= self.k, "Level {} outside [1, {}]", k, self.k);
    }

    // -- Configuration -------------------------------------------------------

    /// Store subsequently checked-in nodes sparsely when profitable.
    pub fn toggle_sparsity(&mut self, enabled: bool) {
        self.sparse_enabled = enabled;
    }

    pub fn set_garbage_collection(&mut self, alg: GarbageAlgorithm, threshold: usize) {
        self.gc = alg;
        self.gc_threshold = threshold;
    }

    /// Grow the domain of level `k`. Dense nodes built under the smaller
    /// domain stay valid: their missing high values default to the zero
    /// child.
    pub fn change_domain(&mut self, k: Level, max_val: Value) -> Result<(), MddError> {
        if k > self.k {
            return Err(MddError::InvalidLevel);
        }
        self.arenas[k].set_max_val(max_val);
        Ok(())
    }

    // -- Node construction ---------------------------------------------------

    /// Allocate a blank node at level `k`, reusing a freed slot if any.
    pub fn new_node(&mut self, k: Level) -> NodeIdx {
        self.assert_nonterminal(k);
        let p = self.arenas[k].alloc();
        debug!("new_node(k = {}) -> {}", k, p);
        p
    }

    /// Set `<k:p>[i] = j`, adjusting the incoming count of the old and new
    /// child. Only legal on a node that has not been checked in.
    pub fn set_arc(&mut self, k: Level, p: NodeIdx, i: Value, j: NodeIdx) {
        self.assert_nonterminal(k);
        assert!(self.arenas[k].is_live(p), "set_arc on dead node <{}:{}>", k, p);
        assert!(
            !self.arenas[k].node(p).checked_in,
            "Node <{}:{}> is canonical and immutable",
            k,
            p
        );
        assert!(
            i >= 0 && i <= self.arenas[k].max_val(),
            "Arc value {} outside the domain of level {}",
            i,
            k
        );
        if k > 1 {
            assert!(
                j == 0 || self.arenas[k - 1].is_live(j),
                "Arc target <{}:{}> is not live",
                k - 1,
                j
            );
        } else {
            assert!(
                j >= 0 && j <= self.arenas[0].max_val(),
                "Terminal value {} out of domain",
                j
            );
        }

        self.arenas[k].ensure_dense_block(p);
        let off = self.arenas[k].full_arc_offset(p, i);
        let old = self.arenas[k].arc(off);
        if old == j {
            return;
        }
        self.arenas[k].set_arc_raw(off, j);
        self.arenas[k].clear_label(off);
        if k > 1 {
            if j != 0 {
                self.arenas[k - 1].node_mut(j).incoming += 1;
            }
            if old != 0 {
                self.release(k - 1, old);
            }
        }
    }

    /// Dense view of `<k:p>` over level `k`'s whole domain.
    pub fn unpack_node(&self, k: Level, p: NodeIdx) -> Vec<NodeIdx> {
        self.assert_nonterminal(k);
        self.arenas[k].unpack(p)
    }

    /// The canonicalization gate. Trims trailing default arcs (an
    /// all-default node folds to the zero node), optionally re-encodes
    /// sparsely, then probes the level's canonical table: a structural twin
    /// absorbs the new node (which is discarded, the twin's incoming count
    /// bumped by the reference the discarded node would have received);
    /// otherwise the node is registered as canonical and returned unchanged.
    ///
    /// Idempotent: checking in an already-canonical node returns it as-is.
    pub fn check_in(&mut self, k: Level, p: NodeIdx) -> NodeIdx {
        self.assert_nonterminal(k);
        if p == 0 {
            return 0;
        }
        assert!(self.arenas[k].is_live(p), "check_in on dead node <{}:{}>", k, p);
        if self.arenas[k].node(p).checked_in {
            return p;
        }

        self.arenas[k].trim_trailing_defaults(p);
        if self.arenas[k].node(p).size == 0 {
            self.arenas[k].free_slot(p);
            return 0;
        }
        if self.sparse_enabled {
            let nnz = self.arenas[k].nonzero_arcs(p);
            if 2 * nnz < self.arenas[k].node(p).size {
                self.arenas[k].to_sparse(p);
            }
        }

        match self.unique[k].canonicalize(&mut self.arenas[k], p) {
            CheckIn::Fresh => p,
            CheckIn::Existing(q) => {
                debug!("check_in(<{}:{}>): folded into <{}:{}>", k, p, k, q);
                self.discard_duplicate(k, p);
                self.arenas[k].node_mut(q).incoming += 1;
                q
            }
        }
    }

    /// Free a structural duplicate: give back its arc references and return
    /// its slot. The canonical twin keeps the shared children alive.
    fn discard_duplicate(&mut self, k: Level, p: NodeIdx) {
        let children = self.stored_children(k, p);
        self.arenas[k].free_slot(p);
        if k > 1 {
            for c in children {
                self.release(k - 1, c);
            }
        }
    }

    fn stored_children(&self, k: Level, p: NodeIdx) -> Vec<NodeIdx> {
        self.arenas[k]
            .unpack(p)
            .into_iter()
            .filter(|&c| c != 0)
            .collect()
    }

    // -- Reference counting & collection ------------------------------------

    /// Drop one incoming reference of `<k:p>`. Under strict collection a
    /// node reaching zero is deleted on the spot; under lazy collection it
    /// is only counted, and reclaimed by a later sweep.
    fn release(&mut self, k: Level, p: NodeIdx) {
        assert!(self.arenas[k].is_live(p), "release of dead node <{}:{}>", k, p);
        let node = self.arenas[k].node_mut(p);
        assert!(
            node.incoming > 0,
            "release of unreferenced node <{}:{}>",
            k,
            p
        );
        node.incoming -= 1;
        if node.incoming > 0 || node.shared {
            return;
        }
        match self.gc {
            GarbageAlgorithm::Strict => self.delete_node(k, p),
            GarbageAlgorithm::Lazy => self.unreachable[k] += 1,
        }
    }

    /// Delete `<k:p>` and cascade: every child losing its last reference is
    /// deleted too. The cascade is an explicit work-list, so arbitrarily
    /// deep diagrams cannot overflow the stack. Caches of every touched
    /// level are flushed: a freed slot may be reused by the next
    /// `new_node`, and a memoized result naming it would resolve to the
    /// wrong node.
    pub fn delete_node(&mut self, k: Level, p: NodeIdx) {
        let mut touched = vec![false; self.k + 1];
        let mut work = vec![(k, p)];
        while let Some((k, p)) = work.pop() {
            if !self.arenas[k].is_live(p) {
                continue;
            }
            debug!("delete_node(<{}:{}>)", k, p);
            touched[k] = true;
            let children = self.stored_children(k, p);
            self.unique[k].remove(&mut self.arenas[k], p);
            self.arenas[k].free_slot(p);
            if k == 1 {
                continue;
            }
            for c in children {
                let child = self.arenas[k - 1].node_mut(c);
                assert!(child.incoming > 0, "Arc into unreferenced node");
                child.incoming -= 1;
                if child.incoming == 0 && !child.shared {
                    work.push((k - 1, c));
                }
            }
        }
        for level in 1..=self.k {
            if touched[level] {
                self.flush_caches(level);
            }
        }
    }

    /// Delete every unreachable node at level `k`.
    fn sweep(&mut self, k: Level) {
        debug!("sweep(k = {}): {} pending", k, self.unreachable[k]);
        for p in 1..self.arenas[k].len() as NodeIdx {
            if !self.arenas[k].is_live(p) {
                continue;
            }
            let node = self.arenas[k].node(p);
            if node.checked_in && node.incoming == 0 && !node.shared {
                self.delete_node(k, p);
            }
        }
        self.unreachable[k] = 0;
    }

    /// Sweep every level whose unreachable count crossed the lazy threshold.
    /// Operations call this at their boundary; it never runs mid-recursion.
    pub(crate) fn maybe_sweep(&mut self) {
        if self.gc != GarbageAlgorithm::Lazy {
            return;
        }
        for k in (1..=self.k).rev() {
            if self.unreachable[k] > self.gc_threshold {
                self.sweep(k);
            }
        }
    }

    /// Force a full sweep of every level, root-most first.
    pub fn collect_garbage(&mut self) {
        for k in (1..=self.k).rev() {
            self.sweep(k);
        }
    }

    /// Recompute every incoming count from what is actually reachable:
    /// registry-held roots plus live arcs. Nodes reachable from no root are
    /// freed. This reconciles the counts accumulated by canonicalization
    /// folds (a fold bumps the canonical node by the reference its discarded
    /// twin would have received, which no later arc removal pays back).
    pub fn prune(&mut self) {
        debug!("prune()");
        let top = self.k;
        let mut counts: Vec<Vec<i32>> =
            (0..=top).map(|k| vec![0; self.arenas[k].len()]).collect();
        for r in self.roots.iter().flatten() {
            if *r != 0 {
                counts[top][*r as usize] += 1;
            }
        }
        for k in (2..=top).rev() {
            for p in 1..self.arenas[k].len() as NodeIdx {
                if !self.arenas[k].is_live(p) || counts[k][p as usize] == 0 {
                    continue;
                }
                for c in self.stored_children(k, p) {
                    counts[k - 1][c as usize] += 1;
                }
            }
        }
        for k in (1..=top).rev() {
            let mut freed = false;
            for p in 1..self.arenas[k].len() as NodeIdx {
                if !self.arenas[k].is_live(p) {
                    continue;
                }
                let count = counts[k][p as usize];
                if count == 0 {
                    // Unreachable: its children were already excluded from
                    // the recount, so free the slot without cascading.
                    self.unique[k].remove(&mut self.arenas[k], p);
                    self.arenas[k].free_slot(p);
                    freed = true;
                } else {
                    self.arenas[k].node_mut(p).incoming = count;
                }
            }
            self.unreachable[k] = 0;
            if freed {
                self.flush_caches(k);
            }
        }
    }

    // -- Compaction ----------------------------------------------------------

    /// Physically remove holes at level `k` by relocating live nodes to
    /// contiguous low indices. Rewrites arcs at the level above, rebuilds
    /// the affected canonical tables, flushes the level's caches, and
    /// remaps registry-held root handles. This is the only point at which
    /// node indices change identity.
    pub fn compact(&mut self, k: Level) {
        self.assert_nonterminal(k);
        debug!(
            "compact(k = {}): {} slots, {} live",
            k,
            self.arenas[k].len(),
            self.arenas[k].live_count()
        );

        let remap = self.arenas[k].rebuild_compacted();
        self.unique[k].rebuild(&mut self.arenas[k]);

        if k < self.k {
            // Arcs one level up now point at moved slots; their contents
            // (and hence hashes) change, so that table is rebuilt too.
            self.arenas[k + 1].remap_children(&remap);
            self.unique[k + 1].rebuild(&mut self.arenas[k + 1]);
        } else {
            for root in self.roots.iter_mut().flatten() {
                if *root != 0 {
                    let new = remap[*root as usize];
                    assert!(new >= 0, "Handle-attached root was freed");
                    *root = new;
                }
            }
        }

        self.flush_caches(k);
        self.unreachable[k] = 0;
        self.remap[k] = remap;
    }

    pub fn compact_top_level(&mut self) {
        self.compact(self.k);
    }

    /// The remap produced by the last compaction of level `k`
    /// (`old index -> new index`, -1 for freed slots). Collaborators holding
    /// raw indices across a compaction apply this to translate them.
    pub fn last_remap(&self, k: Level) -> &[NodeIdx] {
        self.assert_nonterminal(k);
        &self.remap[k]
    }

    /// Drop every memoized result for level `k`. Required whenever the
    /// level's indices are renumbered; cached indices would otherwise
    /// resolve to the wrong nodes.
    pub fn flush_caches(&mut self, k: Level) {
        assert!(k <= self.k);
        self.max_cache[k].clear();
        self.min_cache[k].clear();
        self.complement_cache[k].clear();
        self.bcomplement_cache[k].clear();
        self.less_than_cache[k].clear();
        self.val_restrict_cache[k].clear();
        self.replace_cache[k].clear();
        self.replace_strict_cache[k].clear();
        self.shift_cache[k].clear();
        self.project_onto_cache[k].clear();
        self.apply_cache[k].clear();
        self.select_cache[k].clear();
    }

    // -- External handles ----------------------------------------------------

    /// Attach a root at the top level, incrementing its incoming count.
    pub fn attach(&mut self, p: NodeIdx) -> MddHandle {
        assert!(
            p == 0 || self.arenas[self.k].is_live(p),
            "Attaching handle to dead node {}",
            p
        );
        let slot = self.free_roots.pop().unwrap_or_else(|| {
            self.roots.push(None);
            self.roots.len() - 1
        });
        self.roots[slot] = Some(p);
        if p != 0 {
            let node = self.arenas[self.k].node_mut(p);
            node.incoming += 1;
            node.shared = true;
        }
        debug!("attach({}) -> mdd#{}", p, slot);
        MddHandle::new(slot)
    }

    /// Detach and consume a handle. The root loses one reference and, with
    /// no other holders, becomes collectible under the configured policy.
    pub fn destroy_mdd(&mut self, handle: MddHandle) {
        let slot = handle.slot();
        let p = self.roots[slot].take().expect("Handle already destroyed");
        self.free_roots.push(slot);
        debug!("destroy_mdd(mdd#{}) -> release {}", slot, p);
        if p != 0 {
            let still_shared = self.roots.iter().flatten().any(|&r| r == p);
            if !still_shared {
                self.arenas[self.k].node_mut(p).shared = false;
            }
            self.release(self.k, p);
        }
        self.maybe_sweep();
    }

    /// Current node index behind a handle, or `None` once destroyed.
    pub fn root_index(&self, handle: &MddHandle) -> Option<NodeIdx> {
        self.roots.get(handle.slot()).copied().flatten()
    }

    // -- Arc labels ----------------------------------------------------------

    /// Annotate the arc `<k:p>[v]` with a rule identifier. The arc must be
    /// present (non-default).
    pub fn add_arc_label(&mut self, k: Level, p: NodeIdx, v: Value, rule: RuleId) {
        self.assert_nonterminal(k);
        let off = self.arenas[k]
            .offset_for_value(p, v)
            .expect("Labeling an absent arc");
        self.arenas[k].push_label(off, rule);
    }

    pub fn arc_labels(&self, k: Level, p: NodeIdx, v: Value) -> &[RuleId] {
        self.assert_nonterminal(k);
        match self.arenas[k].offset_for_value(p, v) {
            Some(off) => self.arenas[k].label(off),
            None => &[],
        }
    }
}
