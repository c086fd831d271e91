//! The recursive set operations over diagrams.
//!
//! Every operation follows the same shape: validate operands at the
//! boundary (an invalid operand is reported before any mutation), then
//! recurse top-down. At each level the operation's dedicated per-level
//! cache is consulted first; on a miss the operation recurses into the
//! operands' children per domain value, assembles a result node with
//! `new_node` + `set_arc`, canonicalizes it with `check_in`, memoizes, and
//! returns. The N-ary operations (`apply`, `select`) use the tuple cache
//! instead of the fixed-arity one.
//!
//! Terminal semantics (level 0, where an "index" is the terminal value):
//!
//! | operation            | result                                  |
//! |----------------------|-----------------------------------------|
//! | `max` / `min`        | pointwise max / min                     |
//! | `complement`         | 1 where 0, 0 elsewhere                  |
//! | `binary_complement`  | `max_val(0) - v`                        |
//! | `less_than c`        | 1 where `v < c`                         |
//! | `val_restrict c`     | `v` where `v == c`, else 0              |
//! | `replace`            | right value where non-default           |
//! | `replace` (strict)   | right value where *both* non-default    |
//! | `project_onto`       | left value where right is non-default   |

use log::debug;

use crate::forest::Forest;
use crate::handle::MddHandle;
use crate::types::{Level, MddError, NodeIdx, Value};

impl Forest {
    /// Resolve an operand handle, or report it with the operation's own
    /// error code.
    fn operand(&self, h: &MddHandle, err: MddError) -> Result<NodeIdx, MddError> {
        let p = self.root_index(h).ok_or(err)?;
        if p != 0 && !self.is_live(self.num_levels(), p) {
            return Err(MddError::InvalidMdd);
        }
        Ok(p)
    }

    // -- Binary set operations ----------------------------------------------

    /// Pointwise maximum (set union for 0/1 diagrams).
    pub fn max(&mut self, p: &MddHandle, q: &MddHandle) -> Result<MddHandle, MddError> {
        let pi = self.operand(p, MddError::MaxFailed)?;
        let qi = self.operand(q, MddError::MaxFailed)?;
        debug!("max({}, {})", pi, qi);
        let r = self.max_rec(self.num_levels(), pi, qi);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    /// Pointwise minimum (set intersection for 0/1 diagrams).
    pub fn min(&mut self, p: &MddHandle, q: &MddHandle) -> Result<MddHandle, MddError> {
        let pi = self.operand(p, MddError::MinFailed)?;
        let qi = self.operand(q, MddError::MinFailed)?;
        debug!("min({}, {})", pi, qi);
        let r = self.min_rec(self.num_levels(), pi, qi);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    fn max_rec(&mut self, k: Level, p: NodeIdx, q: NodeIdx) -> NodeIdx {
        if k == 0 {
            return p.max(q);
        }
        if p == q {
            return p;
        }
        if p == 0 {
            return q;
        }
        if q == 0 {
            return p;
        }
        if let Some(r) = self.max_cache[k].hit2(p, q) {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let qv = self.unpack_node(k, q);
        let r = self.new_node(k);
        for i in 0..=self.max_val(k) {
            let child = self.max_rec(k - 1, pv[i as usize], qv[i as usize]);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        self.max_cache[k].add2(r, p, q);
        r
    }

    fn min_rec(&mut self, k: Level, p: NodeIdx, q: NodeIdx) -> NodeIdx {
        if k == 0 {
            return p.min(q);
        }
        if p == q {
            return p;
        }
        if p == 0 || q == 0 {
            return 0;
        }
        if let Some(r) = self.min_cache[k].hit2(p, q) {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let qv = self.unpack_node(k, q);
        let r = self.new_node(k);
        for i in 0..=self.max_val(k) {
            let child = self.min_rec(k - 1, pv[i as usize], qv[i as usize]);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        self.min_cache[k].add2(r, p, q);
        r
    }

    // -- Complements ---------------------------------------------------------

    /// Membership complement: tuples mapping to 0 map to 1, all others to 0.
    pub fn complement(&mut self, p: &MddHandle) -> Result<MddHandle, MddError> {
        let pi = self.operand(p, MddError::ComplementFailed)?;
        debug!("complement({})", pi);
        let r = self.complement_rec(self.num_levels(), pi);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    /// Value complement: every tuple's value `v` becomes `max_val(0) - v`.
    pub fn binary_complement(&mut self, p: &MddHandle) -> Result<MddHandle, MddError> {
        let pi = self.operand(p, MddError::ComplementFailed)?;
        debug!("binary_complement({})", pi);
        let r = self.bcomplement_rec(self.num_levels(), pi);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    fn complement_rec(&mut self, k: Level, p: NodeIdx) -> NodeIdx {
        if k == 0 {
            return if p == 0 { 1 } else { 0 };
        }
        // The complement of a saturated node is empty; the complement of
        // the zero node is the saturated node built below.
        if p != 0 && self.arenas[k].node(p).saturated {
            return 0;
        }
        if let Some(r) = self.complement_cache[k].hit1(p) {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let r = self.new_node(k);
        for i in 0..=self.max_val(k) {
            let child = self.complement_rec(k - 1, pv[i as usize]);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        if p == 0 && r != 0 {
            self.arenas[k].node_mut(r).saturated = true;
        }
        self.complement_cache[k].add1(r, p);
        r
    }

    fn bcomplement_rec(&mut self, k: Level, p: NodeIdx) -> NodeIdx {
        if k == 0 {
            return self.max_val(0) - p;
        }
        if let Some(r) = self.bcomplement_cache[k].hit1(p) {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let r = self.new_node(k);
        for i in 0..=self.max_val(k) {
            let child = self.bcomplement_rec(k - 1, pv[i as usize]);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        self.bcomplement_cache[k].add1(r, p);
        r
    }

    // -- Value filters -------------------------------------------------------

    /// Keep tuples whose value is below `bound`, mapping them to 1.
    pub fn less_than(&mut self, p: &MddHandle, bound: Value) -> Result<MddHandle, MddError> {
        let pi = self.operand(p, MddError::InvalidMdd)?;
        debug!("less_than({}, {})", pi, bound);
        let r = self.less_than_rec(self.num_levels(), pi, bound);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    /// Keep only tuples mapping exactly to `value`.
    pub fn val_restrict(&mut self, p: &MddHandle, value: Value) -> Result<MddHandle, MddError> {
        let pi = self.operand(p, MddError::InvalidMdd)?;
        debug!("val_restrict({}, {})", pi, value);
        let r = self.val_restrict_rec(self.num_levels(), pi, value);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    fn less_than_rec(&mut self, k: Level, p: NodeIdx, bound: Value) -> NodeIdx {
        if k == 0 {
            return if p < bound { 1 } else { 0 };
        }
        if let Some(r) = self.less_than_cache[k].hit2(p, bound) {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let r = self.new_node(k);
        for i in 0..=self.max_val(k) {
            let child = self.less_than_rec(k - 1, pv[i as usize], bound);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        self.less_than_cache[k].add2(r, p, bound);
        r
    }

    fn val_restrict_rec(&mut self, k: Level, p: NodeIdx, value: Value) -> NodeIdx {
        if k == 0 {
            return if p == value { p } else { 0 };
        }
        if p == 0 {
            return 0;
        }
        if let Some(r) = self.val_restrict_cache[k].hit2(p, value) {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let r = self.new_node(k);
        for i in 0..=self.max_val(k) {
            let child = self.val_restrict_rec(k - 1, pv[i as usize], value);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        self.val_restrict_cache[k].add2(r, p, value);
        r
    }

    // -- Overriding combinations --------------------------------------------

    /// Override `p` with `q` wherever `q` maps a tuple to a non-default
    /// value. The strict variant overrides only tuples `p` also maps.
    pub fn replace(
        &mut self,
        p: &MddHandle,
        q: &MddHandle,
        strict: bool,
    ) -> Result<MddHandle, MddError> {
        let pi = self.operand(p, MddError::InvalidMdd)?;
        let qi = self.operand(q, MddError::InvalidMdd)?;
        debug!("replace({}, {}, strict = {})", pi, qi, strict);
        let r = self.replace_rec(self.num_levels(), pi, qi, strict);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    /// Keep `p`'s values on the support of `q`, dropping everything else.
    pub fn project_onto(&mut self, p: &MddHandle, q: &MddHandle) -> Result<MddHandle, MddError> {
        let pi = self.operand(p, MddError::InvalidMdd)?;
        let qi = self.operand(q, MddError::InvalidMdd)?;
        debug!("project_onto({}, {})", pi, qi);
        let r = self.project_onto_rec(self.num_levels(), pi, qi);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    fn replace_rec(&mut self, k: Level, p: NodeIdx, q: NodeIdx, strict: bool) -> NodeIdx {
        if k == 0 {
            return if q != 0 && (!strict || p != 0) { q } else { p };
        }
        if q == 0 || p == q {
            return p;
        }
        if p == 0 {
            if strict {
                return 0;
            }
            return q;
        }
        let cached = if strict {
            self.replace_strict_cache[k].hit2(p, q)
        } else {
            self.replace_cache[k].hit2(p, q)
        };
        if let Some(r) = cached {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let qv = self.unpack_node(k, q);
        let r = self.new_node(k);
        for i in 0..=self.max_val(k) {
            let child = self.replace_rec(k - 1, pv[i as usize], qv[i as usize], strict);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        if strict {
            self.replace_strict_cache[k].add2(r, p, q);
        } else {
            self.replace_cache[k].add2(r, p, q);
        }
        r
    }

    fn project_onto_rec(&mut self, k: Level, p: NodeIdx, q: NodeIdx) -> NodeIdx {
        if k == 0 {
            return if q != 0 { p } else { 0 };
        }
        if p == 0 || q == 0 {
            return 0;
        }
        if p == q {
            return p;
        }
        if let Some(r) = self.project_onto_cache[k].hit2(p, q) {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let qv = self.unpack_node(k, q);
        let r = self.new_node(k);
        for i in 0..=self.max_val(k) {
            let child = self.project_onto_rec(k - 1, pv[i as usize], qv[i as usize]);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        self.project_onto_cache[k].add2(r, p, q);
        r
    }

    // -- Level shift ---------------------------------------------------------

    /// Shift every arc at level `target` up one value: value `v` becomes
    /// `v + 1`, the top value falls off the domain, and value 0 becomes
    /// default.
    pub fn shift(&mut self, p: &MddHandle, target: Level) -> Result<MddHandle, MddError> {
        if target < 1 || target > self.num_levels() {
            return Err(MddError::InvalidLevel);
        }
        let pi = self.operand(p, MddError::InvalidMdd)?;
        debug!("shift({}, target = {})", pi, target);
        let r = self.shift_rec(self.num_levels(), pi, target);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    fn shift_rec(&mut self, k: Level, p: NodeIdx, target: Level) -> NodeIdx {
        if p == 0 {
            return 0;
        }
        if let Some(r) = self.shift_cache[k].hit2(p, target as NodeIdx) {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let r = self.new_node(k);
        if k == target {
            // Sub-diagrams below the shifted level are reused as-is.
            for i in 0..self.max_val(k) {
                self.set_arc(k, r, i + 1, pv[i as usize]);
            }
        } else {
            for i in 0..=self.max_val(k) {
                let child = self.shift_rec(k - 1, pv[i as usize], target);
                self.set_arc(k, r, i, child);
            }
        }
        let r = self.check_in(k, r);
        self.shift_cache[k].add2(r, p, target as NodeIdx);
        r
    }

    // -- N-ary operations ----------------------------------------------------

    /// Combine any number of diagrams pointwise: the result maps each tuple
    /// to `func` applied to the operands' values for that tuple.
    ///
    /// `func` only computes a value from a value tuple; it has no access to
    /// the forest and cannot mutate it structurally.
    pub fn apply<F>(&mut self, roots: &[&MddHandle], func: F) -> Result<MddHandle, MddError>
    where
        F: Fn(&[Value]) -> Value,
    {
        let mut ops = Vec::with_capacity(roots.len());
        for h in roots {
            ops.push(self.operand(h, MddError::InvalidMdd)?);
        }
        debug!("apply({:?})", ops);
        let r = self.apply_rec(self.num_levels(), &ops, &func);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    fn apply_rec<F>(&mut self, k: Level, ops: &[NodeIdx], func: &F) -> NodeIdx
    where
        F: Fn(&[Value]) -> Value,
    {
        if k == 0 {
            let result = func(ops);
            assert!(
                result >= 0 && result <= self.max_val(0),
                "Combining function produced {} outside the terminal domain",
                result
            );
            return result;
        }
        if let Some(r) = self.apply_cache[k].hit(ops) {
            return r;
        }

        let views: Vec<Vec<NodeIdx>> = ops.iter().map(|&p| self.unpack_node(k, p)).collect();
        let r = self.new_node(k);
        let mut tuple = vec![0; ops.len()];
        for i in 0..=self.max_val(k) {
            for (slot, view) in tuple.iter_mut().zip(&views) {
                *slot = view[i as usize];
            }
            let child = self.apply_rec(k - 1, &tuple, func);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        self.apply_cache[k].add(r, ops);
        r
    }

    /// Route each tuple through one of `chains`: the result takes the value
    /// of `chains[s]` where `s` is the selector's value for the tuple. A
    /// selector value with no matching chain yields the default.
    pub fn select(
        &mut self,
        p: &MddHandle,
        chains: &[&MddHandle],
    ) -> Result<MddHandle, MddError> {
        let pi = self.operand(p, MddError::InvalidMdd)?;
        let mut chain_idx = Vec::with_capacity(chains.len());
        for h in chains {
            chain_idx.push(self.operand(h, MddError::InvalidMdd)?);
        }
        debug!("select({}, {:?})", pi, chain_idx);
        let r = self.select_rec(self.num_levels(), pi, &chain_idx);
        let h = self.attach(r);
        self.maybe_sweep();
        Ok(h)
    }

    fn select_rec(&mut self, k: Level, p: NodeIdx, chains: &[NodeIdx]) -> NodeIdx {
        if k == 0 {
            let s = p as usize;
            return if s < chains.len() { chains[s] } else { 0 };
        }
        if let Some(r) = self.select_cache[k].hit_with(p, chains) {
            return r;
        }

        let pv = self.unpack_node(k, p);
        let views: Vec<Vec<NodeIdx>> = chains.iter().map(|&c| self.unpack_node(k, c)).collect();
        let r = self.new_node(k);
        let mut children = vec![0; chains.len()];
        for i in 0..=self.max_val(k) {
            for (slot, view) in children.iter_mut().zip(&views) {
                *slot = view[i as usize];
            }
            let child = self.select_rec(k - 1, pv[i as usize], &children);
            self.set_arc(k, r, i, child);
        }
        let r = self.check_in(k, r);
        self.select_cache[k].add_with(r, p, chains);
        r
    }

    // -- Construction and queries -------------------------------------------

    /// Build the diagram mapping every tuple inside the per-level ranges
    /// `low[k]..=high[k]` to the value `low[0]`, and everything else to the
    /// default. `low` and `high` span `0..=K`.
    pub fn mdd_from_range(
        &mut self,
        low: &[Value],
        high: &[Value],
    ) -> Result<MddHandle, MddError> {
        let kk = self.num_levels();
        if low.len() != kk + 1 || high.len() != kk + 1 {
            return Err(MddError::TupleOutOfBounds);
        }
        if low[0] < 0 || low[0] > self.max_val(0) {
            return Err(MddError::TupleOutOfBounds);
        }
        for k in 1..=kk {
            if low[k] < 0 || low[k] > high[k] || high[k] > self.max_val(k) {
                return Err(MddError::TupleOutOfBounds);
            }
        }

        let mut child = low[0];
        for k in 1..=kk {
            let p = self.new_node(k);
            for v in low[k]..=high[k] {
                self.set_arc(k, p, v, child);
            }
            child = self.check_in(k, p);
        }
        Ok(self.attach(child))
    }

    /// Override `root`'s mapping on the given ranges with the value
    /// `low[0]` and return the combined diagram.
    pub fn assign(
        &mut self,
        root: &MddHandle,
        low: &[Value],
        high: &[Value],
    ) -> Result<MddHandle, MddError> {
        let pi = self.operand(root, MddError::InvalidMdd)?;
        let range = self.mdd_from_range(low, high)?;
        let ri = self.root_index(&range).expect("Fresh handle");
        let r = self.replace_rec(self.num_levels(), pi, ri, false);
        let h = self.attach(r);
        self.destroy_mdd(range);
        self.maybe_sweep();
        Ok(h)
    }

    /// Does `root` map the tuple to a non-default value?
    pub fn is_element_of(&self, root: &MddHandle, tuple: &[Value]) -> Result<bool, MddError> {
        Ok(self.value(root, tuple)? != 0)
    }

    /// The value `root` maps the tuple to. `tuple` spans `0..=K`; the
    /// terminal slot is ignored.
    pub fn value(&self, root: &MddHandle, tuple: &[Value]) -> Result<Value, MddError> {
        let kk = self.num_levels();
        let mut cur = self.operand(root, MddError::InvalidMdd)?;
        if tuple.len() != kk + 1 {
            return Err(MddError::TupleOutOfBounds);
        }
        for k in (1..=kk).rev() {
            let v = tuple[k];
            if v < 0 || v > self.max_val(k) {
                return Err(MddError::TupleOutOfBounds);
            }
            cur = self.arenas[k].arc_for_value(cur, v);
        }
        Ok(cur)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::types::GarbageAlgorithm;

    /// Three levels over {0..=3}, boolean-ish terminals {0, 1}.
    fn filter_forest() -> Forest {
        Forest::new(3, &[1, 3, 3, 3])
    }

    /// A single tuple mapped to `val`; `tup[0]` is ignored.
    fn tuple_mdd(f: &mut Forest, tup: &[Value], val: Value) -> MddHandle {
        let mut low = tup.to_vec();
        let mut high = tup.to_vec();
        low[0] = val;
        high[0] = val;
        f.mdd_from_range(&low, &high).unwrap()
    }

    #[test]
    fn test_range_membership() {
        let mut f = filter_forest();
        let h = f
            .mdd_from_range(&[1, 0, 1, 2], &[1, 3, 2, 3])
            .unwrap();

        assert!(f.is_element_of(&h, &[0, 0, 1, 2]).unwrap());
        assert!(f.is_element_of(&h, &[0, 3, 2, 3]).unwrap());
        assert!(!f.is_element_of(&h, &[0, 0, 0, 2]).unwrap());
        assert!(!f.is_element_of(&h, &[0, 0, 1, 1]).unwrap());
        assert_eq!(f.value(&h, &[0, 2, 1, 3]).unwrap(), 1);
        assert_eq!(f.value(&h, &[0, 2, 3, 3]).unwrap(), 0);
    }

    #[test]
    fn test_range_validation() {
        let mut f = filter_forest();
        assert_eq!(
            f.mdd_from_range(&[1, 0, 0], &[1, 3, 3]),
            Err(MddError::TupleOutOfBounds)
        );
        assert_eq!(
            f.mdd_from_range(&[1, 0, 0, 5], &[1, 3, 3, 5]),
            Err(MddError::TupleOutOfBounds)
        );
        assert_eq!(
            f.mdd_from_range(&[1, 2, 0, 0], &[1, 1, 3, 3]),
            Err(MddError::TupleOutOfBounds)
        );
        // A rejected construction leaves the forest unchanged.
        for k in 1..=3 {
            assert_eq!(f.node_count(k), 0);
        }
    }

    #[test]
    fn test_max_is_union() {
        let mut f = filter_forest();
        let a = tuple_mdd(&mut f, &[0, 1, 1, 1], 1);
        let b = tuple_mdd(&mut f, &[0, 2, 2, 2], 1);

        let u = f.max(&a, &b).unwrap();
        assert!(f.is_element_of(&u, &[0, 1, 1, 1]).unwrap());
        assert!(f.is_element_of(&u, &[0, 2, 2, 2]).unwrap());
        assert!(!f.is_element_of(&u, &[0, 1, 2, 1]).unwrap());
    }

    #[test]
    fn test_min_is_intersection() {
        let mut f = filter_forest();
        let a = f.mdd_from_range(&[1, 0, 0, 0], &[1, 2, 3, 3]).unwrap();
        let b = f.mdd_from_range(&[1, 1, 0, 0], &[1, 3, 3, 3]).unwrap();

        let i = f.min(&a, &b).unwrap();
        assert!(f.is_element_of(&i, &[0, 1, 0, 3]).unwrap());
        assert!(f.is_element_of(&i, &[0, 2, 3, 0]).unwrap());
        assert!(!f.is_element_of(&i, &[0, 0, 0, 0]).unwrap());
        assert!(!f.is_element_of(&i, &[0, 3, 0, 0]).unwrap());
    }

    #[test]
    fn test_operations_share_canonical_results() {
        let mut f = filter_forest();
        let a = tuple_mdd(&mut f, &[0, 1, 1, 1], 1);
        let b = tuple_mdd(&mut f, &[0, 2, 2, 2], 1);

        let u1 = f.max(&a, &b).unwrap();
        let u2 = f.max(&a, &b).unwrap();
        let u3 = f.max(&b, &a).unwrap();
        assert_eq!(f.root_index(&u1), f.root_index(&u2));
        // Commutative inputs reach the same canonical node.
        assert_eq!(f.root_index(&u1), f.root_index(&u3));
    }

    #[test]
    fn test_complement_flips_membership() {
        let mut f = filter_forest();
        let a = tuple_mdd(&mut f, &[0, 1, 2, 3], 1);

        let c = f.complement(&a).unwrap();
        assert!(!f.is_element_of(&c, &[0, 1, 2, 3]).unwrap());
        assert!(f.is_element_of(&c, &[0, 0, 0, 0]).unwrap());
        assert!(f.is_element_of(&c, &[0, 3, 3, 3]).unwrap());

        // An involution, down to the canonical root index.
        let cc = f.complement(&c).unwrap();
        assert_eq!(f.root_index(&cc), f.root_index(&a));
    }

    #[test]
    fn test_complement_of_empty_is_saturated() {
        let mut f = filter_forest();
        let empty = f.mdd_from_range(&[0, 0, 0, 0], &[0, 3, 3, 3]).unwrap();
        assert_eq!(f.root_index(&empty), Some(0));

        let all = f.complement(&empty).unwrap();
        assert!(f.is_element_of(&all, &[0, 0, 0, 0]).unwrap());
        assert!(f.is_element_of(&all, &[0, 3, 3, 3]).unwrap());
        assert!(f.is_element_of(&all, &[0, 2, 0, 1]).unwrap());

        let none = f.complement(&all).unwrap();
        assert_eq!(f.root_index(&none), Some(0));
    }

    #[test]
    fn test_binary_complement_inverts_values() {
        let mut f = Forest::new(2, &[5, 2, 2]);
        let a = tuple_mdd(&mut f, &[0, 1, 1], 4);

        let c = f.binary_complement(&a).unwrap();
        assert_eq!(f.value(&c, &[0, 1, 1]).unwrap(), 1);
        // Tuples mapped to 0 invert to the top terminal value.
        assert_eq!(f.value(&c, &[0, 0, 0]).unwrap(), 5);
    }

    #[test]
    fn test_less_than_thresholds_values() {
        let mut f = Forest::new(2, &[5, 2, 2]);
        let a = tuple_mdd(&mut f, &[0, 1, 1], 4);
        let b = tuple_mdd(&mut f, &[0, 2, 2], 2);
        let s = f.max(&a, &b).unwrap();

        let lt = f.less_than(&s, 3).unwrap();
        assert_eq!(f.value(&lt, &[0, 1, 1]).unwrap(), 0); // 4 >= 3
        assert_eq!(f.value(&lt, &[0, 2, 2]).unwrap(), 1); // 2 < 3
        assert_eq!(f.value(&lt, &[0, 0, 0]).unwrap(), 1); // 0 < 3
    }

    #[test]
    fn test_val_restrict_keeps_one_value() {
        let mut f = Forest::new(2, &[5, 2, 2]);
        let a = tuple_mdd(&mut f, &[0, 1, 1], 4);
        let b = tuple_mdd(&mut f, &[0, 2, 2], 2);
        let s = f.max(&a, &b).unwrap();

        let only4 = f.val_restrict(&s, 4).unwrap();
        assert_eq!(f.value(&only4, &[0, 1, 1]).unwrap(), 4);
        assert_eq!(f.value(&only4, &[0, 2, 2]).unwrap(), 0);
    }

    #[test]
    fn test_replace_overrides() {
        let mut f = Forest::new(2, &[5, 2, 2]);
        let base = f.mdd_from_range(&[1, 0, 0], &[1, 2, 2]).unwrap();
        let patch = tuple_mdd(&mut f, &[0, 1, 1], 4);

        let merged = f.replace(&base, &patch, false).unwrap();
        assert_eq!(f.value(&merged, &[0, 1, 1]).unwrap(), 4);
        assert_eq!(f.value(&merged, &[0, 0, 0]).unwrap(), 1);

        // Strict: the patch only lands where the base is defined.
        let narrow = tuple_mdd(&mut f, &[0, 1, 2], 3);
        let sparse_base = tuple_mdd(&mut f, &[0, 2, 2], 2);
        let strict = f.replace(&sparse_base, &narrow, true).unwrap();
        assert_eq!(f.value(&strict, &[0, 1, 2]).unwrap(), 0);
        assert_eq!(f.value(&strict, &[0, 2, 2]).unwrap(), 2);
    }

    #[test]
    fn test_project_onto_masks_support() {
        let mut f = Forest::new(2, &[5, 2, 2]);
        let base = f.mdd_from_range(&[3, 0, 0], &[3, 2, 2]).unwrap();
        let mask = tuple_mdd(&mut f, &[0, 1, 1], 1);

        let proj = f.project_onto(&base, &mask).unwrap();
        assert_eq!(f.value(&proj, &[0, 1, 1]).unwrap(), 3);
        assert_eq!(f.value(&proj, &[0, 0, 0]).unwrap(), 0);
    }

    #[test]
    fn test_shift_moves_values_up() {
        let mut f = filter_forest();
        let a = tuple_mdd(&mut f, &[0, 1, 2, 0], 1);

        let s = f.shift(&a, 2).unwrap();
        assert!(f.is_element_of(&s, &[0, 1, 3, 0]).unwrap());
        assert!(!f.is_element_of(&s, &[0, 1, 2, 0]).unwrap());

        // The top value falls off the domain.
        let b = tuple_mdd(&mut f, &[0, 1, 3, 0], 1);
        let gone = f.shift(&b, 2).unwrap();
        assert_eq!(f.root_index(&gone), Some(0));

        assert_eq!(f.shift(&a, 9), Err(MddError::InvalidLevel));
    }

    #[test]
    fn test_apply_matches_builtin_max() {
        let mut f = filter_forest();
        let a = tuple_mdd(&mut f, &[0, 1, 1, 1], 1);
        let b = tuple_mdd(&mut f, &[0, 2, 2, 2], 1);

        let via_apply = f
            .apply(&[&a, &b], |vals| vals.iter().copied().max().unwrap_or(0))
            .unwrap();
        let builtin = f.max(&a, &b).unwrap();
        assert_eq!(f.root_index(&via_apply), f.root_index(&builtin));
    }

    #[test]
    fn test_select_routes_by_selector() {
        let mut f = Forest::new(2, &[3, 2, 2]);
        // Selector: tuple (1,1) -> 1, everything else -> 0.
        let sel = tuple_mdd(&mut f, &[0, 1, 1], 1);
        // Chain 0 maps everything to 2; chain 1 maps everything to 3.
        let chain0 = f.mdd_from_range(&[2, 0, 0], &[2, 2, 2]).unwrap();
        let chain1 = f.mdd_from_range(&[3, 0, 0], &[3, 2, 2]).unwrap();

        let routed = f.select(&sel, &[&chain0, &chain1]).unwrap();
        assert_eq!(f.value(&routed, &[0, 1, 1]).unwrap(), 3);
        assert_eq!(f.value(&routed, &[0, 0, 0]).unwrap(), 2);
        assert_eq!(f.value(&routed, &[0, 2, 1]).unwrap(), 2);
    }

    #[test]
    fn test_assign_overrides_ranges() {
        let mut f = Forest::new(2, &[5, 3, 3]);
        let base = f.mdd_from_range(&[1, 0, 0], &[1, 3, 3]).unwrap();

        let patched = f.assign(&base, &[4, 1, 1], &[4, 2, 2]).unwrap();
        assert_eq!(f.value(&patched, &[0, 1, 1]).unwrap(), 4);
        assert_eq!(f.value(&patched, &[0, 2, 2]).unwrap(), 4);
        assert_eq!(f.value(&patched, &[0, 0, 0]).unwrap(), 1);
        assert_eq!(f.value(&patched, &[0, 3, 3]).unwrap(), 1);
    }

    #[test]
    fn test_destroyed_operand_reports_per_operation() {
        let mut f = filter_forest();
        let a = tuple_mdd(&mut f, &[0, 1, 1, 1], 1);
        let b = tuple_mdd(&mut f, &[0, 2, 2, 2], 1);
        let dead = tuple_mdd(&mut f, &[0, 3, 3, 3], 1);
        let slot = dead.slot();
        f.destroy_mdd(dead);
        // A stale alias of the destroyed handle.
        let dead = MddHandle::new(slot);

        assert_eq!(f.max(&a, &dead).unwrap_err(), MddError::MaxFailed);
        assert_eq!(f.min(&dead, &b).unwrap_err(), MddError::MinFailed);
        assert_eq!(
            f.complement(&dead).unwrap_err(),
            MddError::ComplementFailed
        );
        assert_eq!(
            f.replace(&a, &dead, false).unwrap_err(),
            MddError::InvalidMdd
        );
    }

    #[test]
    fn test_prune_reclaims_abandoned_results() {
        let mut f = filter_forest();
        f.set_garbage_collection(GarbageAlgorithm::Lazy, 1_000_000);

        let a = tuple_mdd(&mut f, &[0, 1, 1, 1], 1);
        let b = tuple_mdd(&mut f, &[0, 2, 2, 2], 1);
        let u = f.max(&a, &b).unwrap();
        f.destroy_mdd(u);
        f.destroy_mdd(b);

        f.prune();
        // Only `a`'s spine remains: one node per level.
        for k in 1..=3 {
            assert_eq!(f.node_count(k), 1, "level {}", k);
        }
        assert!(f.is_element_of(&a, &[0, 1, 1, 1]).unwrap());
    }
}
