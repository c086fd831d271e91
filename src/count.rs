//! Size statistics: node counts, tuple cardinality, memory footprint.

use std::collections::{HashMap, HashSet};

use num_bigint::BigUint;

use crate::forest::Forest;
use crate::handle::MddHandle;
use crate::types::{Level, MddError, NodeIdx};

impl Forest {
    /// Number of distinct nodes reachable from `root` (the implicit zero
    /// node not counted).
    pub fn count_nodes(&self, root: &MddHandle) -> Result<usize, MddError> {
        let top = self.num_levels();
        let r = self.root_index(root).ok_or(MddError::InvalidMdd)?;
        if r == 0 {
            return Ok(0);
        }

        let mut seen: HashSet<(Level, NodeIdx)> = HashSet::new();
        let mut stack = vec![(top, r)];
        while let Some((k, p)) = stack.pop() {
            if !seen.insert((k, p)) {
                continue;
            }
            if k == 1 {
                continue;
            }
            for c in self.unpack_node(k, p) {
                if c != 0 && !seen.contains(&(k - 1, c)) {
                    stack.push((k - 1, c));
                }
            }
        }
        Ok(seen.len())
    }

    /// Number of tuples `root` maps to a non-default value.
    pub fn count_tuples(&self, root: &MddHandle) -> Result<BigUint, MddError> {
        let r = self.root_index(root).ok_or(MddError::InvalidMdd)?;
        let mut cache = HashMap::new();
        Ok(self.count_tuples_rec(self.num_levels(), r, &mut cache))
    }

    fn count_tuples_rec(
        &self,
        k: Level,
        p: NodeIdx,
        cache: &mut HashMap<(Level, NodeIdx), BigUint>,
    ) -> BigUint {
        if k == 0 {
            return if p != 0 {
                BigUint::from(1u32)
            } else {
                BigUint::ZERO
            };
        }
        if p == 0 {
            return BigUint::ZERO;
        }
        if let Some(count) = cache.get(&(k, p)) {
            return count.clone();
        }

        let mut total = BigUint::ZERO;
        for c in self.unpack_node(k, p) {
            total += self.count_tuples_rec(k - 1, c, cache);
        }
        cache.insert((k, p), total.clone());
        total
    }

    /// Rough memory footprint of the forest's arenas, in bytes.
    pub fn mem_used(&self) -> usize {
        let mut total = 0;
        for k in 1..=self.num_levels() {
            total += self.last(k) * std::mem::size_of::<crate::node::Node>();
            total += self.arena_arcs_len(k) * std::mem::size_of::<NodeIdx>();
        }
        total
    }

    pub(crate) fn arena_arcs_len(&self, k: Level) -> usize {
        self.arenas[k].arcs_len()
    }
}
