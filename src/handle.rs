//! External root handles.
//!
//! Clients never hold node indices directly: indices change identity under
//! compaction. An `MddHandle` instead names a slot in the forest's root
//! registry; the registry entry tracks the current index of the attached
//! root, and compaction rewrites registry entries in place, so an
//! outstanding handle survives relocation untouched.
//!
//! A handle is deliberately neither `Copy` nor `Clone`: duplicating one
//! without going through [`Forest::attach`](crate::forest::Forest::attach)
//! would undercount references. Destroy a handle with
//! [`Forest::destroy_mdd`](crate::forest::Forest::destroy_mdd); a handle
//! dropped without detaching keeps its root alive until `prune` runs.

use std::fmt;

/// An opaque client-held reference to a diagram root at the top level.
#[derive(Debug, Eq, PartialEq)]
pub struct MddHandle {
    slot: usize,
}

impl MddHandle {
    pub(crate) fn new(slot: usize) -> Self {
        Self { slot }
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }
}

impl fmt::Display for MddHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mdd#{}", self.slot)
    }
}
