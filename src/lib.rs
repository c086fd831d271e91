//! # mdd-rs: Multi-valued Decision Diagrams in Rust
//!
//! **`mdd-rs`** is a manager-centric library for working with **Multi-valued
//! Decision Diagrams (MDDs)**: canonical, node-shared representations of
//! large discrete functions and relations over `K` ordered variables, each
//! with a bounded integer domain.
//!
//! ## What is an MDD?
//!
//! An MDD generalizes a BDD from binary variables to bounded integer
//! domains. Each level of the diagram tests one variable; an arc per domain
//! value leads one level down, until a terminal value is reached. Because
//! structurally identical sub-diagrams are stored exactly once
//! (hash consing), enormous tuple sets — routing tables, filter rule sets,
//! reachable state spaces — compress into a few thousand shared nodes.
//!
//! ## Key Features
//!
//! - **Forest-Centric Architecture**: All operations go through the
//!   [`Forest`][crate::forest::Forest] manager, which owns per-level arenas,
//!   canonical tables, and operation caches. This ensures structural sharing
//!   and maintains the canonical form invariant.
//! - **Two arc encodings**: nodes store their arcs densely (one slot per
//!   domain value) or sparsely (value/child pairs), chosen per node when it
//!   is canonicalized.
//! - **Reference counting with strict or lazy collection**, plus compaction
//!   that physically relocates survivors and remaps outstanding handles.
//! - **Performance First**: Built-in per-level operation caching ensures
//!   that redundant recursive computations are avoided.
//!
//! ## Basic Usage
//!
//! ```rust
//! use mdd_rs::forest::Forest;
//!
//! // 1. Two levels over {0..=3}, boolean terminals.
//! let mut forest = Forest::new(2, &[1, 3, 3]);
//!
//! // 2. Two tuple ranges, mapped to 1.
//! let a = forest.mdd_from_range(&[1, 0, 1], &[1, 2, 1]).unwrap();
//! let b = forest.mdd_from_range(&[1, 3, 0], &[1, 3, 3]).unwrap();
//!
//! // 3. Combine them set-wise.
//! let union = forest.max(&a, &b).unwrap();
//!
//! // 4. Query membership (tuple slot 0 is the terminal placeholder).
//! assert!(forest.is_element_of(&union, &[0, 1, 1]).unwrap());
//! assert!(forest.is_element_of(&union, &[0, 3, 2]).unwrap());
//! assert!(!forest.is_element_of(&union, &[0, 0, 0]).unwrap());
//! ```
//!
//! ## Core Components
//!
//! - **[`forest`]**: The heart of the library — the [`Forest`][crate::forest::Forest]
//!   manager: node construction, canonicalization, collection, compaction.
//! - **[`ops`]**: The recursive set operations (max/min, complements,
//!   filters, replace, N-ary apply/select).
//! - **[`arena`] / [`unique`] / [`cache`]**: the storage, identity, and
//!   memoization layers beneath the manager.
//! - **[`display`]**: range-compressed listings and Graphviz export.
//! - **[`io`]**: saving and loading rooted diagrams.

pub mod arena;
pub mod cache;
pub mod count;
pub mod display;
pub mod forest;
pub mod handle;
pub mod io;
pub mod node;
pub mod ops;
pub mod types;
pub mod unique;
pub mod utils;
