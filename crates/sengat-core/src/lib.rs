//! Core domain types for sentence-graph classification.
//!
//! A sentence arrives here already converted (by an external extraction
//! service) into a small directed graph: tokens as nodes, typed linguistic
//! relations as edges. This crate defines:
//!
//! - [`Graph`] — the immutable per-sentence value type and its invariants
//! - [`graph::coalesce`] — merging a batch of graphs into one renumbered
//!   structure, plus the CLS-injection and undirected-symmetrization
//!   transforms applied before batching
//! - Error types shared by the downstream crates
//!
//! Everything in this crate is a pure function over immutable inputs; there
//! is no shared mutable state and no I/O.

pub mod error;
pub mod graph;

pub use error::{CoreError, CoreResult};
pub use graph::coalesce::{coalesce, inject_cls_node, symmetrize, CoalescedBatch};
pub use graph::{Edge, EdgeTypeId, Graph, NodeId, VocabId};
