//! Batch coalescing: merging independent graphs into one renumbered structure.
//!
//! Batched attention wants a single block-diagonal adjacency over the whole
//! batch rather than per-example padding. [`coalesce`] renumbers every
//! graph's nodes by a running offset and concatenates the fields;
//! [`inject_cls_node`] and [`symmetrize`] are the two independent structural
//! transforms applied around it.

use std::collections::HashSet;

use crate::error::{CoreError, CoreResult};
use crate::graph::{Edge, EdgeTypeId, Graph, NodeId, VocabId};

/// A batch of graphs merged into one globally-renumbered structure.
///
/// `key_node_groups` preserves the per-graph grouping of the (now-global)
/// key node ids so callers can recover per-example slices after a global
/// computation; `position_ids` restart at 0 for each graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescedBatch {
    pub edges: Vec<Edge>,
    pub edge_types: Vec<EdgeTypeId>,
    pub key_node_groups: Vec<Vec<NodeId>>,
    pub node_to_vocab_id: Vec<VocabId>,
    pub position_ids: Vec<usize>,
}

impl CoalescedBatch {
    /// Total node count across the batch.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.node_to_vocab_id.len()
    }
}

/// Merge an ordered sequence of graphs into one [`CoalescedBatch`].
///
/// Every graph's node ids are shifted by the cumulative node count of the
/// graphs before it; edge types are carried through unchanged. Well-formed
/// input never fails here beyond the resolution check — dangling node
/// references are the producer's responsibility and are not re-validated.
///
/// # Errors
///
/// Returns [`CoreError::UnresolvedGraph`] if any graph still lacks
/// vocabulary ids, since node counts are unknown without them.
pub fn coalesce(graphs: &[Graph]) -> CoreResult<CoalescedBatch> {
    let mut edges = Vec::new();
    let mut edge_types = Vec::new();
    let mut key_node_groups = Vec::with_capacity(graphs.len());
    let mut node_to_vocab_id = Vec::new();
    let mut position_ids = Vec::new();

    let mut offset = 0usize;
    for (index, graph) in graphs.iter().enumerate() {
        let vocab_ids = graph.node_to_vocab_id().ok_or(CoreError::UnresolvedGraph {
            context: format!("graph {} in batch of {}", index, graphs.len()),
        })?;

        node_to_vocab_id.extend_from_slice(vocab_ids);
        edges.extend(
            graph
                .edges()
                .iter()
                .map(|&(src, dst)| (src + offset, dst + offset)),
        );
        edge_types.extend_from_slice(graph.edge_types());
        key_node_groups.push(graph.key_nodes().iter().map(|&k| k + offset).collect());
        position_ids.extend(0..vocab_ids.len());

        offset += vocab_ids.len();
    }

    Ok(CoalescedBatch {
        edges,
        edge_types,
        key_node_groups,
        node_to_vocab_id,
        position_ids,
    })
}

/// Connect every key node to a fresh CLS aggregation node.
///
/// Appends one node carrying `cls_vocab_id`, adds a `(key_node, cls_node)`
/// edge of type `cls_edge_type` for each key node, and replaces `key_nodes`
/// with the singleton CLS node — after injection every graph contributes
/// exactly one key row, which makes downstream pooling trivial.
///
/// # Errors
///
/// Returns [`CoreError::PrecursorViolation`] if the graph is unresolved or
/// if `cls_vocab_id` is already present among the node vocabulary ids: the
/// CLS id must be reserved, never an ordinary token. In particular,
/// injecting twice with the same id fails the second time.
pub fn inject_cls_node(
    graph: &Graph,
    cls_vocab_id: VocabId,
    cls_edge_type: EdgeTypeId,
) -> CoreResult<Graph> {
    let vocab_ids = graph
        .node_to_vocab_id()
        .ok_or_else(|| CoreError::precursor("cannot inject a CLS node into an unresolved graph"))?;
    if vocab_ids.contains(&cls_vocab_id) {
        return Err(CoreError::precursor(format!(
            "CLS vocabulary id {} already present in graph",
            cls_vocab_id
        )));
    }

    let cls_node = vocab_ids.len();
    let mut new_vocab_ids = vocab_ids.to_vec();
    new_vocab_ids.push(cls_vocab_id);

    let mut new_edges = graph.edges().to_vec();
    let mut new_edge_types = graph.edge_types().to_vec();
    for &key_node in graph.key_nodes() {
        new_edges.push((key_node, cls_node));
        new_edge_types.push(cls_edge_type);
    }

    Graph::new(new_edges, new_edge_types, vec![cls_node], Some(new_vocab_ids))
}

/// Turn a directed edge list into its undirected closure.
///
/// Each edge is canonicalized by swapping endpoints so `source <= target`,
/// then deduplicated by canonical pair. When duplicates carry conflicting
/// types the first occurrence wins and later types are silently dropped —
/// extraction legitimately produces near-duplicate relations, so this is a
/// documented tie-break, not an error.
///
/// The output lists every surviving canonical edge followed by all the
/// reverses, so its length is exactly twice the number of distinct
/// undirected pairs. The ordering is *not* a stable merge of the input
/// order; callers comparing edge lists should treat the result as a set.
#[must_use]
pub fn symmetrize(edges: &[Edge], edge_types: &[EdgeTypeId]) -> (Vec<Edge>, Vec<EdgeTypeId>) {
    debug_assert_eq!(edges.len(), edge_types.len());

    let mut seen: HashSet<Edge> = HashSet::with_capacity(edges.len());
    let mut canonical: Vec<Edge> = Vec::with_capacity(edges.len());
    let mut canonical_types: Vec<EdgeTypeId> = Vec::with_capacity(edges.len());

    for (&(src, dst), &ty) in edges.iter().zip(edge_types) {
        let pair = if src <= dst { (src, dst) } else { (dst, src) };
        if seen.insert(pair) {
            canonical.push(pair);
            canonical_types.push(ty);
        }
    }

    let mut out_edges = canonical.clone();
    out_edges.extend(canonical.iter().map(|&(a, b)| (b, a)));
    let mut out_types = canonical_types.clone();
    out_types.extend_from_slice(&canonical_types);

    (out_edges, out_types)
}
