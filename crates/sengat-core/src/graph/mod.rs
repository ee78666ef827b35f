//! The per-sentence graph value type.

pub mod coalesce;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::error::{CoreError, CoreResult};

/// Node identifier, local to one graph (0-based, dense).
pub type NodeId = usize;

/// Integer label on an edge, indexing an edge-type embedding table.
pub type EdgeTypeId = usize;

/// A directed `(source, target)` pair.
pub type Edge = (NodeId, NodeId);

/// Global vocabulary id carried by a node.
pub type VocabId = usize;

/// One sentence's structure prior to batching.
///
/// Nodes are tokens, edges are typed linguistic relations. A subset of nodes
/// is marked "key" (e.g. syntactic heads); after CLS injection those collapse
/// into a single synthetic aggregation node per graph.
///
/// A `Graph` is immutable: every transform
/// ([`coalesce::inject_cls_node`], [`coalesce::symmetrize`]) produces a new
/// instance. Equality and hashing are field-wise and order-sensitive, which
/// makes a `Graph` usable directly as a memo-map key; callers that memoize
/// per-graph results own the map and its (unbounded) growth.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Graph {
    edges: Vec<Edge>,
    edge_types: Vec<EdgeTypeId>,
    key_nodes: Vec<NodeId>,
    node_to_vocab_id: Option<Vec<VocabId>>,
}

impl Graph {
    /// Create a graph, checking the cheap structural invariants.
    ///
    /// Checked here: `edges` and `edge_types` have equal length, `key_nodes`
    /// is non-empty, and — once vocabulary ids are resolved — every node
    /// referenced by `edges` or `key_nodes` is in range.
    ///
    /// Not checked: node references in an *unresolved* graph. Producers are
    /// responsible for handing over dense, in-range node ids; re-validating
    /// on every construction would put a scan on the batching hot path.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PrecursorViolation`] on any invariant breach.
    pub fn new(
        edges: Vec<Edge>,
        edge_types: Vec<EdgeTypeId>,
        key_nodes: Vec<NodeId>,
        node_to_vocab_id: Option<Vec<VocabId>>,
    ) -> CoreResult<Self> {
        if edges.len() != edge_types.len() {
            return Err(CoreError::precursor(format!(
                "edges ({}) and edge_types ({}) must have equal length",
                edges.len(),
                edge_types.len()
            )));
        }
        if key_nodes.is_empty() {
            return Err(CoreError::precursor("key_nodes must be non-empty"));
        }
        if let Some(ref vocab_ids) = node_to_vocab_id {
            let num_nodes = vocab_ids.len();
            let out_of_range = edges
                .iter()
                .flat_map(|&(src, dst)| [src, dst])
                .chain(key_nodes.iter().copied())
                .find(|&node| node >= num_nodes);
            if let Some(node) = out_of_range {
                return Err(CoreError::precursor(format!(
                    "node id {} out of range for graph with {} nodes",
                    node, num_nodes
                )));
            }
        }
        Ok(Self {
            edges,
            edge_types,
            key_nodes,
            node_to_vocab_id,
        })
    }

    /// Ordered `(source, target)` pairs.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edge-type ids, parallel to [`Self::edges`].
    #[must_use]
    pub fn edge_types(&self) -> &[EdgeTypeId] {
        &self.edge_types
    }

    /// Nodes designated important for pooling.
    #[must_use]
    pub fn key_nodes(&self) -> &[NodeId] {
        &self.key_nodes
    }

    /// Per-node global vocabulary ids, if resolved.
    #[must_use]
    pub fn node_to_vocab_id(&self) -> Option<&[VocabId]> {
        self.node_to_vocab_id.as_deref()
    }

    /// Node count, known only once vocabulary ids are resolved.
    #[must_use]
    pub fn num_nodes(&self) -> Option<usize> {
        self.node_to_vocab_id.as_ref().map(Vec::len)
    }

    /// Whether vocabulary ids have been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.node_to_vocab_id.is_some()
    }

    /// Produce a resolved copy of this graph.
    ///
    /// # Errors
    ///
    /// Fails if any existing node reference is out of range for `vocab_ids`.
    pub fn with_vocab_ids(&self, vocab_ids: Vec<VocabId>) -> CoreResult<Self> {
        Self::new(
            self.edges.clone(),
            self.edge_types.clone(),
            self.key_nodes.clone(),
            Some(vocab_ids),
        )
    }

    /// xxh64 fingerprint over all four fields.
    ///
    /// Stable across runs for equal graphs; intended as the key of
    /// caller-owned memo maps where hauling the full `Graph` around is
    /// undesirable.
    #[must_use]
    pub fn structural_key(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        for &(src, dst) in &self.edges {
            hasher.update(&(src as u64).to_le_bytes());
            hasher.update(&(dst as u64).to_le_bytes());
        }
        hasher.update(b"|");
        for &ty in &self.edge_types {
            hasher.update(&(ty as u64).to_le_bytes());
        }
        hasher.update(b"|");
        for &node in &self.key_nodes {
            hasher.update(&(node as u64).to_le_bytes());
        }
        hasher.update(b"|");
        if let Some(ref vocab_ids) = self.node_to_vocab_id {
            for &id in vocab_ids {
                hasher.update(&(id as u64).to_le_bytes());
            }
        }
        hasher.digest()
    }
}
