//! SimilarityGraph - the per-build graph model.
//!
//! Topology is stored in petgraph's StableGraph (undirected, weighted by
//! similarity) and never changes after a build. Positions and velocities live
//! in SoA (Structure of Arrays) buffers that the layout simulation mutates
//! every tick and the host can upload without copying.

use std::collections::HashMap;

use log::warn;
use petgraph::Undirected;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use super::edge::{PairKey, SimilarityEdge};
use super::input::GraphInput;
use super::node::{KeywordNode, NodeId};

/// Counts of input records dropped while building a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    /// Nodes whose id was already present.
    pub dropped_duplicate_nodes: usize,
    /// Edges with an endpoint that is not in the node set.
    pub dropped_unknown: usize,
    /// Edges from a node to itself.
    pub dropped_self_loops: usize,
    /// Second and later edges for the same unordered pair.
    pub dropped_duplicates: usize,
    /// Edges with a non-finite similarity.
    pub dropped_invalid_similarity: usize,
}

impl BuildReport {
    /// Total number of dropped records.
    pub fn total_dropped(&self) -> usize {
        self.dropped_duplicate_nodes
            + self.dropped_unknown
            + self.dropped_self_loops
            + self.dropped_duplicates
            + self.dropped_invalid_similarity
    }
}

/// The keyword similarity graph.
///
/// This struct manages:
/// - Graph topology via petgraph (adjacency index for hover and detection)
/// - Node metadata (key, label, embedding, kind, cluster, flags)
/// - Position/velocity buffers in SoA layout
/// - Key lookup from the source's string ids to dense NodeIds
pub struct SimilarityGraph {
    /// Topology. Node weights are the dense NodeId, edge weights the similarity.
    graph: StableGraph<NodeId, SimilarityEdge, Undirected>,

    /// Node metadata indexed by NodeId.
    nodes: Vec<KeywordNode>,

    /// Map from the source's string id to NodeId.
    key_to_id: HashMap<String, NodeId>,

    /// X positions (SoA layout)
    pos_x: Vec<f32>,

    /// Y positions (SoA layout)
    pos_y: Vec<f32>,

    /// X velocities (SoA layout)
    vel_x: Vec<f32>,

    /// Y velocities (SoA layout)
    vel_y: Vec<f32>,

    /// Whether the source supplied an initial position for the node.
    has_initial_position: Vec<bool>,
}

impl SimilarityGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Create a graph with pre-allocated capacity.
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        Self {
            graph: StableGraph::with_capacity(node_capacity, edge_capacity),
            nodes: Vec::with_capacity(node_capacity),
            key_to_id: HashMap::with_capacity(node_capacity),
            pos_x: Vec::with_capacity(node_capacity),
            pos_y: Vec::with_capacity(node_capacity),
            vel_x: Vec::with_capacity(node_capacity),
            vel_y: Vec::with_capacity(node_capacity),
            has_initial_position: Vec::with_capacity(node_capacity),
        }
    }

    /// Build a graph from a source batch.
    ///
    /// Malformed records never fail the build: duplicate node ids, edges with
    /// unknown endpoints, self-loops, duplicate unordered pairs and NaN
    /// similarities are dropped and counted in the report.
    pub fn build(input: &GraphInput) -> (Self, BuildReport) {
        let mut graph = Self::with_capacity(input.nodes.len(), input.edges.len());
        let mut report = BuildReport::default();

        for node in &input.nodes {
            if graph.key_to_id.contains_key(&node.id) {
                report.dropped_duplicate_nodes += 1;
                continue;
            }
            let mut keyword =
                KeywordNode::new(node.id.clone(), node.label.clone()).with_kind(node.kind);
            keyword.embedding = node.embedding.clone().filter(|e| !e.is_empty());
            let position = node
                .x
                .zip(node.y)
                .filter(|(x, y)| x.is_finite() && y.is_finite());
            graph.push_node(keyword, position);
        }

        let mut seen: HashMap<PairKey, petgraph::stable_graph::EdgeIndex> =
            HashMap::with_capacity(input.edges.len());
        for edge in &input.edges {
            let (Some(&source), Some(&target)) = (
                graph.key_to_id.get(&edge.source),
                graph.key_to_id.get(&edge.target),
            ) else {
                report.dropped_unknown += 1;
                continue;
            };
            if source == target {
                report.dropped_self_loops += 1;
                continue;
            }
            let Some(weight) = SimilarityEdge::new(edge.similarity, edge.is_mutual_neighbor) else {
                report.dropped_invalid_similarity += 1;
                continue;
            };
            let key = PairKey::new(source, target);
            if let Some(&existing) = seen.get(&key) {
                // Keep the first similarity but remember the mutual flag.
                if let Some(w) = graph.graph.edge_weight_mut(existing) {
                    w.mutual |= weight.mutual;
                }
                report.dropped_duplicates += 1;
                continue;
            }
            let index = graph.graph.add_edge(
                NodeIndex::new(source.index()),
                NodeIndex::new(target.index()),
                weight,
            );
            seen.insert(key, index);
        }

        if report.total_dropped() > 0 {
            warn!(
                "graph build dropped {} records (unknown endpoints: {}, self loops: {}, duplicate edges: {}, invalid similarity: {}, duplicate nodes: {})",
                report.total_dropped(),
                report.dropped_unknown,
                report.dropped_self_loops,
                report.dropped_duplicates,
                report.dropped_invalid_similarity,
                report.dropped_duplicate_nodes,
            );
        }

        (graph, report)
    }

    fn push_node(&mut self, node: KeywordNode, position: Option<(f32, f32)>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let index = self.graph.add_node(id);
        debug_assert_eq!(index.index(), id.index());

        self.key_to_id.insert(node.key.clone(), id);
        self.nodes.push(node);

        let (x, y) = position.unwrap_or((0.0, 0.0));
        self.pos_x.push(x);
        self.pos_y.push(y);
        self.vel_x.push(0.0);
        self.vel_y.push(0.0);
        self.has_initial_position.push(position.is_some());
        id
    }

    // =========================================================================
    // Node Access
    // =========================================================================

    /// Get the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all node ids.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&KeywordNode> {
        self.nodes.get(id.index())
    }

    /// Look up a node mutably.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut KeywordNode> {
        self.nodes.get_mut(id.index())
    }

    /// All nodes in NodeId order.
    pub fn nodes(&self) -> &[KeywordNode] {
        &self.nodes
    }

    /// All nodes mutably, in NodeId order.
    pub fn nodes_mut(&mut self) -> &mut [KeywordNode] {
        &mut self.nodes
    }

    /// Resolve a source key to its NodeId.
    pub fn id_of(&self, key: &str) -> Option<NodeId> {
        self.key_to_id.get(key).copied()
    }

    /// Whether the source supplied a position for this node.
    pub fn has_initial_position(&self, id: NodeId) -> bool {
        self.has_initial_position.get(id.index()).copied().unwrap_or(false)
    }

    // =========================================================================
    // Topology
    // =========================================================================

    /// Get the number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of incident edges in the full graph.
    pub fn degree(&self, id: NodeId) -> usize {
        self.graph.edges(NodeIndex::new(id.index())).count()
    }

    /// Neighbors of a node.
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph
            .neighbors(NodeIndex::new(id.index()))
            .filter_map(|n| self.graph.node_weight(n).copied())
    }

    /// Iterate over edges as (source, target, weight).
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, SimilarityEdge)> + '_ {
        self.graph.edge_references().map(|e| {
            (
                NodeId(e.source().index() as u32),
                NodeId(e.target().index() as u32),
                *e.weight(),
            )
        })
    }

    // =========================================================================
    // Buffer Access
    // =========================================================================

    /// Get X positions slice.
    pub fn positions_x(&self) -> &[f32] {
        &self.pos_x
    }

    /// Get Y positions slice.
    pub fn positions_y(&self) -> &[f32] {
        &self.pos_y
    }

    /// Get X velocities slice.
    pub fn velocities_x(&self) -> &[f32] {
        &self.vel_x
    }

    /// Get Y velocities slice.
    pub fn velocities_y(&self) -> &[f32] {
        &self.vel_y
    }

    /// Mutable access to all four buffers at once: (x, y, vx, vy).
    pub fn buffers_mut(&mut self) -> (&mut [f32], &mut [f32], &mut [f32], &mut [f32]) {
        (&mut self.pos_x, &mut self.pos_y, &mut self.vel_x, &mut self.vel_y)
    }

    /// Get a node's position.
    pub fn position(&self, id: NodeId) -> Option<(f32, f32)> {
        let i = id.index();
        (i < self.pos_x.len()).then(|| (self.pos_x[i], self.pos_y[i]))
    }

    /// Set a node's position.
    pub fn set_position(&mut self, id: NodeId, x: f32, y: f32) {
        let i = id.index();
        if i < self.pos_x.len() {
            self.pos_x[i] = x;
            self.pos_y[i] = y;
        }
    }

    /// Zero a node's velocity.
    pub fn clear_velocity(&mut self, id: NodeId) {
        let i = id.index();
        if i < self.vel_x.len() {
            self.vel_x[i] = 0.0;
            self.vel_y[i] = 0.0;
        }
    }

    /// Get the bounding box of all nodes as (min_x, min_y, max_x, max_y).
    /// Hidden nodes are skipped.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let mut min_x = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_y = f32::NEG_INFINITY;

        for (i, node) in self.nodes.iter().enumerate() {
            if node.state.is_hidden() {
                continue;
            }
            let (x, y) = (self.pos_x[i], self.pos_y[i]);
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }

        if min_x == f32::INFINITY {
            return None;
        }

        Some((min_x, min_y, max_x, max_y))
    }
}

impl Default for SimilarityGraph {
    fn default() -> Self {
        Self::new()
    }
}
