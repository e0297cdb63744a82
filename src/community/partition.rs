//! Cluster partitions over a [`SimilarityGraph`].
//!
//! A partition maps every node with at least one edge to exactly one
//! cluster; isolated nodes stay unclustered. Each cluster carries a hub: the
//! member with the highest degree in the full graph, ties broken by shorter
//! label, then lexicographic label, then key.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::louvain::{AdjacencyList, LouvainParams, detect_communities, modularity};
use crate::graph::{NodeId, PrecomputedClusters, SimilarityGraph};

/// Edge weights below this still hold a component together.
const MIN_EDGE_WEIGHT: f64 = 1e-3;

/// Cluster identifier. Only meaningful within one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cluster({})", self.0)
    }
}

/// Configuration for community detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommunityConfig {
    /// Louvain resolution parameter (default: 1.0).
    /// Higher values produce more, smaller clusters.
    pub resolution: f32,
    /// Maximum local-moving sweeps per level (default: 100).
    pub max_iterations: u32,
    /// Convergence threshold for modularity gain (default: 0.0001).
    pub min_modularity_gain: f64,
    /// Maximum aggregation levels (default: 20).
    pub max_levels: u32,
    /// Share of connected nodes a precomputed partition must cover to be
    /// accepted (default: 0.9).
    pub precomputed_min_coverage: f32,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_iterations: 100,
            min_modularity_gain: 0.0001,
            max_levels: 20,
            precomputed_min_coverage: 0.9,
        }
    }
}

/// Where a partition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PartitionSource {
    Detected,
    Precomputed,
}

/// One community.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: ClusterId,
    /// Members in ascending NodeId order.
    pub members: Vec<NodeId>,
    pub hub: NodeId,
}

/// Node→cluster assignment plus per-cluster hubs.
#[derive(Debug, Clone)]
pub struct Partition {
    node_to_cluster: HashMap<NodeId, ClusterId>,
    clusters: BTreeMap<ClusterId, Cluster>,
    /// Modularity of the partition at `resolution`.
    pub modularity: f64,
    /// Resolution the partition was produced for.
    pub resolution: f32,
    pub source: PartitionSource,
}

/// Connected nodes re-indexed densely for the Louvain pass.
struct LocalGraph {
    adj: AdjacencyList,
    local_to_node: Vec<NodeId>,
}

impl LocalGraph {
    fn new(graph: &SimilarityGraph) -> Self {
        let mut node_to_local: HashMap<NodeId, usize> = HashMap::new();
        let mut local_to_node = Vec::new();
        for id in graph.node_ids() {
            if graph.degree(id) > 0 {
                node_to_local.insert(id, local_to_node.len());
                local_to_node.push(id);
            }
        }
        let edges = graph.edges().map(|(s, t, w)| {
            (
                node_to_local[&s],
                node_to_local[&t],
                f64::from(w.similarity).max(MIN_EDGE_WEIGHT),
            )
        });
        let adj = AdjacencyList::from_edges(local_to_node.len(), edges);
        Self { adj, local_to_node }
    }
}

impl Partition {
    /// An empty partition.
    pub fn empty(resolution: f32) -> Self {
        Self {
            node_to_cluster: HashMap::new(),
            clusters: BTreeMap::new(),
            modularity: 0.0,
            resolution,
            source: PartitionSource::Detected,
        }
    }

    /// Run community detection over the graph.
    ///
    /// Pure: the graph is not modified. An empty graph yields an empty
    /// partition.
    pub fn detect(graph: &SimilarityGraph, resolution: f32, config: &CommunityConfig) -> Self {
        let local = LocalGraph::new(graph);
        let result = detect_communities(
            &local.adj,
            &LouvainParams {
                resolution: f64::from(resolution),
                max_iterations: config.max_iterations,
                min_modularity_gain: config.min_modularity_gain,
                max_levels: config.max_levels,
            },
        );

        let assignments = local
            .local_to_node
            .iter()
            .zip(&result.assignments)
            .map(|(&node, &c)| (node, ClusterId(c)));
        let mut partition = Self::from_assignments(graph, assignments, resolution);
        partition.modularity = result.modularity;

        debug!(
            "detected {} clusters over {} connected nodes (resolution {resolution}, modularity {:.4})",
            partition.len(),
            local.local_to_node.len(),
            partition.modularity,
        );
        partition
    }

    /// Adopt a partition computed by the graph source.
    ///
    /// Returns None when it covers less than `precomputed_min_coverage` of the
    /// connected nodes. Unknown and isolated ids are ignored; connected nodes
    /// it misses become singleton clusters.
    pub fn from_precomputed(
        graph: &SimilarityGraph,
        precomputed: &PrecomputedClusters,
        config: &CommunityConfig,
    ) -> Option<Self> {
        let local = LocalGraph::new(graph);
        let connected = local.local_to_node.len();
        if connected == 0 {
            return None;
        }

        let lookup = |id: NodeId| {
            graph
                .node(id)
                .and_then(|n| precomputed.node_to_cluster.get(&n.key))
                .copied()
        };
        let covered = local.local_to_node.iter().filter(|&&id| lookup(id).is_some()).count();
        let coverage = covered as f32 / connected as f32;
        if coverage < config.precomputed_min_coverage {
            warn!(
                "precomputed clusters cover {:.0}% of connected nodes, running local detection",
                coverage * 100.0
            );
            return None;
        }

        // Compact external ids in first-seen order; misses get fresh ids after.
        let mut external: HashMap<u32, u32> = HashMap::new();
        let mut next = 0u32;
        let mut assigned: Vec<Option<u32>> = Vec::with_capacity(connected);
        for &id in &local.local_to_node {
            assigned.push(lookup(id).map(|ext| {
                *external.entry(ext).or_insert_with(|| {
                    next += 1;
                    next - 1
                })
            }));
        }
        let assignments: Vec<u32> = assigned
            .into_iter()
            .map(|a| {
                a.unwrap_or_else(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();

        let modularity = modularity(
            &assignments,
            next,
            &local.adj,
            f64::from(precomputed.resolution),
        );
        let pairs = local
            .local_to_node
            .iter()
            .zip(&assignments)
            .map(|(&node, &c)| (node, ClusterId(c)));
        let mut partition = Self::from_assignments(graph, pairs, precomputed.resolution);
        partition.modularity = modularity;
        partition.source = PartitionSource::Precomputed;
        Some(partition)
    }

    fn from_assignments(
        graph: &SimilarityGraph,
        assignments: impl IntoIterator<Item = (NodeId, ClusterId)>,
        resolution: f32,
    ) -> Self {
        let mut node_to_cluster = HashMap::new();
        let mut members: BTreeMap<ClusterId, Vec<NodeId>> = BTreeMap::new();
        for (node, cluster) in assignments {
            node_to_cluster.insert(node, cluster);
            members.entry(cluster).or_default().push(node);
        }

        let clusters = members
            .into_iter()
            .filter_map(|(id, mut members)| {
                members.sort_unstable();
                let hub = select_hub(graph, &members)?;
                Some((id, Cluster { id, members, hub }))
            })
            .collect();

        Self {
            node_to_cluster,
            clusters,
            modularity: 0.0,
            resolution,
            source: PartitionSource::Detected,
        }
    }

    /// Cluster of a node, None for isolated nodes.
    pub fn cluster_of(&self, node: NodeId) -> Option<ClusterId> {
        self.node_to_cluster.get(&node).copied()
    }

    /// Look up a cluster.
    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    /// Iterate clusters in id order.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Check if there are no clusters.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Number of clustered nodes.
    pub fn assigned_count(&self) -> usize {
        self.node_to_cluster.len()
    }

    /// Write cluster ids and hub flags into the live node state.
    ///
    /// Positions and velocities are untouched.
    pub fn apply_to(&self, graph: &mut SimilarityGraph) {
        for (index, node) in graph.nodes_mut().iter_mut().enumerate() {
            let id = NodeId(index as u32);
            node.cluster = self.cluster_of(id);
            let is_hub = node
                .cluster
                .and_then(|c| self.clusters.get(&c))
                .is_some_and(|c| c.hub == id);
            node.state.set_hub(is_hub);
        }
    }
}

/// Pick the hub of a member set.
fn select_hub(graph: &SimilarityGraph, members: &[NodeId]) -> Option<NodeId> {
    members.iter().copied().min_by(|&a, &b| compare_hub(graph, a, b))
}

/// Ordering where the better hub compares as Less.
fn compare_hub(graph: &SimilarityGraph, a: NodeId, b: NodeId) -> Ordering {
    let (Some(na), Some(nb)) = (graph.node(a), graph.node(b)) else {
        return a.cmp(&b);
    };
    graph
        .degree(b)
        .cmp(&graph.degree(a))
        .then_with(|| na.label.chars().count().cmp(&nb.label.chars().count()))
        .then_with(|| na.label.cmp(&nb.label))
        .then_with(|| na.key.cmp(&nb.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeInput, GraphInput, NodeInput};

    fn graph(nodes: &[&str], edges: &[(&str, &str, f32)]) -> SimilarityGraph {
        let input = GraphInput {
            nodes: nodes.iter().map(|n| NodeInput::keyword(*n, *n)).collect(),
            edges: edges.iter().map(|&(s, t, w)| EdgeInput::new(s, t, w)).collect(),
        };
        SimilarityGraph::build(&input).0
    }

    fn two_triangles() -> SimilarityGraph {
        graph(
            &["a", "b", "c", "x", "y", "z", "lonely"],
            &[
                ("a", "b", 0.9),
                ("b", "c", 0.9),
                ("a", "c", 0.9),
                ("x", "y", 0.9),
                ("y", "z", 0.9),
                ("x", "z", 0.9),
                ("c", "x", 0.1),
            ],
        )
    }

    #[test]
    fn test_empty_graph_gives_empty_partition() {
        let g = SimilarityGraph::new();
        let p = Partition::detect(&g, 1.0, &CommunityConfig::default());
        assert!(p.is_empty());
        assert_eq!(p.assigned_count(), 0);
    }

    #[test]
    fn test_partition_totality() {
        let g = two_triangles();
        let p = Partition::detect(&g, 1.0, &CommunityConfig::default());

        let connected = g.node_ids().filter(|&id| g.degree(id) > 0).count();
        let total: usize = p.clusters().map(|c| c.members.len()).sum();
        assert_eq!(total, connected);
        assert_eq!(p.assigned_count(), connected);
        assert!(p.cluster_of(g.id_of("lonely").unwrap()).is_none());

        for id in g.node_ids().filter(|&id| g.degree(id) > 0) {
            let owners = p.clusters().filter(|c| c.members.contains(&id)).count();
            assert_eq!(owners, 1, "{id} should be in exactly one cluster");
        }
    }

    #[test]
    fn test_two_triangles_split() {
        let g = two_triangles();
        let p = Partition::detect(&g, 1.0, &CommunityConfig::default());
        assert_eq!(p.len(), 2);
        let a = p.cluster_of(g.id_of("a").unwrap());
        assert_eq!(a, p.cluster_of(g.id_of("b").unwrap()));
        assert_ne!(a, p.cluster_of(g.id_of("y").unwrap()));
    }

    #[test]
    fn test_hub_is_highest_degree_in_full_graph() {
        // "c" and "x" carry the bridge, so they win their clusters.
        let g = two_triangles();
        let p = Partition::detect(&g, 1.0, &CommunityConfig::default());
        let c = g.id_of("c").unwrap();
        let x = g.id_of("x").unwrap();
        assert_eq!(p.cluster(p.cluster_of(c).unwrap()).unwrap().hub, c);
        assert_eq!(p.cluster(p.cluster_of(x).unwrap()).unwrap().hub, x);
    }

    #[test]
    fn test_hub_stable_under_input_order() {
        let forward = graph(
            &["star", "p", "q", "r"],
            &[("star", "p", 0.8), ("star", "q", 0.8), ("star", "r", 0.8), ("p", "q", 0.8)],
        );
        let reversed = graph(
            &["r", "q", "p", "star"],
            &[("p", "q", 0.8), ("star", "r", 0.8), ("star", "q", 0.8), ("star", "p", 0.8)],
        );
        for g in [&forward, &reversed] {
            let p = Partition::detect(g, 1.0, &CommunityConfig::default());
            let star = g.id_of("star").unwrap();
            let cluster = p.cluster(p.cluster_of(star).unwrap()).unwrap();
            assert_eq!(cluster.hub, star);
        }
    }

    #[test]
    fn test_hub_tie_breaks_by_shorter_label() {
        let g = graph(&["longer", "ab"], &[("longer", "ab", 0.9)]);
        let p = Partition::detect(&g, 1.0, &CommunityConfig::default());
        let cluster = p.clusters().next().unwrap();
        assert_eq!(cluster.hub, g.id_of("ab").unwrap());
    }

    #[test]
    fn test_apply_to_sets_cluster_and_hub_flags() {
        let mut g = two_triangles();
        let p = Partition::detect(&g, 1.0, &CommunityConfig::default());
        p.apply_to(&mut g);
        let c = g.id_of("c").unwrap();
        assert!(g.node(c).unwrap().state.is_hub());
        assert!(!g.node(g.id_of("a").unwrap()).unwrap().state.is_hub());
        assert_eq!(g.node(c).unwrap().cluster, p.cluster_of(c));
        assert!(g.node(g.id_of("lonely").unwrap()).unwrap().cluster.is_none());
    }

    #[test]
    fn test_precomputed_accepted_with_full_coverage() {
        let g = two_triangles();
        let mut map = HashMap::new();
        for key in ["a", "b", "c"] {
            map.insert(key.to_string(), 7);
        }
        for key in ["x", "y", "z"] {
            map.insert(key.to_string(), 3);
        }
        map.insert("lonely".to_string(), 9);
        let pre = PrecomputedClusters {
            resolution: 1.0,
            node_to_cluster: map,
        };
        let p = Partition::from_precomputed(&g, &pre, &CommunityConfig::default()).unwrap();
        assert_eq!(p.source, PartitionSource::Precomputed);
        assert_eq!(p.len(), 2);
        // Isolated nodes stay unclustered even if the source lists them.
        assert!(p.cluster_of(g.id_of("lonely").unwrap()).is_none());
    }

    #[test]
    fn test_precomputed_rejected_below_coverage() {
        let g = two_triangles();
        let mut map = HashMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 1);
        let pre = PrecomputedClusters {
            resolution: 1.0,
            node_to_cluster: map,
        };
        assert!(Partition::from_precomputed(&g, &pre, &CommunityConfig::default()).is_none());
    }

    #[test]
    fn test_precomputed_fills_gaps_with_singletons() {
        let g = graph(
            &["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k"],
            &[
                ("a", "b", 0.5),
                ("b", "c", 0.5),
                ("c", "d", 0.5),
                ("d", "e", 0.5),
                ("e", "f", 0.5),
                ("f", "g", 0.5),
                ("g", "h", 0.5),
                ("h", "i", 0.5),
                ("i", "j", 0.5),
                ("j", "k", 0.5),
            ],
        );
        let map: HashMap<String, u32> = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]
            .iter()
            .map(|k| (k.to_string(), 0))
            .collect();
        let pre = PrecomputedClusters {
            resolution: 1.0,
            node_to_cluster: map,
        };
        let p = Partition::from_precomputed(&g, &pre, &CommunityConfig::default()).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.assigned_count(), 11);
        let k = p.cluster_of(g.id_of("k").unwrap()).unwrap();
        assert_eq!(p.cluster(k).unwrap().members.len(), 1);
    }

    #[test]
    fn test_higher_resolution_gives_more_clusters() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for c in 0..6 {
            for i in 0..4 {
                nodes.push(format!("n{c}_{i}"));
            }
            for i in 0..4 {
                for j in (i + 1)..4 {
                    edges.push((format!("n{c}_{i}"), format!("n{c}_{j}"), 0.9));
                }
            }
            edges.push((format!("n{c}_0"), format!("n{}_0", (c + 1) % 6), 0.9));
        }
        let input = GraphInput {
            nodes: nodes.iter().map(|n| NodeInput::keyword(n.clone(), n.clone())).collect(),
            edges: edges.iter().map(|(s, t, w)| EdgeInput::new(s.clone(), t.clone(), *w)).collect(),
        };
        let g = SimilarityGraph::build(&input).0;
        let config = CommunityConfig::default();
        let mut previous = 0;
        for resolution in [0.05, 0.5, 1.0, 3.0] {
            let count = Partition::detect(&g, resolution, &config).len();
            assert!(count >= previous, "resolution {resolution} gave {count} < {previous}");
            previous = count;
        }
    }
}
