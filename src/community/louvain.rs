//! Multi-level Louvain modularity optimization.
//!
//! # Algorithm Overview
//!
//! 1. **Phase 1 (Local Moving):** Each node starts in its own community.
//!    For each node, compute the modularity gain of moving to each neighbor's
//!    community. Move to the best positive-gain community. Repeat until
//!    convergence.
//! 2. **Phase 2 (Aggregation):** Collapse each community into a super-node.
//!    Edge weights between super-nodes = sum of inter-community edge weights.
//!    Internal edges become self-loop weight.
//! 3. Repeat from Phase 1 on the coarsened graph until no further reduction.
//! 4. Map multi-level assignments back to the original nodes and keep the
//!    level with the best modularity on the original graph.
//!
//! Neighbor communities are visited in ascending id order so a given input
//! always produces the same partition.
//!
//! # References
//!
//! - Blondel et al., "Fast unfolding of communities in large networks" (2008)

use std::collections::{BTreeMap, HashMap};

/// Weighted undirected adjacency over dense local indices.
pub(crate) struct AdjacencyList {
    /// For each node: list of (neighbor, edge_weight) pairs.
    neighbors: Vec<Vec<(usize, f64)>>,
    /// Total edge weight (each undirected edge counted once).
    total_weight: f64,
    /// Weighted degree of each node.
    degree: Vec<f64>,
}

impl AdjacencyList {
    /// Build from undirected weighted edges. Each edge is stored in both
    /// directions.
    pub(crate) fn from_edges(
        node_count: usize,
        edges: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Self {
        let mut neighbors: Vec<Vec<(usize, f64)>> = vec![Vec::new(); node_count];
        let mut degree = vec![0.0f64; node_count];
        let mut total_weight = 0.0f64;

        for (a, b, w) in edges {
            if a >= node_count || b >= node_count || a == b || w <= 0.0 {
                continue;
            }
            neighbors[a].push((b, w));
            neighbors[b].push((a, w));
            degree[a] += w;
            degree[b] += w;
            total_weight += w;
        }

        Self {
            neighbors,
            total_weight,
            degree,
        }
    }

    pub(crate) fn node_count(&self) -> usize {
        self.neighbors.len()
    }
}

/// Result of community detection over an [`AdjacencyList`].
pub(crate) struct LouvainResult {
    /// Community per local node, contiguous from 0.
    pub assignments: Vec<u32>,
    /// Number of distinct communities.
    pub community_count: u32,
    /// Modularity of `assignments` at the requested resolution.
    pub modularity: f64,
}

/// Tuning knobs for [`detect_communities`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct LouvainParams {
    pub resolution: f64,
    pub max_iterations: u32,
    pub min_modularity_gain: f64,
    pub max_levels: u32,
}

/// Build a coarsened graph from community assignments.
fn coarsen_graph(adj: &AdjacencyList, community: &[usize], num_communities: usize) -> AdjacencyList {
    let mut inter_edges: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for (src, neighbors) in adj.neighbors.iter().enumerate() {
        let src_comm = community[src];
        for &(tgt, w) in neighbors {
            *inter_edges.entry((src_comm, community[tgt])).or_insert(0.0) += w;
        }
    }

    let mut neighbors: Vec<Vec<(usize, f64)>> = vec![Vec::new(); num_communities];
    let mut degree = vec![0.0f64; num_communities];
    let mut total_weight = 0.0f64;

    // Both directions of every edge were accumulated, so each entry
    // contributes half its weight to the total.
    for (&(src_comm, tgt_comm), &w) in &inter_edges {
        if src_comm != tgt_comm {
            neighbors[src_comm].push((tgt_comm, w));
        }
        degree[src_comm] += w;
        total_weight += w / 2.0;
    }

    AdjacencyList {
        neighbors,
        total_weight,
        degree,
    }
}

/// Phase 1: local moving. Returns a non-compacted assignment.
fn local_moving(adj: &AdjacencyList, params: &LouvainParams) -> Vec<usize> {
    let node_count = adj.node_count();
    if adj.total_weight < f64::EPSILON {
        return (0..node_count).collect();
    }

    let m2 = 2.0 * adj.total_weight;
    let resolution = params.resolution;

    let mut community: Vec<usize> = (0..node_count).collect();
    let mut sigma_tot: Vec<f64> = adj.degree.clone();

    let mut improved = true;
    let mut iteration = 0u32;

    while improved && iteration < params.max_iterations {
        improved = false;
        iteration += 1;
        let mut total_gain = 0.0f64;

        for node in 0..node_count {
            let node_comm = community[node];
            let k_i = adj.degree[node];
            if k_i < f64::EPSILON {
                continue;
            }

            let mut comm_weights: BTreeMap<usize, f64> = BTreeMap::new();
            for &(neighbor, weight) in &adj.neighbors[node] {
                *comm_weights.entry(community[neighbor]).or_insert(0.0) += weight;
            }
            let k_i_in = comm_weights.get(&node_comm).copied().unwrap_or(0.0);

            // Take the node out of its community before scoring moves.
            sigma_tot[node_comm] -= k_i;

            let stay = k_i_in / m2 - resolution * sigma_tot[node_comm] * k_i / (m2 * m2);
            let mut best_comm = node_comm;
            let mut best_gain = 0.0f64;

            for (&target_comm, &k_i_to_c) in &comm_weights {
                if target_comm == node_comm {
                    continue;
                }
                let gain = k_i_to_c / m2 - resolution * sigma_tot[target_comm] * k_i / (m2 * m2);
                let net_gain = gain - stay;
                if net_gain > best_gain {
                    best_gain = net_gain;
                    best_comm = target_comm;
                }
            }

            community[node] = best_comm;
            sigma_tot[best_comm] += k_i;

            if best_comm != node_comm {
                improved = true;
                total_gain += best_gain;
            }
        }

        if total_gain < params.min_modularity_gain {
            break;
        }
    }

    community
}

/// Compact community ids to be contiguous in first-seen order.
fn compact_communities(community: &[usize]) -> (Vec<usize>, usize) {
    let mut id_map: HashMap<usize, usize> = HashMap::new();
    let mut next_id = 0usize;

    let compacted = community
        .iter()
        .map(|&comm| {
            *id_map.entry(comm).or_insert_with(|| {
                let id = next_id;
                next_id += 1;
                id
            })
        })
        .collect();

    (compacted, next_id)
}

/// Trace each original node through all levels to its final community.
fn map_levels_to_original(levels: &[Vec<usize>], node_count: usize) -> Vec<u32> {
    let finals: Vec<usize> = (0..node_count)
        .map(|node| levels.iter().fold(node, |comm, level| level[comm]))
        .collect();
    let (compacted, _) = compact_communities(&finals);
    compacted.into_iter().map(|c| c as u32).collect()
}

/// Detect communities with multi-level Louvain.
///
/// Modularity is evaluated on the original graph after every level and the
/// best level wins, so over-coarsening never hides a better partition. A
/// single community is a valid answer when nothing beats it.
pub(crate) fn detect_communities(adj: &AdjacencyList, params: &LouvainParams) -> LouvainResult {
    let node_count = adj.node_count();
    if node_count == 0 {
        return LouvainResult {
            assignments: Vec::new(),
            community_count: 0,
            modularity: 0.0,
        };
    }

    let singletons: Vec<u32> = (0..node_count as u32).collect();
    if adj.total_weight < f64::EPSILON {
        return LouvainResult {
            assignments: singletons,
            community_count: node_count as u32,
            modularity: 0.0,
        };
    }

    let mut best = LouvainResult {
        modularity: modularity(&singletons, node_count as u32, adj, params.resolution),
        community_count: node_count as u32,
        assignments: singletons,
    };

    let mut levels: Vec<Vec<usize>> = Vec::new();
    let mut coarse: Option<AdjacencyList> = None;

    for _ in 0..params.max_levels {
        let current = coarse.as_ref().unwrap_or(adj);
        let current_count = current.node_count();

        let (compacted, num_communities) = compact_communities(&local_moving(current, params));
        if num_communities >= current_count {
            break;
        }

        let next = coarsen_graph(current, &compacted, num_communities);
        levels.push(compacted);

        let candidate = map_levels_to_original(&levels, node_count);
        let candidate_count = num_communities as u32;
        let candidate_mod = modularity(&candidate, candidate_count, adj, params.resolution);

        if candidate_mod > best.modularity {
            best = LouvainResult {
                assignments: candidate,
                community_count: candidate_count,
                modularity: candidate_mod,
            };
        } else if candidate_mod < best.modularity - 0.01 {
            // Further coarsening only makes it worse.
            break;
        }

        coarse = Some(next);
    }

    best
}

/// Modularity Q for a given assignment.
///
/// Q = Σ_c [ L_c / m - γ (d_c / 2m)² ]
pub(crate) fn modularity(
    assignments: &[u32],
    community_count: u32,
    adj: &AdjacencyList,
    resolution: f64,
) -> f64 {
    if adj.total_weight < f64::EPSILON {
        return 0.0;
    }

    let m2 = 2.0 * adj.total_weight;
    let mut internal_weight = vec![0.0f64; community_count as usize];
    let mut community_degree = vec![0.0f64; community_count as usize];

    for (node, neighbors) in adj.neighbors.iter().enumerate() {
        let c = assignments[node] as usize;
        community_degree[c] += adj.degree[node];
        for &(neighbor, weight) in neighbors {
            if assignments[neighbor] as usize == c {
                internal_weight[c] += weight;
            }
        }
    }

    // Internal edges were seen from both endpoints.
    internal_weight
        .iter()
        .zip(&community_degree)
        .map(|(&l2, &d)| (l2 / 2.0) / adj.total_weight - resolution * (d / m2).powi(2))
        .sum()
}
