//! Position carry-over across graph rebuilds.
//!
//! A rebuild (filter change, new batch from the source) creates fresh node
//! buffers. Nodes whose key survives get their last position back so the map
//! does not jump; new nodes are seeded next to already-placed neighbors, or on
//! a phyllotaxis spiral when they have none.

use std::collections::HashMap;

use super::model::SimilarityGraph;
use super::node::NodeId;

/// Radius scale of the initial phyllotaxis spiral.
const INITIAL_RADIUS: f32 = 10.0;

/// Offset from the neighbor centroid for seeded nodes.
const NEIGHBOR_JITTER: f32 = 8.0;

/// Last known positions, keyed by node key.
#[derive(Debug, Clone, Default)]
pub struct PositionCache {
    positions: HashMap<String, (f32, f32)>,
}

impl PositionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of remembered positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Remembered position for a key.
    pub fn get(&self, key: &str) -> Option<(f32, f32)> {
        self.positions.get(key).copied()
    }

    /// Record the current position of every node in the graph.
    pub fn remember(&mut self, graph: &SimilarityGraph) {
        for id in graph.node_ids() {
            if let (Some(node), Some(pos)) = (graph.node(id), graph.position(id)) {
                self.positions.insert(node.key.clone(), pos);
            }
        }
    }

    /// Forget everything. Used when a new dataset replaces the old one.
    pub fn clear(&mut self) {
        self.positions.clear();
    }

    /// Assign starting positions to a freshly built graph.
    ///
    /// Entries for keys that did not survive the rebuild are dropped.
    /// Source-supplied positions (anchors) always win over the cache.
    pub fn seed(&mut self, graph: &mut SimilarityGraph) {
        self.positions.retain(|key, _| graph.id_of(key).is_some());

        let count = graph.node_count();
        let mut placed = vec![false; count];
        let mut pending = Vec::new();
        let ids: Vec<NodeId> = graph.node_ids().collect();

        for &id in &ids {
            if graph.has_initial_position(id) {
                placed[id.index()] = true;
                continue;
            }
            let cached = graph.node(id).and_then(|n| self.get(&n.key));
            match cached {
                Some((x, y)) => {
                    graph.set_position(id, x, y);
                    placed[id.index()] = true;
                }
                None => pending.push(id),
            }
        }

        let mut spiral_index = 0usize;
        for id in pending {
            let anchor = neighbor_centroid(graph, id, &placed);
            let (x, y) = match anchor {
                Some((cx, cy)) => {
                    let angle = id.raw() as f32 * GOLDEN_ANGLE;
                    (cx + NEIGHBOR_JITTER * angle.cos(), cy + NEIGHBOR_JITTER * angle.sin())
                }
                None => {
                    let p = phyllotaxis(spiral_index);
                    spiral_index += 1;
                    p
                }
            };
            graph.set_position(id, x, y);
            placed[id.index()] = true;
        }

        for id in ids {
            graph.clear_velocity(id);
        }
    }
}

const GOLDEN_ANGLE: f32 = std::f32::consts::PI * 0.763_932; // π(3 - √5)

/// Point `i` on the sunflower spiral used for initial placement.
fn phyllotaxis(i: usize) -> (f32, f32) {
    let radius = INITIAL_RADIUS * (0.5 + i as f32).sqrt();
    let angle = i as f32 * GOLDEN_ANGLE;
    (radius * angle.cos(), radius * angle.sin())
}

fn neighbor_centroid(graph: &SimilarityGraph, id: NodeId, placed: &[bool]) -> Option<(f32, f32)> {
    let mut sum = (0.0f32, 0.0f32);
    let mut n = 0usize;
    for neighbor in graph.neighbors(id) {
        if !placed[neighbor.index()] {
            continue;
        }
        if let Some((x, y)) = graph.position(neighbor) {
            sum.0 += x;
            sum.1 += y;
            n += 1;
        }
    }
    (n > 0).then(|| (sum.0 / n as f32, sum.1 / n as f32))
}
