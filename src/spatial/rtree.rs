//! R-tree over node positions using the rstar crate.
//!
//! Rebuilt in bulk from the graph's position buffers whenever positions have
//! moved; queries are O(log n) plus the result size.

use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::graph::{NodeId, SimilarityGraph};

/// A node position in the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodePoint {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
}

impl RTreeObject for NodePoint {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for NodePoint {
    fn distance_2(&self, point: &[f32; 2]) -> f32 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// Spatial index for graph nodes.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    tree: RTree<NodePoint>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load every node accepted by `include`.
    pub fn from_graph(graph: &SimilarityGraph, include: impl Fn(NodeId) -> bool) -> Self {
        let xs = graph.positions_x();
        let ys = graph.positions_y();
        let points = graph
            .node_ids()
            .filter(|&id| include(id))
            .map(|id| NodePoint {
                id,
                x: xs[id.index()],
                y: ys[id.index()],
            })
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .collect();
        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// Bulk-load from raw buffers, with ids equal to buffer positions.
    pub fn from_buffers(xs: &[f32], ys: &[f32]) -> Self {
        let points = xs
            .iter()
            .zip(ys)
            .enumerate()
            .filter(|(_, (x, y))| x.is_finite() && y.is_finite())
            .map(|(i, (&x, &y))| NodePoint {
                id: NodeId::new(i as u32),
                x,
                y,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// Nodes within `radius` of a point, inclusive.
    pub fn within(&self, x: f32, y: f32, radius: f32) -> impl Iterator<Item = &NodePoint> {
        self.tree.locate_within_distance([x, y], radius * radius)
    }

    /// Ids of the nodes within `radius` of a point.
    pub fn in_radius(&self, x: f32, y: f32, radius: f32) -> Vec<NodeId> {
        self.within(x, y, radius).map(|p| p.id).collect()
    }

    /// Nearest node within `max_distance`.
    pub fn nearest_within(&self, x: f32, y: f32, max_distance: f32) -> Option<NodeId> {
        self.tree
            .nearest_neighbor(&[x, y])
            .filter(|p| p.distance_2(&[x, y]) <= max_distance * max_distance)
            .map(|p| p.id)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
