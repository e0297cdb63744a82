//! Hover highlighting: a screen-space radius query expanded by graph
//! adjacency and embedding similarity.
//!
//! The radius query runs against the R-tree, so only the handful of nodes
//! under the cursor are expanded. Cost per pointer move follows the local
//! neighborhood, not the graph size.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::rtree::SpatialIndex;
use crate::graph::{NodeId, SimilarityGraph};
use crate::labels::cosine_similarity;
use crate::viewport::Camera;

/// Configuration for hover highlighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HoverConfig {
    /// Pointer radius in screen pixels (default: 60).
    pub screen_radius: f32,
    /// Embedding similarity above which two nodes under the pointer
    /// highlight each other (default: 0.75).
    pub similarity_threshold: f32,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self {
            screen_radius: 60.0,
            similarity_threshold: 0.75,
        }
    }
}

/// Result of one hover query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoverOutcome {
    /// Nodes to highlight. `None` when nothing is under the pointer, which
    /// tells the renderer to dim everything uniformly.
    pub highlighted: Option<HashSet<NodeId>>,
    /// Nodes within the pointer radius, nearest first.
    pub spatial: Vec<NodeId>,
}

/// Compute the highlight set for a pointer at `cursor` (screen pixels).
///
/// The index is expected to hold only nodes that are currently shown. The
/// result contains the nearest keyword under the pointer, every graph
/// neighbor of a node under the pointer, and every node under the pointer
/// whose embedding is more similar than `similarity_threshold` to another
/// node under the pointer. Only visible keyword nodes are ever highlighted.
pub fn compute_highlight(
    graph: &SimilarityGraph,
    index: &SpatialIndex,
    cursor: (f32, f32),
    camera: &Camera,
    screen_radius: f32,
    similarity_threshold: f32,
) -> HoverOutcome {
    let camera = camera.sanitized();
    let (wx, wy) = camera.screen_to_world(cursor.0, cursor.1);
    let radius = camera.world_radius(screen_radius.max(0.0));

    let mut within: Vec<(f32, NodeId)> = index
        .within(wx, wy, radius)
        .map(|p| ((p.x - wx).powi(2) + (p.y - wy).powi(2), p.id))
        .collect();
    within.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let spatial: Vec<NodeId> = within.into_iter().map(|(_, id)| id).collect();

    if spatial.is_empty() {
        return HoverOutcome {
            highlighted: None,
            spatial,
        };
    }

    let highlightable = |id: NodeId| {
        graph
            .node(id)
            .is_some_and(|n| n.is_keyword() && !n.state.is_hidden())
    };

    let mut result = HashSet::new();
    if let Some(&focus) = spatial.iter().find(|&&id| highlightable(id)) {
        result.insert(focus);
    }

    for &id in &spatial {
        result.extend(graph.neighbors(id).filter(|&n| highlightable(n)));
    }

    let embedded: Vec<(NodeId, &[f32])> = spatial
        .iter()
        .filter_map(|&id| Some((id, graph.node(id)?.embedding.as_deref()?)))
        .collect();
    for (i, &(a, ea)) in embedded.iter().enumerate() {
        for &(b, eb) in &embedded[i + 1..] {
            if cosine_similarity(ea, eb) > similarity_threshold {
                if highlightable(a) {
                    result.insert(a);
                }
                if highlightable(b) {
                    result.insert(b);
                }
            }
        }
    }

    HoverOutcome {
        highlighted: Some(result),
        spatial,
    }
}
