//! Edge type and related structures.
//!
//! Edges connect two keywords with a similarity score. Each edge has:
//! - A similarity in [0, 1] used as the community weight and force input
//! - A mutual-nearest-neighbor flag that boosts attraction

use super::node::NodeId;

/// Undirected similarity edge weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityEdge {
    /// Pairwise similarity, clamped into [0, 1].
    pub similarity: f32,
    /// Each endpoint is among the other's nearest neighbors.
    pub mutual: bool,
}

impl SimilarityEdge {
    /// Create an edge weight, clamping the similarity.
    ///
    /// Returns None for non-finite similarity values.
    pub fn new(similarity: f32, mutual: bool) -> Option<Self> {
        if !similarity.is_finite() {
            return None;
        }
        Some(Self {
            similarity: similarity.clamp(0.0, 1.0),
            mutual,
        })
    }
}

/// Unordered endpoint pair used to drop duplicate edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(NodeId, NodeId);

impl PairKey {
    /// Canonical key for an unordered pair.
    #[inline]
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}
