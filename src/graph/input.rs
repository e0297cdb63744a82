//! Wire shapes supplied by the graph source.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::node::NodeKind;

/// A node as delivered by the graph source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub kind: NodeKind,
    /// Initial position. Required in practice for pinned anchors.
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
}

impl NodeInput {
    /// Keyword node without an embedding.
    pub fn keyword(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    /// Builder: attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Pinned anchor at a fixed position.
    pub fn anchor(id: impl Into<String>, label: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: NodeKind::PinnedAnchor,
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }
}

/// An edge as delivered by the graph source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeInput {
    pub source: String,
    pub target: String,
    pub similarity: f32,
    #[serde(default)]
    pub is_mutual_neighbor: bool,
}

impl EdgeInput {
    pub fn new(source: impl Into<String>, target: impl Into<String>, similarity: f32) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            similarity,
            is_mutual_neighbor: false,
        }
    }

    /// Builder: flag as a mutual nearest-neighbor edge.
    pub fn mutual(mut self) -> Self {
        self.is_mutual_neighbor = true;
        self
    }
}

/// A full graph batch from the graph source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphInput {
    pub nodes: Vec<NodeInput>,
    pub edges: Vec<EdgeInput>,
}

/// Cluster assignments computed ahead of time by the graph source for a
/// known resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecomputedClusters {
    pub resolution: f32,
    pub node_to_cluster: HashMap<String, u32>,
}
