//! Node type and related structures.
//!
//! Nodes are the keywords of the similarity map. Each node has:
//! - A dense arena identifier (index into the graph's node buffers)
//! - A stable string key supplied by the graph source
//! - An optional embedding used for semantic matching
//! - State flags (pinned, hidden, hub, dragging)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::community::ClusterId;

/// Dense node identifier.
///
/// Valid for one graph build only. Use [`KeywordNode::key`] to refer to a
/// node across rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new NodeId from a raw u32.
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Slot in the SoA buffers.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl From<u32> for NodeId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<NodeId> for u32 {
    #[inline]
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// What a node represents on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// A keyword from the similarity graph.
    #[default]
    Keyword,
    /// A fixed reference point positioned by the host. Never highlighted.
    PinnedAnchor,
}

/// Node state flags packed into a single byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeState {
    flags: u8,
}

impl NodeState {
    const PINNED: u8 = 0b0000_0001;
    const HIDDEN: u8 = 0b0000_0010;
    const HUB: u8 = 0b0000_0100;
    const DRAGGING: u8 = 0b0000_1000;

    /// Create a new default node state.
    #[inline]
    pub fn new() -> Self {
        Self { flags: 0 }
    }

    #[inline]
    fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    /// Check if the node is pinned (excluded from force integration).
    #[inline]
    pub fn is_pinned(self) -> bool {
        self.flags & Self::PINNED != 0
    }

    /// Set the pinned state.
    #[inline]
    pub fn set_pinned(&mut self, pinned: bool) {
        self.set(Self::PINNED, pinned);
    }

    /// Check if the node is hidden by the current filter.
    #[inline]
    pub fn is_hidden(self) -> bool {
        self.flags & Self::HIDDEN != 0
    }

    /// Set the hidden state.
    #[inline]
    pub fn set_hidden(&mut self, hidden: bool) {
        self.set(Self::HIDDEN, hidden);
    }

    /// Check if the node is the hub of its cluster.
    #[inline]
    pub fn is_hub(self) -> bool {
        self.flags & Self::HUB != 0
    }

    /// Set the hub flag.
    #[inline]
    pub fn set_hub(&mut self, hub: bool) {
        self.set(Self::HUB, hub);
    }

    /// Check if the node is being dragged.
    #[inline]
    pub fn is_dragging(self) -> bool {
        self.flags & Self::DRAGGING != 0
    }

    /// Set the dragging state.
    #[inline]
    pub fn set_dragging(&mut self, dragging: bool) {
        self.set(Self::DRAGGING, dragging);
    }
}

/// A keyword node. Position and velocity live in the graph's SoA buffers.
#[derive(Debug, Clone)]
pub struct KeywordNode {
    /// Stable key from the graph source.
    pub key: String,
    /// Display string.
    pub label: String,
    /// Embedding vector, absent for nodes that only take part in layout.
    pub embedding: Option<Vec<f32>>,
    /// Node kind.
    pub kind: NodeKind,
    /// Cluster assignment from the latest detection pass.
    pub cluster: Option<ClusterId>,
    /// State flags.
    pub state: NodeState,
}

impl KeywordNode {
    /// Create a keyword node with no embedding.
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            embedding: None,
            kind: NodeKind::Keyword,
            cluster: None,
            state: NodeState::new(),
        }
    }

    /// Builder: attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Builder: set the kind. Anchors start pinned.
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self.state.set_pinned(kind == NodeKind::PinnedAnchor);
        self
    }

    /// Whether the node is a keyword (eligible for highlighting).
    #[inline]
    pub fn is_keyword(&self) -> bool {
        self.kind == NodeKind::Keyword
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.index(), 42);
        assert_eq!(format!("{}", id), "Node(42)");
    }

    #[test]
    fn test_node_state_flags_are_independent() {
        let mut state = NodeState::new();
        state.set_pinned(true);
        state.set_hub(true);
        assert!(state.is_pinned());
        assert!(state.is_hub());
        assert!(!state.is_hidden());
        assert!(!state.is_dragging());

        state.set_pinned(false);
        assert!(!state.is_pinned());
        assert!(state.is_hub());
    }

    #[test]
    fn test_anchor_starts_pinned() {
        let node = KeywordNode::new("a", "A").with_kind(NodeKind::PinnedAnchor);
        assert!(node.state.is_pinned());
        assert!(!node.is_keyword());

        let node = KeywordNode::new("b", "B");
        assert!(!node.state.is_pinned());
        assert!(node.is_keyword());
    }
}
