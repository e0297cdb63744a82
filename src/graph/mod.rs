//! Graph data structures and operations.
//!
//! This module provides the similarity graph model using petgraph's
//! StableGraph for the adjacency index, with Structure of Arrays (SoA) layout
//! for positions and velocities so the simulation can work on flat buffers
//! and the host can upload them without copying.

mod edge;
mod input;
mod model;
mod node;
mod positions;

pub use edge::SimilarityEdge;
pub use input::{EdgeInput, GraphInput, NodeInput, PrecomputedClusters};
pub use model::{BuildReport, SimilarityGraph};
pub use node::{KeywordNode, NodeId, NodeKind, NodeState};
pub use positions::PositionCache;
