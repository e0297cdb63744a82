//! Spatial queries over node positions: an R-tree index and the hover
//! highlight built on top of it.

mod hover;
mod rtree;

pub use hover::{HoverConfig, HoverOutcome, compute_highlight};
pub use rtree::{NodePoint, SpatialIndex};
