//! Force-directed layout.
//!
//! Nodes repel each other through a Barnes–Hut quadtree, edges act as
//! springs whose rest length and stiffness come from contrast-curved
//! similarity, and a boundary force keeps disconnected components from
//! drifting away. Collision is resolved only once the layout has cooled.

mod contrast;
mod cooling;
mod forces;
mod quadtree;
mod simulation;

pub use contrast::contrast_curve;
pub use cooling::{CoolingConfig, CoolingState, Phase};
pub use forces::{ForceConfig, LinkForce};
pub use simulation::{Simulation, StepStats};
