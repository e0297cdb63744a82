//! Camera transform and the auto-fit policy.

mod autofit;
mod camera;

pub use autofit::{AutoFitConfig, AutoFitController};
pub use camera::{Camera, MAX_ZOOM, MIN_ZOOM, Viewport};
