//! Force-directed layout over a [`SimilarityGraph`]'s position buffers.

use serde::Serialize;

use super::cooling::{CoolingConfig, CoolingState, Phase};
use super::forces::{
    Bodies, ForceConfig, LinkForce, apply_boundary, apply_center, apply_collision, apply_links,
    apply_many_body, build_links,
};
use crate::graph::SimilarityGraph;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStats {
    pub phase: Phase,
    pub alpha: f32,
    /// Mean speed of the free nodes after integration.
    pub mean_speed: f32,
    /// Containment radius used this tick.
    pub boundary_radius: f32,
}

/// The layout simulation.
///
/// Holds the springs derived from the current graph and the cooling state.
/// Positions and velocities live in the graph itself, so a re-detection or a
/// label update never disturbs the integration.
#[derive(Debug, Clone)]
pub struct Simulation {
    forces: ForceConfig,
    cooling_config: CoolingConfig,
    cooling: CoolingState,
    links: Vec<LinkForce>,
    bound: (usize, usize),
    ticks: u64,
}

impl Simulation {
    pub fn new(forces: ForceConfig, cooling_config: CoolingConfig) -> Self {
        let cooling = CoolingState::new(&cooling_config);
        Self {
            forces,
            cooling_config,
            cooling,
            links: Vec::new(),
            bound: (0, 0),
            ticks: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.cooling.phase()
    }

    pub fn alpha(&self) -> f32 {
        self.cooling.alpha()
    }

    /// Ticks since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn links(&self) -> &[LinkForce] {
        &self.links
    }

    pub fn force_config(&self) -> &ForceConfig {
        &self.forces
    }

    /// Re-derive the springs after the graph was rebuilt.
    pub fn rebind(&mut self, graph: &SimilarityGraph) {
        self.links = build_links(graph, &self.forces);
        self.bound = (graph.node_count(), graph.edge_count());
    }

    /// Back to Hot, keeping positions.
    pub fn reheat(&mut self) {
        self.cooling.reheat(&self.cooling_config);
    }

    /// Back to the initial energy, as after a fresh load.
    pub fn restart(&mut self) {
        self.cooling.restart(&self.cooling_config);
    }

    /// Advance the layout by one tick.
    ///
    /// `dt` is the frame time in seconds; integration scales with it relative
    /// to 60 fps, clamped so a stalled frame cannot launch nodes. Pinned and
    /// dragged nodes are not integrated.
    pub fn step(&mut self, graph: &mut SimilarityGraph, dt: f32) -> StepStats {
        if self.bound != (graph.node_count(), graph.edge_count()) {
            self.rebind(graph);
        }
        self.ticks += 1;
        self.cooling.advance_alpha(&self.cooling_config);
        let alpha = self.cooling.alpha();

        let fixed: Vec<bool> = graph
            .nodes()
            .iter()
            .map(|n| n.state.is_pinned() || n.state.is_dragging())
            .collect();
        let free = fixed.iter().filter(|&&f| !f).count();

        let mut boundary_radius = 0.0;
        let mut mean_speed = 0.0;
        if graph.node_count() >= 2 && free > 0 {
            let (x, y, vx, vy) = graph.buffers_mut();
            {
                let mut bodies = Bodies { x: &*x, y: &*y, vx: &mut *vx, vy: &mut *vy };
                apply_many_body(&mut bodies, &self.forces, alpha);
                apply_links(&mut bodies, &self.links, alpha);
                boundary_radius = apply_boundary(&mut bodies, &self.forces, alpha);
                apply_center(&mut bodies, &self.forces, alpha);
                if self.cooling.collision_enabled() {
                    apply_collision(&mut bodies, &self.forces);
                }
            }

            let time_scale = if dt.is_finite() {
                (dt * 60.0).clamp(0.25, 3.0)
            } else {
                1.0
            };
            let keep = 1.0 - self.forces.velocity_decay;
            let max_speed = self.forces.max_speed;
            let mut speed_sum = 0.0;
            for i in 0..x.len() {
                if fixed[i] {
                    vx[i] = 0.0;
                    vy[i] = 0.0;
                    continue;
                }
                vx[i] *= keep;
                vy[i] *= keep;
                let mut speed = (vx[i] * vx[i] + vy[i] * vy[i]).sqrt();
                if !speed.is_finite() {
                    vx[i] = 0.0;
                    vy[i] = 0.0;
                    speed = 0.0;
                } else if speed > max_speed {
                    let s = max_speed / speed;
                    vx[i] *= s;
                    vy[i] *= s;
                    speed = max_speed;
                }
                x[i] += vx[i] * time_scale;
                y[i] += vy[i] * time_scale;
                speed_sum += speed;
            }
            mean_speed = speed_sum / free as f32;
        }

        self.cooling.observe(mean_speed, &self.cooling_config);
        StepStats {
            phase: self.cooling.phase(),
            alpha,
            mean_speed,
            boundary_radius,
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(ForceConfig::default(), CoolingConfig::default())
    }
}
