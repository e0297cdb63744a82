//! Force terms of the layout simulation.
//!
//! Every force writes into the velocity buffers; integration happens in
//! [`super::Simulation::step`]. Forces are scaled by the current alpha except
//! collision, which resolves overlap at full strength.

use serde::{Deserialize, Serialize};

use super::contrast::contrast_curve;
use super::quadtree::{QuadNode, separation};
use crate::graph::SimilarityGraph;
use crate::spatial::SpatialIndex;

/// Repulsion softening, in squared world units.
const SOFTENING: f32 = 1.0;

/// Configuration for the force terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForceConfig {
    /// Steepness of the similarity contrast curve (default: 2.0).
    pub contrast_exponent: f32,
    /// Link length at full similarity (default: 40).
    pub base_distance: f32,
    /// Extra link length at zero similarity (default: 150).
    pub distance_range: f32,
    /// Link strength at zero similarity (default: 0.2).
    pub base_strength: f32,
    /// Extra link strength at full similarity (default: 0.8).
    pub strength_range: f32,
    /// Strength multiplier for mutual nearest-neighbor edges (default: 1.5).
    pub knn_boost: f32,
    /// Many-body repulsion magnitude (default: 30).
    pub repulsion_strength: f32,
    /// Barnes–Hut opening angle (default: 0.9). 0 is exact.
    pub theta: f32,
    /// Boundary radius as a multiple of the layout's RMS extent (default: 2.0).
    pub boundary_scale: f32,
    /// Pull strength toward the boundary for nodes outside it (default: 0.1).
    pub boundary_strength: f32,
    /// Smallest extent the boundary is computed from (default: 50).
    pub min_extent: f32,
    /// Collision radius per node (default: 6).
    pub collision_radius: f32,
    /// Share of overlap resolved per tick (default: 0.7).
    pub collision_strength: f32,
    /// Fraction of velocity lost per tick (default: 0.4).
    pub velocity_decay: f32,
    /// Weak pull of every node toward the origin (default: 0.05).
    pub center_strength: f32,
    /// Speed limit per tick, in world units (default: 50).
    pub max_speed: f32,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            contrast_exponent: 2.0,
            base_distance: 40.0,
            distance_range: 150.0,
            base_strength: 0.2,
            strength_range: 0.8,
            knn_boost: 1.5,
            repulsion_strength: 30.0,
            theta: 0.9,
            boundary_scale: 2.0,
            boundary_strength: 0.1,
            min_extent: 50.0,
            collision_radius: 6.0,
            collision_strength: 0.7,
            velocity_decay: 0.4,
            center_strength: 0.05,
            max_speed: 50.0,
        }
    }
}

/// One edge's spring, derived once per graph build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkForce {
    pub source: usize,
    pub target: usize,
    /// Rest length.
    pub distance: f32,
    pub strength: f32,
    /// Share of the correction applied to the target. Lower-degree endpoints
    /// move more.
    pub bias: f32,
}

impl LinkForce {
    /// Derive the spring for one edge.
    pub fn new(
        source: usize,
        target: usize,
        similarity: f32,
        mutual: bool,
        degrees: (usize, usize),
        config: &ForceConfig,
    ) -> Self {
        let adjusted = contrast_curve(similarity, config.contrast_exponent);
        let mut strength = config.base_strength + adjusted * config.strength_range;
        if mutual {
            strength *= config.knn_boost;
        }
        let (ds, dt) = (degrees.0.max(1) as f32, degrees.1.max(1) as f32);
        Self {
            source,
            target,
            distance: config.base_distance + (1.0 - adjusted) * config.distance_range,
            strength,
            bias: ds / (ds + dt),
        }
    }
}

/// Derive the springs for every edge of the graph.
pub fn build_links(graph: &SimilarityGraph, config: &ForceConfig) -> Vec<LinkForce> {
    graph
        .edges()
        .map(|(s, t, edge)| {
            LinkForce::new(
                s.index(),
                t.index(),
                edge.similarity,
                edge.mutual,
                (graph.degree(s), graph.degree(t)),
                config,
            )
        })
        .collect()
}

/// Mutable view of the simulation buffers.
pub struct Bodies<'a> {
    pub x: &'a [f32],
    pub y: &'a [f32],
    pub vx: &'a mut [f32],
    pub vy: &'a mut [f32],
}

/// Pairwise inverse-distance repulsion through a Barnes–Hut quadtree.
pub fn apply_many_body(bodies: &mut Bodies<'_>, config: &ForceConfig, alpha: f32) {
    let Some(tree) = QuadNode::build(bodies.x, bodies.y) else {
        return;
    };
    let strength = config.repulsion_strength * alpha;
    for i in 0..bodies.x.len() {
        let mut force = (0.0, 0.0);
        tree.repulsion(i, bodies.x, bodies.y, strength, config.theta, SOFTENING, &mut force);
        bodies.vx[i] += force.0;
        bodies.vy[i] += force.1;
    }
}

/// Springs along edges, following the predicted positions the way d3's
/// link force does.
pub fn apply_links(bodies: &mut Bodies<'_>, links: &[LinkForce], alpha: f32) {
    for link in links {
        let (s, t) = (link.source, link.target);
        let dx = bodies.x[t] + bodies.vx[t] - bodies.x[s] - bodies.vx[s];
        let dy = bodies.y[t] + bodies.vy[t] - bodies.y[s] - bodies.vy[s];
        let (dx, dy) = separation(t, s, dx, dy);
        let len = (dx * dx + dy * dy).sqrt();
        let k = (len - link.distance) / len * alpha * link.strength;
        let (fx, fy) = (dx * k, dy * k);
        bodies.vx[t] -= fx * link.bias;
        bodies.vy[t] -= fy * link.bias;
        bodies.vx[s] += fx * (1.0 - link.bias);
        bodies.vy[s] += fy * (1.0 - link.bias);
    }
}

/// Containment: nodes farther from the centroid than
/// `boundary_scale × max(rms extent, min_extent)` are pulled back in.
///
/// Returns the boundary radius used.
pub fn apply_boundary(bodies: &mut Bodies<'_>, config: &ForceConfig, alpha: f32) -> f32 {
    let n = bodies.x.len();
    if n == 0 {
        return 0.0;
    }
    let inv = 1.0 / n as f32;
    let cx = bodies.x.iter().sum::<f32>() * inv;
    let cy = bodies.y.iter().sum::<f32>() * inv;
    let mean_sq = bodies
        .x
        .iter()
        .zip(bodies.y)
        .map(|(&x, &y)| (x - cx).powi(2) + (y - cy).powi(2))
        .sum::<f32>()
        * inv;
    let radius = config.boundary_scale * mean_sq.sqrt().max(config.min_extent);

    for i in 0..n {
        let dx = bodies.x[i] - cx;
        let dy = bodies.y[i] - cy;
        let d = (dx * dx + dy * dy).sqrt();
        if d > radius {
            let k = (d - radius) / d * config.boundary_strength * alpha;
            bodies.vx[i] -= dx * k;
            bodies.vy[i] -= dy * k;
        }
    }
    radius
}

/// Weak gravity toward the origin.
pub fn apply_center(bodies: &mut Bodies<'_>, config: &ForceConfig, alpha: f32) {
    let k = config.center_strength * alpha;
    if k == 0.0 {
        return;
    }
    for i in 0..bodies.x.len() {
        bodies.vx[i] -= bodies.x[i] * k;
        bodies.vy[i] -= bodies.y[i] * k;
    }
}

/// Minimum separation of `2 × collision_radius` between node centers.
///
/// Candidate pairs come from an R-tree over the current positions.
pub fn apply_collision(bodies: &mut Bodies<'_>, config: &ForceConfig) {
    let min_distance = config.collision_radius * 2.0;
    if min_distance <= 0.0 || bodies.x.len() < 2 {
        return;
    }
    let index = SpatialIndex::from_buffers(bodies.x, bodies.y);
    for i in 0..bodies.x.len() {
        let (xi, yi) = (bodies.x[i], bodies.y[i]);
        for other in index.within(xi, yi, min_distance) {
            let j = other.id.index();
            if j <= i {
                continue;
            }
            let (dx, dy) = separation(i, j, xi - bodies.x[j], yi - bodies.y[j]);
            let d = (dx * dx + dy * dy).sqrt();
            if d >= min_distance {
                continue;
            }
            let k = (min_distance - d) / d * config.collision_strength * 0.5;
            bodies.vx[i] += dx * k;
            bodies.vy[i] += dy * k;
            bodies.vx[j] -= dx * k;
            bodies.vy[j] -= dy * k;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Buffers {
        x: Vec<f32>,
        y: Vec<f32>,
        vx: Vec<f32>,
        vy: Vec<f32>,
    }

    impl Buffers {
        fn new(points: &[(f32, f32)]) -> Self {
            Self {
                x: points.iter().map(|p| p.0).collect(),
                y: points.iter().map(|p| p.1).collect(),
                vx: vec![0.0; points.len()],
                vy: vec![0.0; points.len()],
            }
        }

        fn bodies(&mut self) -> Bodies<'_> {
            Bodies {
                x: &self.x,
                y: &self.y,
                vx: &mut self.vx,
                vy: &mut self.vy,
            }
        }
    }

    #[test]
    fn test_link_parameters_follow_similarity() {
        let config = ForceConfig::default();
        let strong = LinkForce::new(0, 1, 1.0, false, (1, 1), &config);
        let weak = LinkForce::new(0, 1, 0.0, false, (1, 1), &config);
        let mid = LinkForce::new(0, 1, 0.5, false, (1, 1), &config);

        assert!((strong.distance - 40.0).abs() < 1e-4);
        assert!((strong.strength - 1.0).abs() < 1e-4);
        assert!((weak.distance - 190.0).abs() < 1e-4);
        assert!((weak.strength - 0.2).abs() < 1e-4);
        assert!((mid.distance - 115.0).abs() < 1e-4);
        assert!((mid.bias - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mutual_edges_are_boosted() {
        let config = ForceConfig::default();
        let plain = LinkForce::new(0, 1, 0.7, false, (1, 1), &config);
        let boosted = LinkForce::new(0, 1, 0.7, true, (1, 1), &config);
        assert!((boosted.strength - plain.strength * config.knn_boost).abs() < 1e-5);
        assert_eq!(boosted.distance, plain.distance);
    }

    #[test]
    fn test_bias_moves_leaf_more_than_hub() {
        // Source is a hub with degree 4, target a leaf.
        let link = LinkForce::new(0, 1, 0.5, false, (4, 1), &ForceConfig::default());
        assert!(link.bias > 0.5, "target side should take most of the correction");
    }

    #[test]
    fn test_stretched_link_pulls_together() {
        let mut buffers = Buffers::new(&[(0.0, 0.0), (500.0, 0.0)]);
        let link = LinkForce::new(0, 1, 0.9, false, (1, 1), &ForceConfig::default());
        apply_links(&mut buffers.bodies(), &[link], 1.0);
        assert!(buffers.vx[0] > 0.0);
        assert!(buffers.vx[1] < 0.0);
    }

    #[test]
    fn test_many_body_pushes_apart() {
        let mut buffers = Buffers::new(&[(-1.0, 0.0), (1.0, 0.0)]);
        apply_many_body(&mut buffers.bodies(), &ForceConfig::default(), 1.0);
        assert!(buffers.vx[0] < 0.0);
        assert!(buffers.vx[1] > 0.0);
    }

    #[test]
    fn test_boundary_pulls_outlier_only() {
        let mut points: Vec<(f32, f32)> = (0..20)
            .map(|i| ((i as f32).cos() * 10.0, (i as f32).sin() * 10.0))
            .collect();
        points.push((5000.0, 0.0));
        let mut buffers = Buffers::new(&points);
        let radius = apply_boundary(&mut buffers.bodies(), &ForceConfig::default(), 1.0);

        assert!(radius < 5000.0);
        assert!(buffers.vx[20] < 0.0, "outlier pulled back");
        assert_eq!(buffers.vx[0], 0.0, "inner node untouched");
    }

    #[test]
    fn test_collision_separates_overlap() {
        let mut buffers = Buffers::new(&[(0.0, 0.0), (2.0, 0.0), (100.0, 0.0)]);
        apply_collision(&mut buffers.bodies(), &ForceConfig::default());
        assert!(buffers.vx[0] < 0.0);
        assert!(buffers.vx[1] > 0.0);
        assert_eq!(buffers.vx[2], 0.0);
    }
}
