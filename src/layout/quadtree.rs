//! Barnes–Hut quadtree for many-body repulsion.

const LEAF_CAPACITY: usize = 12;
const MAX_DEPTH: usize = 16;

/// Square cell of the tree.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    cx: f32,
    cy: f32,
    half: f32,
}

impl Bounds {
    fn from_points(xs: &[f32], ys: &[f32]) -> Option<Self> {
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for (&x, &y) in xs.iter().zip(ys) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return None;
        }

        let span = (max_x - min_x).max(max_y - min_y).max(1.0);
        Some(Self {
            cx: (min_x + max_x) * 0.5,
            cy: (min_y + max_y) * 0.5,
            half: span * 0.5 + 1.0,
        })
    }

    fn contains(self, x: f32, y: f32) -> bool {
        (x - self.cx).abs() <= self.half && (y - self.cy).abs() <= self.half
    }

    fn quadrant(self, x: f32, y: f32) -> usize {
        usize::from(x >= self.cx) | (usize::from(y >= self.cy) << 1)
    }

    fn child(self, quadrant: usize) -> Self {
        let q = self.half * 0.5;
        let dx = if quadrant & 1 == 1 { q } else { -q };
        let dy = if quadrant & 2 == 2 { q } else { -q };
        Self {
            cx: self.cx + dx,
            cy: self.cy + dy,
            half: q,
        }
    }
}

/// A node of the tree. Leaves hold point indices; inner nodes only carry
/// aggregate mass.
#[derive(Debug)]
pub(crate) struct QuadNode {
    bounds: Bounds,
    mass_x: f32,
    mass_y: f32,
    mass: f32,
    indices: Vec<usize>,
    children: [Option<Box<QuadNode>>; 4],
}

impl QuadNode {
    /// Build over all points. None for an empty or non-finite point set.
    pub(crate) fn build(xs: &[f32], ys: &[f32]) -> Option<Self> {
        let bounds = Bounds::from_points(xs, ys)?;
        Some(Self::build_node(bounds, (0..xs.len()).collect(), xs, ys, 0))
    }

    fn build_node(bounds: Bounds, indices: Vec<usize>, xs: &[f32], ys: &[f32], depth: usize) -> Self {
        let mass = indices.len() as f32;
        let (mut mx, mut my) = (0.0, 0.0);
        for &i in &indices {
            mx += xs[i];
            my += ys[i];
        }
        if mass > 0.0 {
            mx /= mass;
            my /= mass;
        }

        let mut node = Self {
            bounds,
            mass_x: mx,
            mass_y: my,
            mass,
            indices,
            children: std::array::from_fn(|_| None),
        };
        if depth >= MAX_DEPTH || node.indices.len() <= LEAF_CAPACITY {
            return node;
        }

        let mut buckets: [Vec<usize>; 4] = std::array::from_fn(|_| Vec::new());
        for &i in &node.indices {
            buckets[bounds.quadrant(xs[i], ys[i])].push(i);
        }
        for (quadrant, bucket) in buckets.into_iter().enumerate() {
            if !bucket.is_empty() {
                node.children[quadrant] = Some(Box::new(Self::build_node(
                    bounds.child(quadrant),
                    bucket,
                    xs,
                    ys,
                    depth + 1,
                )));
            }
        }
        node.indices.clear();
        node
    }

    fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Accumulate the repulsion on point `index` into `force`.
    ///
    /// The force falls off with inverse distance: each source contributes
    /// `delta * strength / (d² + softening)`. Cells that are far enough
    /// relative to their size (`side / d < theta`) act as one body, leaves
    /// included.
    pub(crate) fn repulsion(
        &self,
        index: usize,
        xs: &[f32],
        ys: &[f32],
        strength: f32,
        theta: f32,
        softening: f32,
        force: &mut (f32, f32),
    ) {
        if self.mass <= 0.0 {
            return;
        }
        let (px, py) = (xs[index], ys[index]);

        let dx = px - self.mass_x;
        let dy = py - self.mass_y;
        let dist_sq = (dx * dx + dy * dy).max(1e-4);
        let far = !self.bounds.contains(px, py)
            && self.bounds.half * 2.0 / dist_sq.sqrt() < theta
            && self.mass > 1.0;
        if far {
            let scale = strength * self.mass / (dist_sq + softening);
            force.0 += dx * scale;
            force.1 += dy * scale;
            return;
        }

        if self.is_leaf() {
            for &other in &self.indices {
                if other == index {
                    continue;
                }
                let (dx, dy) = separation(index, other, px - xs[other], py - ys[other]);
                let scale = strength / (dx * dx + dy * dy + softening);
                force.0 += dx * scale;
                force.1 += dy * scale;
            }
            return;
        }

        for child in self.children.iter().flatten() {
            child.repulsion(index, xs, ys, strength, theta, softening, force);
        }
    }
}

/// Separation vector between two points, replaced by a deterministic small
/// offset when they coincide.
pub(crate) fn separation(a: usize, b: usize, dx: f32, dy: f32) -> (f32, f32) {
    if dx * dx + dy * dy > 1e-8 {
        return (dx, dy);
    }
    let angle = (a as f32 * 0.618_034 + b as f32 * 0.414_214) * std::f32::consts::TAU;
    (angle.cos() * 1e-2, angle.sin() * 1e-2)
}
