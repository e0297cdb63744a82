//! MapEngine - the keyword map as one stateful object.
//!
//! The engine owns the similarity graph, the current partition, the layout
//! simulation, label state, and the camera. Hosts drive it through two entry
//! points: `tick(dt)` once per animation frame and `on_pointer_move` per
//! pointer event. Everything else (graph loads, resolution changes, label
//! responses, drags) is a plain method call between frames.

use std::collections::{HashSet, VecDeque};

use log::{debug, info, warn};
use serde::Serialize;

use crate::community::{ClusterId, Partition, PartitionSource};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::{BuildReport, GraphInput, NodeId, NodeKind, PositionCache, PrecomputedClusters, SimilarityGraph};
use crate::labels::{CacheStorage, LabelCache, LabelCoordinator, LabelJob, LabelSource};
use crate::layout::{Phase, Simulation, StepStats};
use crate::spatial::{SpatialIndex, compute_highlight};
use crate::viewport::{AutoFitController, Camera, Viewport};

/// Resolutions closer than this are treated as equal when matching a
/// precomputed partition.
const RESOLUTION_EPSILON: f32 = 1e-6;

/// What the renderer should do with highlight state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "ids", rename_all = "camelCase")]
pub enum Highlight {
    /// No hover in progress: everything at full opacity.
    Off,
    /// Pointer over empty space: dim everything uniformly.
    DimAll,
    /// Highlight these node ids, dim the rest.
    Set(Vec<u32>),
}

/// One node in a [`RenderFrame`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFrame {
    pub id: u32,
    pub key: String,
    pub label: String,
    pub kind: NodeKind,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub cluster: Option<u32>,
    pub hub: bool,
    pub hidden: bool,
}

/// One cluster label in a [`RenderFrame`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterFrame {
    pub id: u32,
    pub label: String,
    pub label_source: LabelSource,
    pub hub: u32,
    pub members: usize,
    pub visible_members: usize,
    /// `visible_members / members`, for fading labels of filtered clusters.
    pub visible_ratio: f32,
    /// Mean position of the visible members. None when all are hidden.
    pub anchor: Option<(f32, f32)>,
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderFrame {
    pub phase: Phase,
    pub alpha: f32,
    pub camera: Camera,
    pub generation: u64,
    pub nodes: Vec<NodeFrame>,
    pub clusters: Vec<ClusterFrame>,
    pub highlight: Highlight,
}

/// A drag event waiting for the next tick.
#[derive(Debug, Clone, PartialEq)]
enum DragEvent {
    Start(String),
    Move(String, f32, f32),
    End(String),
}

/// The keyword map engine.
pub struct MapEngine {
    config: EngineConfig,
    graph: SimilarityGraph,
    partition: Partition,
    resolution: f32,
    precomputed: Option<PrecomputedClusters>,
    last_report: BuildReport,

    simulation: Simulation,
    positions: PositionCache,
    drags: VecDeque<DragEvent>,

    labels: LabelCoordinator,
    cache: LabelCache,

    camera: Camera,
    viewport: Viewport,
    autofit: AutoFitController,

    highlight: Highlight,
    spatial: SpatialIndex,
    spatial_dirty: bool,
}

impl MapEngine {
    /// Create an engine with an empty graph and an empty label cache.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cache = LabelCache::new(config.label_cache.clone());
        Ok(Self {
            resolution: config.community.resolution,
            partition: Partition::empty(config.community.resolution),
            simulation: Simulation::new(config.forces.clone(), config.cooling.clone()),
            graph: SimilarityGraph::new(),
            precomputed: None,
            last_report: BuildReport::default(),
            positions: PositionCache::new(),
            drags: VecDeque::new(),
            labels: LabelCoordinator::new(),
            cache,
            camera: Camera::IDENTITY,
            viewport: Viewport::default(),
            autofit: AutoFitController::new(),
            highlight: Highlight::Off,
            spatial: SpatialIndex::new(),
            spatial_dirty: true,
            config,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current graph with live positions.
    pub fn graph(&self) -> &SimilarityGraph {
        &self.graph
    }

    /// Result of the latest community detection.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Current modularity resolution.
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Current simulation phase.
    pub fn phase(&self) -> Phase {
        self.simulation.phase()
    }

    /// Current camera transform.
    pub fn camera(&self) -> Camera {
        self.camera
    }

    /// Highlight state from the last pointer event.
    pub fn highlight(&self) -> &Highlight {
        &self.highlight
    }

    /// Per-cluster label cells and pending label requests.
    pub fn labels(&self) -> &LabelCoordinator {
        &self.labels
    }

    /// The label cache.
    pub fn cache(&self) -> &LabelCache {
        &self.cache
    }

    /// Report of the most recent graph build.
    pub fn last_report(&self) -> &BuildReport {
        &self.last_report
    }

    /// Displayed label of the cluster a node belongs to.
    pub fn cluster_label(&self, key: &str) -> Option<&str> {
        let id = self.graph.id_of(key)?;
        let cluster = self.graph.node(id)?.cluster?;
        self.labels.cell(cluster).map(|c| c.text.as_str())
    }

    // =========================================================================
    // Graph Lifecycle
    // =========================================================================

    /// Load a new dataset.
    ///
    /// Position carry-over, auto-fit history, and the user-interaction flag
    /// are reset. A precomputed partition is used when it matches the current
    /// resolution and covers enough of the graph.
    pub fn load_graph(&mut self, input: &GraphInput, precomputed: Option<PrecomputedClusters>) -> BuildReport {
        self.positions.clear();
        self.autofit.reset();
        self.drags.clear();
        self.precomputed = precomputed;
        self.simulation.restart();
        self.rebuild(input)
    }

    /// Replace the graph after a filter change.
    ///
    /// Surviving node keys keep their positions; the layout is reheated.
    pub fn update_graph(&mut self, input: &GraphInput) -> BuildReport {
        self.positions.remember(&self.graph);
        self.simulation.reheat();
        self.rebuild(input)
    }

    fn rebuild(&mut self, input: &GraphInput) -> BuildReport {
        let (mut graph, report) = SimilarityGraph::build(input);
        self.positions.seed(&mut graph);
        self.graph = graph;
        self.simulation.rebind(&self.graph);
        self.spatial_dirty = true;
        self.highlight = Highlight::Off;
        self.detect();

        info!(
            "graph built: {} nodes, {} edges, {} clusters",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.partition.len()
        );
        self.last_report = report;
        report
    }

    /// Re-run community detection at a new resolution.
    ///
    /// Cluster ids and hub flags are rewritten in place; positions,
    /// velocities, and the cooling phase are untouched.
    pub fn set_resolution(&mut self, resolution: f32) -> Result<()> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "resolution must be positive, got {resolution}"
            )));
        }
        self.resolution = resolution;
        self.detect();
        Ok(())
    }

    fn detect(&mut self) {
        let community = &self.config.community;
        let adopted = self
            .precomputed
            .as_ref()
            .filter(|pre| (pre.resolution - self.resolution).abs() < RESOLUTION_EPSILON)
            .and_then(|pre| {
                let partition = Partition::from_precomputed(&self.graph, pre, community);
                if partition.is_none() {
                    warn!("precomputed clusters rejected, detecting locally");
                }
                partition
            });
        self.partition =
            adopted.unwrap_or_else(|| Partition::detect(&self.graph, self.resolution, community));
        self.partition.apply_to(&mut self.graph);
        let generation = self.labels.on_detection(&self.partition, &self.graph, &mut self.cache);

        debug!(
            "detection generation {generation}: {} clusters ({:?}), modularity {:.3}",
            self.partition.len(),
            self.partition.source,
            self.partition.modularity
        );
    }

    /// Hide every node whose key is in `keys` and show all others.
    ///
    /// Hidden nodes keep simulating but are excluded from hover, auto-fit
    /// bounds, and label visibility. Returns how many keys matched.
    pub fn set_hidden(&mut self, keys: &[String]) -> usize {
        let hidden: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let mut matched = 0;
        for node in self.graph.nodes_mut() {
            let hide = hidden.contains(node.key.as_str());
            matched += usize::from(hide);
            node.state.set_hidden(hide);
        }
        self.spatial_dirty = true;
        matched
    }

    fn visible_count(&self) -> usize {
        self.graph.nodes().iter().filter(|n| !n.state.is_hidden()).count()
    }

    // =========================================================================
    // Frame Loop
    // =========================================================================

    /// Advance one animation frame of `dt` seconds.
    ///
    /// Queued drags are applied first, then the layout steps, then auto-fit
    /// may reframe the camera.
    pub fn tick(&mut self, dt: f32) -> StepStats {
        self.apply_drags();
        let stats = self.simulation.step(&mut self.graph, dt);
        self.spatial_dirty = true;

        self.autofit.advance(dt);
        let visible = self.visible_count();
        if self.autofit.should_fit(stats.phase, visible, &self.config.auto_fit) {
            self.fit_camera();
            self.autofit.record_fit(visible);
        }
        stats
    }

    fn fit_camera(&mut self) {
        if let Some(bounds) = self.graph.bounds() {
            self.camera = Camera::fit_bounds(bounds, self.viewport, self.config.auto_fit.padding);
        }
    }

    // =========================================================================
    // Camera
    // =========================================================================

    /// Set the viewport size in screen pixels.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.viewport = Viewport { width, height };
        }
    }

    /// Apply a camera from manual pan or zoom. Disables auto-fit.
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera.sanitized();
        self.autofit.mark_interaction();
    }

    /// Explicit "fit all": frames the layout now and re-enables auto-fit.
    pub fn reset_view(&mut self) {
        self.autofit.reset();
        self.fit_camera();
        self.autofit.record_fit(self.visible_count());
    }

    // =========================================================================
    // Pointer & Drag
    // =========================================================================

    /// Recompute the highlight for a pointer at screen position `(x, y)`.
    pub fn on_pointer_move(&mut self, x: f32, y: f32) -> &Highlight {
        if self.spatial_dirty {
            let graph = &self.graph;
            self.spatial = SpatialIndex::from_graph(graph, |id| {
                graph.node(id).is_some_and(|n| !n.state.is_hidden())
            });
            self.spatial_dirty = false;
        }

        let hover = &self.config.hover;
        let outcome = compute_highlight(
            &self.graph,
            &self.spatial,
            (x, y),
            &self.camera,
            hover.screen_radius,
            hover.similarity_threshold,
        );
        self.highlight = match outcome.highlighted {
            None => Highlight::DimAll,
            Some(set) => {
                let mut ids: Vec<u32> = set.into_iter().map(NodeId::raw).collect();
                ids.sort_unstable();
                Highlight::Set(ids)
            }
        };
        &self.highlight
    }

    /// Pointer left the map: clear the highlight.
    pub fn on_pointer_leave(&mut self) {
        self.highlight = Highlight::Off;
    }

    fn require_node(&self, key: &str) -> Result<()> {
        match self.graph.id_of(key) {
            Some(_) => Ok(()),
            None => Err(EngineError::UnknownNode(key.to_string())),
        }
    }

    /// Begin dragging a node. Applied on the next tick.
    pub fn drag_start(&mut self, key: &str) -> Result<()> {
        self.require_node(key)?;
        self.drags.push_back(DragEvent::Start(key.to_string()));
        Ok(())
    }

    /// Move a dragged node to world position `(x, y)`. Applied on the next
    /// tick.
    pub fn drag_move(&mut self, key: &str, x: f32, y: f32) -> Result<()> {
        self.require_node(key)?;
        if x.is_finite() && y.is_finite() {
            self.drags.push_back(DragEvent::Move(key.to_string(), x, y));
        }
        Ok(())
    }

    /// Release a dragged node. Applied on the next tick.
    pub fn drag_end(&mut self, key: &str) -> Result<()> {
        self.require_node(key)?;
        self.drags.push_back(DragEvent::End(key.to_string()));
        Ok(())
    }

    fn apply_drags(&mut self) {
        while let Some(event) = self.drags.pop_front() {
            let key = match &event {
                DragEvent::Start(k) | DragEvent::Move(k, _, _) | DragEvent::End(k) => k,
            };
            // The graph may have been rebuilt since the event was queued.
            let Some(id) = self.graph.id_of(key) else {
                debug!("dropping drag for vanished node {key}");
                continue;
            };
            match event {
                DragEvent::Start(_) => {
                    if let Some(node) = self.graph.node_mut(id) {
                        node.state.set_dragging(true);
                    }
                    self.graph.clear_velocity(id);
                    self.simulation.reheat();
                }
                DragEvent::Move(_, x, y) => {
                    self.graph.set_position(id, x, y);
                    self.graph.clear_velocity(id);
                    self.simulation.reheat();
                }
                DragEvent::End(_) => {
                    if let Some(node) = self.graph.node_mut(id) {
                        node.state.set_dragging(false);
                    }
                }
            }
        }
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Drain the label jobs queued by detection passes.
    pub fn take_label_jobs(&mut self) -> Vec<LabelJob> {
        self.labels.take_jobs()
    }

    /// Deliver a label service response. Returns whether a displayed label
    /// changed.
    pub fn apply_label(&mut self, cluster_id: u32, generation: u64, label: &str) -> bool {
        self.labels
            .apply_label(ClusterId(cluster_id), generation, label, &mut self.cache)
    }

    /// Report a failed label request. The cluster keeps its fallback label.
    pub fn fail_label(&mut self, cluster_id: u32, generation: u64) {
        self.labels.fail_label(ClusterId(cluster_id), generation);
    }

    /// Re-queue requests for clusters still showing hub labels.
    pub fn retry_unlabeled(&mut self) -> usize {
        self.labels.retry_unlabeled()
    }

    /// Replace the label cache with the stored one. Never fails; an
    /// unreadable store leaves an empty cache.
    pub fn load_cache(&mut self, storage: &dyn CacheStorage) {
        self.cache = LabelCache::load(storage, self.config.label_cache.clone());
        debug!("label cache loaded with {} entries", self.cache.len());
    }

    /// Write the label cache to storage.
    pub fn save_cache(&self, storage: &mut dyn CacheStorage) -> Result<()> {
        self.cache.save(storage)
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Positions as `[x0, y0, x1, y1, ...]`.
    pub fn positions_interleaved(&self) -> Vec<f32> {
        self.graph
            .positions_x()
            .iter()
            .zip(self.graph.positions_y())
            .flat_map(|(&x, &y)| [x, y])
            .collect()
    }

    /// Snapshot for the renderer.
    pub fn frame(&self) -> RenderFrame {
        let xs = self.graph.positions_x();
        let ys = self.graph.positions_y();
        let vxs = self.graph.velocities_x();
        let vys = self.graph.velocities_y();

        let nodes = self
            .graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, node)| NodeFrame {
                id: i as u32,
                key: node.key.clone(),
                label: node.label.clone(),
                kind: node.kind,
                x: xs[i],
                y: ys[i],
                vx: vxs[i],
                vy: vys[i],
                cluster: node.cluster.map(|c| c.0),
                hub: node.state.is_hub(),
                hidden: node.state.is_hidden(),
            })
            .collect();

        let mut clusters = Vec::with_capacity(self.partition.len());
        for cluster in self.partition.clusters() {
            let mut visible = 0usize;
            let (mut sx, mut sy) = (0.0f32, 0.0f32);
            for &m in &cluster.members {
                if self.graph.node(m).is_some_and(|n| !n.state.is_hidden()) {
                    visible += 1;
                    sx += xs[m.index()];
                    sy += ys[m.index()];
                }
            }
            let total = cluster.members.len();
            let (label, label_source) = match self.labels.cell(cluster.id) {
                Some(cell) => (cell.text.clone(), cell.source),
                None => (
                    self.graph
                        .node(cluster.hub)
                        .map(|n| n.label.clone())
                        .unwrap_or_default(),
                    LabelSource::Hub,
                ),
            };
            clusters.push(ClusterFrame {
                id: cluster.id.0,
                label,
                label_source,
                hub: cluster.hub.raw(),
                members: total,
                visible_members: visible,
                visible_ratio: if total == 0 {
                    0.0
                } else {
                    visible as f32 / total as f32
                },
                anchor: (visible > 0).then(|| (sx / visible as f32, sy / visible as f32)),
            });
        }

        RenderFrame {
            phase: self.simulation.phase(),
            alpha: self.simulation.alpha(),
            camera: self.camera,
            generation: self.labels.generation(),
            nodes,
            clusters,
            highlight: self.highlight.clone(),
        }
    }

    /// Where the current partition came from.
    pub fn partition_source(&self) -> PartitionSource {
        self.partition.source
    }
}
