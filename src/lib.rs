//! Keyword Map - WASM Module
//!
//! Turns a keyword-similarity graph into an explorable map: topical
//! communities, cached semantic labels, a force-directed layout that cools
//! into place, and hover highlighting that mixes screen-space proximity with
//! graph and embedding neighborhoods. Compiled to WebAssembly and exposed to
//! JavaScript via wasm-bindgen; the pure-Rust [`MapEngine`] is usable and
//! testable without a browser.
//!
//! # Architecture
//!
//! - `graph`: similarity graph on petgraph's StableGraph with SoA positions
//! - `community`: Louvain partitioning and hub selection
//! - `labels`: centroid-keyed label cache and label job coordination
//! - `layout`: force simulation and its cooling state machine
//! - `spatial`: R-tree index and hover highlighting
//! - `viewport`: camera transform and auto-fit policy

use js_sys::Float32Array;
use log::Level;
use wasm_bindgen::prelude::*;

pub mod community;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod labels;
pub mod layout;
pub mod spatial;
pub mod viewport;

pub use config::EngineConfig;
pub use engine::{ClusterFrame, Highlight, MapEngine, NodeFrame, RenderFrame};
pub use error::{EngineError, Result};

use graph::{GraphInput, PrecomputedClusters};
use labels::{CACHE_STORAGE_KEY, CacheStorage, MemoryStorage};
use viewport::Camera;

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    let _ = console_log::init_with_level(Level::Debug);
    console_error_panic_hook::set_once();
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// JavaScript entry point wrapping [`MapEngine`].
#[wasm_bindgen]
pub struct KeywordMapWasm {
    engine: MapEngine,
}

#[wasm_bindgen]
impl KeywordMapWasm {
    /// Create an engine. `config` is an optional partial `EngineConfig`
    /// object; missing fields take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> std::result::Result<KeywordMapWasm, JsValue> {
        let config: EngineConfig = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(js_error)?
        };
        let engine = MapEngine::new(config).map_err(js_error)?;
        Ok(Self { engine })
    }

    // =========================================================================
    // Graph Lifecycle
    // =========================================================================

    /// Load a new dataset `{nodes, edges}`, optionally with precomputed
    /// `{resolution, nodeToCluster}`. Returns the build report.
    #[wasm_bindgen(js_name = loadGraph)]
    pub fn load_graph(&mut self, input: JsValue, precomputed: JsValue) -> std::result::Result<JsValue, JsValue> {
        let input: GraphInput = serde_wasm_bindgen::from_value(input).map_err(js_error)?;
        let precomputed: Option<PrecomputedClusters> = if precomputed.is_undefined() || precomputed.is_null() {
            None
        } else {
            Some(serde_wasm_bindgen::from_value(precomputed).map_err(js_error)?)
        };
        let report = self.engine.load_graph(&input, precomputed);
        serde_wasm_bindgen::to_value(&report).map_err(js_error)
    }

    /// Replace the graph after a filter change, keeping surviving positions.
    #[wasm_bindgen(js_name = updateGraph)]
    pub fn update_graph(&mut self, input: JsValue) -> std::result::Result<JsValue, JsValue> {
        let input: GraphInput = serde_wasm_bindgen::from_value(input).map_err(js_error)?;
        let report = self.engine.update_graph(&input);
        serde_wasm_bindgen::to_value(&report).map_err(js_error)
    }

    /// Re-run community detection at a new resolution.
    #[wasm_bindgen(js_name = setResolution)]
    pub fn set_resolution(&mut self, resolution: f32) -> std::result::Result<(), JsValue> {
        self.engine.set_resolution(resolution).map_err(js_error)
    }

    /// Hide the nodes with the given keys; all others are shown.
    #[wasm_bindgen(js_name = setHidden)]
    pub fn set_hidden(&mut self, keys: Vec<String>) -> usize {
        self.engine.set_hidden(&keys)
    }

    // =========================================================================
    // Frame Loop
    // =========================================================================

    /// Advance one frame. Returns `{phase, alpha, meanSpeed, boundaryRadius}`.
    pub fn tick(&mut self, dt: f32) -> std::result::Result<JsValue, JsValue> {
        let stats = self.engine.tick(dt);
        serde_wasm_bindgen::to_value(&stats).map_err(js_error)
    }

    /// Full render snapshot.
    pub fn frame(&self) -> std::result::Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.frame()).map_err(js_error)
    }

    // =========================================================================
    // Position Buffer Access (Zero-Copy)
    // =========================================================================

    /// Get a zero-copy view of X positions.
    ///
    /// # Safety
    ///
    /// The returned view is invalidated if any Rust allocation occurs.
    /// Use immediately, do not store.
    #[wasm_bindgen(js_name = getPositionsXView)]
    pub fn get_positions_x_view(&self) -> Float32Array {
        unsafe { Float32Array::view(self.engine.graph().positions_x()) }
    }

    /// Get a zero-copy view of Y positions. Same caveats as X.
    #[wasm_bindgen(js_name = getPositionsYView)]
    pub fn get_positions_y_view(&self) -> Float32Array {
        unsafe { Float32Array::view(self.engine.graph().positions_y()) }
    }

    /// Positions as a copied `[x0, y0, x1, y1, ...]` array.
    #[wasm_bindgen(js_name = getPositions)]
    pub fn get_positions(&self) -> Vec<f32> {
        self.engine.positions_interleaved()
    }

    // =========================================================================
    // Camera
    // =========================================================================

    #[wasm_bindgen(js_name = setViewport)]
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.engine.set_viewport(width, height);
    }

    /// Apply a manual pan/zoom. Disables auto-fit until `resetView`.
    #[wasm_bindgen(js_name = setCamera)]
    pub fn set_camera(&mut self, x: f32, y: f32, k: f32) {
        self.engine.set_camera(Camera::new(x, y, k));
    }

    #[wasm_bindgen(js_name = resetView)]
    pub fn reset_view(&mut self) {
        self.engine.reset_view();
    }

    /// Current camera as `[x, y, k]`.
    #[wasm_bindgen(js_name = getCamera)]
    pub fn get_camera(&self) -> Vec<f32> {
        let c = self.engine.camera();
        vec![c.x, c.y, c.k]
    }

    // =========================================================================
    // Pointer & Drag
    // =========================================================================

    /// Pointer moved to screen position `(x, y)`. Returns the highlight.
    #[wasm_bindgen(js_name = onPointerMove)]
    pub fn on_pointer_move(&mut self, x: f32, y: f32) -> std::result::Result<JsValue, JsValue> {
        let highlight = self.engine.on_pointer_move(x, y);
        serde_wasm_bindgen::to_value(highlight).map_err(js_error)
    }

    #[wasm_bindgen(js_name = onPointerLeave)]
    pub fn on_pointer_leave(&mut self) {
        self.engine.on_pointer_leave();
    }

    #[wasm_bindgen(js_name = dragStart)]
    pub fn drag_start(&mut self, key: &str) -> std::result::Result<(), JsValue> {
        self.engine.drag_start(key).map_err(js_error)
    }

    /// Move a dragged node to world position `(x, y)`.
    #[wasm_bindgen(js_name = dragMove)]
    pub fn drag_move(&mut self, key: &str, x: f32, y: f32) -> std::result::Result<(), JsValue> {
        self.engine.drag_move(key, x, y).map_err(js_error)
    }

    #[wasm_bindgen(js_name = dragEnd)]
    pub fn drag_end(&mut self, key: &str) -> std::result::Result<(), JsValue> {
        self.engine.drag_end(key).map_err(js_error)
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Drain queued label jobs as an array of `{type, clusterId, generation, ...}`.
    #[wasm_bindgen(js_name = takeLabelJobs)]
    pub fn take_label_jobs(&mut self) -> std::result::Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.take_label_jobs()).map_err(js_error)
    }

    #[wasm_bindgen(js_name = applyLabel)]
    pub fn apply_label(&mut self, cluster_id: u32, generation: u64, label: &str) -> bool {
        self.engine.apply_label(cluster_id, generation, label)
    }

    #[wasm_bindgen(js_name = failLabel)]
    pub fn fail_label(&mut self, cluster_id: u32, generation: u64) {
        self.engine.fail_label(cluster_id, generation);
    }

    /// Load the label cache from its serialized form (as stored under
    /// `keyword-map.label-cache`). Bad input leaves an empty cache.
    #[wasm_bindgen(js_name = importCache)]
    pub fn import_cache(&mut self, json: String) -> std::result::Result<(), JsValue> {
        let mut storage = MemoryStorage::new();
        storage.set(CACHE_STORAGE_KEY, json).map_err(js_error)?;
        self.engine.load_cache(&storage);
        Ok(())
    }

    /// Serialize the label cache for the host to store.
    #[wasm_bindgen(js_name = exportCache)]
    pub fn export_cache(&self) -> std::result::Result<String, JsValue> {
        let mut storage = MemoryStorage::new();
        self.engine.save_cache(&mut storage).map_err(js_error)?;
        storage
            .get(CACHE_STORAGE_KEY)
            .map_err(js_error)?
            .ok_or_else(|| JsValue::from_str("label cache was not written"))
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::graph::{EdgeInput, NodeInput};
    use crate::labels::{LabelJob, LabelSource};
    use crate::layout::Phase;

    /// Three topical groups with embeddings pointing in distinct directions,
    /// loosely bridged, plus one isolated keyword.
    fn dataset() -> GraphInput {
        let topics = [("lang", 0.0f32), ("food", 2.1f32), ("space", 4.2f32)];
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for (topic, angle) in topics {
            for i in 0..6 {
                let a = angle + i as f32 * 0.03;
                nodes.push(
                    NodeInput::keyword(format!("{topic}-{i}"), format!("{topic}{i}"))
                        .with_embedding(vec![a.cos(), a.sin(), 0.1]),
                );
            }
            for i in 0..6 {
                for j in (i + 1)..6 {
                    let mutual = (i + j) % 2 == 1;
                    let edge = EdgeInput::new(format!("{topic}-{i}"), format!("{topic}-{j}"), 0.85);
                    edges.push(if mutual { edge.mutual() } else { edge });
                }
            }
        }
        edges.push(EdgeInput::new("lang-0", "food-0", 0.15));
        edges.push(EdgeInput::new("food-0", "space-0", 0.15));
        nodes.push(NodeInput::keyword("hermit", "hermit"));
        GraphInput { nodes, edges }
    }

    fn answer_jobs(engine: &mut MapEngine) -> usize {
        let jobs = engine.take_label_jobs();
        for job in &jobs {
            match job {
                LabelJob::Generate {
                    cluster_id,
                    generation,
                    keywords,
                } => {
                    let label = format!("About {}", &keywords[0][..keywords[0].len() - 1]);
                    engine.apply_label(*cluster_id, *generation, &label);
                }
                LabelJob::Refine {
                    cluster_id,
                    generation,
                    old_label,
                    ..
                } => {
                    engine.apply_label(*cluster_id, *generation, &format!("{old_label}+"));
                }
            }
        }
        jobs.len()
    }

    #[test]
    fn test_full_session() {
        let mut engine = MapEngine::new(EngineConfig::default()).unwrap();
        engine.set_viewport(1200.0, 800.0);
        let report = engine.load_graph(&dataset(), None);
        assert_eq!(report.total_dropped(), 0);

        // Detection: three clusters, the isolated keyword stays out.
        assert_eq!(engine.partition().len(), 3);
        let hermit = engine.graph().id_of("hermit").unwrap();
        assert_eq!(engine.partition().cluster_of(hermit), None);

        // Labels: hub labels first, generated labels after the round trip.
        assert!(engine.frame().clusters.iter().all(|c| c.label_source == LabelSource::Hub));
        assert_eq!(answer_jobs(&mut engine), 3);
        let frame = engine.frame();
        assert!(frame.clusters.iter().all(|c| c.label_source == LabelSource::Generated));
        assert_eq!(engine.cluster_label("space-3"), Some("About space"));
        assert_eq!(engine.cache().len(), 3);

        // Layout settles.
        let mut ticks = 0;
        while engine.phase() != Phase::Settled {
            engine.tick(1.0 / 60.0);
            ticks += 1;
            assert!(ticks < 3000, "layout never settled");
        }
        assert_ne!(engine.camera(), Camera::IDENTITY, "auto-fit should have framed the graph");

        // Hover over a node highlights its neighborhood.
        let id = engine.graph().id_of("food-2").unwrap();
        let (wx, wy) = engine.graph().position(id).unwrap();
        let (sx, sy) = engine.camera().world_to_screen(wx, wy);
        match engine.on_pointer_move(sx, sy).clone() {
            Highlight::Set(ids) => {
                assert!(ids.contains(&id.raw()));
                assert!(!ids.contains(&hermit.raw()));
            }
            other => panic!("expected a highlight set, got {other:?}"),
        }
        engine.on_pointer_leave();
        assert_eq!(engine.highlight(), &Highlight::Off);

        // Dragging reheats a settled layout.
        engine.drag_start("food-2").unwrap();
        engine.drag_move("food-2", wx + 200.0, wy).unwrap();
        engine.tick(1.0 / 60.0);
        assert_eq!(engine.phase(), Phase::Hot);
        assert_eq!(engine.graph().position(id), Some((wx + 200.0, wy)));
        engine.drag_end("food-2").unwrap();
        engine.tick(1.0 / 60.0);

        // Filter change: surviving keywords keep their positions.
        let before = engine.graph().position(engine.graph().id_of("lang-1").unwrap());
        let mut filtered = dataset();
        filtered.nodes.retain(|n| !n.id.starts_with("space"));
        filtered.edges.retain(|e| !e.source.starts_with("space") && !e.target.starts_with("space"));
        engine.update_graph(&filtered);
        assert_eq!(engine.graph().node_count(), 13);
        assert_eq!(engine.graph().position(engine.graph().id_of("lang-1").unwrap()), before);

        // Same clusters re-detected: labels come straight from the cache.
        assert_eq!(engine.partition().len(), 2);
        assert!(engine.take_label_jobs().is_empty());
        assert_eq!(engine.cluster_label("lang-4"), Some("About lang"));
    }

    #[test]
    fn test_identical_clusters_share_cached_label() {
        let mut engine = MapEngine::new(EngineConfig::default()).unwrap();
        engine.load_graph(&dataset(), None);
        answer_jobs(&mut engine);
        let label = engine.cluster_label("lang-0").unwrap().to_string();

        // Same members under a fresh load get new cluster ids but the same
        // centroid, so both runs resolve to the same cached label.
        let mut shuffled = dataset();
        shuffled.nodes.reverse();
        engine.load_graph(&shuffled, None);
        assert!(engine.take_label_jobs().is_empty());
        assert_eq!(engine.cluster_label("lang-0"), Some(label.as_str()));
        let cluster = engine
            .graph()
            .node(engine.graph().id_of("lang-0").unwrap())
            .unwrap()
            .cluster
            .unwrap();
        assert_eq!(engine.labels().cell(cluster).unwrap().source, LabelSource::Cached);
    }

    #[test]
    fn test_label_failure_falls_back_to_hub() {
        let mut engine = MapEngine::new(EngineConfig::default()).unwrap();
        engine.load_graph(&dataset(), None);
        for job in engine.take_label_jobs() {
            if let LabelJob::Generate {
                cluster_id,
                generation,
                ..
            } = job
            {
                engine.fail_label(cluster_id, generation);
            }
        }
        assert!(engine.frame().clusters.iter().all(|c| c.label_source == LabelSource::Hub));
        assert_eq!(engine.retry_unlabeled(), 0, "failed clusters wait for the next detection");

        engine.set_resolution(1.0).unwrap();
        assert_eq!(engine.take_label_jobs().len(), 3);
    }

    #[test]
    fn test_cache_survives_export_and_import() {
        let mut engine = MapEngine::new(EngineConfig::default()).unwrap();
        engine.load_graph(&dataset(), None);
        answer_jobs(&mut engine);

        let mut storage = MemoryStorage::new();
        engine.save_cache(&mut storage).unwrap();

        let mut fresh = MapEngine::new(EngineConfig::default()).unwrap();
        fresh.load_cache(&storage);
        assert_eq!(fresh.cache().len(), 3);
        fresh.load_graph(&dataset(), None);
        assert!(fresh.take_label_jobs().is_empty());
        assert_eq!(fresh.cluster_label("food-1"), Some("About food"));
    }

    #[test]
    fn test_hidden_nodes_are_not_hovered() {
        let mut engine = MapEngine::new(EngineConfig::default()).unwrap();
        engine.load_graph(&dataset(), None);
        let id = engine.graph().id_of("hermit").unwrap();
        let (wx, wy) = engine.graph().position(id).unwrap();
        let (sx, sy) = engine.camera().world_to_screen(wx, wy);

        let keys: Vec<String> = engine.graph().nodes().iter().map(|n| n.key.clone()).collect();
        engine.set_hidden(&keys);
        assert_eq!(engine.on_pointer_move(sx, sy), &Highlight::DimAll);
    }
}
