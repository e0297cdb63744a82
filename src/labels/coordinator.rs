//! Cluster label lifecycle across detection passes.
//!
//! Every detection pass bumps a generation counter and gives each cluster a
//! [`LabelCell`] that starts as the hub's label. The cache is consulted
//! immediately; whatever it cannot answer becomes a [`LabelJob`] in the
//! outbox for the host to send to the label service. Responses come back
//! tagged with `(cluster, generation)` and are checked against the current
//! cells, so a reply for a superseded pass never overwrites a newer label
//! unless it still describes the same cluster.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, warn};
use serde::Serialize;

use super::cache::{LabelCache, Lookup};
use super::vector::{centroid, cosine_similarity};
use crate::community::{ClusterId, Partition};
use crate::graph::SimilarityGraph;

/// Pending requests older than this many generations are forgotten.
const MAX_PENDING_GENERATIONS: u64 = 8;

/// Where a cluster's displayed label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelSource {
    /// The hub member's own label.
    Hub,
    /// Reused from the cache.
    Cached,
    /// Fresh from the label service.
    Generated,
    /// Refined from a near cache match.
    Refined,
}

/// The displayed label of one cluster in one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCell {
    pub cluster: ClusterId,
    pub generation: u64,
    pub text: String,
    pub source: LabelSource,
}

/// Work for the label service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LabelJob {
    /// Generate a label from scratch.
    #[serde(rename_all = "camelCase")]
    Generate {
        cluster_id: u32,
        generation: u64,
        keywords: Vec<String>,
    },
    /// Adjust an existing label to a changed member set.
    #[serde(rename_all = "camelCase")]
    Refine {
        cluster_id: u32,
        generation: u64,
        old_label: String,
        old_keywords: Vec<String>,
        new_keywords: Vec<String>,
    },
}

/// Members and semantic fingerprint of a cluster.
#[derive(Debug, Clone)]
struct Signature {
    keywords: Vec<String>,
    centroid: Option<Vec<f32>>,
}

#[derive(Debug)]
struct PendingRequest {
    signature: Signature,
    refine: bool,
}

/// Tracks label cells, outstanding requests and failures.
#[derive(Debug, Default)]
pub struct LabelCoordinator {
    generation: u64,
    cells: BTreeMap<ClusterId, LabelCell>,
    signatures: BTreeMap<ClusterId, Signature>,
    pending: HashMap<(ClusterId, u64), PendingRequest>,
    outbox: Vec<LabelJob>,
    no_retry: HashSet<ClusterId>,
}

impl LabelCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation. Bumped by every detection pass.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Label cell of a cluster in the current generation.
    pub fn cell(&self, cluster: ClusterId) -> Option<&LabelCell> {
        self.cells.get(&cluster)
    }

    /// All current cells in cluster order.
    pub fn cells(&self) -> impl Iterator<Item = &LabelCell> {
        self.cells.values()
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drain the jobs queued since the last call.
    pub fn take_jobs(&mut self) -> Vec<LabelJob> {
        std::mem::take(&mut self.outbox)
    }

    /// Start a new generation for a fresh partition.
    ///
    /// Cells start as hub labels; cache hits replace them immediately and
    /// misses or near matches queue jobs.
    pub fn on_detection(&mut self, partition: &Partition, graph: &SimilarityGraph, cache: &mut LabelCache) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        self.cells.clear();
        self.signatures.clear();
        self.no_retry.clear();
        self.outbox.clear();
        self.pending
            .retain(|&(_, g), _| g + MAX_PENDING_GENERATIONS > generation);

        for cluster in partition.clusters() {
            let hub_label = graph
                .node(cluster.hub)
                .map(|n| n.label.clone())
                .unwrap_or_default();
            let signature = Signature {
                keywords: cluster
                    .members
                    .iter()
                    .filter_map(|&m| graph.node(m).map(|n| n.label.clone()))
                    .collect(),
                centroid: centroid(
                    cluster
                        .members
                        .iter()
                        .filter_map(|&m| graph.node(m)?.embedding.as_deref()),
                ),
            };

            let mut cell = LabelCell {
                cluster: cluster.id,
                generation,
                text: hub_label,
                source: LabelSource::Hub,
            };

            let lookup = match &signature.centroid {
                Some(c) => cache.lookup(c),
                None => Lookup::Miss,
            };
            match lookup {
                Lookup::Exact(m) => {
                    if let Some(label) = cache.touch(m.index) {
                        cell.text = label.to_string();
                        cell.source = LabelSource::Cached;
                    }
                }
                Lookup::Near(m) => {
                    if let Some(entry) = cache.entry(m.index) {
                        cell.text = entry.label.clone();
                        cell.source = LabelSource::Cached;
                        self.outbox.push(LabelJob::Refine {
                            cluster_id: cluster.id.0,
                            generation,
                            old_label: entry.label.clone(),
                            old_keywords: entry.keywords_sorted.clone(),
                            new_keywords: signature.keywords.clone(),
                        });
                        self.pending.insert(
                            (cluster.id, generation),
                            PendingRequest {
                                signature: signature.clone(),
                                refine: true,
                            },
                        );
                    }
                }
                Lookup::Miss => self.queue_generate(cluster.id, &signature),
            }

            self.cells.insert(cluster.id, cell);
            self.signatures.insert(cluster.id, signature);
        }

        debug!(
            "label generation {generation}: {} clusters, {} jobs queued",
            self.cells.len(),
            self.outbox.len()
        );
        generation
    }

    fn queue_generate(&mut self, cluster: ClusterId, signature: &Signature) {
        self.outbox.push(LabelJob::Generate {
            cluster_id: cluster.0,
            generation: self.generation,
            keywords: signature.keywords.clone(),
        });
        self.pending.insert(
            (cluster, self.generation),
            PendingRequest {
                signature: signature.clone(),
                refine: false,
            },
        );
    }

    /// Handle a label service response.
    ///
    /// The label is cached under the centroid the request was made for. It
    /// is shown if the request belongs to the current generation, or if the
    /// cluster id still exists and its centroid still matches the request.
    /// Returns whether a displayed label changed.
    pub fn apply_label(
        &mut self,
        cluster: ClusterId,
        generation: u64,
        label: &str,
        cache: &mut LabelCache,
    ) -> bool {
        let Some(request) = self.pending.remove(&(cluster, generation)) else {
            debug!("ignoring label for {cluster} generation {generation}: no such request");
            return false;
        };
        let label = label.trim();
        if label.is_empty() {
            self.record_failure(cluster, generation);
            return false;
        }

        if let Some(c) = &request.signature.centroid {
            cache.add_or_update(&request.signature.keywords, c.clone(), label);
        }

        let current = generation == self.generation
            || self.signatures.get(&cluster).is_some_and(|sig| {
                match (&sig.centroid, &request.signature.centroid) {
                    (Some(now), Some(then)) => {
                        cosine_similarity(now, then) >= cache.config().match_threshold
                    }
                    _ => false,
                }
            });
        if !current {
            debug!("stale label for {cluster} generation {generation} cached but not shown");
            return false;
        }

        match self.cells.get_mut(&cluster) {
            Some(cell) => {
                cell.text = label.to_string();
                cell.source = if request.refine {
                    LabelSource::Refined
                } else {
                    LabelSource::Generated
                };
                true
            }
            None => false,
        }
    }

    /// Handle a failed or missing label service response.
    ///
    /// The cluster keeps its current label and is not retried until the next
    /// detection pass.
    pub fn fail_label(&mut self, cluster: ClusterId, generation: u64) {
        if self.pending.remove(&(cluster, generation)).is_some() {
            self.record_failure(cluster, generation);
        }
    }

    fn record_failure(&mut self, cluster: ClusterId, generation: u64) {
        if generation == self.generation {
            warn!("label request for {cluster} failed, keeping fallback label");
            self.no_retry.insert(cluster);
        }
    }

    /// Queue fresh requests for clusters still showing their hub label that
    /// have no request in flight and have not failed this generation.
    /// Returns the number of jobs queued.
    pub fn retry_unlabeled(&mut self) -> usize {
        let generation = self.generation;
        let candidates: Vec<ClusterId> = self
            .cells
            .values()
            .filter(|cell| cell.source == LabelSource::Hub)
            .map(|cell| cell.cluster)
            .filter(|c| !self.no_retry.contains(c) && !self.pending.contains_key(&(*c, generation)))
            .collect();

        for cluster in &candidates {
            if let Some(signature) = self.signatures.get(cluster).cloned() {
                self.queue_generate(*cluster, &signature);
            }
        }
        candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::CommunityConfig;
    use crate::graph::{EdgeInput, GraphInput, NodeInput};

    /// Two well-separated triangles with 2-d embeddings pointing apart.
    fn graph(prefix: &str) -> SimilarityGraph {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for (group, angle) in [("a", 0.0f32), ("b", 1.6f32)] {
            for i in 0..3 {
                let key = format!("{prefix}{group}{i}");
                let e = vec![(angle + i as f32 * 0.01).cos(), (angle + i as f32 * 0.01).sin()];
                nodes.push(NodeInput::keyword(key.clone(), format!("{group}{i}")).with_embedding(e));
            }
            edges.push(EdgeInput::new(format!("{prefix}{group}0"), format!("{prefix}{group}1"), 0.9));
            edges.push(EdgeInput::new(format!("{prefix}{group}1"), format!("{prefix}{group}2"), 0.9));
            edges.push(EdgeInput::new(format!("{prefix}{group}0"), format!("{prefix}{group}2"), 0.9));
        }
        SimilarityGraph::build(&GraphInput { nodes, edges }).0
    }

    fn detect(g: &SimilarityGraph) -> Partition {
        Partition::detect(g, 1.0, &CommunityConfig::default())
    }

    fn answer_all(coord: &mut LabelCoordinator, cache: &mut LabelCache) {
        for job in coord.take_jobs() {
            if let LabelJob::Generate {
                cluster_id,
                generation,
                keywords,
            } = job
            {
                let label = format!("Topic {}", keywords[0]);
                coord.apply_label(ClusterId(cluster_id), generation, &label, cache);
            }
        }
    }

    #[test]
    fn test_cells_start_as_hub_labels_and_queue_jobs() {
        let g = graph("");
        let p = detect(&g);
        let mut cache = LabelCache::default();
        let mut coord = LabelCoordinator::new();
        coord.on_detection(&p, &g, &mut cache);

        assert_eq!(coord.cells().count(), 2);
        for cell in coord.cells() {
            assert_eq!(cell.source, LabelSource::Hub);
            let hub = p.cluster(cell.cluster).unwrap().hub;
            assert_eq!(cell.text, g.node(hub).unwrap().label);
        }
        let jobs = coord.take_jobs();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| matches!(j, LabelJob::Generate { .. })));
        assert!(coord.take_jobs().is_empty());
    }

    #[test]
    fn test_response_updates_cell_and_cache() {
        let g = graph("");
        let p = detect(&g);
        let mut cache = LabelCache::default();
        let mut coord = LabelCoordinator::new();
        coord.on_detection(&p, &g, &mut cache);
        answer_all(&mut coord, &mut cache);

        assert_eq!(cache.len(), 2);
        assert!(coord.cells().all(|c| c.source == LabelSource::Generated));
        assert_eq!(coord.pending_count(), 0);
    }

    #[test]
    fn test_identical_clusters_reuse_cached_label() {
        let mut cache = LabelCache::default();
        let mut coord = LabelCoordinator::new();

        let first = graph("");
        let p1 = detect(&first);
        coord.on_detection(&p1, &first, &mut cache);
        answer_all(&mut coord, &mut cache);
        let labels: HashSet<String> = coord.cells().map(|c| c.text.clone()).collect();

        // Same members under different keys and cluster ids.
        let second = graph("again-");
        let p2 = detect(&second);
        coord.on_detection(&p2, &second, &mut cache);
        assert!(coord.take_jobs().is_empty(), "exact matches need no request");
        for cell in coord.cells() {
            assert_eq!(cell.source, LabelSource::Cached);
            assert!(labels.contains(&cell.text));
        }
    }

    #[test]
    fn test_near_match_shows_cached_label_and_refines() {
        let g = graph("");
        let p = detect(&g);
        let mut cache = LabelCache::default();
        // cos(0.4) ≈ 0.92: near band for the "a" cluster only.
        cache.add_or_update(&["x".to_string()], vec![0.4f32.cos(), -0.4f32.sin()], "Old");

        let mut coord = LabelCoordinator::new();
        coord.on_detection(&p, &g, &mut cache);
        let jobs = coord.take_jobs();
        let refine = jobs
            .iter()
            .find_map(|j| match j {
                LabelJob::Refine {
                    cluster_id,
                    generation,
                    old_label,
                    ..
                } => Some((*cluster_id, *generation, old_label.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(refine.2, "Old");
        let cluster = ClusterId(refine.0);
        assert_eq!(coord.cell(cluster).unwrap().text, "Old");

        assert!(coord.apply_label(cluster, refine.1, "Better", &mut cache));
        assert_eq!(coord.cell(cluster).unwrap().source, LabelSource::Refined);
        assert_eq!(coord.cell(cluster).unwrap().text, "Better");
    }

    #[test]
    fn test_failure_keeps_hub_and_blocks_retry() {
        let g = graph("");
        let p = detect(&g);
        let mut cache = LabelCache::default();
        let mut coord = LabelCoordinator::new();
        let generation = coord.on_detection(&p, &g, &mut cache);
        let jobs = coord.take_jobs();

        let LabelJob::Generate { cluster_id, .. } = &jobs[0] else {
            panic!("expected generate job");
        };
        let failed = ClusterId(*cluster_id);
        coord.fail_label(failed, generation);
        assert_eq!(coord.cell(failed).unwrap().source, LabelSource::Hub);

        // The other cluster never answered either; drop its request too.
        let LabelJob::Generate { cluster_id, .. } = &jobs[1] else {
            panic!("expected generate job");
        };
        coord.pending.clear();
        assert_eq!(coord.retry_unlabeled(), 1);
        match &coord.take_jobs()[0] {
            LabelJob::Generate { cluster_id: retried, .. } => assert_eq!(retried, cluster_id),
            other => panic!("unexpected job {other:?}"),
        }
    }

    #[test]
    fn test_empty_label_counts_as_failure() {
        let g = graph("");
        let p = detect(&g);
        let mut cache = LabelCache::default();
        let mut coord = LabelCoordinator::new();
        let generation = coord.on_detection(&p, &g, &mut cache);
        let cluster = coord.cells().next().unwrap().cluster;
        assert!(!coord.apply_label(cluster, generation, "   ", &mut cache));
        assert!(cache.is_empty());
        assert_eq!(coord.cell(cluster).unwrap().source, LabelSource::Hub);
    }

    #[test]
    fn test_stale_response_for_changed_cluster_is_ignored() {
        let mut cache = LabelCache::default();
        let mut coord = LabelCoordinator::new();

        let first = graph("");
        let p1 = detect(&first);
        let old_generation = coord.on_detection(&p1, &first, &mut cache);
        let jobs = coord.take_jobs();

        // Re-detect over a graph whose cluster 0 now points elsewhere.
        let mut rotated = graph("");
        for node in rotated.nodes_mut() {
            if let Some(e) = node.embedding.as_mut() {
                let (x, y) = (e[0], e[1]);
                e[0] = -y;
                e[1] = x;
            }
        }
        let p2 = detect(&rotated);
        coord.on_detection(&p2, &rotated, &mut cache);

        let LabelJob::Generate { cluster_id, .. } = &jobs[0] else {
            panic!("expected generate job");
        };
        let cluster = ClusterId(*cluster_id);
        let before = coord.cell(cluster).unwrap().clone();
        assert!(!coord.apply_label(cluster, old_generation, "Late", &mut cache));
        assert_eq!(coord.cell(cluster).unwrap(), &before);
        // Still learned for later lookups.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stale_response_for_same_cluster_is_merged() {
        let mut cache = LabelCache::default();
        let mut coord = LabelCoordinator::new();
        let g = graph("");
        let p = detect(&g);
        let old_generation = coord.on_detection(&p, &g, &mut cache);
        let jobs = coord.take_jobs();

        // Same graph re-detected (e.g. resolution nudged) before the reply.
        coord.on_detection(&p, &g, &mut cache);
        let LabelJob::Generate { cluster_id, .. } = &jobs[0] else {
            panic!("expected generate job");
        };
        let cluster = ClusterId(*cluster_id);
        assert!(coord.apply_label(cluster, old_generation, "Late", &mut cache));
        assert_eq!(coord.cell(cluster).unwrap().text, "Late");
    }

    #[test]
    fn test_unknown_request_is_ignored() {
        let mut cache = LabelCache::default();
        let mut coord = LabelCoordinator::new();
        assert!(!coord.apply_label(ClusterId(4), 9, "Nope", &mut cache));
        assert!(cache.is_empty());
    }
}
