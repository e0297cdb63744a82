//! Approximate label cache keyed by cluster centroid.
//!
//! Lookups compare the query centroid against every stored centroid by
//! cosine similarity. A linear scan is fine at the expected scale of a few
//! hundred clusters. Two bands matter to callers:
//!
//! - `>= exact_threshold`: reuse the label as-is.
//! - `>= match_threshold`: show the label now, ask for a cheap refinement.
//! - below: miss, ask for a fresh label.
//!
//! Entries are evicted least-recently-used first once the cache grows past
//! its capacity. `lastUsed` is a logical clock, bumped on every insert and hit.

use serde::{Deserialize, Serialize};

use super::vector::cosine_similarity;

/// Float slack so an identical centroid still matches a threshold of 1.0.
const SIMILARITY_EPSILON: f32 = 1e-5;

/// `similarity >= threshold`, with slack only at the top of the range.
fn reaches(similarity: f32, threshold: f32) -> bool {
    if threshold >= 1.0 {
        similarity + SIMILARITY_EPSILON >= threshold
    } else {
        similarity >= threshold
    }
}

/// Configuration for the label cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelCacheConfig {
    /// Minimum similarity for a cached label to be shown (default: 0.85).
    pub match_threshold: f32,
    /// Minimum similarity for a cached label to be reused without a
    /// refinement request (default: 0.95).
    pub exact_threshold: f32,
    /// Similarity above which an insert updates an existing entry in place
    /// instead of adding a new one (default: 0.95).
    pub exists_threshold: f32,
    /// Maximum number of entries (default: 500).
    pub capacity: usize,
}

impl Default for LabelCacheConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.85,
            exact_threshold: 0.95,
            exists_threshold: 0.95,
            capacity: 500,
        }
    }
}

/// One cached label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Sorted member labels the label was generated from. Informational.
    pub keywords_sorted: Vec<String>,
    /// Normalized mean of the member embeddings.
    pub centroid: Vec<f32>,
    pub label: String,
    /// Logical timestamp of the last insert or hit.
    pub last_used: u64,
}

/// Best match found by [`LabelCache::find_best_match`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheMatch {
    /// Position of the entry in the cache.
    pub index: usize,
    pub similarity: f32,
}

/// Outcome of classifying a centroid against the cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    /// Close enough to reuse without further work.
    Exact(CacheMatch),
    /// Reuse now, refine in the background.
    Near(CacheMatch),
    /// Nothing similar enough.
    Miss,
}

/// Serialized form of the cache.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CacheSnapshot {
    pub version: u32,
    pub clock: u64,
    pub entries: Vec<CacheEntry>,
}

/// In-memory label cache.
#[derive(Debug, Clone)]
pub struct LabelCache {
    entries: Vec<CacheEntry>,
    clock: u64,
    config: LabelCacheConfig,
}

impl LabelCache {
    /// Create an empty cache.
    pub fn new(config: LabelCacheConfig) -> Self {
        Self {
            entries: Vec::new(),
            clock: 0,
            config,
        }
    }

    pub(crate) fn from_snapshot(snapshot: CacheSnapshot, config: LabelCacheConfig) -> Self {
        let mut cache = Self {
            entries: snapshot.entries,
            clock: snapshot.clock,
            config,
        };
        // A stored clock behind its own entries would break LRU ordering.
        let newest = cache.entries.iter().map(|e| e.last_used).max().unwrap_or(0);
        cache.clock = cache.clock.max(newest);
        cache.evict();
        cache
    }

    pub(crate) fn snapshot(&self, version: u32) -> CacheSnapshot {
        CacheSnapshot {
            version,
            clock: self.clock,
            entries: self.entries.clone(),
        }
    }

    /// Cache configuration.
    pub fn config(&self) -> &LabelCacheConfig {
        &self.config
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in storage order.
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Entry at a position returned by a match.
    pub fn entry(&self, index: usize) -> Option<&CacheEntry> {
        self.entries.get(index)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Highest-similarity entry at or above `threshold`.
    ///
    /// Ties keep the entry seen first.
    pub fn find_best_match(&self, centroid: &[f32], threshold: f32) -> Option<CacheMatch> {
        let mut best: Option<CacheMatch> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let similarity = cosine_similarity(centroid, &entry.centroid);
            if !reaches(similarity, threshold) {
                continue;
            }
            if best.is_none_or(|b| similarity > b.similarity) {
                best = Some(CacheMatch { index, similarity });
            }
        }
        best
    }

    /// Classify a centroid into the exact / near / miss bands.
    pub fn lookup(&self, centroid: &[f32]) -> Lookup {
        match self.find_best_match(centroid, self.config.match_threshold) {
            Some(m) if reaches(m.similarity, self.config.exact_threshold) => {
                Lookup::Exact(m)
            }
            Some(m) => Lookup::Near(m),
            None => Lookup::Miss,
        }
    }

    /// Mark an entry as used now. Returns its label.
    pub fn touch(&mut self, index: usize) -> Option<&str> {
        let now = self.tick();
        let entry = self.entries.get_mut(index)?;
        entry.last_used = now;
        Some(&entry.label)
    }

    /// Insert a label, or update the entry whose centroid already matches
    /// above `exists_threshold`.
    ///
    /// No two entries are ever left within `exists_threshold` of each other:
    /// an update that moves a centroid next to another entry absorbs it.
    pub fn add_or_update(&mut self, members: &[String], centroid: Vec<f32>, label: impl Into<String>) {
        let mut keywords_sorted = members.to_vec();
        keywords_sorted.sort_unstable();
        let label = label.into();
        let now = self.tick();

        match self.find_best_match(&centroid, self.config.exists_threshold) {
            Some(m) => {
                let entry = &mut self.entries[m.index];
                entry.keywords_sorted = keywords_sorted;
                entry.centroid = centroid;
                entry.label = label;
                entry.last_used = now;
                self.absorb_near(m.index);
            }
            None => {
                self.entries.push(CacheEntry {
                    keywords_sorted,
                    centroid,
                    label,
                    last_used: now,
                });
                self.evict();
            }
        }
    }

    /// Remove every other entry within `exists_threshold` of the entry at
    /// `keep`.
    fn absorb_near(&mut self, keep: usize) {
        let threshold = self.config.exists_threshold;
        let kept = self.entries[keep].centroid.clone();
        let mut index = 0;
        self.entries.retain(|entry| {
            let current = index;
            index += 1;
            current == keep || !reaches(cosine_similarity(&kept, &entry.centroid), threshold)
        });
    }

    /// Drop least-recently-used entries until within capacity.
    fn evict(&mut self) {
        while self.entries.len() > self.config.capacity {
            let oldest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(i, _)| i);
            match oldest {
                Some(i) => {
                    self.entries.remove(i);
                }
                None => break,
            }
        }
    }
}

impl Default for LabelCache {
    fn default() -> Self {
        Self::new(LabelCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(angle: f32) -> Vec<f32> {
        vec![angle.cos(), angle.sin()]
    }

    fn members(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_add_or_update_is_idempotent() {
        let mut cache = LabelCache::default();
        cache.add_or_update(&members(&["b", "a"]), unit(0.3), "Topic");
        cache.add_or_update(&members(&["b", "a"]), unit(0.3), "Topic");

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entries()[0].label, "Topic");
        assert_eq!(cache.entries()[0].keywords_sorted, members(&["a", "b"]));

        let found = cache.find_best_match(&unit(0.3), 1.0).unwrap();
        assert_eq!(found.index, 0);
    }

    #[test]
    fn test_close_centroid_updates_in_place() {
        let mut cache = LabelCache::default();
        cache.add_or_update(&members(&["a"]), unit(0.0), "Old");
        // cos(0.1) ≈ 0.995, above the exists threshold.
        cache.add_or_update(&members(&["a", "b"]), unit(0.1), "New");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entries()[0].label, "New");
    }

    #[test]
    fn test_distant_centroid_adds_entry() {
        let mut cache = LabelCache::default();
        cache.add_or_update(&members(&["a"]), unit(0.0), "One");
        cache.add_or_update(&members(&["z"]), unit(1.2), "Two");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lookup_bands() {
        let mut cache = LabelCache::default();
        cache.add_or_update(&members(&["a"]), unit(0.0), "Topic");

        // cos(0.1) ≈ 0.995
        assert!(matches!(cache.lookup(&unit(0.1)), Lookup::Exact(_)));
        // cos(0.45) ≈ 0.900
        assert!(matches!(cache.lookup(&unit(0.45)), Lookup::Near(_)));
        // cos(0.7) ≈ 0.765
        assert_eq!(cache.lookup(&unit(0.7)), Lookup::Miss);
    }

    #[test]
    fn test_best_match_prefers_highest_similarity() {
        let mut cache = LabelCache::new(LabelCacheConfig {
            exists_threshold: 0.999,
            ..Default::default()
        });
        cache.add_or_update(&members(&["a"]), unit(0.3), "Far");
        cache.add_or_update(&members(&["b"]), unit(0.05), "Close");
        let m = cache.find_best_match(&unit(0.0), 0.85).unwrap();
        assert_eq!(cache.entry(m.index).unwrap().label, "Close");
    }

    #[test]
    fn test_touch_refreshes_last_used() {
        let mut cache = LabelCache::default();
        cache.add_or_update(&members(&["a"]), unit(0.0), "A");
        let before = cache.entries()[0].last_used;
        assert_eq!(cache.touch(0), Some("A"));
        assert!(cache.entries()[0].last_used > before);
        assert_eq!(cache.touch(7), None);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = LabelCache::new(LabelCacheConfig {
            capacity: 2,
            ..Default::default()
        });
        cache.add_or_update(&members(&["a"]), unit(0.0), "A");
        cache.add_or_update(&members(&["b"]), unit(1.5), "B");
        // Use A so B becomes the oldest.
        cache.touch(0);
        cache.add_or_update(&members(&["c"]), unit(3.0), "C");

        let labels: Vec<_> = cache.entries().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(cache.len(), 2);
        assert!(labels.contains(&"A"));
        assert!(labels.contains(&"C"));
        assert!(!labels.contains(&"B"));
    }

    #[test]
    fn test_snapshot_restores_clock_floor() {
        let mut cache = LabelCache::default();
        cache.add_or_update(&members(&["a"]), unit(0.0), "A");
        let mut snapshot = cache.snapshot(1);
        snapshot.clock = 0;
        let restored = LabelCache::from_snapshot(snapshot, LabelCacheConfig::default());
        assert_eq!(restored.len(), 1);
        assert!(restored.clock >= restored.entries()[0].last_used);
    }

    #[test]
    fn test_update_absorbs_entry_it_moves_next_to() {
        let mut cache = LabelCache::default();
        cache.add_or_update(&members(&["a"]), unit(0.0), "A");
        // cos(0.6) ≈ 0.825, two separate entries.
        cache.add_or_update(&members(&["b"]), unit(0.6), "B");
        assert_eq!(cache.len(), 2);

        // Closest to B (cos 0.29 ≈ 0.958), but also within reach of A
        // (cos 0.31 ≈ 0.952) once B moves here.
        cache.add_or_update(&members(&["a", "b"]), unit(0.31), "AB");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entries()[0].label, "AB");

        let threshold = cache.config().exists_threshold;
        for (i, a) in cache.entries().iter().enumerate() {
            for b in &cache.entries()[i + 1..] {
                assert!(cosine_similarity(&a.centroid, &b.centroid) < threshold);
            }
        }
    }

    #[test]
    fn test_threshold_has_no_slack_below_one() {
        let mut cache = LabelCache::default();
        cache.add_or_update(&members(&["a"]), vec![1.0, 0.0], "A");
        let s: f32 = 0.849_995;
        let query = vec![s, (1.0 - s * s).sqrt()];
        assert_eq!(cache.find_best_match(&query, 0.85), None);
        assert_eq!(cache.lookup(&query), Lookup::Miss);
        assert!(cache.find_best_match(&[1.0, 0.0], 1.0).is_some());
    }
}
