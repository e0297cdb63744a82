//! Cluster labels: an approximate centroid-keyed cache, its persistence,
//! and the coordinator that turns detection passes into label jobs.

mod cache;
mod coordinator;
mod storage;
mod vector;

pub use cache::{CacheEntry, CacheMatch, LabelCache, LabelCacheConfig, Lookup};
pub use coordinator::{LabelCell, LabelCoordinator, LabelJob, LabelSource};
pub use storage::{CacheStorage, MemoryStorage, CACHE_SCHEMA_VERSION, CACHE_STORAGE_KEY};
pub use vector::{centroid, cosine_similarity};
