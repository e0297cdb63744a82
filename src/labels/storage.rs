//! Label cache persistence through a key-value storage collaborator.
//!
//! The cache is stored as one JSON document under a fixed key. The document
//! carries a schema version; anything written by another version, or that
//! fails to decode, is discarded and the session starts with an empty cache.

use std::collections::HashMap;

use log::warn;

use super::cache::{CacheSnapshot, LabelCache, LabelCacheConfig};
use crate::error::{EngineError, Result};

/// Storage key for the serialized cache.
pub const CACHE_STORAGE_KEY: &str = "keyword-map.label-cache";

/// Current schema version of the serialized cache.
pub const CACHE_SCHEMA_VERSION: u32 = 2;

/// Opaque key-value storage supplied by the host.
pub trait CacheStorage {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value.
    fn set(&mut self, key: &str, value: String) -> Result<()>;
}

/// In-memory storage, for tests and hosts without persistence.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

impl LabelCache {
    /// Serialize the cache to its versioned JSON form.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot(CACHE_SCHEMA_VERSION))?)
    }

    /// Decode a serialized cache, rejecting other schema versions.
    pub fn decode(json: &str, config: LabelCacheConfig) -> Result<Self> {
        let snapshot: CacheSnapshot = serde_json::from_str(json)?;
        if snapshot.version != CACHE_SCHEMA_VERSION {
            return Err(EngineError::CacheVersion {
                found: snapshot.version,
                expected: CACHE_SCHEMA_VERSION,
            });
        }
        Ok(Self::from_snapshot(snapshot, config))
    }

    /// Load the cache from storage.
    ///
    /// Never fails: a missing, stale or corrupt document yields an empty
    /// cache.
    pub fn load(storage: &dyn CacheStorage, config: LabelCacheConfig) -> Self {
        let stored = match storage.get(CACHE_STORAGE_KEY) {
            Ok(Some(json)) => json,
            Ok(None) => return Self::new(config),
            Err(e) => {
                warn!("label cache read failed, starting empty: {e}");
                return Self::new(config);
            }
        };
        match Self::decode(&stored, config.clone()) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("label cache reset: {e}");
                Self::new(config)
            }
        }
    }

    /// Write the cache to storage.
    pub fn save(&self, storage: &mut dyn CacheStorage) -> Result<()> {
        storage.set(CACHE_STORAGE_KEY, self.encode()?)
    }
}
