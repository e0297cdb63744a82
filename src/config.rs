//! Engine configuration.
//!
//! Each component owns its config struct next to its code; `EngineConfig`
//! groups them so a host can pass one JSON object. Every field has a default,
//! so `{}` is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::community::CommunityConfig;
use crate::error::{EngineError, Result};
use crate::labels::LabelCacheConfig;
use crate::layout::{CoolingConfig, ForceConfig};
use crate::spatial::HoverConfig;
use crate::viewport::AutoFitConfig;

/// All engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub community: CommunityConfig,
    pub forces: ForceConfig,
    pub cooling: CoolingConfig,
    pub label_cache: LabelCacheConfig,
    pub hover: HoverConfig,
    pub auto_fit: AutoFitConfig,
}

fn unit_interval(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!("{name} must be in [0, 1], got {value}")))
    }
}

fn positive(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!("{name} must be positive, got {value}")))
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        positive("community.resolution", self.community.resolution)?;
        unit_interval("community.precomputedMinCoverage", self.community.precomputed_min_coverage)?;

        let cache = &self.label_cache;
        unit_interval("labelCache.matchThreshold", cache.match_threshold)?;
        unit_interval("labelCache.exactThreshold", cache.exact_threshold)?;
        unit_interval("labelCache.existsThreshold", cache.exists_threshold)?;
        if cache.match_threshold > cache.exact_threshold {
            return Err(EngineError::InvalidConfig(format!(
                "labelCache.matchThreshold ({}) exceeds exactThreshold ({})",
                cache.match_threshold, cache.exact_threshold
            )));
        }
        if cache.capacity == 0 {
            return Err(EngineError::InvalidConfig("labelCache.capacity must be at least 1".into()));
        }

        positive("forces.contrastExponent", self.forces.contrast_exponent)?;
        unit_interval("forces.velocityDecay", self.forces.velocity_decay)?;
        positive("forces.maxSpeed", self.forces.max_speed)?;
        if !(self.forces.theta.is_finite() && self.forces.theta >= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "forces.theta must be non-negative, got {}",
                self.forces.theta
            )));
        }

        unit_interval("cooling.alphaDecay", self.cooling.alpha_decay)?;
        positive("cooling.alphaMin", self.cooling.alpha_min)?;
        unit_interval("hover.similarityThreshold", self.hover.similarity_threshold)?;
        Ok(())
    }
}
