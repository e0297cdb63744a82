//! When to reframe the camera around the whole layout.
//!
//! Policy: one automatic fit after a short settle-in delay, then at most
//! `max_refits` more while the visible node count changes materially and the
//! layout is still moving. Once the user pans or zooms, never again until
//! the next reset.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::layout::Phase;

/// Configuration for automatic camera fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoFitConfig {
    /// Seconds after a load before the first fit (default: 0.5).
    pub initial_delay: f32,
    /// Fits allowed after the first one (default: 3).
    pub max_refits: u32,
    /// Relative change in visible node count that warrants a refit
    /// (default: 0.2).
    pub material_change_ratio: f32,
    /// Screen padding around the fitted bounds, in pixels (default: 40).
    pub padding: f32,
}

impl Default for AutoFitConfig {
    fn default() -> Self {
        Self {
            initial_delay: 0.5,
            max_refits: 3,
            material_change_ratio: 0.2,
            padding: 40.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutoFitController {
    elapsed: f32,
    initial_done: bool,
    refits: u32,
    user_interacted: bool,
    last_fit_count: usize,
}

impl AutoFitController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all history, as for a new graph.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record manual pan or zoom. Sticky until [`reset`](Self::reset).
    pub fn mark_interaction(&mut self) {
        if !self.user_interacted {
            debug!("auto-fit disabled by user interaction");
        }
        self.user_interacted = true;
    }

    pub fn user_interacted(&self) -> bool {
        self.user_interacted
    }

    /// Advance the settle-in timer.
    pub fn advance(&mut self, dt: f32) {
        if dt.is_finite() && dt > 0.0 {
            self.elapsed += dt;
        }
    }

    /// Whether the camera should be fitted now.
    pub fn should_fit(&self, phase: Phase, visible_count: usize, config: &AutoFitConfig) -> bool {
        if self.user_interacted || visible_count == 0 {
            return false;
        }
        if !self.initial_done {
            return self.elapsed >= config.initial_delay;
        }
        if phase == Phase::Settled || self.refits >= config.max_refits {
            return false;
        }
        let last = self.last_fit_count.max(1) as f32;
        let change = (visible_count as f32 - self.last_fit_count as f32).abs() / last;
        change >= config.material_change_ratio
    }

    /// Note that a fit was applied for `visible_count` nodes.
    pub fn record_fit(&mut self, visible_count: usize) {
        if self.initial_done {
            self.refits += 1;
        }
        self.initial_done = true;
        self.last_fit_count = visible_count;
        debug!("auto-fit applied ({visible_count} nodes, {} refits)", self.refits);
    }
}
