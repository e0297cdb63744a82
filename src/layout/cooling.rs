//! Convergence state machine: `Hot → Cooling → Settled`.
//!
//! While Hot, alpha eases toward a constant target so the layout keeps
//! moving until the speed heuristic judges it settled in. Cooling lets alpha
//! decay toward zero and turns collision on; Settled is reached once alpha
//! drops below its floor. A drag sends the machine back to Hot.

use log::debug;
use serde::{Deserialize, Serialize};

/// Configuration for the cooling schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoolingConfig {
    /// Alpha at load (default: 1.0).
    pub alpha_start: f32,
    /// Alpha held while Hot (default: 0.3).
    pub hot_alpha_target: f32,
    /// Per-tick easing of alpha toward its target (default: 0.0228, d3's
    /// rate for 300 ticks).
    pub alpha_decay: f32,
    /// Alpha below which the layout counts as Settled (default: 0.001).
    pub alpha_min: f32,
    /// Mean node speed, in world units per tick, below which a tick counts
    /// as calm (default: 0.5).
    pub settle_speed: f32,
    /// Consecutive calm ticks that end the Hot phase (default: 30).
    pub settle_ticks: u32,
    /// Hot ticks after which cooling starts regardless (default: 600).
    pub max_hot_ticks: u32,
}

impl Default for CoolingConfig {
    fn default() -> Self {
        Self {
            alpha_start: 1.0,
            hot_alpha_target: 0.3,
            alpha_decay: 0.0228,
            alpha_min: 0.001,
            settle_speed: 0.5,
            settle_ticks: 30,
            max_hot_ticks: 600,
        }
    }
}

/// Simulation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Hot,
    Cooling,
    Settled,
}

/// Alpha and phase bookkeeping.
#[derive(Debug, Clone)]
pub struct CoolingState {
    phase: Phase,
    alpha: f32,
    calm_ticks: u32,
    hot_ticks: u32,
}

impl CoolingState {
    pub fn new(config: &CoolingConfig) -> Self {
        Self {
            phase: Phase::Hot,
            alpha: config.alpha_start,
            calm_ticks: 0,
            hot_ticks: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Collision is only resolved once the Hot phase is over.
    pub fn collision_enabled(&self) -> bool {
        self.phase != Phase::Hot
    }

    /// Alpha the schedule is currently easing toward.
    pub fn alpha_target(&self, config: &CoolingConfig) -> f32 {
        match self.phase {
            Phase::Hot => config.hot_alpha_target,
            Phase::Cooling | Phase::Settled => 0.0,
        }
    }

    /// Ease alpha one tick toward its target.
    pub fn advance_alpha(&mut self, config: &CoolingConfig) {
        let target = self.alpha_target(config);
        self.alpha += (target - self.alpha) * config.alpha_decay;
    }

    /// Feed the mean node speed of the tick just integrated and run the
    /// phase transitions.
    pub fn observe(&mut self, mean_speed: f32, config: &CoolingConfig) {
        match self.phase {
            Phase::Hot => {
                self.hot_ticks += 1;
                if mean_speed < config.settle_speed {
                    self.calm_ticks += 1;
                } else {
                    self.calm_ticks = 0;
                }
                let calm = self.calm_ticks >= config.settle_ticks;
                if calm || self.hot_ticks >= config.max_hot_ticks {
                    debug!(
                        "layout cooling after {} hot ticks ({})",
                        self.hot_ticks,
                        if calm { "settled in" } else { "hot tick limit" }
                    );
                    self.phase = Phase::Cooling;
                }
            }
            Phase::Cooling => {
                if self.alpha < config.alpha_min {
                    debug!("layout settled");
                    self.phase = Phase::Settled;
                }
            }
            Phase::Settled => {}
        }
    }

    /// Back to Hot: alpha is raised to at least the hot target and the calm
    /// counters restart.
    pub fn reheat(&mut self, config: &CoolingConfig) {
        if self.phase != Phase::Hot {
            debug!("layout reheated from {:?}", self.phase);
        }
        self.phase = Phase::Hot;
        self.alpha = self.alpha.max(config.hot_alpha_target);
        self.calm_ticks = 0;
        self.hot_ticks = 0;
    }

    /// Start over as after a load.
    pub fn restart(&mut self, config: &CoolingConfig) {
        *self = Self::new(config);
    }
}
