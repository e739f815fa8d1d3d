//! Complexity score to tier mapping

use serde::{Deserialize, Serialize};

use super::types::TierKey;

/// Default upper bound (exclusive) of the fast tier
pub const DEFAULT_THRESHOLD_FAST: f64 = 0.30;

/// Default upper bound (exclusive) of the mid tier
pub const DEFAULT_THRESHOLD_MID: f64 = 0.42;

/// The two monotonic thresholds splitting `[0, 1]` into three tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub fast: f64,
    pub mid: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            fast: DEFAULT_THRESHOLD_FAST,
            mid: DEFAULT_THRESHOLD_MID,
        }
    }
}

impl TierThresholds {
    pub fn new(fast: f64, mid: f64) -> Self {
        Self { fast, mid }
    }

    /// Map a complexity score to a tier.
    ///
    /// Lower bounds are inclusive: a score equal to `fast` is `mid`, a score
    /// equal to `mid` is `reasoning`. Out-of-range scores land in the nearest
    /// bucket, and NaN lands in `reasoning`.
    pub fn decide(&self, score: f64) -> TierKey {
        if score < self.fast {
            TierKey::Fast
        } else if score < self.mid {
            TierKey::Mid
        } else {
            TierKey::Reasoning
        }
    }
}

/// Map a score to a tier using the default thresholds
pub fn decide_tier(score: f64) -> TierKey {
    TierThresholds::default().decide(score)
}
