//! Form analyzer.
//!
//! Turns a side's recent results into a probability: a recency-weighted
//! win rate, pulled toward a prior so that a short history cannot produce
//! a 0% or 100% estimate.

use serde::{Deserialize, Serialize};

/// Result of one recent game from the perspective of the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormResult {
    Win,
    Loss,
    Push,
}

impl FormResult {
    fn score(&self) -> f64 {
        match self {
            FormResult::Win => 1.0,
            FormResult::Push => 0.5,
            FormResult::Loss => 0.0,
        }
    }
}

/// Form analyzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Number of most recent results considered.
    pub window: usize,
    /// Weight multiplier per game of age (1.0 = plain average).
    pub decay: f64,
    /// Probability assumed with no history.
    pub prior: f64,
    /// Pseudo-games of prior blended into the rate.
    pub prior_weight: f64,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            window: 10,
            decay: 0.85,
            prior: 0.5,
            prior_weight: 2.0,
        }
    }
}

pub struct FormAnalyzer {
    config: FormConfig,
}

impl FormAnalyzer {
    pub fn new(config: FormConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    /// Form probability from results ordered most recent first.
    pub fn probability(&self, recent: &[FormResult]) -> f64 {
        let decay = self.config.decay.clamp(f64::MIN_POSITIVE, 1.0);
        let prior = self.config.prior.clamp(0.0, 1.0);
        let prior_weight = self.config.prior_weight.max(0.0);

        let mut weight = 1.0;
        let mut weighted_score = 0.0;
        let mut total_weight = 0.0;
        for result in recent.iter().take(self.config.window) {
            weighted_score += weight * result.score();
            total_weight += weight;
            weight *= decay;
        }

        let denominator = total_weight + prior_weight;
        if denominator <= 0.0 {
            return prior;
        }
        ((weighted_score + prior * prior_weight) / denominator).clamp(0.0, 1.0)
    }
}

impl Default for FormAnalyzer {
    fn default() -> Self {
        Self::new(FormConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
