//! External probability estimators.
//!
//! Defines the `ProbabilityEstimator` trait, the built-in sources
//! (home-advantage baseline, market-implied, rating-based) and the
//! registry that runs them in isolation from one another.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Candidate, ExternalEstimate};
use crate::pricing::odds;
use crate::types::{MarketType, SelectionSide};

/// Abstraction over external probability sources.
///
/// `Ok(None)` means the source has no opinion on this candidate.
/// Errors are never propagated past the registry.
#[async_trait]
pub trait ProbabilityEstimator: Send + Sync {
    /// Source name used in the confidence breakdown.
    fn name(&self) -> &str;

    /// Probability that the candidate's selection wins.
    async fn estimate(&self, candidate: &Candidate) -> Result<Option<f64>>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for the built-in estimators and the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Upper bound on a single estimator call.
    pub timeout_ms: u64,
    /// Historical home win rate used by the baseline (None disables it).
    pub home_win_rate: Option<f64>,
    /// Enable the market-implied source.
    pub market_implied: bool,
    /// Logistic scale of the rating source (None disables it).
    pub rating_scale: Option<f64>,
    /// Rating points credited to the home side.
    pub home_rating_bonus: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            home_win_rate: Some(0.57),
            market_implied: true,
            rating_scale: Some(400.0),
            home_rating_bonus: 50.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in sources
// ---------------------------------------------------------------------------

/// League-wide home win rate applied to moneyline picks.
pub struct HomeAdvantageBaseline {
    home_win_rate: f64,
}

impl HomeAdvantageBaseline {
    pub fn new(home_win_rate: f64) -> Self {
        Self { home_win_rate }
    }
}

#[async_trait]
impl ProbabilityEstimator for HomeAdvantageBaseline {
    fn name(&self) -> &str {
        "home-advantage baseline"
    }

    async fn estimate(&self, candidate: &Candidate) -> Result<Option<f64>> {
        if candidate.market != MarketType::Moneyline {
            return Ok(None);
        }
        Ok(match candidate.side {
            SelectionSide::Home => Some(self.home_win_rate),
            SelectionSide::Away => Some(1.0 - self.home_win_rate),
            SelectionSide::Over | SelectionSide::Under => None,
        })
    }
}

/// Probability implied by the offered price, with the bookmaker margin
/// removed when the opposite side's price is known.
pub struct MarketImplied;

#[async_trait]
impl ProbabilityEstimator for MarketImplied {
    fn name(&self) -> &str {
        "market-implied"
    }

    async fn estimate(&self, candidate: &Candidate) -> Result<Option<f64>> {
        let Some(price) = candidate.odds else {
            return Ok(None);
        };
        let p = odds::implied_probability(price)?;
        match candidate.opponent_odds {
            Some(opp) => {
                let q = odds::implied_probability(opp)?;
                Ok(Some(p / (p + q)))
            }
            None => Ok(Some(p)),
        }
    }
}

/// Logistic win probability from a rating difference (Elo style).
pub struct RatingBased {
    scale: f64,
    home_bonus: f64,
}

impl RatingBased {
    pub fn new(scale: f64, home_bonus: f64) -> Self {
        Self { scale, home_bonus }
    }
}

#[async_trait]
impl ProbabilityEstimator for RatingBased {
    fn name(&self) -> &str {
        "rating-based"
    }

    async fn estimate(&self, candidate: &Candidate) -> Result<Option<f64>> {
        if candidate.market != MarketType::Moneyline || self.scale <= 0.0 {
            return Ok(None);
        }
        let (Some(rating), Some(opponent)) = (candidate.rating, candidate.opponent_rating) else {
            return Ok(None);
        };
        let bonus = match candidate.side {
            SelectionSide::Home => self.home_bonus,
            SelectionSide::Away => -self.home_bonus,
            SelectionSide::Over | SelectionSide::Under => return Ok(None),
        };
        let diff = rating - opponent + bonus;
        Ok(Some(1.0 / (1.0 + 10f64.powf(-diff / self.scale))))
    }
}

/// Wraps a plain function as an estimator.
pub struct FnEstimator<F> {
    name: String,
    f: F,
}

impl<F> FnEstimator<F>
where
    F: Fn(&Candidate) -> Option<f64> + Send + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
        }
    }
}

#[async_trait]
impl<F> ProbabilityEstimator for FnEstimator<F>
where
    F: Fn(&Candidate) -> Option<f64> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn estimate(&self, candidate: &Candidate) -> Result<Option<f64>> {
        Ok((self.f)(candidate))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Caller-assembled set of estimators.
#[derive(Clone)]
pub struct EstimatorRegistry {
    estimators: Vec<Arc<dyn ProbabilityEstimator>>,
    timeout: Duration,
}

impl EstimatorRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            estimators: Vec::new(),
            timeout,
        }
    }

    /// Registry holding the built-in sources enabled in `config`.
    pub fn from_config(config: &EstimatorConfig) -> Self {
        let mut registry = Self::new(Duration::from_millis(config.timeout_ms));
        if let Some(rate) = config.home_win_rate {
            registry.register(HomeAdvantageBaseline::new(rate));
        }
        if config.market_implied {
            registry.register(MarketImplied);
        }
        if let Some(scale) = config.rating_scale {
            registry.register(RatingBased::new(scale, config.home_rating_bonus));
        }
        registry
    }

    /// Add a source. Names are unique: a second source under a name already
    /// registered is skipped.
    pub fn register<E: ProbabilityEstimator + 'static>(&mut self, estimator: E) -> &mut Self {
        if self.estimators.iter().any(|e| e.name() == estimator.name()) {
            warn!(source = %estimator.name(), "Estimator already registered, skipping");
            return self;
        }
        self.estimators.push(Arc::new(estimator));
        self
    }

    /// Builder-style `register`.
    pub fn with<E: ProbabilityEstimator + 'static>(mut self, estimator: E) -> Self {
        self.register(estimator);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.estimators.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    /// Run every estimator concurrently. Each entry succeeds or fails on its
    /// own: errors, panics, timeouts and values outside [0, 1] become `None`.
    /// Entries come back in registration order.
    pub async fn collect(&self, candidate: &Candidate) -> Vec<ExternalEstimate> {
        let calls = self.estimators.iter().map(|estimator| {
            let source = estimator.name().to_string();
            async move {
                let call = AssertUnwindSafe(estimator.estimate(candidate)).catch_unwind();
                let probability = match tokio::time::timeout(self.timeout, call).await {
                    Ok(Ok(Ok(Some(p)))) if p.is_finite() && (0.0..=1.0).contains(&p) => Some(p),
                    Ok(Ok(Ok(Some(p)))) => {
                        warn!(source = %source, value = p, "Estimator returned an invalid probability");
                        None
                    }
                    Ok(Ok(Ok(None))) => None,
                    Ok(Ok(Err(e))) => {
                        warn!(source = %source, error = %e, "Estimator failed");
                        None
                    }
                    Ok(Err(_)) => {
                        warn!(source = %source, "Estimator panicked");
                        None
                    }
                    Err(_) => {
                        warn!(
                            source = %source,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Estimator timed out"
                        );
                        None
                    }
                };
                debug!(source = %source, probability = ?probability, "Estimate collected");
                ExternalEstimate {
                    source,
                    probability,
                }
            }
        });
        join_all(calls).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
