//! Confidence engine — form analysis, external estimators and blending.
//!
//! `blend` is a pure function of the form probability, the collected
//! external estimates and an explicit weight. `ConfidenceBlender` is the
//! convenience wrapper that runs the form analyzer and the estimator
//! registry for a candidate pick and then blends.

pub mod estimators;
pub mod form;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::types::{MarketType, SelectionSide};
use estimators::EstimatorRegistry;
use form::{FormAnalyzer, FormResult};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A pick under consideration for recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub event_id: String,
    pub market: MarketType,
    pub side: SelectionSide,
    /// Offered American price for the side.
    #[serde(default)]
    pub odds: Option<i32>,
    /// Price of the opposite side, when quoted.
    #[serde(default)]
    pub opponent_odds: Option<i32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub opponent_rating: Option<f64>,
    /// Recent results of the selection, most recent first.
    #[serde(default)]
    pub recent_form: Vec<FormResult>,
}

impl Candidate {
    pub fn new(event_id: &str, market: MarketType, side: SelectionSide) -> Self {
        Self {
            event_id: event_id.to_string(),
            market,
            side,
            odds: None,
            opponent_odds: None,
            rating: None,
            opponent_rating: None,
            recent_form: Vec::new(),
        }
    }
}

/// One named source's opinion; `None` when it had nothing to offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEstimate {
    pub source: String,
    pub probability: Option<f64>,
}

impl ExternalEstimate {
    pub fn new(source: &str, probability: Option<f64>) -> Self {
        Self {
            source: source.to_string(),
            probability,
        }
    }

    /// The probability if it is a usable number in [0, 1].
    pub fn usable(&self) -> Option<f64> {
        self.probability
            .filter(|p| p.is_finite() && (0.0..=1.0).contains(p))
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Blended ranking signal for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub form_probability: f64,
    /// Mean of the usable external estimates; `None` if there were none.
    pub external_mean: Option<f64>,
    pub blended_probability: f64,
    /// Weight given to the form probability in this blend.
    pub weight: f64,
    /// Every named source, including those that returned nothing. A repeated
    /// source name gets a `#2`, `#3`... suffix so no entry is lost.
    pub breakdown: BTreeMap<String, Option<f64>>,
}

impl fmt::Display for ConfidenceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "blended={:.1}% form={:.1}% external={} (w={:.2})",
            self.blended_probability * 100.0,
            self.form_probability * 100.0,
            self.external_mean
                .map(|m| format!("{:.1}%", m * 100.0))
                .unwrap_or_else(|| "n/a".into()),
            self.weight,
        )
    }
}

// ---------------------------------------------------------------------------
// Blend
// ---------------------------------------------------------------------------

/// Blend a form probability with external estimates.
///
/// `blended = weight × form + (1 − weight) × mean(external)`, or just the
/// form probability when no external estimate is usable. `weight` and
/// `form_probability` are clamped to [0, 1].
pub fn blend(form_probability: f64, external: &[ExternalEstimate], weight: f64) -> ConfidenceResult {
    let weight = clamp_unit(weight, "blend weight");
    let form_probability = clamp_unit(form_probability, "form probability");

    let usable: Vec<f64> = external.iter().filter_map(ExternalEstimate::usable).collect();
    let external_mean = if usable.is_empty() {
        None
    } else {
        Some(usable.iter().sum::<f64>() / usable.len() as f64)
    };

    let blended_probability = match external_mean {
        Some(mean) => weight * form_probability + (1.0 - weight) * mean,
        None => form_probability,
    };

    let mut breakdown = BTreeMap::new();
    for e in external {
        let mut key = e.source.clone();
        let mut n = 1;
        while breakdown.contains_key(&key) {
            n += 1;
            key = format!("{}#{n}", e.source);
        }
        breakdown.insert(key, e.usable());
    }

    ConfidenceResult {
        form_probability,
        external_mean,
        blended_probability,
        weight,
        breakdown,
    }
}

/// Clamp into [0, 1]; NaN becomes 0.5.
fn clamp_unit(value: f64, what: &str) -> f64 {
    if (0.0..=1.0).contains(&value) {
        return value;
    }
    let clamped = if value.is_nan() { 0.5 } else { value.clamp(0.0, 1.0) };
    warn!(what, value, clamped, "Value outside [0, 1], clamping");
    clamped
}

// ---------------------------------------------------------------------------
// Blender
// ---------------------------------------------------------------------------

/// Scores candidates: form analysis + external estimates + blend.
pub struct ConfidenceBlender {
    form: FormAnalyzer,
    registry: EstimatorRegistry,
    weight: f64,
}

impl ConfidenceBlender {
    pub fn new(form: FormAnalyzer, registry: EstimatorRegistry, weight: f64) -> Self {
        Self {
            form,
            registry,
            weight,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Score a candidate with the configured weight.
    pub async fn score(&self, candidate: &Candidate) -> ConfidenceResult {
        self.score_with_weight(candidate, self.weight).await
    }

    /// Score a candidate with an explicit weight (backtesting).
    pub async fn score_with_weight(&self, candidate: &Candidate, weight: f64) -> ConfidenceResult {
        let form_probability = self.form.probability(&candidate.recent_form);
        let external = self.registry.collect(candidate).await;
        let result = blend(form_probability, &external, weight);
        debug!(
            event_id = %candidate.event_id,
            market = %candidate.market,
            side = %candidate.side,
            result = %result,
            "Candidate scored"
        );
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
