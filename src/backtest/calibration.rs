//! Blend-weight calibration.
//!
//! Replays resolved picks through `blend` under different form weights and
//! scores each weight by Brier score, so the configured weight can be
//! chosen from history instead of guessed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::confidence::{blend, ExternalEstimate};
use crate::types::MarketType;

// ---------------------------------------------------------------------------
// Calibration data
// ---------------------------------------------------------------------------

/// A scored pick whose outcome is now known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub pick_id: String,
    pub market: MarketType,
    pub form_probability: f64,
    #[serde(default)]
    pub external: Vec<ExternalEstimate>,
    pub won: bool,
}

impl CalibrationPoint {
    fn blended(&self, weight: f64) -> f64 {
        blend(self.form_probability, &self.external, weight).blended_probability
    }

    fn outcome(&self) -> f64 {
        if self.won {
            1.0
        } else {
            0.0
        }
    }
}

/// Brier score of one weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightScore {
    pub weight: f64,
    pub brier: f64,
}

/// A bucket in the calibration curve (e.g. all blends between 0.60 and 0.70).
#[derive(Debug, Clone)]
pub struct CalibrationBucket {
    pub bin_start: f64,
    pub bin_end: f64,
    pub mean_predicted: f64,
    pub actual_rate: f64,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

pub struct Calibrator {
    points: Vec<CalibrationPoint>,
    num_bins: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            num_bins: 10,
        }
    }

    pub fn add_point(&mut self, point: CalibrationPoint) {
        self.points.push(point);
    }

    pub fn add_points(&mut self, points: Vec<CalibrationPoint>) {
        self.points.extend(points);
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    /// Brier = (1/N) × Σ(blended − outcome)². Lower is better; 0.25 is a
    /// coin flip. `None` with no points.
    pub fn brier(&self, weight: f64) -> Option<f64> {
        brier_of(self.points.iter(), weight)
    }

    /// Brier score per market type under `weight`.
    pub fn market_brier(&self, weight: f64) -> BTreeMap<String, f64> {
        let mut by_market: BTreeMap<String, Vec<&CalibrationPoint>> = BTreeMap::new();
        for p in &self.points {
            by_market.entry(p.market.to_string()).or_default().push(p);
        }
        by_market
            .into_iter()
            .filter_map(|(market, points)| brier_of(points.into_iter(), weight).map(|b| (market, b)))
            .collect()
    }

    /// Score every candidate weight, in the order given.
    pub fn sweep(&self, weights: &[f64]) -> Vec<WeightScore> {
        weights
            .iter()
            .filter_map(|&weight| self.brier(weight).map(|brier| WeightScore { weight, brier }))
            .collect()
    }

    /// Lowest-Brier weight on a 0..=1 grid with the given step. Ties go to
    /// the smaller weight.
    pub fn best_weight(&self, step: f64) -> Option<WeightScore> {
        if !(step > 0.0 && step <= 1.0) {
            return None;
        }
        let steps = (1.0 / step).round() as usize;
        let grid: Vec<f64> = (0..=steps).map(|i| (i as f64 * step).min(1.0)).collect();

        let best = self
            .sweep(&grid)
            .into_iter()
            .fold(None::<WeightScore>, |best, s| match best {
                Some(b) if b.brier <= s.brier => Some(b),
                _ => Some(s),
            })?;

        info!(
            points = self.points.len(),
            weight = best.weight,
            brier = format!("{:.4}", best.brier),
            "Best blend weight"
        );
        Some(best)
    }

    /// Bin blended probabilities and compare each bin with its hit rate.
    pub fn calibration_curve(&self, weight: f64) -> Vec<CalibrationBucket> {
        let bin_width = 1.0 / self.num_bins as f64;
        let blended: Vec<(f64, bool)> = self.points.iter().map(|p| (p.blended(weight), p.won)).collect();

        (0..self.num_bins)
            .map(|i| {
                let bin_start = i as f64 * bin_width;
                let bin_end = bin_start + bin_width;
                let last = i == self.num_bins - 1;
                let in_bin: Vec<&(f64, bool)> = blended
                    .iter()
                    .filter(|(p, _)| *p >= bin_start && (*p < bin_end || (last && *p <= bin_end)))
                    .collect();

                let count = in_bin.len();
                if count == 0 {
                    return CalibrationBucket {
                        bin_start,
                        bin_end,
                        mean_predicted: (bin_start + bin_end) / 2.0,
                        actual_rate: 0.0,
                        count,
                    };
                }
                CalibrationBucket {
                    bin_start,
                    bin_end,
                    mean_predicted: in_bin.iter().map(|(p, _)| p).sum::<f64>() / count as f64,
                    actual_rate: in_bin.iter().filter(|(_, won)| *won).count() as f64 / count as f64,
                    count,
                }
            })
            .collect()
    }
}

fn brier_of<'a>(points: impl Iterator<Item = &'a CalibrationPoint>, weight: f64) -> Option<f64> {
    let (sum, n) = points.fold((0.0, 0usize), |(sum, n), p| {
        (sum + (p.blended(weight) - p.outcome()).powi(2), n + 1)
    });
    (n > 0).then(|| sum / n as f64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
