//! Confidence blending with the built-in and custom estimators.

use betledger::confidence::estimators::{EstimatorConfig, EstimatorRegistry, FnEstimator};
use betledger::confidence::form::{FormAnalyzer, FormResult};
use betledger::confidence::{blend, Candidate, ConfidenceBlender, ExternalEstimate};
use betledger::types::{MarketType, SelectionSide};
use std::time::Duration;

fn make_candidate() -> Candidate {
    let mut c = Candidate::new("nba-bos-nyk", MarketType::Moneyline, SelectionSide::Home);
    c.odds = Some(-140);
    c.opponent_odds = Some(120);
    c.rating = Some(1610.0);
    c.opponent_rating = Some(1575.0);
    c.recent_form = vec![FormResult::Win, FormResult::Win, FormResult::Loss, FormResult::Push];
    c
}

#[test]
fn test_blend_reference_values() {
    assert_eq!(blend(0.62, &[], 0.5).blended_probability, 0.62);
    let r = blend(0.58, &[ExternalEstimate::new("market-implied", Some(0.54))], 0.5);
    assert!((r.blended_probability - 0.56).abs() < 1e-12);
}

#[tokio::test]
async fn test_builtin_registry_scores_candidate() {
    let registry = EstimatorRegistry::from_config(&EstimatorConfig::default());
    assert_eq!(registry.len(), 3);

    let blender = ConfidenceBlender::new(FormAnalyzer::default(), registry, 0.5);
    let r = blender.score(&make_candidate()).await;
    assert_eq!(r.breakdown.len(), 3);
    assert!(r.breakdown.values().all(Option::is_some));
    assert!(r.blended_probability > 0.5 && r.blended_probability < 0.75, "{r}");
}

#[tokio::test]
async fn test_failing_source_never_blocks_the_pick() {
    let registry = EstimatorRegistry::new(Duration::from_millis(50))
        .with(FnEstimator::new("always-missing", |_c: &Candidate| None))
        .with(FnEstimator::new("garbage", |_c: &Candidate| Some(1.7)));
    let blender = ConfidenceBlender::new(FormAnalyzer::default(), registry, 0.3);
    let r = blender.score(&make_candidate()).await;
    assert_eq!(r.external_mean, None);
    assert_eq!(r.blended_probability, r.form_probability);
    assert_eq!(r.breakdown.len(), 2);
}

#[test]
fn test_weight_is_per_call() {
    let registry = EstimatorRegistry::new(Duration::from_millis(50))
        .with(FnEstimator::new("fixed", |_c: &Candidate| Some(0.40)));
    let blender = ConfidenceBlender::new(FormAnalyzer::default(), registry, 0.5);
    let candidate = make_candidate();

    let low = tokio_test::block_on(blender.score_with_weight(&candidate, 0.0));
    let high = tokio_test::block_on(blender.score_with_weight(&candidate, 1.0));
    assert!((low.blended_probability - 0.40).abs() < 1e-12);
    assert_eq!(high.blended_probability, high.form_probability);
}
