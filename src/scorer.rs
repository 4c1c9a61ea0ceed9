//! The scorer contract and the aggregation helpers shared by every scorer.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::model::{validate_score, PartialScore, Sample, ScoreResult, Trajectory};

/// Execution context handed to every scorer call: cancellation plus an optional deadline.
#[derive(Clone, Default)]
pub struct ScoreContext {
    pub cancellation: CancellationToken,
}

impl ScoreContext {
    pub fn new() -> Self {
        Self { cancellation: CancellationToken::new() }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A deterministic, named scoring function over a completed sample.
#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, ctx: &ScoreContext, sample: &Sample) -> Result<ScoreResult>;
}

/// A scorer that can additionally produce a confidence-weighted score from an
/// in-progress trajectory, for the feedback dispatcher.
#[async_trait]
pub trait StreamingScorer: Scorer {
    async fn score_partial(
        &self,
        ctx: &ScoreContext,
        sample: &Sample,
        trajectory: &Trajectory,
    ) -> Result<PartialScore>;

    fn supports_streaming(&self) -> bool {
        true
    }
}

/// Runs `scorer.score`, validating the result is within bounds before returning it.
pub async fn score_validated(
    scorer: &dyn Scorer,
    ctx: &ScoreContext,
    sample: &Sample,
) -> Result<ScoreResult> {
    let result = scorer.score(ctx, sample).await?;
    validate_score(scorer.name(), result.score)?;
    Ok(result)
}

/// Unweighted arithmetic mean of scorer results. Empty input yields `0.0`.
pub fn aggregate_equal(results: &HashMap<String, ScoreResult>) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.values().map(|r| r.score).sum::<f64>() / results.len() as f64
}

/// Weighted mean of scorer results keyed by scorer name. Weights for scorers not
/// present in `results` are ignored. Falls back to the equal-weight mean when the
/// sum of applicable weights is zero.
pub fn aggregate_weighted(
    results: &HashMap<String, ScoreResult>,
    weights: &HashMap<String, f64>,
) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (name, result) in results {
        if let Some(&w) = weights.get(name) {
            weighted_sum += result.score * w;
            weight_total += w;
        }
    }
    if weight_total == 0.0 {
        return aggregate_equal(results);
    }
    weighted_sum / weight_total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f64) -> ScoreResult {
        ScoreResult::new(score)
    }

    #[test]
    fn aggregate_equal_of_empty_is_zero() {
        assert_eq!(aggregate_equal(&HashMap::new()), 0.0);
    }

    #[test]
    fn aggregate_equal_averages_scores() {
        let mut results = HashMap::new();
        results.insert("a".to_string(), result(1.0));
        results.insert("b".to_string(), result(0.0));
        assert_eq!(aggregate_equal(&results), 0.5);
    }

    #[test]
    fn aggregate_weighted_respects_weights() {
        let mut results = HashMap::new();
        results.insert("a".to_string(), result(1.0));
        results.insert("b".to_string(), result(0.0));
        let mut weights = HashMap::new();
        weights.insert("a".to_string(), 3.0);
        weights.insert("b".to_string(), 1.0);
        assert_eq!(aggregate_weighted(&results, &weights), 0.75);
    }

    #[test]
    fn aggregate_weighted_falls_back_when_no_weights_apply() {
        let mut results = HashMap::new();
        results.insert("a".to_string(), result(1.0));
        results.insert("b".to_string(), result(0.0));
        let weights = HashMap::new();
        assert_eq!(aggregate_weighted(&results, &weights), aggregate_equal(&results));
    }

    #[test]
    fn aggregate_weighted_ignores_unknown_scorer_weights() {
        let mut results = HashMap::new();
        results.insert("a".to_string(), result(1.0));
        let mut weights = HashMap::new();
        weights.insert("a".to_string(), 1.0);
        weights.insert("ghost".to_string(), 5.0);
        assert_eq!(aggregate_weighted(&results, &weights), 1.0);
    }
}
