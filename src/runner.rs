//! Evaluation runner: scores recorded samples against a set of scorers,
//! aggregates results, enforces thresholds, and drives logging/observability
//! hooks.
//!
//! Orchestration shape (sequential per-scorer dispatch with error isolation,
//! chainable `with_*` configuration) follows `Evaluator`/`EvaluationConfig`;
//! batch parallelism over many samples follows `evaluate_cases_parallel`
//! (`futures::stream::buffer_unordered`) and `agentreplay-evals`'
//! `EvalBuilder::evaluate` parallel-execution path.

use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Instant;

use crate::error::{EvalError, Result};
use crate::model::{EvalResult, EvalSet, Sample, ScoreResult};
use crate::observability::{Logger, ObservabilityHook};
use crate::report::EvalSummary;
use crate::scorer::{score_validated, ScoreContext, Scorer};

/// Skip gate matching the existing `GOEVALS=1` opt-in used by CI configs.
pub fn evaluations_enabled() -> bool {
    std::env::var("GOEVALS").map(|v| v == "1").unwrap_or(false)
}

/// Runs `f` only when [`evaluations_enabled`] returns true.
pub async fn run<F, Fut>(name: &str, f: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    if !evaluations_enabled() {
        tracing::info!(eval.name = name, "skipping evaluation run, GOEVALS != 1");
        return;
    }
    f().await;
}

pub struct RunnerConfig {
    pub max_concurrent: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

/// Scores samples and coordinates logging/observability around each run.
pub struct EvaluationRunner {
    config: RunnerConfig,
    logger: Option<Box<dyn Logger>>,
    observability: Vec<Box<dyn ObservabilityHook>>,
}

impl EvaluationRunner {
    pub fn new() -> Self {
        Self { config: RunnerConfig::default(), logger: None, observability: Vec::new() }
    }

    pub fn with_logger(mut self, logger: Box<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_otel(mut self, hook: Box<dyn ObservabilityHook>) -> Self {
        self.observability.push(hook);
        self
    }

    pub fn with_langfuse(mut self, hook: Box<dyn ObservabilityHook>) -> Self {
        self.observability.push(hook);
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.max_concurrent = n;
        self
    }

    /// Scores one sample against every scorer, sequentially, isolating failures.
    #[tracing::instrument(skip(self, sample, scorers), fields(sample.id = %sample.id))]
    pub async fn score(&self, sample: &Sample, scorers: &[&dyn Scorer]) -> EvalResult {
        let start = Instant::now();
        let ctx = ScoreContext::new();
        let mut scores = HashMap::new();

        for scorer in scorers {
            let outcome = score_validated(*scorer, &ctx, sample).await;
            let result = match outcome {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(scorer = scorer.name(), error = %e, "scorer failed");
                    ScoreResult::failed(e.to_string())
                }
            };
            scores.insert(scorer.name().to_string(), result);
        }

        let succeeded: Vec<&ScoreResult> =
            scores.values().filter(|r| !r.details.contains_key("error")).collect();
        let overall_score = if succeeded.is_empty() {
            0.0
        } else {
            succeeded.iter().map(|r| r.score).sum::<f64>() / succeeded.len() as f64
        };

        let result = EvalResult {
            sample_id: sample.id.clone(),
            scores,
            overall_score,
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            error: None,
        };

        self.log(sample, &result).await;
        self.emit_observability(sample, &result).await;
        result
    }

    /// Scores every sample sequentially against the same scorer set.
    pub async fn score_all(&self, samples: &[Sample], scorers: &[&dyn Scorer]) -> Vec<EvalResult> {
        let mut results = Vec::with_capacity(samples.len());
        for sample in samples {
            results.push(self.score(sample, scorers).await);
        }
        results
    }

    /// Scores samples concurrently, bounded by `max_concurrent`.
    pub async fn score_set_parallel(
        &self,
        samples: &[Sample],
        scorers: &[&dyn Scorer],
    ) -> Vec<EvalResult> {
        futures::stream::iter(samples.iter())
            .map(|sample| self.score(sample, scorers))
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await
    }

    /// Scores every sample in an eval set (after its own tag filter) and returns an
    /// aggregate summary, treating `overall_score >= threshold` as passing.
    pub async fn score_set(
        &self,
        eval_set: &EvalSet,
        tags: &[&str],
        threshold: f64,
        scorers: &[&dyn Scorer],
    ) -> EvalSummary {
        let samples: Vec<Sample> = eval_set.filter_by_tags(tags).into_iter().cloned().collect();
        let results = self.score_all(&samples, scorers).await;
        EvalSummary::from_results(results, threshold)
    }

    /// Reports a non-fatal failure (logged, not panicking) when `result` is under `threshold`.
    pub fn require_score(&self, result: &EvalResult, threshold: f64) -> Result<()> {
        if result.overall_score < threshold {
            tracing::error!(
                sample.id = %result.sample_id,
                actual = result.overall_score,
                threshold,
                "required score threshold not met"
            );
            return Err(EvalError::ThresholdFailed { actual: result.overall_score, threshold });
        }
        Ok(())
    }

    async fn log(&self, sample: &Sample, result: &EvalResult) {
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log(sample, result).await {
                tracing::warn!(error = %e, "logger hook failed");
            }
        }
    }

    async fn emit_observability(&self, sample: &Sample, result: &EvalResult) {
        for hook in &self.observability {
            if let Err(e) = hook.on_score(sample, result).await {
                tracing::warn!(error = %e, "observability hook failed");
            }
        }
    }
}

impl Default for EvaluationRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoreResult;
    use crate::scorer::ScoreContext;
    use async_trait::async_trait;

    struct AlwaysScorer(f64);

    #[async_trait]
    impl Scorer for AlwaysScorer {
        fn name(&self) -> &str {
            "always"
        }

        async fn score(&self, _ctx: &ScoreContext, _sample: &Sample) -> Result<ScoreResult> {
            Ok(ScoreResult::new(self.0))
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl Scorer for FailingScorer {
        fn name(&self) -> &str {
            "failing"
        }

        async fn score(&self, _ctx: &ScoreContext, _sample: &Sample) -> Result<ScoreResult> {
            Err(EvalError::ScorerFailed("failing".to_string(), "boom".to_string()))
        }
    }

    #[tokio::test]
    async fn score_isolates_a_failing_scorer() {
        let runner = EvaluationRunner::new();
        let sample = Sample::new("s1");
        let good = AlwaysScorer(1.0);
        let bad = FailingScorer;
        let scorers: Vec<&dyn Scorer> = vec![&good, &bad];
        let result = runner.score(&sample, &scorers).await;
        assert_eq!(result.overall_score, 1.0);
        assert!(result.scores["failing"].details.contains_key("error"));
    }

    #[tokio::test]
    async fn score_all_scorers_failing_yields_zero_overall() {
        let runner = EvaluationRunner::new();
        let sample = Sample::new("s1");
        let bad = FailingScorer;
        let scorers: Vec<&dyn Scorer> = vec![&bad];
        let result = runner.score(&sample, &scorers).await;
        assert_eq!(result.overall_score, 0.0);
    }

    #[tokio::test]
    async fn require_score_fails_below_threshold() {
        let runner = EvaluationRunner::new();
        let sample = Sample::new("s1");
        let good = AlwaysScorer(0.3);
        let scorers: Vec<&dyn Scorer> = vec![&good];
        let result = runner.score(&sample, &scorers).await;
        assert!(runner.require_score(&result, 0.5).is_err());
        assert!(runner.require_score(&result, 0.2).is_ok());
    }

    #[test]
    fn skip_gate_defaults_to_disabled() {
        std::env::remove_var("GOEVALS");
        assert!(!evaluations_enabled());
    }
}
