//! Feedback dispatcher: fans a trajectory out to every registered streaming
//! scorer in parallel, aggregates the results, and derives alerts plus a
//! recommended action for the running agent.
//!
//! The fan-out shape (`tokio::spawn` per scorer, joined with
//! `futures::future::join_all`, each wrapped in `tokio::time::timeout`) is
//! grounded on `agentreplay-evals`' `OnlineEvaluator::evaluate_task`; the
//! threshold-to-alert-level mapping is grounded on that same module's
//! `AlertManager`/`ComparisonOperator` checks.

use anyhow::anyhow;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EvalError, Result};
use crate::model::{Action, Alert, AlertLevel, Feedback, PartialScore, Sample, Trajectory};
use crate::observability::ObservabilityHook;
use crate::scorer::{ScoreContext, StreamingScorer};

/// Warning/critical thresholds on the dispatcher's overall score.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdConfig {
    pub warning: f64,
    pub critical: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self { warning: 0.5, critical: 0.2 }
    }
}

impl ThresholdConfig {
    fn validate(&self) -> Result<()> {
        if self.critical > self.warning {
            return Err(EvalError::ConfigError(
                "critical threshold must be <= warning threshold".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub thresholds: ThresholdConfig,
    pub per_scorer_timeout: Duration,
    pub confidence_floor: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            per_scorer_timeout: Duration::from_secs(5),
            confidence_floor: 0.5,
        }
    }
}

impl DispatcherConfig {
    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_scorer_timeout = timeout;
        self
    }

    pub fn with_confidence_floor(mut self, floor: f64) -> Self {
        self.confidence_floor = floor;
        self
    }
}

/// Fans a trajectory out to its registered streaming scorers and aggregates feedback.
pub struct FeedbackDispatcher {
    scorers: Vec<Arc<dyn StreamingScorer>>,
    config: DispatcherConfig,
    observability: Vec<Arc<dyn ObservabilityHook>>,
}

impl std::fmt::Debug for FeedbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackDispatcher")
            .field("scorers_len", &self.scorers.len())
            .field("config", &self.config)
            .field("observability_len", &self.observability.len())
            .finish()
    }
}

impl FeedbackDispatcher {
    pub fn new(scorers: Vec<Arc<dyn StreamingScorer>>, config: DispatcherConfig) -> Result<Self> {
        if scorers.is_empty() {
            return Err(EvalError::ConfigError("dispatcher requires at least one scorer".to_string()));
        }
        config.thresholds.validate()?;
        Ok(Self { scorers, config, observability: Vec::new() })
    }

    /// Registers a span/metric hook invoked after every `evaluate` call.
    pub fn with_observability(mut self, hook: Arc<dyn ObservabilityHook>) -> Self {
        self.observability.push(hook);
        self
    }

    #[tracing::instrument(skip(self, sample, trajectory), fields(step_index = trajectory.steps.len()))]
    pub async fn evaluate(&self, sample: &Sample, trajectory: &Trajectory) -> Result<Feedback> {
        let outcomes = self.fan_out(sample, trajectory).await;

        let mut scores = HashMap::new();
        let mut failed_scorers = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(partial) => {
                    scores.insert(name, partial);
                }
                Err(cause) => failed_scorers.push(format!("{name}: {cause}")),
            }
        }

        if scores.is_empty() {
            return Err(EvalError::DispatcherFailed(anyhow!(failed_scorers.join("; "))));
        }

        let overall = self.aggregate(&scores, &failed_scorers);
        let alerts = self.build_alerts(&scores, &overall);

        let feedback = Feedback {
            timestamp: Utc::now(),
            step_index: trajectory.steps.len(),
            scores,
            overall,
            alerts,
            consumed: false,
        };

        self.emit_observability(sample, &feedback).await;
        Ok(feedback)
    }

    async fn emit_observability(&self, sample: &Sample, feedback: &Feedback) {
        for hook in &self.observability {
            if let Err(e) = hook.on_feedback(sample, feedback).await {
                tracing::warn!(error = %e, "observability hook failed");
            }
        }
    }

    async fn fan_out(
        &self,
        sample: &Sample,
        trajectory: &Trajectory,
    ) -> Vec<(String, std::result::Result<PartialScore, String>)> {
        let ctx = ScoreContext::new();
        let tasks: Vec<_> = self
            .scorers
            .iter()
            .map(|scorer| {
                let scorer = Arc::clone(scorer);
                let sample = sample.clone();
                let trajectory = trajectory.clone();
                let ctx = ctx.clone();
                let timeout = self.config.per_scorer_timeout;
                let name = scorer.name().to_string();
                tokio::spawn(async move {
                    let result =
                        tokio::time::timeout(timeout, scorer.score_partial(&ctx, &sample, &trajectory))
                            .await;
                    let outcome = match result {
                        Ok(Ok(partial)) => Ok(partial),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err("timed out".to_string()),
                    };
                    (name, outcome)
                })
            })
            .collect();

        let joined = futures::future::join_all(tasks).await;
        joined
            .into_iter()
            .map(|r| r.unwrap_or_else(|e| ("unknown".to_string(), Err(e.to_string()))))
            .collect()
    }

    fn aggregate(
        &self,
        scores: &HashMap<String, PartialScore>,
        failed_scorers: &[String],
    ) -> PartialScore {
        let qualifying: Vec<&PartialScore> =
            scores.values().filter(|p| p.confidence >= self.config.confidence_floor).collect();
        let pool: Vec<&PartialScore> = if qualifying.is_empty() { scores.values().collect() } else { qualifying };

        let overall_score = pool.iter().map(|p| p.score).sum::<f64>() / pool.len() as f64;
        let overall_confidence = pool.iter().map(|p| p.confidence).sum::<f64>() / pool.len() as f64;

        let mut action = if overall_score < self.config.thresholds.critical {
            Action::Reconsider
        } else if overall_score < self.config.thresholds.warning {
            Action::Adjust
        } else {
            Action::Continue
        };
        for partial in scores.values() {
            action = action.max(partial.action);
        }

        let mut details = HashMap::new();
        if !failed_scorers.is_empty() {
            details.insert(
                "failed_scorers".to_string(),
                serde_json::Value::Array(
                    failed_scorers.iter().cloned().map(serde_json::Value::String).collect(),
                ),
            );
        }

        PartialScore {
            score: overall_score,
            confidence: overall_confidence,
            status: crate::model::ScoreStatus::Partial,
            action,
            feedback: String::new(),
            details,
        }
    }

    fn build_alerts(&self, scores: &HashMap<String, PartialScore>, overall: &PartialScore) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let thresholds = &self.config.thresholds;

        if overall.score < thresholds.warning {
            let level = if overall.score < thresholds.critical { AlertLevel::Critical } else { AlertLevel::Warning };
            alerts.push(Alert {
                level,
                scorer: "overall".to_string(),
                score: overall.score,
                threshold: if level == AlertLevel::Critical { thresholds.critical } else { thresholds.warning },
                message: format!("overall score {:.3} breached {:?} threshold", overall.score, level),
                action: overall.action,
            });
        }

        for scorer in &self.scorers {
            if let Some(partial) = scores.get(scorer.name()) {
                if partial.score < thresholds.warning {
                    let level =
                        if partial.score < thresholds.critical { AlertLevel::Critical } else { AlertLevel::Warning };
                    alerts.push(Alert {
                        level,
                        scorer: scorer.name().to_string(),
                        score: partial.score,
                        threshold: if level == AlertLevel::Critical { thresholds.critical } else { thresholds.warning },
                        message: format!(
                            "scorer '{}' score {:.3} breached {:?} threshold",
                            scorer.name(),
                            partial.score,
                            level
                        ),
                        action: partial.action,
                    });
                }
            }
        }

        alerts
    }
}
