//! Trajectory scorer: checks whether the full sequence of steps an agent took
//! conforms to what was expected, either as an unordered subset or an exact
//! sequence match.
//!
//! The edit-distance-normalised similarity used by `ExactMatch` mirrors
//! `ResponseScorer::levenshtein_similarity`'s text-diffing approach, generalised
//! from characters to `(type, name)` trajectory steps.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::{
    Action, PartialScore, Sample, ScoreResult, ScoreStatus, StepType, Trajectory, TrajectoryStep,
};
use crate::scorer::{ScoreContext, Scorer, StreamingScorer};

/// One expected step in a trajectory, identified by type and name only.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedStep {
    pub step_type: StepType,
    pub name: String,
    pub required: bool,
}

impl ExpectedStep {
    pub fn new(step_type: StepType, name: impl Into<String>) -> Self {
        Self { step_type, name: name.into(), required: true }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// How [`TrajectoryScorer`] compares the actual step sequence to the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Required steps must all appear somewhere in the trajectory; order is ignored.
    SubsetMatch,
    /// The full step sequence must match, scored by normalised edit distance otherwise.
    ExactMatch,
}

#[derive(Debug, Clone)]
pub struct TrajectoryConfig {
    pub expected_steps: Vec<ExpectedStep>,
    pub mode: Mode,
    pub penalize_extra: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self { expected_steps: Vec::new(), mode: Mode::SubsetMatch, penalize_extra: 0.0 }
    }
}

pub struct TrajectoryScorer {
    config: TrajectoryConfig,
}

impl TrajectoryScorer {
    pub fn new(config: TrajectoryConfig) -> Self {
        Self { config }
    }

    fn key(step: &TrajectoryStep) -> (StepType, &str) {
        (step.step_type, step.name.as_str())
    }

    fn subset_score(&self, actual: &[TrajectoryStep]) -> (f64, usize, usize) {
        let required: Vec<&ExpectedStep> =
            self.config.expected_steps.iter().filter(|s| s.required).collect();
        if required.is_empty() {
            return (1.0, 0, actual.len());
        }
        let present = required
            .iter()
            .filter(|exp| actual.iter().any(|a| a.step_type == exp.step_type && a.name == exp.name))
            .count();
        let extra = actual
            .iter()
            .filter(|a| {
                !self
                    .config
                    .expected_steps
                    .iter()
                    .any(|exp| exp.step_type == a.step_type && exp.name == a.name)
            })
            .count();
        let base = present as f64 / required.len() as f64;
        let penalty = self.config.penalize_extra * (extra as f64 / required.len().max(1) as f64);
        ((base - penalty).clamp(0.0, 1.0), present, extra)
    }

    fn exact_score(&self, actual: &[TrajectoryStep]) -> f64 {
        let expected: Vec<(StepType, &str)> =
            self.config.expected_steps.iter().map(|s| (s.step_type, s.name.as_str())).collect();
        let actual_keys: Vec<(StepType, &str)> = actual.iter().map(Self::key).collect();
        if expected == actual_keys {
            return 1.0;
        }
        let distance = levenshtein(&expected, &actual_keys);
        let max_len = expected.len().max(actual_keys.len());
        if max_len == 0 {
            1.0
        } else {
            (1.0 - distance as f64 / max_len as f64).max(0.0)
        }
    }

    fn score_steps(&self, actual: &[TrajectoryStep]) -> (f64, HashMap<String, Value>) {
        match self.config.mode {
            Mode::SubsetMatch => {
                let (score, present, extra) = self.subset_score(actual);
                let mut details = HashMap::new();
                details.insert("present".to_string(), Value::from(present));
                details.insert("extra".to_string(), Value::from(extra));
                (score, details)
            }
            Mode::ExactMatch => {
                let score = self.exact_score(actual);
                let mut details = HashMap::new();
                details.insert(
                    "exact".to_string(),
                    Value::Bool((score - 1.0).abs() < f64::EPSILON),
                );
                (score, details)
            }
        }
    }
}

fn levenshtein(a: &[(StepType, &str)], b: &[(StepType, &str)]) -> usize {
    let m = a.len();
    let n = b.len();
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for i in 0..=m {
        dp[i][0] = i;
    }
    for j in 0..=n {
        dp[0][j] = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1).min(dp[i][j - 1] + 1).min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[m][n]
}

#[async_trait]
impl Scorer for TrajectoryScorer {
    fn name(&self) -> &str {
        "trajectory"
    }

    async fn score(&self, _ctx: &ScoreContext, sample: &Sample) -> Result<ScoreResult> {
        let (score, details) = self.score_steps(&sample.trajectory.steps);
        Ok(ScoreResult { score, details })
    }
}

#[async_trait]
impl StreamingScorer for TrajectoryScorer {
    async fn score_partial(
        &self,
        _ctx: &ScoreContext,
        _sample: &Sample,
        trajectory: &Trajectory,
    ) -> Result<PartialScore> {
        let (score, details) = self.score_steps(&trajectory.steps);
        let expected_count = self.config.expected_steps.len().max(1);
        let confidence = (trajectory.steps.len() as f64 / expected_count as f64).min(1.0);
        let action = if score < 0.2 { Action::Reconsider } else if score < 0.5 { Action::Adjust } else { Action::Continue };
        let status =
            if trajectory.steps.len() >= expected_count { ScoreStatus::Final } else { ScoreStatus::Partial };
        Ok(PartialScore { score, confidence, status, action, feedback: String::new(), details })
    }
}
