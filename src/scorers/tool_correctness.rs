//! Tool-correctness scorer: compares the trajectory's tool calls against the
//! sample's expected tool calls.
//!
//! Matching follows `ToolTrajectoryScorer`'s order-ignored vs. order-enforced
//! walks and its permissive-by-default argument comparison, generalised with a
//! numeric tolerance and split match/mismatch/missing/extra accounting in the
//! style of `agentreplay-evals`' `calculate_tool_metrics`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::{
    Action, ExpectedToolCall, PartialScore, Sample, ScoreResult, ScoreStatus, StepType, Trajectory,
};
use crate::scorer::{ScoreContext, Scorer, StreamingScorer};

/// Configuration for [`ToolCorrectnessScorer`].
#[derive(Debug, Clone)]
pub struct ToolCorrectnessConfig {
    /// Expected tool calls to score against. When empty, the sample's own
    /// `expected_tools` are used instead.
    pub expected_tools: Vec<ExpectedToolCall>,
    pub order_matters: bool,
    pub numeric_tolerance: f64,
}

impl Default for ToolCorrectnessConfig {
    fn default() -> Self {
        Self { expected_tools: Vec::new(), order_matters: false, numeric_tolerance: 0.0 }
    }
}

/// Scores how closely an agent's tool calls matched what was expected.
pub struct ToolCorrectnessScorer {
    config: ToolCorrectnessConfig,
}

impl ToolCorrectnessScorer {
    pub fn new() -> Self {
        Self { config: ToolCorrectnessConfig::default() }
    }

    pub fn with_config(config: ToolCorrectnessConfig) -> Self {
        Self { config }
    }

    fn expected_tools<'a>(&'a self, sample: &'a Sample) -> &'a [ExpectedToolCall] {
        if self.config.expected_tools.is_empty() {
            &sample.expected_tools
        } else {
            &self.config.expected_tools
        }
    }

    fn args_match(&self, expected: &Value, actual: &Value) -> bool {
        match (expected, actual) {
            (Value::Object(exp), Value::Object(act)) => {
                exp.iter().all(|(k, v)| act.get(k).is_some_and(|a| self.value_match(v, a)))
            }
            (exp, act) => self.value_match(exp, act),
        }
    }

    fn value_match(&self, expected: &Value, actual: &Value) -> bool {
        match (expected.as_f64(), actual.as_f64()) {
            (Some(e), Some(a)) => (e - a).abs() <= self.config.numeric_tolerance,
            _ => expected == actual,
        }
    }

    fn call_matches(&self, expected: &ExpectedToolCall, name: &str, args: &Value) -> bool {
        expected.name == name && self.args_match(&expected.arguments, args)
    }

    /// Detailed structural comparison used by both `score` and `score_partial`.
    fn compare(&self, expected: &[ExpectedToolCall], actual: &[(&str, &Value)]) -> Comparison {
        if self.config.order_matters {
            self.compare_ordered(expected, actual)
        } else {
            self.compare_unordered(expected, actual)
        }
    }

    fn compare_unordered(
        &self,
        expected: &[ExpectedToolCall],
        actual: &[(&str, &Value)],
    ) -> Comparison {
        let mut consumed = vec![false; actual.len()];
        let mut matched = 0usize;
        let mut mismatched = Vec::new();
        let mut missing = Vec::new();

        for exp in expected {
            let mut found_name_only = None;
            let mut found_full = None;
            for (i, (name, args)) in actual.iter().enumerate() {
                if consumed[i] || *name != exp.name {
                    continue;
                }
                if found_name_only.is_none() {
                    found_name_only = Some(i);
                }
                if self.args_match(&exp.arguments, args) {
                    found_full = Some(i);
                    break;
                }
            }
            if let Some(i) = found_full {
                consumed[i] = true;
                matched += 1;
            } else if let Some(i) = found_name_only {
                if exp.required {
                    consumed[i] = true;
                    mismatched.push(exp.name.clone());
                }
            } else if exp.required {
                missing.push(exp.name.clone());
            }
        }

        let extra = actual
            .iter()
            .enumerate()
            .filter(|(i, _)| !consumed[*i])
            .map(|(_, (name, _))| name.to_string())
            .collect();

        Comparison { matched, missing, extra, mismatched }
    }

    /// Walks `expected` in order, advancing the actual cursor only when a
    /// match for the *current* expected entry is actually found ahead of it.
    /// An optional entry that isn't found ahead leaves the actual cursor
    /// untouched, so its lookahead never strands actual calls a later
    /// required entry still needs.
    fn compare_ordered(
        &self,
        expected: &[ExpectedToolCall],
        actual: &[(&str, &Value)],
    ) -> Comparison {
        let mut matched = 0usize;
        let mut missing = Vec::new();
        let mut mismatched = Vec::new();
        let mut consumed = vec![false; actual.len()];
        let mut act_idx = 0usize;

        for exp in expected {
            match actual[act_idx..].iter().position(|(name, _)| *name == exp.name) {
                Some(offset) => {
                    let idx = act_idx + offset;
                    let (_, args) = actual[idx];
                    if self.args_match(&exp.arguments, args) {
                        matched += 1;
                    } else {
                        mismatched.push(exp.name.clone());
                    }
                    consumed[idx] = true;
                    act_idx = idx + 1;
                }
                None if exp.required => missing.push(exp.name.clone()),
                None => {}
            }
        }

        let extra = actual
            .iter()
            .enumerate()
            .filter(|(i, _)| !consumed[*i])
            .map(|(_, (name, _))| name.to_string())
            .collect();

        Comparison { matched, missing, extra, mismatched }
    }

    fn score_from(&self, expected: &[ExpectedToolCall], actual: &[(&str, &Value)]) -> (f64, Comparison) {
        let required_count = expected.iter().filter(|e| e.required).count();
        let comparison = self.compare(expected, actual);
        let denom = required_count.max(actual.len());
        let score = if denom == 0 { 1.0 } else { comparison.matched as f64 / denom as f64 };
        (score, comparison)
    }
}

impl Default for ToolCorrectnessScorer {
    fn default() -> Self {
        Self::new()
    }
}

struct Comparison {
    matched: usize,
    missing: Vec<String>,
    extra: Vec<String>,
    mismatched: Vec<String>,
}

fn steps_as_calls(trajectory: &Trajectory) -> Vec<(&str, &Value)> {
    trajectory
        .steps
        .iter()
        .filter(|s| s.step_type == StepType::Tool)
        .map(|s| (s.name.as_str(), &s.input))
        .collect()
}

fn details_from(comparison: &Comparison) -> HashMap<String, Value> {
    let mut details = HashMap::new();
    details.insert("matched".to_string(), Value::from(comparison.matched));
    details.insert(
        "missing".to_string(),
        Value::Array(comparison.missing.iter().cloned().map(Value::String).collect()),
    );
    details.insert(
        "extra".to_string(),
        Value::Array(comparison.extra.iter().cloned().map(Value::String).collect()),
    );
    details.insert(
        "mismatched".to_string(),
        Value::Array(comparison.mismatched.iter().cloned().map(Value::String).collect()),
    );
    details
}

#[async_trait]
impl Scorer for ToolCorrectnessScorer {
    fn name(&self) -> &str {
        "tool_correctness"
    }

    async fn score(&self, _ctx: &ScoreContext, sample: &Sample) -> Result<ScoreResult> {
        let expected = self.expected_tools(sample);
        let actual = steps_as_calls(&sample.trajectory);
        let (score, comparison) = self.score_from(expected, &actual);
        Ok(ScoreResult { score, details: details_from(&comparison) })
    }
}

#[async_trait]
impl StreamingScorer for ToolCorrectnessScorer {
    async fn score_partial(
        &self,
        _ctx: &ScoreContext,
        sample: &Sample,
        trajectory: &Trajectory,
    ) -> Result<PartialScore> {
        let expected = self.expected_tools(sample);
        let required_count = expected.iter().filter(|e| e.required).count().max(1);
        let actual = steps_as_calls(trajectory);
        let (score, comparison) = self.score_from(expected, &actual);

        let confidence = (actual.len() as f64 / required_count as f64).min(1.0);
        let action = if score < 0.2 && confidence > 0.5 {
            Action::Reconsider
        } else if score < 0.5 && confidence > 0.5 {
            Action::Adjust
        } else {
            Action::Continue
        };
        let status = if actual.len() >= required_count { ScoreStatus::Final } else { ScoreStatus::Partial };

        Ok(PartialScore {
            score,
            confidence,
            status,
            action,
            feedback: format!(
                "{}/{} required tools matched",
                comparison.matched, required_count
            ),
            details: details_from(&comparison),
        })
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrajectoryStep;
    use serde_json::json;

    fn sample_with(expected: Vec<ExpectedToolCall>, actual: Vec<TrajectoryStep>) -> Sample {
        let mut sample = Sample::new("s1");
        sample.expected_tools = expected;
        sample.trajectory.steps = actual;
        sample
    }

    #[tokio::test]
    async fn perfect_match_scores_one() {
        let scorer = ToolCorrectnessScorer::new();
        let expected = vec![
            ExpectedToolCall::new("nmap").with_arguments(json!({"target": "192.168.1.1", "ports": "80,443"})),
            ExpectedToolCall::new("http-client").with_arguments(json!({"url": "https://example.com", "method": "GET"})),
        ];
        let actual = vec![
            TrajectoryStep::tool("nmap", json!({"target": "192.168.1.1", "ports": "80,443"})),
            TrajectoryStep::tool("http-client", json!({"url": "https://example.com", "method": "GET"})),
        ];
        let sample = sample_with(expected, actual);
        let ctx = ScoreContext::new();
        let result = scorer.score(&ctx, &sample).await.unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.details.get("matched").unwrap(), &Value::from(2));
    }

    #[tokio::test]
    async fn wrong_argument_counts_as_mismatched_not_matched() {
        let scorer = ToolCorrectnessScorer::new();
        let expected = vec![ExpectedToolCall::new("nmap").with_arguments(json!({"target": "192.168.1.1"}))];
        let actual = vec![TrajectoryStep::tool("nmap", json!({"target": "192.168.1.2"}))];
        let sample = sample_with(expected, actual);
        let ctx = ScoreContext::new();
        let result = scorer.score(&ctx, &sample).await.unwrap();
        assert_eq!(result.score, 0.0);
        let mismatched = result.details.get("mismatched").unwrap().as_array().unwrap();
        assert_eq!(mismatched.len(), 1);
    }

    #[tokio::test]
    async fn numeric_tolerance_allows_close_values() {
        let config = ToolCorrectnessConfig { numeric_tolerance: 0.5, ..Default::default() };
        let scorer = ToolCorrectnessScorer::with_config(config);
        let expected = vec![ExpectedToolCall::new("scan").with_arguments(json!({"timeout": 10.0}))];
        let actual = vec![TrajectoryStep::tool("scan", json!({"timeout": 10.3}))];
        let sample = sample_with(expected, actual);
        let ctx = ScoreContext::new();
        let result = scorer.score(&ctx, &sample).await.unwrap();
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn progressive_score_is_non_decreasing() {
        let scorer = ToolCorrectnessScorer::new();
        let expected =
            vec![ExpectedToolCall::new("t1"), ExpectedToolCall::new("t2"), ExpectedToolCall::new("t3")];
        let mut sample = sample_with(expected, vec![]);
        let ctx = ScoreContext::new();

        let mut last_score = -1.0;
        for step_name in ["t1", "t2", "t3"] {
            sample.trajectory.steps.push(TrajectoryStep::tool(step_name, Value::Null));
            let partial = scorer.score_partial(&ctx, &sample, &sample.trajectory).await.unwrap();
            assert!(partial.score >= last_score);
            last_score = partial.score;
        }
        assert_eq!(last_score, 1.0);
    }

    #[tokio::test]
    async fn extra_keys_in_actual_are_ignored_by_default() {
        let scorer = ToolCorrectnessScorer::new();
        let expected = vec![ExpectedToolCall::new("get_weather").with_arguments(json!({"location": "NYC"}))];
        let actual = vec![TrajectoryStep::tool("get_weather", json!({"location": "NYC", "unit": "celsius"}))];
        let sample = sample_with(expected, actual);
        let ctx = ScoreContext::new();
        let result = scorer.score(&ctx, &sample).await.unwrap();
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn ordered_optional_lookahead_does_not_strand_a_later_required_call() {
        let config = ToolCorrectnessConfig { order_matters: true, ..Default::default() };
        let scorer = ToolCorrectnessScorer::with_config(config);
        let expected = vec![
            ExpectedToolCall::new("optional").optional(),
            ExpectedToolCall::new("required"),
        ];
        let actual = vec![TrajectoryStep::tool("required", Value::Null)];
        let sample = sample_with(expected, actual);
        let ctx = ScoreContext::new();
        let result = scorer.score(&ctx, &sample).await.unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.details.get("matched").unwrap(), &Value::from(1));
        assert!(result.details.get("extra").unwrap().as_array().unwrap().is_empty());
        assert!(result.details.get("missing").unwrap().as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ordered_out_of_position_actual_counts_as_extra() {
        let config = ToolCorrectnessConfig { order_matters: true, ..Default::default() };
        let scorer = ToolCorrectnessScorer::with_config(config);
        let expected = vec![ExpectedToolCall::new("t1"), ExpectedToolCall::new("t2")];
        let actual = vec![
            TrajectoryStep::tool("noise", Value::Null),
            TrajectoryStep::tool("t1", Value::Null),
            TrajectoryStep::tool("t2", Value::Null),
        ];
        let sample = sample_with(expected, actual);
        let ctx = ScoreContext::new();
        let result = scorer.score(&ctx, &sample).await.unwrap();
        assert_eq!(result.score, 1.0);
        let extra = result.details.get("extra").unwrap().as_array().unwrap();
        assert_eq!(extra.len(), 1);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::model::TrajectoryStep;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn progressive_score_never_decreases(n in 1usize..6) {
            let scorer = ToolCorrectnessScorer::new();
            let expected: Vec<ExpectedToolCall> =
                (0..n).map(|i| ExpectedToolCall::new(format!("t{i}"))).collect();
            let mut sample = Sample::new("s1");
            sample.expected_tools = expected;
            let ctx = ScoreContext::new();

            let mut last = -1.0;
            for i in 0..n {
                sample.trajectory.steps.push(TrajectoryStep::tool(format!("t{i}"), Value::Null));
                let partial = futures::executor::block_on(
                    scorer.score_partial(&ctx, &sample, &sample.trajectory)
                ).unwrap();
                prop_assert!(partial.score >= last);
                last = partial.score;
            }
        }

        #[test]
        fn ordered_required_lookup_never_strands_a_later_required_call(
            prefix_noise in 0usize..4,
        ) {
            let scorer = ToolCorrectnessScorer::with_config(ToolCorrectnessConfig {
                order_matters: true,
                ..Default::default()
            });
            let mut actual = Vec::new();
            for i in 0..prefix_noise {
                actual.push(TrajectoryStep::tool(format!("noise{i}"), Value::Null));
            }
            actual.push(TrajectoryStep::tool("a", Value::Null));
            actual.push(TrajectoryStep::tool("b", Value::Null));
            let expected = vec![ExpectedToolCall::new("a"), ExpectedToolCall::new("b")];
            let mut sample = Sample::new("s1");
            sample.expected_tools = expected;
            sample.trajectory.steps = actual;
            let ctx = ScoreContext::new();
            let result = futures::executor::block_on(scorer.score(&ctx, &sample)).unwrap();
            prop_assert_eq!(result.score, 1.0);
        }
    }
}
