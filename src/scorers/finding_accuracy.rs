//! Finding-accuracy scorer: precision/recall/F1 of the findings an agent
//! reported against the ground-truth findings expected for a sample.
//!
//! The match-then-count-TP/FP/FN shape is grounded on `agentreplay-evals`'
//! `tool_correctness.rs::calculate_tool_metrics`, generalised from tool names
//! to findings matched by id, fuzzy title, severity, and category; the
//! the whitespace-token Jaccard similarity used for fuzzy title matching
//! mirrors `ResponseScorer::jaccard_similarity`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::model::{Action, Finding, PartialScore, Sample, ScoreResult, ScoreStatus, Trajectory};
use crate::scorer::{ScoreContext, Scorer, StreamingScorer};

#[derive(Debug, Clone)]
pub struct FindingAccuracyConfig {
    pub ground_truth: Vec<Finding>,
    pub match_by_severity: bool,
    pub match_by_category: bool,
    pub fuzzy_title_threshold: f64,
}

impl Default for FindingAccuracyConfig {
    fn default() -> Self {
        Self {
            ground_truth: Vec::new(),
            match_by_severity: false,
            match_by_category: false,
            fuzzy_title_threshold: 1.0,
        }
    }
}

pub struct FindingAccuracyScorer {
    config: FindingAccuracyConfig,
}

impl FindingAccuracyScorer {
    pub fn new(config: FindingAccuracyConfig) -> Self {
        Self { config }
    }

    fn ground_truth<'a>(&'a self, sample: &'a Sample) -> &'a [Finding] {
        if self.config.ground_truth.is_empty() {
            &sample.expected_findings
        } else {
            &self.config.ground_truth
        }
    }

    fn titles_match(&self, a: &str, b: &str) -> bool {
        let a_words: HashSet<&str> = a.split_whitespace().collect();
        let b_words: HashSet<&str> = b.split_whitespace().collect();
        if a_words.is_empty() && b_words.is_empty() {
            return true;
        }
        let union = a_words.union(&b_words).count();
        if union == 0 {
            return false;
        }
        let intersection = a_words.intersection(&b_words).count();
        (intersection as f64 / union as f64) >= self.config.fuzzy_title_threshold
    }

    fn findings_match(&self, expected: &Finding, actual: &Finding) -> bool {
        let identity_match = if !expected.id.is_empty() && !actual.id.is_empty() {
            expected.id == actual.id
        } else {
            self.titles_match(&expected.title, &actual.title)
        };
        if !identity_match {
            return false;
        }
        if self.config.match_by_severity && expected.severity != actual.severity {
            return false;
        }
        if self.config.match_by_category && expected.category != actual.category {
            return false;
        }
        true
    }

    fn score_findings(&self, ground_truth: &[Finding], actual: &[Finding]) -> (f64, HashMap<String, Value>) {
        if ground_truth.is_empty() {
            let mut details = HashMap::new();
            details.insert(
                "warning".to_string(),
                Value::String("no ground truth findings provided".to_string()),
            );
            return (1.0, details);
        }

        let mut matched_actual = vec![false; actual.len()];
        let mut tp = 0usize;
        let mut weighted_tp = 0.0;

        for expected in ground_truth {
            for (i, cand) in actual.iter().enumerate() {
                if !matched_actual[i] && self.findings_match(expected, cand) {
                    matched_actual[i] = true;
                    tp += 1;
                    weighted_tp += expected.severity.weight();
                    break;
                }
            }
        }

        let fp = matched_actual.iter().filter(|m| !**m).count();
        let fn_ = ground_truth.len() - tp;

        let precision = if tp + fp == 0 { 0.0 } else { tp as f64 / (tp + fp) as f64 };
        let recall = if tp + fn_ == 0 { 0.0 } else { tp as f64 / (tp + fn_) as f64 };
        let f1 = if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) };

        let mut details = HashMap::new();
        details.insert("true_positives".to_string(), Value::from(tp));
        details.insert("false_positives".to_string(), Value::from(fp));
        details.insert("false_negatives".to_string(), Value::from(fn_));
        details.insert("precision".to_string(), Value::from(precision));
        details.insert("recall".to_string(), Value::from(recall));
        if self.config.match_by_severity {
            details.insert("weighted_tp_count".to_string(), Value::from(weighted_tp));
        }
        (f1, details)
    }
}

fn findings_from_trajectory(trajectory: &Trajectory) -> Vec<Finding> {
    trajectory
        .findings()
        .into_iter()
        .filter_map(|step| serde_json::from_value::<Finding>(step.output.clone()).ok())
        .collect()
}

#[async_trait]
impl Scorer for FindingAccuracyScorer {
    fn name(&self) -> &str {
        "finding_accuracy"
    }

    async fn score(&self, _ctx: &ScoreContext, sample: &Sample) -> Result<ScoreResult> {
        let ground_truth = self.ground_truth(sample);
        let actual = findings_from_trajectory(&sample.trajectory);
        let (score, details) = self.score_findings(ground_truth, &actual);
        Ok(ScoreResult { score, details })
    }
}

#[async_trait]
impl StreamingScorer for FindingAccuracyScorer {
    async fn score_partial(
        &self,
        _ctx: &ScoreContext,
        sample: &Sample,
        trajectory: &Trajectory,
    ) -> Result<PartialScore> {
        let ground_truth = self.ground_truth(sample);
        let actual = findings_from_trajectory(trajectory);
        let (score, details) = self.score_findings(ground_truth, &actual);
        let expected_count = ground_truth.len().max(1);
        let confidence = (actual.len() as f64 / expected_count as f64).min(1.0);
        let action = if score < 0.2 && confidence > 0.5 {
            Action::Reconsider
        } else if score < 0.5 && confidence > 0.5 {
            Action::Adjust
        } else {
            Action::Continue
        };
        let status = if actual.len() >= expected_count { ScoreStatus::Final } else { ScoreStatus::Partial };
        Ok(PartialScore { score, confidence, status, action, feedback: String::new(), details })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Severity, TrajectoryStep};

    fn finding(id: &str, severity: Severity, category: &str, title: &str) -> Finding {
        Finding { id: id.to_string(), severity, category: category.to_string(), title: title.to_string() }
    }

    fn sample_with(ground_truth: Vec<Finding>, actual: Vec<Finding>) -> Sample {
        let mut sample = Sample::new("s1");
        sample.expected_findings = ground_truth;
        sample.trajectory.steps = actual
            .into_iter()
            .map(|f| TrajectoryStep::finding(f.title.clone(), serde_json::to_value(&f).unwrap()))
            .collect();
        sample
    }

    #[tokio::test]
    async fn f1_with_one_false_positive() {
        let scorer = FindingAccuracyScorer::new(FindingAccuracyConfig::default());
        let ground_truth = vec![finding("f1", Severity::High, "injection", "Prompt injection")];
        let actual = vec![
            finding("f1", Severity::High, "injection", "Prompt injection"),
            finding("f2", Severity::Low, "dos", "Unrelated finding"),
        ];
        let sample = sample_with(ground_truth, actual);
        let ctx = ScoreContext::new();
        let result = scorer.score(&ctx, &sample).await.unwrap();
        assert!((result.score - 0.6667).abs() < 0.001);
    }

    #[tokio::test]
    async fn empty_ground_truth_scores_one_with_warning() {
        let scorer = FindingAccuracyScorer::new(FindingAccuracyConfig::default());
        let sample = sample_with(vec![], vec![finding("f1", Severity::Low, "x", "y")]);
        let ctx = ScoreContext::new();
        let result = scorer.score(&ctx, &sample).await.unwrap();
        assert_eq!(result.score, 1.0);
        assert!(result.details.contains_key("warning"));
    }

    #[tokio::test]
    async fn fuzzy_title_match_below_threshold_fails() {
        let config = FindingAccuracyConfig { fuzzy_title_threshold: 0.9, ..Default::default() };
        let scorer = FindingAccuracyScorer::new(config);
        let ground_truth = vec![finding("", Severity::Medium, "x", "sql injection in login form")];
        let actual = vec![finding("", Severity::Medium, "x", "totally unrelated title here")];
        let sample = sample_with(ground_truth, actual);
        let ctx = ScoreContext::new();
        let result = scorer.score(&ctx, &sample).await.unwrap();
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn serde_roundtrip_for_finding_output() {
        let f = finding("f1", Severity::Critical, "rce", "Remote code execution");
        let value = serde_json::to_value(&f).unwrap();
        let back: Finding = serde_json::from_value(value).unwrap();
        assert_eq!(f, back);
    }
}
