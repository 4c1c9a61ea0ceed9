//! Batch evaluation reporting: aggregates a run's [`EvalResult`]s into pass/fail
//! counts and per-scorer averages.
//!
//! Adapted from `EvaluationReport`/`EvaluationSummary::from_results`'
//! single-agent-conversation result shape to the harness's per-sample
//! [`EvalResult`].

use std::collections::HashMap;

use crate::model::EvalResult;

/// Aggregate statistics over a batch of [`EvalResult`]s.
#[derive(Debug, Clone, Default)]
pub struct EvalSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub avg_scores: HashMap<String, f64>,
    pub results: Vec<EvalResult>,
}

impl EvalSummary {
    /// Builds a summary from `results`, treating `overall_score >= threshold` as passing.
    pub fn from_results(results: Vec<EvalResult>, threshold: f64) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.overall_score >= threshold).count();
        let failed = total - passed;
        let pass_rate = if total > 0 { passed as f64 / total as f64 } else { 0.0 };

        let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
        for result in &results {
            for (name, score) in &result.scores {
                let entry = sums.entry(name.clone()).or_insert((0.0, 0));
                entry.0 += score.score;
                entry.1 += 1;
            }
        }
        let avg_scores = sums.into_iter().map(|(k, (sum, count))| (k, sum / count as f64)).collect();

        Self { total, passed, failed, pass_rate, avg_scores, results }
    }

    pub fn failures(&self, threshold: f64) -> Vec<&EvalResult> {
        self.results.iter().filter(|r| r.overall_score < threshold).collect()
    }

    pub fn format_summary(&self) -> String {
        let mut output = String::new();
        output.push_str("Evaluation Summary:\n");
        output.push_str(&format!("  Total: {}\n", self.total));
        output.push_str(&format!("  Passed: {}\n", self.passed));
        output.push_str(&format!("  Failed: {}\n", self.failed));
        output.push_str(&format!("  Pass Rate: {:.1}%\n", self.pass_rate * 100.0));

        if !self.avg_scores.is_empty() {
            output.push_str("\nAverage Scores:\n");
            for (scorer, score) in &self.avg_scores {
                output.push_str(&format!("  {scorer}: {score:.3}\n"));
            }
        }
        output
    }
}
