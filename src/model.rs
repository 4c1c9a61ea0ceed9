//! Core data model: samples, trajectories, and scoring results.
//!
//! `Value` is `serde_json::Value` directly rather than a bespoke tagged type: the
//! eval-set file format is JSON, so the wire and in-memory representations match,
//! and `serde_json::Number` already distinguishes integer- from float-valued numbers
//! the way the tool-correctness numeric tolerance needs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{EvalError, Result};

/// Severity of a ground-truth finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used when computing weighted true-positive counts in finding-accuracy scoring.
    pub fn weight(self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Medium => 2.0,
            Severity::High => 3.0,
            Severity::Critical => 4.0,
        }
    }
}

/// A finding the agent is expected (or claims) to have discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub id: String,
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    pub title: String,
}

/// An expected tool invocation within a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

impl ExpectedToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), arguments: Value::Object(Default::default()), required: true }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Classifies what a [`TrajectoryStep`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Tool,
    Llm,
    Delegate,
    Finding,
    Memory,
}

/// One recorded step of an agent's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl TrajectoryStep {
    pub fn tool(name: impl Into<String>, input: Value) -> Self {
        Self {
            step_type: StepType::Tool,
            name: name.into(),
            input,
            output: Value::Null,
            error: None,
            start_time: None,
            duration_ms: 0,
        }
    }

    pub fn finding(title: impl Into<String>, output: Value) -> Self {
        Self {
            step_type: StepType::Finding,
            name: title.into(),
            input: Value::Null,
            output,
            error: None,
            start_time: None,
            duration_ms: 0,
        }
    }
}

/// The time-ordered sequence of operations an agent performed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub steps: Vec<TrajectoryStep>,
    #[serde(default)]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Trajectory {
    pub fn tool_calls(&self) -> Vec<&TrajectoryStep> {
        self.steps.iter().filter(|s| s.step_type == StepType::Tool).collect()
    }

    pub fn findings(&self) -> Vec<&TrajectoryStep> {
        self.steps.iter().filter(|s| s.step_type == StepType::Finding).collect()
    }
}

/// One evaluation case: a task plus what the agent is expected to have produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    #[serde(default)]
    pub task: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub trajectory: Trajectory,
    #[serde(default)]
    pub expected_output: Option<Value>,
    #[serde(default)]
    pub expected_tools: Vec<ExpectedToolCall>,
    #[serde(default)]
    pub expected_findings: Vec<Finding>,
    #[serde(default)]
    pub tags: HashSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Sample {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }
}

/// A named, versioned collection of samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalSet {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub samples: Vec<Sample>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl EvalSet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EvalError::LoadError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| EvalError::ParseError(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the samples whose tag-set is a superset of `tags`. An empty filter returns all.
    pub fn filter_by_tags(&self, tags: &[&str]) -> Vec<&Sample> {
        if tags.is_empty() {
            return self.samples.iter().collect();
        }
        self.samples.iter().filter(|s| tags.iter().all(|t| s.tags.contains(*t))).collect()
    }
}

/// Outcome of a single scorer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: f64,
    #[serde(default)]
    pub details: HashMap<String, Value>,
}

impl ScoreResult {
    pub fn new(score: f64) -> Self {
        Self { score, details: HashMap::new() }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(0.0).with_detail("error", message.into())
    }
}

/// Result of evaluating one sample against a set of scorers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    pub sample_id: String,
    pub scores: HashMap<String, ScoreResult>,
    pub overall_score: f64,
    pub duration_ms: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Lifecycle state of a streaming partial score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    Pending,
    Partial,
    Final,
}

/// Recommended action for the agent consuming feedback. Ordered: weaker first,
/// so `max` over observed actions implements the precedence abort > reconsider > adjust > continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Continue,
    Adjust,
    Reconsider,
    Abort,
}

/// A confidence-weighted score produced from an in-progress trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialScore {
    pub score: f64,
    pub confidence: f64,
    pub status: ScoreStatus,
    pub action: Action,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub details: HashMap<String, Value>,
}

impl PartialScore {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            score,
            confidence,
            status: ScoreStatus::Partial,
            action: Action::Continue,
            feedback: String::new(),
            details: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: ScoreStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }
}

/// Severity of a threshold breach alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// A threshold-breach notification produced by the feedback dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub scorer: String,
    pub score: f64,
    pub threshold: f64,
    pub message: String,
    pub action: Action,
}

/// The feedback dispatcher's aggregate output for one point in a trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub step_index: usize,
    pub scores: HashMap<String, PartialScore>,
    pub overall: PartialScore,
    pub alerts: Vec<Alert>,
    pub consumed: bool,
}

/// Validates that `score` is a finite value in `[0.0, 1.0]`.
pub fn validate_score(scorer: &str, score: f64) -> Result<()> {
    if score.is_nan() || !(0.0..=1.0).contains(&score) {
        return Err(EvalError::InvalidScore { scorer: scorer.to_string(), value: score });
    }
    Ok(())
}
