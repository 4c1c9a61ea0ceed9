//! # evalharness
//!
//! Scoring, streaming feedback, and a batch evaluation-runner contract for
//! recorded agent executions.
//!
//! This crate is deliberately agent-agnostic: it consumes a [`model::Sample`]
//! carrying a pre-recorded [`model::Trajectory`] rather than executing an
//! agent itself. Three building blocks compose:
//!
//! - [`scorer`] and [`scorers`]: deterministic, pluggable scoring functions.
//! - [`dispatcher`]: parallel streaming feedback for long-running agents,
//!   with threshold-driven alerts and a recommended action.
//! - [`runner`]: batch/single scoring, threshold enforcement, logging, and
//!   observability hook points.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use evalharness::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let sample = Sample::new("case-1");
//!     let tool_scorer = ToolCorrectnessScorer::new();
//!     let scorers: Vec<&dyn Scorer> = vec![&tool_scorer];
//!
//!     let runner = EvaluationRunner::new();
//!     let result = runner.score(&sample, &scorers).await;
//!     assert!(runner.require_score(&result, 0.8).is_ok());
//! }
//! ```

pub mod dispatcher;
pub mod error;
pub mod model;
pub mod observability;
pub mod report;
pub mod runner;
pub mod scorer;
pub mod scorers;

pub use dispatcher::{DispatcherConfig, FeedbackDispatcher, ThresholdConfig};
pub use error::{EvalError, Result};
pub use model::{
    Action, Alert, AlertLevel, EvalResult, EvalSet, ExpectedToolCall, Feedback, Finding,
    PartialScore, Sample, ScoreResult, ScoreStatus, Severity, StepType, Trajectory, TrajectoryStep,
};
pub use observability::{JsonlLogger, Logger, ObservabilityHook, OtelHook};
pub use report::EvalSummary;
pub use runner::{evaluations_enabled, run, EvaluationRunner, RunnerConfig};
pub use scorer::{aggregate_equal, aggregate_weighted, ScoreContext, Scorer, StreamingScorer};
pub use scorers::{
    ExpectedStep, FindingAccuracyConfig, FindingAccuracyScorer, Mode, ToolCorrectnessConfig,
    ToolCorrectnessScorer, TrajectoryConfig, TrajectoryScorer,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dispatcher::{DispatcherConfig, FeedbackDispatcher, ThresholdConfig};
    pub use crate::error::{EvalError, Result};
    pub use crate::model::{
        Action, Alert, AlertLevel, EvalResult, EvalSet, ExpectedToolCall, Feedback, Finding,
        PartialScore, Sample, ScoreResult, ScoreStatus, Severity, StepType, Trajectory,
        TrajectoryStep,
    };
    pub use crate::observability::{JsonlLogger, Logger, ObservabilityHook, OtelHook};
    pub use crate::report::EvalSummary;
    pub use crate::runner::{evaluations_enabled, run, EvaluationRunner, RunnerConfig};
    pub use crate::scorer::{aggregate_equal, aggregate_weighted, ScoreContext, Scorer, StreamingScorer};
    pub use crate::scorers::{
        ExpectedStep, FindingAccuracyConfig, FindingAccuracyScorer, Mode, ToolCorrectnessConfig,
        ToolCorrectnessScorer, TrajectoryConfig, TrajectoryScorer,
    };
}
