//! Canonical scorer implementations.

pub mod finding_accuracy;
pub mod tool_correctness;
pub mod trajectory;

pub use finding_accuracy::{FindingAccuracyConfig, FindingAccuracyScorer};
pub use tool_correctness::{ToolCorrectnessConfig, ToolCorrectnessScorer};
pub use trajectory::{ExpectedStep, Mode, TrajectoryConfig, TrajectoryScorer};
