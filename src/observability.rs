//! Observability hook points: a pluggable [`Logger`] for JSONL result records
//! and a pluggable [`ObservabilityHook`] for span/metric emission.
//!
//! Defined as optional trait objects attached to the runner/dispatcher via
//! builders, the same pattern as `Evaluator`'s `Option<LlmJudge>` — no global
//! state, call sites guard with presence checks. Span/metric naming follows
//! `agentreplay-evals`' use of `opentelemetry`/`opentelemetry-semantic-conventions`.

use async_trait::async_trait;
use opentelemetry::trace::{Span, Status, Tracer};
use opentelemetry::{global, KeyValue};
use opentelemetry_semantic_conventions::trace::EXCEPTION_MESSAGE;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{EvalError, Result};
use crate::model::{EvalResult, Feedback, Sample};

/// Persists a scored result. Implementors are expected to be internally thread-safe.
#[async_trait]
pub trait Logger: Send + Sync {
    async fn log(&self, sample: &Sample, result: &EvalResult) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A span/metric emission hook invoked after every `EvaluationRunner::score` call
/// and every `FeedbackDispatcher::evaluate` call.
#[async_trait]
pub trait ObservabilityHook: Send + Sync {
    async fn on_score(&self, sample: &Sample, result: &EvalResult) -> Result<()>;

    /// Invoked once per dispatcher call with the aggregated feedback. Default
    /// no-op so hooks that only care about batch scoring don't need to implement it.
    async fn on_feedback(&self, _sample: &Sample, _feedback: &Feedback) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON line per result to a file, matching the JSONL log record format.
pub struct JsonlLogger {
    file: Mutex<std::fs::File>,
}

impl JsonlLogger {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path.into())?;
        Ok(Self { file: Mutex::new(file) })
    }
}

#[derive(serde::Serialize)]
struct JsonlRecord<'a> {
    sample_id: &'a str,
    task_id: Option<String>,
    timestamp: chrono::DateTime<chrono::Utc>,
    duration_ms: u64,
    overall_score: f64,
    scores: std::collections::HashMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Extracts an identifier from the opaque task descriptor, if one is present.
/// `task` has no fixed shape, so an object `id` field (string or otherwise) is
/// used when present; absent or non-object tasks yield `None`, serialized as `null`.
fn task_id(task: &serde_json::Value) -> Option<String> {
    match task.get("id")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl Logger for JsonlLogger {
    async fn log(&self, sample: &Sample, result: &EvalResult) -> Result<()> {
        let record = JsonlRecord {
            sample_id: &result.sample_id,
            task_id: task_id(&sample.task),
            timestamp: result.timestamp,
            duration_ms: result.duration_ms,
            overall_score: result.overall_score,
            scores: result.scores.iter().map(|(k, v)| (k.clone(), v.score)).collect(),
            error: result.error.as_deref(),
        };
        let line = serde_json::to_string(&record)?;
        let mut file = self.file.lock().map_err(|_| {
            EvalError::ObservabilityFailed("jsonl logger mutex poisoned".to_string())
        })?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Emits the `eval.score` span and `eval.score`/`eval.duration`/`eval.count` metrics
/// through the global OpenTelemetry providers.
pub struct OtelHook {
    tracer_name: &'static str,
    pass_threshold: f64,
}

impl OtelHook {
    pub fn new(pass_threshold: f64) -> Self {
        Self { tracer_name: "evalharness", pass_threshold }
    }
}

#[async_trait]
impl ObservabilityHook for OtelHook {
    async fn on_score(&self, sample: &Sample, result: &EvalResult) -> Result<()> {
        let tracer = global::tracer(self.tracer_name);
        let mut span = tracer.start("eval.score");
        span.set_attribute(KeyValue::new("sample.id", sample.id.clone()));
        span.set_attribute(KeyValue::new("eval.overall_score", result.overall_score));
        span.set_attribute(KeyValue::new("eval.duration_ms", result.duration_ms as i64));
        span.set_attribute(KeyValue::new("eval.scorer_count", result.scores.len() as i64));
        for (name, score) in &result.scores {
            span.set_attribute(KeyValue::new(format!("eval.scorer.{name}.score"), score.score));
        }

        if result.overall_score >= self.pass_threshold && result.error.is_none() {
            span.set_status(Status::Ok);
        } else {
            let message = result.error.clone().unwrap_or_else(|| "score below threshold".to_string());
            span.set_attribute(KeyValue::new(EXCEPTION_MESSAGE, message.clone()));
            span.set_status(Status::error(message));
        }
        span.end();

        let meter = global::meter(self.tracer_name);
        meter
            .f64_histogram("eval.score")
            .init()
            .record(result.overall_score, &[KeyValue::new("sample.id", sample.id.clone())]);
        meter
            .f64_histogram("eval.duration")
            .init()
            .record(result.duration_ms as f64, &[KeyValue::new("sample.id", sample.id.clone())]);
        meter
            .u64_counter("eval.count")
            .init()
            .add(1, &[KeyValue::new("sample.id", sample.id.clone())]);

        Ok(())
    }

    async fn on_feedback(&self, sample: &Sample, feedback: &Feedback) -> Result<()> {
        let tracer = global::tracer(self.tracer_name);

        let mut span = tracer.start("eval.feedback");
        span.set_attribute(KeyValue::new("sample.id", sample.id.clone()));
        span.set_attribute(KeyValue::new("eval.overall_score", feedback.overall.score));
        span.set_attribute(KeyValue::new("eval.overall_confidence", feedback.overall.confidence));
        span.set_attribute(KeyValue::new("eval.action", format!("{:?}", feedback.overall.action)));
        span.set_attribute(KeyValue::new("eval.alert_count", feedback.alerts.len() as i64));
        span.set_attribute(KeyValue::new("eval.step_index", feedback.step_index as i64));
        span.end();

        for alert in &feedback.alerts {
            let mut alert_span = tracer.start("eval.alert");
            alert_span.set_attribute(KeyValue::new("alert.level", format!("{:?}", alert.level)));
            alert_span.set_attribute(KeyValue::new("alert.scorer", alert.scorer.clone()));
            alert_span.set_attribute(KeyValue::new("alert.score", alert.score));
            alert_span.set_attribute(KeyValue::new("alert.threshold", alert.threshold));
            alert_span.end();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoreResult;
    use std::collections::HashMap;

    fn sample_result(score: f64) -> EvalResult {
        let mut scores = HashMap::new();
        scores.insert("tool_correctness".to_string(), ScoreResult::new(score));
        EvalResult {
            sample_id: "s1".to_string(),
            scores,
            overall_score: score,
            duration_ms: 12,
            timestamp: chrono::Utc::now(),
            error: None,
        }
    }

    #[tokio::test]
    async fn jsonl_logger_appends_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let logger = JsonlLogger::new(&path).unwrap();
        let mut sample = Sample::new("s1");
        sample.task = serde_json::json!({"id": "task-42"});

        logger.log(&sample, &sample_result(0.8)).await.unwrap();
        logger.log(&sample, &sample_result(0.4)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["overall_score"], 0.8);
        assert_eq!(first["task_id"], "task-42");
    }

    #[tokio::test]
    async fn jsonl_logger_writes_null_task_id_when_task_has_no_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let logger = JsonlLogger::new(&path).unwrap();
        let sample = Sample::new("s1");

        logger.log(&sample, &sample_result(0.5)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let record: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert!(record.get("task_id").is_some());
        assert!(record["task_id"].is_null());
    }
}
