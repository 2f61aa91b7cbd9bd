//! Progress events and their server-sent-event wire format.
//!
//! Every event is written as one `data: <json>\n\n` frame.

use serde::{Deserialize, Serialize};

use crate::model::grade;

/// Echo of what was asked and what came back for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_prompt: String,
    pub user_prompt: String,
    pub prompt: String,
    /// First character of the model's answer, lowercased; empty if none.
    pub response: String,
    /// Full content of the correct option.
    pub correct_option: String,
    pub is_correct: bool,
}

/// Running totals after one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionProgress {
    pub processed_questions: usize,
    pub total_questions: usize,
    pub correct_count: usize,
    pub response: QuestionResult,
    /// Seconds spent on this question.
    pub time: f64,
    /// Seconds spent on the whole exam; only on the last question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
}

/// The event that ends a run early.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub error: String,
    pub processed_questions: usize,
    pub total_questions: usize,
    pub correct_count: usize,
}

/// One event of a single exam evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Question(QuestionProgress),
    Error(RunFailure),
}

/// Totals of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub correct_count: usize,
    pub total_questions: usize,
    pub total_time: f64,
}

impl ProgressEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, ProgressEvent::Error(_))
    }

    /// Totals, if this event closes a complete run.
    pub fn summary(&self) -> Option<RunSummary> {
        match self {
            ProgressEvent::Question(q) => q.total_time.map(|total_time| RunSummary {
                correct_count: q.correct_count,
                total_questions: q.total_questions,
                total_time,
            }),
            ProgressEvent::Error(_) => None,
        }
    }
}

/// Grade line shown once a batch combination finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    /// `"X.XX (correct/total)"`.
    pub grade: String,
    pub time: f64,
}

impl From<RunSummary> for EvalResult {
    fn from(summary: RunSummary) -> Self {
        Self {
            grade: format!(
                "{:.2} ({}/{})",
                grade(summary.correct_count, summary.total_questions),
                summary.correct_count,
                summary.total_questions
            ),
            time: summary.total_time,
        }
    }
}

/// One event of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEvent {
    Progress { progress: String },
    Evaluation(ProgressEvent),
    EvalResult { eval_result: EvalResult },
    Error { error: String },
    Done { done: bool },
}

/// Encode an event as a `data: <json>\n\n` frame.
pub fn to_sse_frame<T: Serialize>(event: &T) -> serde_json::Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Decode one frame produced by [`to_sse_frame`].
pub fn parse_sse_frame(frame: &str) -> Option<BatchEvent> {
    let json = frame.trim().strip_prefix("data:")?.trim();
    match serde_json::from_str(json) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("failed to decode event frame: {e}");
            None
        }
    }
}
