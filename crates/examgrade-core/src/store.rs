//! In-memory evaluation store.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::GradeError;
use crate::model::{Evaluation, NewEvaluation, NewQuestionEvaluation};
use crate::traits::EvaluationStore;

#[derive(Debug, Default)]
struct Rows {
    evaluations: Vec<Evaluation>,
    question_evaluations: Vec<(i64, NewQuestionEvaluation)>,
}

/// Keeps committed evaluations in memory. Useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Rows>,
    reject_commits: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every commit fails.
    pub fn rejecting() -> Self {
        Self {
            rows: Mutex::default(),
            reject_commits: true,
        }
    }

    pub fn evaluations(&self) -> Vec<Evaluation> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .evaluations
            .clone()
    }

    /// `(evaluation id, row)` pairs in commit order.
    pub fn question_evaluations(&self) -> Vec<(i64, NewQuestionEvaluation)> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .question_evaluations
            .clone()
    }
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn commit_evaluation(&self, evaluation: NewEvaluation) -> Result<i64, GradeError> {
        if self.reject_commits {
            return Err(GradeError::Persistence("store is read-only".into()));
        }

        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let id = rows.evaluations.len() as i64 + 1;
        rows.evaluations.push(Evaluation {
            id,
            prompt: evaluation.prompt,
            ev_date: evaluation.ev_date,
            grade: evaluation.grade,
            time: evaluation.time,
            model_id: evaluation.model.id.unwrap_or_default(),
            exam_id: evaluation.exam_id,
        });
        rows.question_evaluations.extend(
            evaluation
                .question_evaluations
                .into_iter()
                .map(|row| (id, row)),
        );
        Ok(id)
    }
}
