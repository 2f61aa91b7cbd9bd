//! Evaluation stream engine.
//!
//! Drives one exam through one model, a question at a time, and streams a
//! progress event per question. Results are collected in memory and
//! committed as a single unit after the last question; a failing question
//! ends the stream with an error event and nothing is written.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::GradeError;
use crate::events::{ProgressEvent, QuestionProgress, QuestionResult, RunFailure};
use crate::model::{grade, round2, Exam, NewEvaluation, NewQuestionEvaluation, Question};
use crate::prompt::{build_prompt, instruction_part};
use crate::traits::{EvaluationStore, ResponseGenerator};

/// First character of the first response line, trimmed and lowercased.
///
/// No lines at all gives an empty answer.
pub fn answer_from_fragments(fragments: &[String]) -> String {
    fragments
        .first()
        .and_then(|line| line.trim().to_lowercase().chars().next())
        .map(String::from)
        .unwrap_or_default()
}

/// Compare an answer with the correct option's content on their first
/// character, ignoring case and surrounding whitespace.
pub fn is_correct(answer: &str, correct_option: &str) -> bool {
    let expected = correct_option.trim().to_lowercase().chars().next();
    let given = answer.trim().to_lowercase().chars().next();
    matches!((given, expected), (Some(g), Some(e)) if g == e)
}

/// Streams evaluations and commits their results.
pub struct EvaluationEngine {
    store: Arc<dyn EvaluationStore>,
}

/// What one answered question contributes to the run.
struct Answered {
    result: QuestionResult,
    row: NewQuestionEvaluation,
}

struct RunState<'a> {
    exam: &'a Exam,
    user_instruction: &'a str,
    model: &'a dyn ResponseGenerator,
    store: &'a dyn EvaluationStore,
    started_at: DateTime<Utc>,
    next_index: usize,
    correct_count: usize,
    total_secs: f64,
    rows: Vec<NewQuestionEvaluation>,
    finished: bool,
}

impl EvaluationEngine {
    pub fn new(store: Arc<dyn EvaluationStore>) -> Self {
        Self { store }
    }

    /// Evaluate `exam` with `model`, one event per question in exam order.
    ///
    /// The stream is lazy: a question is only sent once the previous event
    /// has been pulled, and dropping the stream stops the run. The commit
    /// happens when the stream is polled past its last question event.
    pub fn stream_evaluation<'a>(
        &'a self,
        exam: &'a Exam,
        user_instruction: &'a str,
        model: &'a dyn ResponseGenerator,
    ) -> BoxStream<'a, ProgressEvent> {
        let state = RunState {
            exam,
            user_instruction,
            model,
            store: self.store.as_ref(),
            started_at: Utc::now(),
            next_index: 0,
            correct_count: 0,
            total_secs: 0.0,
            rows: Vec::with_capacity(exam.questions.len()),
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            let event = state.step().await?;
            Some((event, state))
        })
        .boxed()
    }
}

impl RunState<'_> {
    async fn step(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }

        let total = self.exam.questions.len();
        let Some(question) = self.exam.questions.get(self.next_index) else {
            self.finished = true;
            return self.commit().await;
        };
        let index = self.next_index;

        let start = Instant::now();
        let answered = match answer_question(question, self.user_instruction, self.model).await {
            Ok(answered) => answered,
            Err(e) => {
                tracing::error!(
                    exam = %self.exam.description,
                    model = %self.model.spec().description,
                    "error processing question {}: {e}",
                    index + 1
                );
                self.finished = true;
                return Some(ProgressEvent::Error(RunFailure {
                    error: e.to_string(),
                    processed_questions: index + 1,
                    total_questions: total,
                    correct_count: self.correct_count,
                }));
            }
        };
        let secs = start.elapsed().as_secs_f64();

        self.next_index += 1;
        self.total_secs += secs;
        if answered.result.is_correct {
            self.correct_count += 1;
        }
        self.rows.push(answered.row);

        Some(ProgressEvent::Question(QuestionProgress {
            processed_questions: index + 1,
            total_questions: total,
            correct_count: self.correct_count,
            response: answered.result,
            time: round2(secs),
            total_time: (index + 1 == total).then(|| round2(self.total_secs)),
        }))
    }

    /// Write the evaluation once every question has been answered.
    ///
    /// Yields an error event only if the write fails.
    async fn commit(&mut self) -> Option<ProgressEvent> {
        let total = self.exam.questions.len();
        let evaluation = NewEvaluation {
            prompt: instruction_part(self.user_instruction),
            ev_date: self.started_at,
            grade: grade(self.correct_count, total),
            time: round2(self.total_secs),
            model: self.model.spec().clone(),
            exam_id: self.exam.id,
            question_evaluations: std::mem::take(&mut self.rows),
        };
        let grade = evaluation.grade;

        match self.store.commit_evaluation(evaluation).await {
            Ok(id) => {
                tracing::info!(
                    evaluation = id,
                    exam = %self.exam.description,
                    model = %self.model.spec().description,
                    "evaluation stored with grade {grade:.2}"
                );
                None
            }
            Err(e) => {
                tracing::error!(exam = %self.exam.description, "failed to store evaluation: {e}");
                Some(ProgressEvent::Error(RunFailure {
                    error: e.to_string(),
                    processed_questions: total,
                    total_questions: total,
                    correct_count: self.correct_count,
                }))
            }
        }
    }
}

async fn answer_question(
    question: &Question,
    user_instruction: &str,
    model: &dyn ResponseGenerator,
) -> Result<Answered, GradeError> {
    let correct = question.correct_option().ok_or_else(|| {
        GradeError::InvalidExam(format!("question {} has no correct option", question.id))
    })?;

    let prompt = build_prompt(question, user_instruction);
    tracing::info!("Question prompt: {}", prompt.question_part);

    let fragments: Vec<String> = model
        .generate_response(&prompt.full_prompt)
        .await?
        .try_collect()
        .await?;
    tracing::info!("Model response: {}", fragments.concat());

    if fragments.is_empty() {
        tracing::warn!(
            question = question.id,
            "model returned no answer, scoring as incorrect"
        );
    }

    let answer = answer_from_fragments(&fragments);
    let correct_flag = is_correct(&answer, &correct.content);

    Ok(Answered {
        result: QuestionResult {
            question_prompt: prompt.question_part,
            user_prompt: prompt.instruction_part,
            prompt: prompt.full_prompt,
            response: answer,
            correct_option: correct.content.clone(),
            is_correct: correct_flag,
        },
        row: NewQuestionEvaluation {
            question_id: question.id,
            option_id: correct.id,
        },
    })
}
