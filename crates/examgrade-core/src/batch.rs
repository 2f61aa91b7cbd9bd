//! Batch orchestration over exams × models × repetitions.
//!
//! Combinations run one after another, models outermost. Every combination
//! is isolated: an empty exam, a model that fails validation, or a failure
//! mid-run is reported as an event and the batch moves on.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::engine::EvaluationEngine;
use crate::events::{BatchEvent, EvalResult, ProgressEvent};
use crate::model::Exam;
use crate::traits::ResponseGenerator;

/// The combination currently streaming.
struct Running<'a> {
    events: BoxStream<'a, ProgressEvent>,
    buffered: Vec<ProgressEvent>,
}

struct BatchState<'a> {
    engine: &'a EvaluationEngine,
    exams: &'a [Exam],
    models: &'a [Arc<dyn ResponseGenerator>],
    repetitions: usize,
    user_instruction: &'a str,
    span: tracing::Span,
    /// Index of the next combination to start.
    cursor: usize,
    /// Combinations that passed validation so far.
    started: usize,
    current: Option<Running<'a>>,
    done: bool,
}

/// Run every (model, exam, repetition) combination and stream the result.
///
/// The stream always ends with [`BatchEvent::Done`]. Nothing runs until it
/// is polled, and dropping it stops the batch after the question in flight.
pub fn run_batch<'a>(
    engine: &'a EvaluationEngine,
    exams: &'a [Exam],
    models: &'a [Arc<dyn ResponseGenerator>],
    repetitions: usize,
    user_instruction: &'a str,
) -> BoxStream<'a, BatchEvent> {
    let run_id = Uuid::new_v4();
    let state = BatchState {
        engine,
        exams,
        models,
        repetitions,
        user_instruction,
        span: tracing::info_span!("batch", %run_id),
        cursor: 0,
        started: 0,
        current: None,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        let span = state.span.clone();
        let event = state.step().instrument(span).await?;
        Some((event, state))
    })
    .boxed()
}

impl<'a> BatchState<'a> {
    fn total(&self) -> usize {
        self.models.len() * self.exams.len() * self.repetitions
    }

    /// Model, exam and 1-based repetition of combination `index`.
    fn combination(&self, index: usize) -> (&'a Arc<dyn ResponseGenerator>, &'a Exam, usize) {
        let models: &'a [Arc<dyn ResponseGenerator>] = self.models;
        let exams: &'a [Exam] = self.exams;
        let per_model = exams.len() * self.repetitions;
        (
            &models[index / per_model],
            &exams[(index / self.repetitions) % exams.len()],
            index % self.repetitions + 1,
        )
    }

    async fn step(&mut self) -> Option<BatchEvent> {
        loop {
            if let Some(running) = self.current.as_mut() {
                match running.events.next().await {
                    Some(event) => {
                        running.buffered.push(event.clone());
                        return Some(BatchEvent::Evaluation(event));
                    }
                    None => {
                        let finished = self.current.take()?;
                        let summary = finished
                            .buffered
                            .iter()
                            .rev()
                            .find_map(ProgressEvent::summary);
                        if let Some(summary) = summary {
                            return Some(BatchEvent::EvalResult {
                                eval_result: EvalResult::from(summary),
                            });
                        }
                        continue;
                    }
                }
            }

            if self.cursor >= self.total() {
                if self.done {
                    return None;
                }
                self.done = true;
                tracing::info!(
                    combinations = self.total(),
                    started = self.started,
                    "batch finished"
                );
                return Some(BatchEvent::Done { done: true });
            }

            let (model, exam, repetition) = self.combination(self.cursor);
            self.cursor += 1;

            if exam.questions.is_empty() {
                tracing::warn!(exam = %exam.description, "skipping exam without questions");
                return Some(BatchEvent::Error {
                    error: format!("Exam {} has no questions.", exam.description),
                });
            }

            if let Err(e) = model.validate().await {
                tracing::warn!(model = %model.spec().description, "skipping model: {e}");
                return Some(BatchEvent::Error {
                    error: format!("Model {}: {e}", model.spec().description),
                });
            }

            self.started += 1;
            let progress = format!(
                "Eval {}/{} - Model: {} Subject: {} Exam: {} Repetition: {}/{}",
                self.started,
                self.total(),
                model.spec().description,
                exam.course,
                exam.description,
                repetition,
                self.repetitions,
            );
            tracing::info!("{progress}");

            let engine: &'a EvaluationEngine = self.engine;
            self.current = Some(Running {
                events: engine.stream_evaluation(exam, self.user_instruction, &**model),
                buffered: Vec::new(),
            });
            return Some(BatchEvent::Progress { progress });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{capitals_exam, exam, ScriptedModel};

    fn engine() -> (Arc<MemoryStore>, EvaluationEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = EvaluationEngine::new(store.clone());
        (store, engine)
    }

    fn progress_lines(events: &[BatchEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { progress } => Some(progress.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_exam_is_reported_and_skipped() {
        let (store, engine) = engine();
        let exams = vec![exam(1, &[]), {
            let mut valid = capitals_exam();
            valid.id = 2;
            valid
        }];
        let models: Vec<Arc<dyn ResponseGenerator>> = vec![Arc::new(ScriptedModel::always(&["a"]))];

        let events: Vec<_> = run_batch(&engine, &exams, &models, 1, "").collect().await;

        let errors: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0],
            &BatchEvent::Error { error: "Exam Exam 1 has no questions.".into() }
        );

        let evaluations = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::Evaluation(_)))
            .count();
        assert_eq!(evaluations, 3);

        let results: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::EvalResult { eval_result } => Some(eval_result),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].grade, "6.67 (2/3)");

        assert_eq!(events.last(), Some(&BatchEvent::Done { done: true }));
        assert_eq!(store.evaluations().len(), 1);
        assert_eq!(store.evaluations()[0].exam_id, 2);
    }

    #[tokio::test]
    async fn models_are_the_outer_loop() {
        let (_store, engine) = engine();
        let mut second = exam(2, &[("Pick a", &["a) yes", "b) no"], 'a')]);
        second.course = "Networks".into();
        let exams = vec![exam(1, &[("Pick a", &["a) yes", "b) no"], 'a')]), second];
        let models: Vec<Arc<dyn ResponseGenerator>> = vec![
            Arc::new(ScriptedModel::always(&["a"]).named("m1")),
            Arc::new(ScriptedModel::always(&["a"]).named("m2")),
        ];

        let events: Vec<_> = run_batch(&engine, &exams, &models, 2, "").collect().await;

        assert_eq!(
            progress_lines(&events),
            vec![
                "Eval 1/8 - Model: m1 Subject: Operating Systems Exam: Exam 1 Repetition: 1/2",
                "Eval 2/8 - Model: m1 Subject: Operating Systems Exam: Exam 1 Repetition: 2/2",
                "Eval 3/8 - Model: m1 Subject: Networks Exam: Exam 2 Repetition: 1/2",
                "Eval 4/8 - Model: m1 Subject: Networks Exam: Exam 2 Repetition: 2/2",
                "Eval 5/8 - Model: m2 Subject: Operating Systems Exam: Exam 1 Repetition: 1/2",
                "Eval 6/8 - Model: m2 Subject: Operating Systems Exam: Exam 1 Repetition: 2/2",
                "Eval 7/8 - Model: m2 Subject: Networks Exam: Exam 2 Repetition: 1/2",
                "Eval 8/8 - Model: m2 Subject: Networks Exam: Exam 2 Repetition: 2/2",
            ]
        );
    }

    #[tokio::test]
    async fn invalid_model_does_not_stop_the_batch() {
        let (store, engine) = engine();
        let exams = vec![capitals_exam()];
        let good = Arc::new(ScriptedModel::always(&["a"]).named("good"));
        let models: Vec<Arc<dyn ResponseGenerator>> = vec![
            Arc::new(
                ScriptedModel::always(&["a"])
                    .named("broken")
                    .invalid("Cannot connect to API"),
            ),
            good.clone() as Arc<dyn ResponseGenerator>,
        ];

        let events: Vec<_> = run_batch(&engine, &exams, &models, 1, "").collect().await;

        match &events[0] {
            BatchEvent::Error { error } => {
                assert!(error.starts_with("Model broken: "));
                assert!(error.contains("Cannot connect to API"));
            }
            other => panic!("expected model error, got {other:?}"),
        }
        // Only validated combinations are counted.
        assert_eq!(
            progress_lines(&events),
            vec!["Eval 1/2 - Model: good Subject: Operating Systems Exam: Exam 1 Repetition: 1/1"]
        );
        assert_eq!(good.calls(), 3);
        assert_eq!(store.evaluations().len(), 1);
        assert_eq!(events.last(), Some(&BatchEvent::Done { done: true }));
    }

    #[tokio::test]
    async fn failure_mid_run_is_isolated() {
        let (store, engine) = engine();
        let exams = vec![capitals_exam()];
        let models: Vec<Arc<dyn ResponseGenerator>> = vec![Arc::new(ScriptedModel::with_replies(
            vec![Ok(vec!["a"]), Err("connection reset"), Ok(vec!["a"])],
        ))];

        let events: Vec<_> = run_batch(&engine, &exams, &models, 2, "").collect().await;

        // Progress, q1, error | progress, q1..q3, eval_result | done
        assert_eq!(events.len(), 9);
        assert!(matches!(
            events[2],
            BatchEvent::Evaluation(ProgressEvent::Error(_))
        ));
        assert!(matches!(events[3], BatchEvent::Progress { .. }));
        assert_eq!(
            events[7],
            BatchEvent::EvalResult {
                eval_result: EvalResult {
                    grade: "6.67 (2/3)".into(),
                    time: match &events[6] {
                        BatchEvent::Evaluation(e) => e.summary().unwrap().total_time,
                        other => panic!("expected evaluation, got {other:?}"),
                    },
                },
            }
        );
        assert_eq!(events[8], BatchEvent::Done { done: true });
        assert_eq!(store.evaluations().len(), 1);
    }

    #[tokio::test]
    async fn nothing_to_do_still_finishes() {
        let (_store, engine) = engine();
        let models: Vec<Arc<dyn ResponseGenerator>> = vec![Arc::new(ScriptedModel::always(&["a"]))];

        let events: Vec<_> = run_batch(&engine, &[], &models, 3, "").collect().await;
        assert_eq!(events, vec![BatchEvent::Done { done: true }]);

        let exams = vec![capitals_exam()];
        let events: Vec<_> = run_batch(&engine, &exams, &models, 0, "").collect().await;
        assert_eq!(events, vec![BatchEvent::Done { done: true }]);
    }

    #[tokio::test]
    async fn dropped_batch_starts_nothing_new() {
        let (store, engine) = engine();
        let exams = vec![capitals_exam()];
        let model = Arc::new(ScriptedModel::always(&["a"]));
        let models: Vec<Arc<dyn ResponseGenerator>> = vec![model.clone() as Arc<dyn ResponseGenerator>];

        let first: Vec<_> = run_batch(&engine, &exams, &models, 5, "")
            .take(2)
            .collect()
            .await;

        assert!(matches!(first[0], BatchEvent::Progress { .. }));
        assert_eq!(model.calls(), 1);
        assert!(store.evaluations().is_empty());
    }
}
