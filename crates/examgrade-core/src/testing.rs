//! Test fixtures: a scripted model and exam builders.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::{GradeError, ModelConfigError};
use crate::model::{Exam, ModelSpec, Question, QuestionOption};
use crate::think::filter_think_tags;
use crate::traits::{ResponseGenerator, ResponseStream};

/// Replies with raw chunks from a script, one entry per call.
pub(crate) struct ScriptedModel {
    spec: ModelSpec,
    replies: Vec<Result<Vec<String>, String>>,
    invalid: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    /// Same chunks on every call.
    pub(crate) fn always(chunks: &[&str]) -> Self {
        Self::with_replies(vec![Ok(chunks.to_vec())])
    }

    /// Call `n` gets `replies[n]`; the last entry repeats.
    pub(crate) fn with_replies(replies: Vec<Result<Vec<&str>, &str>>) -> Self {
        Self {
            spec: ModelSpec::local("scripted"),
            replies: replies
                .into_iter()
                .map(|r| {
                    r.map(|chunks| chunks.into_iter().map(str::to_string).collect())
                        .map_err(str::to_string)
                })
                .collect(),
            invalid: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn named(mut self, description: &str) -> Self {
        self.spec.description = description.to_string();
        self
    }

    pub(crate) fn invalid(mut self, problem: &str) -> Self {
        self.invalid = Some(problem.to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    async fn validate(&self) -> Result<(), ModelConfigError> {
        match &self.invalid {
            Some(problem) => Err(ModelConfigError::new(problem.clone())),
            None => Ok(()),
        }
    }

    async fn generate_response(&self, _prompt: &str) -> Result<ResponseStream, GradeError> {
        self.validate().await?;
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(call)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));

        match reply {
            Ok(chunks) => Ok(filter_think_tags(
                stream::iter(chunks.into_iter().map(Ok)).boxed(),
            )),
            Err(message) => Err(GradeError::ModelCall(message)),
        }
    }
}

/// Build an exam from `(statement, options, correct letter)` triples.
///
/// Question ids count from 1, option ids from `question_id * 100`.
pub(crate) fn exam(id: i64, questions: &[(&str, &[&str], char)]) -> Exam {
    Exam {
        id,
        description: format!("Exam {id}"),
        course: "Operating Systems".into(),
        questions: questions
            .iter()
            .enumerate()
            .map(|(i, (statement, options, correct))| {
                let question_id = i as i64 + 1;
                let options: Vec<QuestionOption> = options
                    .iter()
                    .enumerate()
                    .map(|(j, content)| QuestionOption {
                        id: question_id * 100 + j as i64,
                        content: (*content).to_string(),
                    })
                    .collect();
                let correct_option_id = options
                    .iter()
                    .find(|o| crate::model::option_letter(&o.content) == Some(*correct))
                    .map(|o| o.id);
                Question {
                    id: question_id,
                    statement: (*statement).to_string(),
                    options,
                    correct_option_id,
                }
            })
            .collect(),
    }
}

pub(crate) fn capitals_exam() -> Exam {
    exam(
        1,
        &[
            ("Capital of France?", &["a) Paris", "b) Rome"], 'a'),
            ("Capital of Italy?", &["a) Paris", "b) Rome"], 'b'),
            ("Capital of Spain?", &["a) Madrid", "b) Lisbon"], 'a'),
        ],
    )
}
