//! Core data model types for examgrade.
//!
//! Parsed records (`QuestionRecord`, `ExamRecord`) come straight out of the
//! exam file parser. The identity-carrying graph (`Exam`, `Question`,
//! `QuestionOption`) is what a store hands back after persisting them, and is
//! what the evaluation engine consumes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, ModelConfigError};
use crate::parser;

/// One parsed multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Statement text, possibly spanning several lines.
    pub statement: String,
    /// Raw option lines such as `"a) Paris"`, in file order.
    pub options: Vec<String>,
    /// Lowercase label of the correct option.
    pub correct_option_letter: char,
}

impl QuestionRecord {
    /// Lowercase labels of every option, in file order.
    pub fn option_letters(&self) -> Vec<char> {
        self.options
            .iter()
            .filter_map(|o| option_letter(o))
            .collect()
    }

    /// The raw option line whose label is the correct letter.
    pub fn correct_option(&self) -> Option<&str> {
        self.options
            .iter()
            .find(|o| option_letter(o) == Some(self.correct_option_letter))
            .map(String::as_str)
    }
}

/// Lowercase label of an option line (`"B) foo"` -> `'b'`).
pub fn option_letter(option: &str) -> Option<char> {
    let mut chars = option.trim_start().chars();
    let letter = chars.next()?;
    if letter.is_ascii_alphabetic() && chars.next() == Some(')') {
        Some(letter.to_ascii_lowercase())
    } else {
        None
    }
}

/// A parsed exam: a description plus its questions, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRecord {
    pub description: String,
    pub questions: Vec<QuestionRecord>,
}

impl ExamRecord {
    /// Parse exam file text and validate the exam as a whole.
    pub fn parse(description: &str, text: &str) -> Result<Self, FormatError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(FormatError::whole_file("Exam description is required"));
        }
        let questions = parser::parse(text)?;
        Ok(Self {
            description: description.to_string(),
            questions,
        })
    }
}

/// A stored answer option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    /// Full option line, label included (`"a) Paris"`).
    pub content: String,
}

/// A stored question with its options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub statement: String,
    pub options: Vec<QuestionOption>,
    /// Id of the correct option, one of `options`.
    pub correct_option_id: Option<i64>,
}

impl Question {
    pub fn correct_option(&self) -> Option<&QuestionOption> {
        let id = self.correct_option_id?;
        self.options.iter().find(|o| o.id == id)
    }

    /// Point the correct option at one of this question's options.
    ///
    /// Returns `false` and leaves the question untouched if `option_id` is not
    /// one of its options.
    pub fn set_correct_option(&mut self, option_id: i64) -> bool {
        if self.options.iter().any(|o| o.id == option_id) {
            self.correct_option_id = Some(option_id);
            true
        } else {
            false
        }
    }
}

/// A stored exam with its full question graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub description: String,
    /// Name of the owning course ("subject").
    #[serde(default)]
    pub course: String,
    pub questions: Vec<Question>,
}

impl fmt::Display for Exam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Which model to evaluate and how to reach it.
///
/// Note: custom Debug impl masks the API key to keep it out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Store identity, once persisted.
    #[serde(default)]
    pub id: Option<i64>,
    /// Model identifier (e.g. "llama3.2:1b", "gpt-4.1-mini").
    pub description: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Owning user; required for external models, forbidden for local ones.
    #[serde(default)]
    pub owner: Option<String>,
}

impl ModelSpec {
    pub fn local(description: impl Into<String>) -> Self {
        Self {
            id: None,
            description: description.into(),
            api_url: None,
            api_key: None,
            owner: None,
        }
    }

    pub fn external(
        description: impl Into<String>,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            description: description.into(),
            api_url: Some(api_url.into()),
            api_key: Some(api_key.into()),
            owner: Some(owner.into()),
        }
    }

    /// External iff both an API URL and an API key are present.
    pub fn is_external(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }

    /// Exactly one of API URL and API key is set.
    pub fn is_half_configured(&self) -> bool {
        self.api_url.is_some() != self.api_key.is_some()
    }

    /// Check the ownership invariant.
    pub fn check_ownership(&self) -> Result<(), ModelConfigError> {
        match (self.is_external(), self.owner.is_some()) {
            (true, false) => Err(ModelConfigError::new(
                "The owner is required for external models",
            )),
            (false, true) => Err(ModelConfigError::new(
                "The owner should only be set for external models",
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("owner", &self.owner)
            .finish()
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// An evaluation assembled in memory, committed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvaluation {
    /// Instruction part of the prompt used for every question.
    pub prompt: String,
    pub ev_date: DateTime<Utc>,
    /// 0-10 scale, two decimals.
    pub grade: f64,
    /// Total elapsed seconds, two decimals.
    pub time: f64,
    pub model: ModelSpec,
    pub exam_id: i64,
    pub question_evaluations: Vec<NewQuestionEvaluation>,
}

/// Links one question of an evaluation to the option recorded for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestionEvaluation {
    pub question_id: i64,
    pub option_id: i64,
}

/// A persisted evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: i64,
    pub prompt: String,
    pub ev_date: DateTime<Utc>,
    pub grade: f64,
    pub time: f64,
    pub model_id: i64,
    pub exam_id: i64,
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Grade on the 0-10 scale: `round(correct / total * 10, 2)`, 0 for an empty exam.
pub fn grade(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(correct as f64 / total as f64 * 10.0)
}
