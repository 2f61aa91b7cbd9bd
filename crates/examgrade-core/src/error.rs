//! Error types shared by the parser, the model adapters and the engine.
//!
//! Defined in `examgrade-core` so providers and stores can report failures
//! in the categories the engine and batch orchestrator act on.

use std::fmt;

use thiserror::Error;

/// A malformed exam file.
///
/// Carries the 1-based line number when the failure can be pinned to one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    pub line: Option<usize>,
    pub message: String,
}

impl FormatError {
    pub fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn whole_file(message: impl Into<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for FormatError {}

/// A model that cannot be used: missing fields, bad URL or a failed probe.
///
/// Every problem found is kept so the caller sees them all at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfigError {
    pub problems: Vec<String>,
}

impl ModelConfigError {
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }
}

impl fmt::Display for ModelConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, problem) in self.problems.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "Model error: {problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ModelConfigError {}

/// Umbrella error for grading operations.
#[derive(Debug, Error)]
pub enum GradeError {
    /// The exam file could not be parsed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The model failed validation.
    #[error(transparent)]
    ModelConfig(#[from] ModelConfigError),

    /// The backend failed while producing a response.
    #[error("model call failed: {0}")]
    ModelCall(String),

    /// Writing results failed.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The exam graph handed to the engine is not usable.
    #[error("invalid exam: {0}")]
    InvalidExam(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_display_with_line() {
        let err = FormatError::at(7, "Question missing statement");
        assert_eq!(err.to_string(), "Line 7: Question missing statement");
        assert_eq!(
            FormatError::whole_file("File is completely empty").to_string(),
            "File is completely empty"
        );
    }

    #[test]
    fn model_config_error_lists_every_problem() {
        let err = ModelConfigError {
            problems: vec![
                "API URL is required for external models".into(),
                "API key is required for external models".into(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Model error: API URL is required for external models\n\
             Model error: API key is required for external models"
        );
    }
}
