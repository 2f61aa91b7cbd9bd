//! Core trait definitions for model backends and result stores.
//!
//! Model backends are implemented by the `examgrade-providers` crate, the
//! SQLite store by `examgrade-store`.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{GradeError, ModelConfigError};
use crate::model::{ModelSpec, NewEvaluation};

/// Lazy, finite sequence of filtered response lines.
pub type ResponseStream = BoxStream<'static, Result<String, GradeError>>;

// ---------------------------------------------------------------------------
// Model backend trait
// ---------------------------------------------------------------------------

/// A model that can answer prompts, held by the engine as an opaque handle.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// The model this handle was built for.
    fn spec(&self) -> &ModelSpec;

    /// Check the model is usable before any prompt is sent.
    async fn validate(&self) -> Result<(), ModelConfigError>;

    /// Send `prompt` and stream back the response lines, think block removed.
    ///
    /// Implementations call [`validate`](Self::validate) first and return its
    /// failure as [`GradeError::ModelConfig`].
    async fn generate_response(&self, prompt: &str) -> Result<ResponseStream, GradeError>;
}

// ---------------------------------------------------------------------------
// Result store trait
// ---------------------------------------------------------------------------

/// Persistence for finished evaluations.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Write the evaluation and every question evaluation as one atomic unit.
    ///
    /// Returns the new evaluation id. On error nothing is written.
    async fn commit_evaluation(&self, evaluation: NewEvaluation) -> Result<i64, GradeError>;
}
