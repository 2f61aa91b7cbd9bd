//! examgrade-core — exam parsing, prompt building, and the evaluation engine.
//!
//! This crate defines the data model, the backend and store traits, and the
//! streaming evaluation and batch logic the rest of examgrade builds on.

pub mod batch;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod store;
pub mod think;
pub mod traits;

#[cfg(test)]
mod testing;

pub use batch::run_batch;
pub use engine::EvaluationEngine;
pub use error::{FormatError, GradeError, ModelConfigError};
