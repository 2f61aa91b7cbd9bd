//! examgrade-store — SQLite persistence.
//!
//! Stores courses, exams with their question graph, models, and committed
//! evaluations. [`SqliteStore`] also implements the core `EvaluationStore`
//! trait so the evaluation engine can commit into it directly.

pub mod sqlite;

pub use sqlite::{
    AnalysisScope, CourseSummary, EvaluationRecord, ExamSummary, ModelAverage, SqliteStore,
};
