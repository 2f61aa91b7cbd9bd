//! The `examgrade run` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::StreamExt;

use examgrade_core::engine::EvaluationEngine;
use examgrade_core::events::ProgressEvent;
use examgrade_core::traits::ResponseGenerator;

pub async fn execute(
    exam_id: i64,
    model: Option<String>,
    instruction: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (config, store) = super::open_store(config_path.as_deref())?;

    let exam = store.load_exam(exam_id)?;
    anyhow::ensure!(
        !exam.questions.is_empty(),
        "Exam {} has no questions.",
        exam.description
    );

    let description = model.unwrap_or_else(|| config.default_model.clone());
    let spec = store.ensure_model(&config.model_spec(&description))?;
    let client = config.client(spec);
    client
        .validate()
        .await
        .map_err(|e| anyhow!("Model {description}: {e}"))?;

    eprintln!(
        "examgrade v{}: {} ({} questions) with {}",
        env!("CARGO_PKG_VERSION"),
        exam.description,
        exam.questions.len(),
        description
    );

    let engine = EvaluationEngine::new(Arc::new(store.clone()));
    let mut events = engine.stream_evaluation(&exam, &instruction, &client);
    let mut stdout = std::io::stdout().lock();
    let mut last = None;

    while let Some(event) = events.next().await {
        super::write_frame(&mut stdout, &event)?;
        last = Some(event);
    }

    match last {
        Some(ProgressEvent::Error(failure)) => Err(anyhow!(
            "evaluation stopped after {}/{} questions: {}",
            failure.processed_questions,
            failure.total_questions,
            failure.error
        )),
        Some(event) => {
            if let Some(summary) = event.summary() {
                eprintln!(
                    "\nComplete: {}/{} correct, grade {:.2} ({:.1}s)",
                    summary.correct_count,
                    summary.total_questions,
                    examgrade_core::model::grade(summary.correct_count, summary.total_questions),
                    summary.total_time
                );
            }
            Ok(())
        }
        None => Err(anyhow!("evaluation produced no events")),
    }
}
