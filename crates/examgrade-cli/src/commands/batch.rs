//! The `examgrade batch` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use futures::StreamExt;

use examgrade_core::batch::run_batch;
use examgrade_core::engine::EvaluationEngine;
use examgrade_core::events::{BatchEvent, EvalResult};
use examgrade_core::model::Exam;
use examgrade_core::traits::ResponseGenerator;

pub async fn execute(
    exams_str: String,
    models_str: Option<String>,
    repetitions: usize,
    instruction: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(repetitions >= 1, "repetitions must be at least 1");

    let exam_ids = super::split_list(&exams_str)
        .iter()
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| anyhow::anyhow!("invalid exam id: '{s}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    anyhow::ensure!(!exam_ids.is_empty(), "at least one exam id is required");

    let (config, store) = super::open_store(config_path.as_deref())?;

    let exams: Vec<Exam> = exam_ids
        .iter()
        .map(|&id| store.load_exam(id))
        .collect::<Result<_>>()?;

    let descriptions = match &models_str {
        Some(m) => super::split_list(m),
        None => vec![config.default_model.clone()],
    };
    anyhow::ensure!(!descriptions.is_empty(), "at least one model is required");

    let mut models: Vec<Arc<dyn ResponseGenerator>> = Vec::with_capacity(descriptions.len());
    for description in &descriptions {
        let spec = store
            .ensure_model(&config.model_spec(description))
            .with_context(|| format!("failed to register model {description}"))?;
        models.push(Arc::new(config.client(spec)));
    }

    eprintln!(
        "examgrade v{}: {} exams x {} models x {} repetitions",
        env!("CARGO_PKG_VERSION"),
        exams.len(),
        models.len(),
        repetitions
    );

    let engine = EvaluationEngine::new(Arc::new(store.clone()));
    let mut events = run_batch(&engine, &exams, &models, repetitions, &instruction);
    let mut stdout = std::io::stdout().lock();

    let mut current = String::new();
    let mut results: Vec<(String, EvalResult)> = Vec::new();
    let mut errors = 0usize;

    while let Some(event) = events.next().await {
        super::write_frame(&mut stdout, &event)?;
        match event {
            BatchEvent::Progress { progress } => current = progress,
            BatchEvent::EvalResult { eval_result } => {
                results.push((current.clone(), eval_result));
            }
            BatchEvent::Error { error } => {
                tracing::debug!(%error, "combination rejected");
                errors += 1;
            }
            BatchEvent::Evaluation(e) if e.is_error() => errors += 1,
            _ => {}
        }
    }

    print_summary(&results);
    if errors > 0 {
        eprintln!("{errors} errors, see the event stream for details");
    }

    Ok(())
}

fn print_summary(results: &[(String, EvalResult)]) {
    let mut table = Table::new();
    table.set_header(vec!["Evaluation", "Grade", "Time"]);

    for (label, result) in results {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(&result.grade),
            Cell::new(format!("{:.2}s", result.time)),
        ]);
    }

    eprintln!("\n{table}");
}
