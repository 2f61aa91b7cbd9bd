//! The `examgrade history` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

pub fn execute(exam_id: i64, config_path: Option<PathBuf>) -> Result<()> {
    let (_, store) = super::open_store(config_path.as_deref())?;
    let exam = store.load_exam(exam_id)?;
    let records = store.evaluations_for_exam(exam_id)?;

    println!(
        "{} / {} ({} questions)",
        exam.course,
        exam.description,
        exam.questions.len()
    );

    if records.is_empty() {
        println!("No evaluations yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Id", "Date", "Model", "Grade", "Time"]);

    for record in &records {
        let evaluation = &record.evaluation;
        table.add_row(vec![
            Cell::new(evaluation.id),
            Cell::new(evaluation.ev_date.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&record.model),
            Cell::new(format!("{:.2}", evaluation.grade)),
            Cell::new(format!("{:.2}s", evaluation.time)),
        ]);
    }

    println!("{table}\n");

    super::analysis::print_averages(
        "Averages by model",
        &store.model_averages(examgrade_store::AnalysisScope::Exam(exam_id))?,
    );
    Ok(())
}
