//! The `examgrade analysis` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use examgrade_store::{AnalysisScope, ModelAverage};

pub fn execute(
    course: Option<String>,
    exam: Option<i64>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (_, store) = super::open_store(config_path.as_deref())?;

    if let Some(exam_id) = exam {
        let exam = store.load_exam(exam_id)?;
        print_averages(
            &format!("{} / {}", exam.course, exam.description),
            &store.model_averages(AnalysisScope::Exam(exam_id))?,
        );
        return Ok(());
    }

    let courses: Vec<_> = store
        .list_courses()?
        .into_iter()
        .filter(|c| course.as_deref().map_or(true, |name| c.name == name))
        .collect();
    if let Some(name) = &course {
        anyhow::ensure!(!courses.is_empty(), "course not found: {name}");
    }

    for c in &courses {
        let title = match &c.owner {
            Some(owner) => format!("{} ({owner})", c.name),
            None => c.name.clone(),
        };
        print_averages(&title, &store.model_averages(AnalysisScope::Course(c.id))?);
    }

    if course.is_none() {
        print_averages("Overall", &store.model_averages(AnalysisScope::All)?);
    }

    Ok(())
}

/// Print a titled table of per-model averages.
pub(crate) fn print_averages(title: &str, averages: &[ModelAverage]) {
    println!("{title}");
    if averages.is_empty() {
        println!("No evaluations yet.\n");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Model", "Evaluations", "Avg grade", "Avg time"]);
    for avg in averages {
        table.add_row(vec![
            Cell::new(&avg.model),
            Cell::new(avg.evaluations),
            Cell::new(format!("{:.2}", avg.grade)),
            Cell::new(format!("{:.2}s", avg.time)),
        ]);
    }
    println!("{table}\n");
}
