//! The `examgrade import` command.

use std::path::PathBuf;

use anyhow::Result;

use examgrade_core::parser::parse_exam_file;

pub fn execute(
    file: PathBuf,
    course: String,
    name: Option<String>,
    owner: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(!course.trim().is_empty(), "course name is required");

    let record = parse_exam_file(&file, name.as_deref())?;
    let (config, store) = super::open_store(config_path.as_deref())?;

    let exam = store.import_exam(
        course.trim(),
        &record.description,
        owner.as_deref(),
        &record.questions,
    )?;

    println!(
        "Imported exam {} \"{}\" ({} questions) into {}",
        exam.id,
        exam.description,
        exam.questions.len(),
        config.database.display()
    );
    println!("\nNext: examgrade run --exam {}", exam.id);
    Ok(())
}
