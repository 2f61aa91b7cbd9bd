//! The `examgrade check` command.

use std::path::PathBuf;

use anyhow::Result;

use examgrade_core::parser::parse_exam_file;

pub fn execute(file: PathBuf) -> Result<()> {
    let exam = parse_exam_file(&file, None)?;
    let options: usize = exam.questions.iter().map(|q| q.options.len()).sum();
    println!(
        "  {}: {} questions, {} options",
        exam.description,
        exam.questions.len(),
        options
    );
    println!("\nExam file valid.");
    Ok(())
}
