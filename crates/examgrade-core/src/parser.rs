//! Exam file parser.
//!
//! Turns the line-oriented exam text format into validated question records:
//!
//! ```text
//! What's the PATH?
//! a) A special file.
//! b) An environment variable.
//!
//! b
//! ```
//!
//! The answer line may also follow the last option directly, without the
//! blank separator.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::error::FormatError;
use crate::model::{option_letter, ExamRecord, QuestionRecord};

static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]\)").expect("option pattern is valid"));

const MIN_OPTIONS: usize = 2;

/// Parse exam text into its questions.
pub fn parse(text: &str) -> Result<Vec<QuestionRecord>, FormatError> {
    let mut parser = ExamParser::default();
    for (index, line) in text.lines().enumerate() {
        parser.feed(index + 1, line)?;
    }
    parser.finish()
}

/// Read and parse an exam file. The exam is named after the file unless
/// `name` is given.
pub fn parse_exam_file(path: &Path, name: Option<&str>) -> Result<ExamRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read exam file: {}", path.display()))?;

    let description = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    ExamRecord::parse(&description, &text)
        .with_context(|| format!("invalid exam file: {}", path.display()))
}

fn is_option_line(line: &str) -> bool {
    OPTION_LINE.is_match(line)
}

/// A question whose options are still being collected.
#[derive(Debug)]
struct PendingQuestion {
    statement: String,
    options: Vec<String>,
}

#[derive(Debug, Default)]
enum State {
    /// Collecting statement lines.
    #[default]
    Statement,
    /// Collecting option lines.
    Options(PendingQuestion),
    /// Options closed by a blank line; waiting for the answer letter.
    Correct(PendingQuestion),
}

#[derive(Debug, Default)]
struct ExamParser {
    state: State,
    statement: Vec<String>,
    questions: Vec<QuestionRecord>,
    has_content: bool,
}

impl ExamParser {
    fn feed(&mut self, line_no: usize, raw: &str) -> Result<(), FormatError> {
        let line = raw.trim();
        if !line.is_empty() {
            self.has_content = true;
        }

        self.state = match std::mem::take(&mut self.state) {
            State::Statement => {
                if is_option_line(line) {
                    if self.statement.is_empty() {
                        return Err(FormatError::at(line_no, "Question missing statement"));
                    }
                    let statement = self.statement.join("\n");
                    self.statement.clear();
                    State::Options(PendingQuestion {
                        statement,
                        options: vec![line.to_string()],
                    })
                } else {
                    if !line.is_empty() {
                        self.statement.push(line.to_string());
                    }
                    State::Statement
                }
            }
            State::Options(mut pending) => {
                if line.is_empty() {
                    check_option_count(line_no, &pending)?;
                    State::Correct(pending)
                } else if is_option_line(line) {
                    pending.options.push(line.to_string());
                    State::Options(pending)
                } else {
                    // Compact format: the answer follows the last option.
                    check_option_count(line_no, &pending)?;
                    self.accept_answer(line_no, line, pending)?;
                    State::Statement
                }
            }
            State::Correct(pending) => {
                if line.is_empty() {
                    State::Correct(pending)
                } else {
                    self.accept_answer(line_no, line, pending)?;
                    State::Statement
                }
            }
        };

        Ok(())
    }

    fn accept_answer(
        &mut self,
        line_no: usize,
        line: &str,
        pending: PendingQuestion,
    ) -> Result<(), FormatError> {
        let answer = line.trim().to_lowercase();
        let letters: Vec<char> = pending
            .options
            .iter()
            .filter_map(|o| option_letter(o))
            .collect();

        let mut chars = answer.chars();
        let letter = match (chars.next(), chars.next()) {
            (Some(c), None) if letters.contains(&c) => c,
            _ => {
                let valid = letters
                    .iter()
                    .map(char::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(FormatError::at(
                    line_no,
                    format!("Invalid correct option '{answer}'. Valid options: [{valid}]"),
                ));
            }
        };

        self.questions.push(QuestionRecord {
            statement: pending.statement,
            options: pending.options,
            correct_option_letter: letter,
        });
        Ok(())
    }

    fn finish(self) -> Result<Vec<QuestionRecord>, FormatError> {
        if !self.has_content {
            return Err(FormatError::whole_file("File is completely empty"));
        }

        // Leftover statement text is dropped; only an open question fails.
        if !matches!(self.state, State::Statement) {
            return Err(FormatError::whole_file(
                "Invalid format: incomplete final question",
            ));
        }

        if self.questions.is_empty() {
            return Err(FormatError::whole_file("File contains no valid questions"));
        }

        Ok(self.questions)
    }
}

fn check_option_count(line_no: usize, pending: &PendingQuestion) -> Result<(), FormatError> {
    if pending.options.len() < MIN_OPTIONS {
        let preview: String = pending.statement.chars().take(30).collect();
        return Err(FormatError::at(
            line_no,
            format!("Minimum {MIN_OPTIONS} options required. Question: '{preview}...'"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_EXAM: &str = "
What's the PATH?
a) A special file.
b) A file that contains the path to a directory.
c) A file that contains the path to a file.
d) An environment variable.

d
";

    const TWO_QUESTIONS: &str = "
Which is not a file system?
Pick one.
a) ext4
b) NTFS

c) FAT32 is missing on purpose
b

What does ls do?
a) Lists files
B) Deletes files

A
";

    #[test]
    fn parse_single_question() {
        let questions = parse(VALID_EXAM).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].statement, "What's the PATH?");
        assert_eq!(questions[0].options.len(), 4);
        assert_eq!(questions[0].options[3], "d) An environment variable.");
        assert_eq!(questions[0].correct_option_letter, 'd');
    }

    #[test]
    fn blank_lines_inside_statement_are_dropped() {
        let text = "First line\n\nSecond line\na) yes\nb) no\n\na\n";
        let questions = parse(text).unwrap();
        assert_eq!(questions[0].statement, "First line\nSecond line");
    }

    #[test]
    fn answer_letter_is_case_insensitive() {
        let text = "Q?\na) one\nB) two\n\nb\n\nR?\na) x\nb) y\n\nA\n";
        let questions = parse(text).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].correct_option_letter, 'b');
        assert_eq!(questions[1].correct_option_letter, 'a');
    }

    #[test]
    fn compact_answer_without_blank_line() {
        let text = "Capital of France?\na) Rome\nb) Paris\nb\nCapital of Italy?\na) Rome\nb) Paris\na\n";
        let questions = parse(text).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].correct_option_letter, 'b');
        assert_eq!(questions[1].correct_option_letter, 'a');
    }

    #[test]
    fn stray_text_after_options_is_read_as_the_answer() {
        let err = parse(TWO_QUESTIONS).unwrap_err();
        assert_eq!(err.line, Some(7));
        assert!(err.message.contains("Invalid correct option"));
    }

    #[test]
    fn empty_file_fails() {
        let err = parse("").unwrap_err();
        assert_eq!(err.message, "File is completely empty");
        assert!(parse("\n   \n\t\n").is_err());
    }

    #[test]
    fn statement_without_options_fails() {
        let err = parse("\nWhat's the PATH?\n").unwrap_err();
        assert_eq!(err.message, "File contains no valid questions");
        assert_eq!(err.line, None);
    }

    #[test]
    fn trailing_note_after_last_question_is_ignored() {
        let text = "Q?\na) x\nb) y\n\na\n\nTrailing note without options\n";
        let records = parse(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].statement, "Q?");
        assert_eq!(records[0].correct_option_letter, 'a');
    }

    #[test]
    fn missing_answer_fails() {
        let text = "What's the PATH?\na) A special file.\nb) An environment variable.\n";
        let err = parse(text).unwrap_err();
        assert!(err.message.contains("incomplete final question"));

        let text = "What's the PATH?\na) A special file.\nb) An environment variable.\n\n\n";
        assert!(parse(text).is_err());
    }

    #[test]
    fn options_without_statement_fail() {
        let err = parse("a) one\nb) two\n\na\n").unwrap_err();
        assert_eq!(err.line, Some(1));
        assert!(err.message.contains("missing statement"));
    }

    #[test]
    fn single_option_fails() {
        let err = parse("Only one?\na) lonely\n\na\n").unwrap_err();
        assert_eq!(err.line, Some(3));
        assert!(err.message.contains("Minimum 2 options"));

        let err = parse("Only one?\na) lonely\na\n").unwrap_err();
        assert!(err.message.contains("Minimum 2 options"));
    }

    #[test]
    fn answer_not_among_options_fails() {
        let err = parse("Q?\na) one\nb) two\n\nc\n").unwrap_err();
        assert_eq!(err.line, Some(5));
        assert!(err.message.contains("'c'"));
        assert!(err.message.contains("[a, b]"));
    }

    #[test]
    fn answer_with_parenthesis_fails() {
        let text = "Which is not a file system?\na) ext4\nb) NTFS\nc) FAT32\nd) None of the above\nd)\n";
        let err = parse(text).unwrap_err();
        assert!(err.message.contains("incomplete final question"));
    }

    #[test]
    fn every_record_has_its_answer_among_labels() {
        let text = "Q1?\na) x\nb) y\nc) z\n\nc\n\nQ2?\nA) p\nB) q\nb\n";
        for record in parse(text).unwrap() {
            assert!(record.options.len() >= 2);
            assert!(record.option_letters().contains(&record.correct_option_letter));
        }
    }

    #[test]
    fn crlf_input() {
        let text = "Q?\r\na) one\r\nb) two\r\n\r\nb\r\n";
        let questions = parse(text).unwrap();
        assert_eq!(questions[0].options, vec!["a) one", "b) two"]);
    }

    #[test]
    fn parse_exam_file_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unix-basics.txt");
        std::fs::write(&path, VALID_EXAM).unwrap();

        let exam = parse_exam_file(&path, None).unwrap();
        assert_eq!(exam.description, "unix-basics.txt");
        assert_eq!(exam.questions.len(), 1);

        let named = parse_exam_file(&path, Some("Unix 101")).unwrap();
        assert_eq!(named.description, "Unix 101");
    }

    #[test]
    fn parse_exam_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        std::fs::write(&path, "Q?\na) one\n").unwrap();

        let err = parse_exam_file(&path, None).unwrap_err();
        assert!(format!("{err:#}").contains("broken.txt"));
    }
}
