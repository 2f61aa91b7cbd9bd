//! Prompt construction for a single question.

use serde::{Deserialize, Serialize};

use crate::model::Question;

/// Directive appended to every caller instruction.
pub const ANSWER_DIRECTIVE: &str = "\n\nI will give you a multiple-choice question and you must reply with the correct option. \
Only tell me the option, for example 'a', absolutely nothing else.\n";

/// The text sent to a model, together with its two components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// `instruction_part + question_part`.
    pub full_prompt: String,
    /// Caller instruction followed by [`ANSWER_DIRECTIVE`].
    pub instruction_part: String,
    /// Statement, then one option per line sorted by content.
    pub question_part: String,
}

/// Instruction part for a caller-supplied instruction.
pub fn instruction_part(user_instruction: &str) -> String {
    let mut part = String::with_capacity(user_instruction.len() + ANSWER_DIRECTIVE.len());
    part.push_str(user_instruction);
    part.push_str(ANSWER_DIRECTIVE);
    part
}

/// Build the prompt for `question`.
///
/// Options are emitted sorted by their content, so the prompt does not depend
/// on the order the options were stored in.
pub fn build_prompt(question: &Question, user_instruction: &str) -> Prompt {
    let instruction_part = instruction_part(user_instruction);

    let mut options: Vec<&str> = question.options.iter().map(|o| o.content.as_str()).collect();
    options.sort_unstable();

    let mut question_part = String::new();
    question_part.push_str(&question.statement);
    question_part.push('\n');
    for option in options {
        question_part.push_str(option);
        question_part.push('\n');
    }

    Prompt {
        full_prompt: format!("{instruction_part}{question_part}"),
        instruction_part,
        question_part,
    }
}
