//! Extraction of a numbered link choice from a free-form model response.
//!
//! The model is told to wrap its final choice in `<answer>N</answer>`. Anything
//! else is rejected with a correction that can be sent back verbatim.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<answer>\s*(\d+)\s*</answer>").unwrap());

/// Why a response did not yield a usable choice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("no answer tag found (expected 1..={max_choice})")]
    NoAnswerFound { max_choice: usize },
    #[error("{count} answer tags found")]
    MultipleAnswers { count: usize },
    #[error("answer {raw:?} is not an integer")]
    NotAnInteger { raw: String, max_choice: usize },
    #[error("answer {value} outside 1..={max_choice}")]
    OutOfRange { value: u64, max_choice: usize },
}

impl MoveError {
    /// Corrective message to append to the conversation as a user turn.
    pub fn correction(&self) -> String {
        match self {
            MoveError::NoAnswerFound { max_choice } => format!(
                "No answer found in response. Please respond with a number between 1 and \
                 {max_choice} in <answer>NUMBER</answer> tags."
            ),
            MoveError::MultipleAnswers { .. } => {
                "Multiple answers found in response. Please respond with just one.".to_string()
            }
            MoveError::NotAnInteger { raw, max_choice } => format!(
                "You answered with {raw} but it could not be converted to an integer. Please \
                 respond with a number between 1 and {max_choice}."
            ),
            MoveError::OutOfRange { value, max_choice } => format!(
                "You answered with {value} but you have to select a number between 1 and \
                 {max_choice}."
            ),
        }
    }
}

/// Extract a 1-based choice in `1..=max_choice` from `text`.
///
/// Exactly one answer tag must be present. The returned index is never clamped.
pub fn extract_choice(text: &str, max_choice: usize) -> Result<usize, MoveError> {
    let captures: Vec<&str> = ANSWER_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    let raw = match captures.as_slice() {
        [] => return Err(MoveError::NoAnswerFound { max_choice }),
        [single] => *single,
        many => {
            return Err(MoveError::MultipleAnswers { count: many.len() });
        }
    };

    let value: u64 = raw.parse().map_err(|_| MoveError::NotAnInteger {
        raw: raw.to_string(),
        max_choice,
    })?;

    if value < 1 || value > max_choice as u64 {
        return Err(MoveError::OutOfRange { value, max_choice });
    }
    Ok(value as usize)
}
