// Full structural validation of an answer schema against a poll.
//
// The answer session pre-filters user input per question kind, but this is
// the check that gates every submission.

use std::collections::HashSet;

use thiserror::Error;

use crate::answer::{AnswerSchema, Value};
use crate::poll::Poll;
use crate::question::{Question, QuestionId, QuestionKind};

/// A schema value that breaks a rule of the question it targets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("question {question_id}: {violation}")]
pub struct ValidationError {
    pub question_id: QuestionId,
    pub violation: Violation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("question is not included in the poll")]
    UnknownQuestion,

    #[error("question and value have different types ({found} != {expected})")]
    KindMismatch {
        expected: QuestionKind,
        found: QuestionKind,
    },

    #[error("all values must be linked to different questions")]
    DuplicateTarget,

    #[error("{min} <= len(selected) <= {max} does not hold (got {found})")]
    SelectedCount { min: usize, max: usize, found: usize },

    #[error("option index {index} out of range 0..{options}")]
    OptionOutOfRange { index: usize, options: usize },

    #[error("len(sliders) == {expected} does not hold (got {found})")]
    SliderCount { expected: usize, found: usize },

    #[error("{min} <= slider <= {max} does not hold (got {value})")]
    SliderOutOfRange { value: i64, min: i64, max: i64 },

    #[error("{min} <= len(ranks) <= {max} does not hold (got {found})")]
    RankCount { min: usize, max: usize, found: usize },

    #[error("option {index} is ranked more than once")]
    DuplicateRank { index: usize },

    #[error("len(text) >= {min} does not hold (got {found})")]
    TextTooShort { min: usize, found: usize },

    #[error("len(text) <= {max} does not hold (got {found})")]
    TextTooLong { max: usize, found: usize },
}

/// Validate every value of `schema` against the questions of `poll`.
///
/// Stops at the first violation.
pub fn validate(schema: &AnswerSchema, poll: &Poll) -> Result<(), ValidationError> {
    let index = poll.poll.index();
    let mut targets = HashSet::new();

    for value in schema.values() {
        let question_id = value.question_id();
        let fail = |violation| ValidationError {
            question_id,
            violation,
        };

        if !targets.insert(question_id) {
            return Err(fail(Violation::DuplicateTarget));
        }
        let question = index
            .get(&question_id)
            .ok_or_else(|| fail(Violation::UnknownQuestion))?;

        check_value(value, question).map_err(fail)?;
    }

    Ok(())
}

/// Check one value against the structural bounds of its target question.
pub fn check_value(value: &Value, question: &Question) -> Result<(), Violation> {
    match (value, question) {
        (Value::Selector { selected, .. }, Question::Selector(q)) => {
            let max = q.max_checked();
            if !(q.min_checked..=max).contains(&selected.len()) {
                return Err(Violation::SelectedCount {
                    min: q.min_checked,
                    max,
                    found: selected.len(),
                });
            }
            check_indices(selected.iter().copied(), q.options.len())
        }
        (Value::Slider { sliders, .. }, Question::Slider(q)) => {
            if sliders.len() != q.options.len() {
                return Err(Violation::SliderCount {
                    expected: q.options.len(),
                    found: sliders.len(),
                });
            }
            match sliders.iter().find(|v| !q.in_range(**v)) {
                Some(&value) => Err(Violation::SliderOutOfRange {
                    value,
                    min: q.min_value,
                    max: q.max_value,
                }),
                None => Ok(()),
            }
        }
        (Value::TopList { ranks, .. }, Question::TopList(q)) => {
            let max = q.max_ranks();
            if !(q.min_ranks..=max).contains(&ranks.len()) {
                return Err(Violation::RankCount {
                    min: q.min_ranks,
                    max,
                    found: ranks.len(),
                });
            }
            let mut seen = HashSet::new();
            if let Some(&index) = ranks.iter().find(|r| !seen.insert(**r)) {
                return Err(Violation::DuplicateRank { index });
            }
            check_indices(ranks.iter().copied(), q.options.len())
        }
        (Value::Text { text, .. }, Question::Text(q)) => {
            let found = text.chars().count();
            if let Some(min) = q.min_length.filter(|min| found < *min) {
                return Err(Violation::TextTooShort { min, found });
            }
            if let Some(max) = q.max_length.filter(|max| found > *max) {
                return Err(Violation::TextTooLong { max, found });
            }
            Ok(())
        }
        _ => Err(Violation::KindMismatch {
            expected: question.kind(),
            found: value.kind(),
        }),
    }
}

fn check_indices(
    mut indices: impl Iterator<Item = usize>,
    options: usize,
) -> Result<(), Violation> {
    match indices.find(|i| *i >= options) {
        Some(index) => Err(Violation::OptionOutOfRange { index, options }),
        None => Ok(()),
    }
}
