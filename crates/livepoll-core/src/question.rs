// Question model: the four question kinds and their structural invariants.
//
// Every question goes through a checked constructor, and deserialization is
// routed through the same constructor via `RawQuestion`, so a `Question`
// value in memory always satisfies its kind's bounds.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionError {
    #[error("label must not be empty")]
    EmptyLabel,

    #[error("description must not be empty when present")]
    EmptyDescription,

    #[error("len(options) >= 2, got {0}")]
    TooFewOptions(usize),

    #[error("{min} <= {max} <= len(options) = {options} does not hold")]
    CountBounds { min: usize, max: usize, options: usize },

    #[error("min_value < max_value does not hold ({min} >= {max})")]
    ValueRange { min: i64, max: i64 },

    #[error("min_length < max_length does not hold ({min} >= {max})")]
    LengthRange { min: usize, max: usize },

    #[error("field `{field}` is required for {kind} questions")]
    MissingField { field: &'static str, kind: QuestionKind },
}

// ---------------------------------------------------------------------------
// Identifiers and discriminants
// ---------------------------------------------------------------------------

/// Globally unique question identifier, generated once at authoring time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub Uuid);

impl QuestionId {
    pub fn new_v4() -> Self {
        QuestionId(Uuid::new_v4())
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Question kind tag. Encoded on the wire as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QuestionKind {
    Selector,
    Slider,
    TopList,
    Text,
}

impl From<QuestionKind> for u8 {
    fn from(kind: QuestionKind) -> u8 {
        match kind {
            QuestionKind::Selector => 1,
            QuestionKind::Slider => 2,
            QuestionKind::TopList => 3,
            QuestionKind::Text => 4,
        }
    }
}

impl TryFrom<u8> for QuestionKind {
    type Error = String;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(QuestionKind::Selector),
            2 => Ok(QuestionKind::Slider),
            3 => Ok(QuestionKind::TopList),
            4 => Ok(QuestionKind::Text),
            other => Err(format!("unknown question type {other}")),
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuestionKind::Selector => "selector",
            QuestionKind::Slider => "slider",
            QuestionKind::TopList => "top_list",
            QuestionKind::Text => "text",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Question variants
// ---------------------------------------------------------------------------

/// Attributes shared by every question kind.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionBase {
    pub id: QuestionId,
    pub label: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub hide_results: bool,
}

impl QuestionBase {
    /// A base with a fresh id and only a label set.
    pub fn new(label: impl Into<String>) -> Self {
        QuestionBase {
            id: QuestionId::new_v4(),
            label: label.into(),
            description: None,
            image: None,
            hide_results: false,
        }
    }

    pub fn with_id(mut self, id: QuestionId) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn check(&self) -> Result<(), QuestionError> {
        if self.label.is_empty() {
            return Err(QuestionError::EmptyLabel);
        }
        if self.description.as_deref().is_some_and(str::is_empty) {
            return Err(QuestionError::EmptyDescription);
        }
        Ok(())
    }
}

/// One labeled choice of an option-based question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl QuestionOption {
    pub fn new(label: impl Into<String>) -> Self {
        QuestionOption {
            label: label.into(),
            image: None,
        }
    }
}

fn check_options(options: &[QuestionOption]) -> Result<(), QuestionError> {
    if options.len() < 2 {
        return Err(QuestionError::TooFewOptions(options.len()));
    }
    Ok(())
}

fn check_count_bounds(
    min: usize,
    max: Option<usize>,
    options: usize,
) -> Result<(), QuestionError> {
    let effective = max.unwrap_or(options);
    if min > effective || effective > options {
        return Err(QuestionError::CountBounds {
            min,
            max: effective,
            options,
        });
    }
    Ok(())
}

/// Pick a subset of the options.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorQuestion {
    pub base: QuestionBase,
    pub options: Vec<QuestionOption>,
    pub min_checked: usize,
    pub max_checked: Option<usize>,
}

impl SelectorQuestion {
    pub fn new(
        base: QuestionBase,
        options: Vec<QuestionOption>,
        min_checked: usize,
        max_checked: Option<usize>,
    ) -> Result<Self, QuestionError> {
        base.check()?;
        check_options(&options)?;
        check_count_bounds(min_checked, max_checked, options.len())?;
        Ok(SelectorQuestion {
            base,
            options,
            min_checked,
            max_checked,
        })
    }

    /// Upper selection bound, defaulting to the number of options.
    pub fn max_checked(&self) -> usize {
        self.max_checked.unwrap_or(self.options.len())
    }
}

/// Assign one integer in `[min_value, max_value]` to every option.
#[derive(Debug, Clone, PartialEq)]
pub struct SliderQuestion {
    pub base: QuestionBase,
    pub options: Vec<QuestionOption>,
    pub min_value: i64,
    pub max_value: i64,
}

impl SliderQuestion {
    pub fn new(
        base: QuestionBase,
        options: Vec<QuestionOption>,
        min_value: i64,
        max_value: i64,
    ) -> Result<Self, QuestionError> {
        base.check()?;
        check_options(&options)?;
        if min_value >= max_value {
            return Err(QuestionError::ValueRange {
                min: min_value,
                max: max_value,
            });
        }
        Ok(SliderQuestion {
            base,
            options,
            min_value,
            max_value,
        })
    }

    pub fn in_range(&self, value: i64) -> bool {
        (self.min_value..=self.max_value).contains(&value)
    }
}

/// Rank a subset of the options, front = highest rank.
#[derive(Debug, Clone, PartialEq)]
pub struct TopListQuestion {
    pub base: QuestionBase,
    pub options: Vec<QuestionOption>,
    pub min_ranks: usize,
    pub max_ranks: Option<usize>,
}

impl TopListQuestion {
    pub fn new(
        base: QuestionBase,
        options: Vec<QuestionOption>,
        min_ranks: usize,
        max_ranks: Option<usize>,
    ) -> Result<Self, QuestionError> {
        base.check()?;
        check_options(&options)?;
        check_count_bounds(min_ranks, max_ranks, options.len())?;
        Ok(TopListQuestion {
            base,
            options,
            min_ranks,
            max_ranks,
        })
    }

    pub fn max_ranks(&self) -> usize {
        self.max_ranks.unwrap_or(self.options.len())
    }
}

/// Free-text answer with optional length bounds (in characters).
#[derive(Debug, Clone, PartialEq)]
pub struct TextQuestion {
    pub base: QuestionBase,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl TextQuestion {
    pub fn new(
        base: QuestionBase,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Result<Self, QuestionError> {
        base.check()?;
        if let (Some(min), Some(max)) = (min_length, max_length) {
            if min >= max {
                return Err(QuestionError::LengthRange { min, max });
            }
        }
        Ok(TextQuestion {
            base,
            min_length,
            max_length,
        })
    }
}

/// A poll question of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuestion", into = "RawQuestion")]
pub enum Question {
    Selector(SelectorQuestion),
    Slider(SliderQuestion),
    TopList(TopListQuestion),
    Text(TextQuestion),
}

impl Question {
    pub fn base(&self) -> &QuestionBase {
        match self {
            Question::Selector(q) => &q.base,
            Question::Slider(q) => &q.base,
            Question::TopList(q) => &q.base,
            Question::Text(q) => &q.base,
        }
    }

    pub fn id(&self) -> QuestionId {
        self.base().id
    }

    pub fn label(&self) -> &str {
        &self.base().label
    }

    pub fn kind(&self) -> QuestionKind {
        match self {
            Question::Selector(_) => QuestionKind::Selector,
            Question::Slider(_) => QuestionKind::Slider,
            Question::TopList(_) => QuestionKind::TopList,
            Question::Text(_) => QuestionKind::Text,
        }
    }

    /// Options of option-based questions; empty for text questions.
    pub fn options(&self) -> &[QuestionOption] {
        match self {
            Question::Selector(q) => &q.options,
            Question::Slider(q) => &q.options,
            Question::TopList(q) => &q.options,
            Question::Text(_) => &[],
        }
    }
}

impl From<SelectorQuestion> for Question {
    fn from(q: SelectorQuestion) -> Self {
        Question::Selector(q)
    }
}

impl From<SliderQuestion> for Question {
    fn from(q: SliderQuestion) -> Self {
        Question::Slider(q)
    }
}

impl From<TopListQuestion> for Question {
    fn from(q: TopListQuestion) -> Self {
        Question::TopList(q)
    }
}

impl From<TextQuestion> for Question {
    fn from(q: TextQuestion) -> Self {
        Question::Text(q)
    }
}

// ---------------------------------------------------------------------------
// Wire representation
// ---------------------------------------------------------------------------

/// Flat wire shape shared by all kinds; `question_type` selects which of the
/// optional fields apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawQuestion {
    #[serde(default = "QuestionId::new_v4")]
    question_id: QuestionId,
    question_type: QuestionKind,
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    hide_results: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<QuestionOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_checked: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_checked: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_ranks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_ranks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_length: Option<usize>,
}

impl TryFrom<RawQuestion> for Question {
    type Error = QuestionError;

    fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
        let kind = raw.question_type;
        let base = QuestionBase {
            id: raw.question_id,
            label: raw.label,
            description: raw.description,
            image: raw.image,
            hide_results: raw.hide_results,
        };
        let options = || {
            raw.options.clone().ok_or(QuestionError::MissingField {
                field: "options",
                kind,
            })
        };

        let question = match kind {
            QuestionKind::Selector => SelectorQuestion::new(
                base,
                options()?,
                raw.min_checked.unwrap_or(1),
                raw.max_checked,
            )?
            .into(),
            QuestionKind::Slider => SliderQuestion::new(
                base,
                options()?,
                raw.min_value.unwrap_or(1),
                raw.max_value.unwrap_or(5),
            )?
            .into(),
            QuestionKind::TopList => TopListQuestion::new(
                base,
                options()?,
                raw.min_ranks.unwrap_or(1),
                raw.max_ranks,
            )?
            .into(),
            QuestionKind::Text => TextQuestion::new(base, raw.min_length, raw.max_length)?.into(),
        };
        Ok(question)
    }
}

impl From<Question> for RawQuestion {
    fn from(question: Question) -> Self {
        let kind = question.kind();
        let (base, options) = match &question {
            Question::Selector(q) => (q.base.clone(), Some(q.options.clone())),
            Question::Slider(q) => (q.base.clone(), Some(q.options.clone())),
            Question::TopList(q) => (q.base.clone(), Some(q.options.clone())),
            Question::Text(q) => (q.base.clone(), None),
        };
        let mut raw = RawQuestion {
            question_id: base.id,
            question_type: kind,
            label: base.label,
            description: base.description,
            image: base.image,
            hide_results: base.hide_results,
            options,
            min_checked: None,
            max_checked: None,
            min_value: None,
            max_value: None,
            min_ranks: None,
            max_ranks: None,
            min_length: None,
            max_length: None,
        };
        match question {
            Question::Selector(q) => {
                raw.min_checked = Some(q.min_checked);
                raw.max_checked = q.max_checked;
            }
            Question::Slider(q) => {
                raw.min_value = Some(q.min_value);
                raw.max_value = Some(q.max_value);
            }
            Question::TopList(q) => {
                raw.min_ranks = Some(q.min_ranks);
                raw.max_ranks = q.max_ranks;
            }
            Question::Text(q) => {
                raw.min_length = q.min_length;
                raw.max_length = q.max_length;
            }
        }
        raw
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
