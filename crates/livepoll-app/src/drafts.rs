// In-progress answers, one record per question kind.
//
// A draft owns a copy of the question it answers plus the participant's
// partial input. Drafts enforce the per-kind bounds as input arrives so the
// session only offers "Send" for values that should pass validation.

use std::collections::BTreeSet;

use livepoll_core::{SelectorQuestion, SliderQuestion, TextQuestion, TopListQuestion, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorDraft {
    question: SelectorQuestion,
    selected: BTreeSet<usize>,
}

impl SelectorDraft {
    pub fn new(question: SelectorQuestion) -> Self {
        SelectorDraft {
            question,
            selected: BTreeSet::new(),
        }
    }

    pub fn question(&self) -> &SelectorQuestion {
        &self.question
    }

    pub fn selected(&self) -> &BTreeSet<usize> {
        &self.selected
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    fn at_capacity(&self) -> bool {
        self.selected.len() >= self.question.max_checked()
    }

    /// Options that can still be toggled. At capacity only checked options
    /// remain, so the participant can uncheck but not check more.
    pub fn visible_options(&self) -> Vec<usize> {
        (0..self.question.options.len())
            .filter(|i| !self.at_capacity() || self.is_selected(*i))
            .collect()
    }

    /// Check or uncheck an option. Returns `false` when the toggle is not
    /// allowed (unknown index, or checking past the upper bound).
    pub fn toggle(&mut self, index: usize) -> bool {
        if index >= self.question.options.len() {
            return false;
        }
        if self.selected.remove(&index) {
            return true;
        }
        if self.at_capacity() {
            return false;
        }
        self.selected.insert(index)
    }

    pub fn can_submit(&self) -> bool {
        (self.question.min_checked..=self.question.max_checked()).contains(&self.selected.len())
    }

    pub fn to_value(&self) -> Value {
        Value::Selector {
            question_id: self.question.base.id,
            selected: self.selected.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Slider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SliderInputError {
    #[error("Value is incorrect. Try again.")]
    NotANumber,

    #[error("Value must be between {min} and {max}.\nTry again.")]
    OutOfRange { min: i64, max: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliderDraft {
    question: SliderQuestion,
    values: Vec<Option<i64>>,
}

impl SliderDraft {
    pub fn new(question: SliderQuestion) -> Self {
        let values = vec![None; question.options.len()];
        SliderDraft { question, values }
    }

    pub fn question(&self) -> &SliderQuestion {
        &self.question
    }

    /// Confirmed value per option, `None` while unset.
    pub fn values(&self) -> &[Option<i64>] {
        &self.values
    }

    pub fn has_option(&self, index: usize) -> bool {
        index < self.values.len()
    }

    /// Parse a typed entry and check it against the question's range.
    pub fn parse_entry(&self, input: &str) -> Result<i64, SliderInputError> {
        let value: i64 = input
            .trim()
            .parse()
            .map_err(|_| SliderInputError::NotANumber)?;
        if !self.question.in_range(value) {
            return Err(SliderInputError::OutOfRange {
                min: self.question.min_value,
                max: self.question.max_value,
            });
        }
        Ok(value)
    }

    /// Parse `input` and store it for `index`. Leaves the draft untouched on
    /// error.
    pub fn set_from_input(&mut self, index: usize, input: &str) -> Result<i64, SliderInputError> {
        let value = self.parse_entry(input)?;
        if let Some(slot) = self.values.get_mut(index) {
            *slot = Some(value);
        }
        Ok(value)
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// The answer value, once every option has a value.
    pub fn to_value(&self) -> Option<Value> {
        let sliders = self.values.iter().copied().collect::<Option<Vec<_>>>()?;
        Some(Value::Slider {
            question_id: self.question.base.id,
            sliders,
        })
    }
}

// ---------------------------------------------------------------------------
// TopList
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TopListDraft {
    question: TopListQuestion,
    ranks: Vec<usize>,
}

impl TopListDraft {
    pub fn new(question: TopListQuestion) -> Self {
        TopListDraft {
            question,
            ranks: Vec::new(),
        }
    }

    pub fn question(&self) -> &TopListQuestion {
        &self.question
    }

    /// Ranked option indices, highest rank first.
    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    pub fn unranked(&self) -> Vec<usize> {
        (0..self.question.options.len())
            .filter(|i| !self.ranks.contains(i))
            .collect()
    }

    pub fn can_add(&self) -> bool {
        self.ranks.len() < self.question.max_ranks()
    }

    pub fn can_submit(&self) -> bool {
        (self.question.min_ranks..=self.question.max_ranks()).contains(&self.ranks.len())
    }

    pub fn has_slot(&self, slot: usize) -> bool {
        slot < self.ranks.len()
    }

    /// Put `option` into an existing slot, or append it as a new lowest rank
    /// when `slot` is `None`. Other slots keep their order. Returns `false`
    /// if the option is unknown or already ranked, or the slot does not exist.
    pub fn place(&mut self, option: usize, slot: Option<usize>) -> bool {
        if option >= self.question.options.len() || self.ranks.contains(&option) {
            return false;
        }
        match slot {
            Some(slot) => match self.ranks.get_mut(slot) {
                Some(current) => {
                    *current = option;
                    true
                }
                None => false,
            },
            None if self.can_add() => {
                self.ranks.push(option);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, slot: usize) -> bool {
        if slot >= self.ranks.len() {
            return false;
        }
        self.ranks.remove(slot);
        true
    }

    pub fn to_value(&self) -> Value {
        Value::TopList {
            question_id: self.question.base.id,
            ranks: self.ranks.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextInputError {
    #[error("Message length must be at least {min} characters.")]
    TooShort { min: usize },

    #[error("Message length must be at most {max} characters.")]
    TooLong { max: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextDraft {
    question: TextQuestion,
    text: Option<String>,
}

impl TextDraft {
    pub fn new(question: TextQuestion) -> Self {
        TextDraft {
            question,
            text: None,
        }
    }

    pub fn question(&self) -> &TextQuestion {
        &self.question
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Replace the draft with `input` if it is within the length bounds.
    /// A rejected input keeps the previous draft.
    pub fn accept(&mut self, input: &str) -> Result<(), TextInputError> {
        let length = input.chars().count();
        if let Some(min) = self.question.min_length.filter(|min| length < *min) {
            return Err(TextInputError::TooShort { min });
        }
        if let Some(max) = self.question.max_length.filter(|max| length > *max) {
            return Err(TextInputError::TooLong { max });
        }
        self.text = Some(input.to_string());
        Ok(())
    }

    pub fn to_value(&self) -> Option<Value> {
        self.text.as_ref().map(|text| Value::Text {
            question_id: self.question.base.id,
            text: text.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
