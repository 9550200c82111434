// Answer values, the answer schema submitted by a participant, and the
// persisted answer returned by the backend.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::poll::{Poll, User};
use crate::question::{QuestionId, QuestionKind};
use crate::validate::{self, ValidationError, Violation};

/// A participant's response to a single question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawValue", into = "RawValue")]
pub enum Value {
    /// Indices of the checked options.
    Selector {
        question_id: QuestionId,
        selected: BTreeSet<usize>,
    },
    /// One value per option, in option order.
    Slider {
        question_id: QuestionId,
        sliders: Vec<i64>,
    },
    /// Option indices, highest rank first.
    TopList {
        question_id: QuestionId,
        ranks: Vec<usize>,
    },
    Text { question_id: QuestionId, text: String },
}

impl Value {
    pub fn question_id(&self) -> QuestionId {
        match self {
            Value::Selector { question_id, .. }
            | Value::Slider { question_id, .. }
            | Value::TopList { question_id, .. }
            | Value::Text { question_id, .. } => *question_id,
        }
    }

    pub fn kind(&self) -> QuestionKind {
        match self {
            Value::Selector { .. } => QuestionKind::Selector,
            Value::Slider { .. } => QuestionKind::Slider,
            Value::TopList { .. } => QuestionKind::TopList,
            Value::Text { .. } => QuestionKind::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawValue {
    question_id: QuestionId,
    question_type: QuestionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected: Option<BTreeSet<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sliders: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ranks: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl TryFrom<RawValue> for Value {
    type Error = String;

    fn try_from(raw: RawValue) -> Result<Self, Self::Error> {
        let question_id = raw.question_id;
        let missing =
            |field: &str| format!("`{field}` is required for {} values", raw.question_type);
        match raw.question_type {
            QuestionKind::Selector => Ok(Value::Selector {
                question_id,
                selected: raw.selected.ok_or_else(|| missing("selected"))?,
            }),
            QuestionKind::Slider => Ok(Value::Slider {
                question_id,
                sliders: raw.sliders.ok_or_else(|| missing("sliders"))?,
            }),
            QuestionKind::TopList => Ok(Value::TopList {
                question_id,
                ranks: raw.ranks.ok_or_else(|| missing("ranks"))?,
            }),
            QuestionKind::Text => Ok(Value::Text {
                question_id,
                text: raw.text.ok_or_else(|| missing("text"))?,
            }),
        }
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        let mut raw = RawValue {
            question_id: value.question_id(),
            question_type: value.kind(),
            selected: None,
            sliders: None,
            ranks: None,
            text: None,
        };
        match value {
            Value::Selector { selected, .. } => raw.selected = Some(selected),
            Value::Slider { sliders, .. } => raw.sliders = Some(sliders),
            Value::TopList { ranks, .. } => raw.ranks = Some(ranks),
            Value::Text { text, .. } => raw.text = Some(text),
        }
        raw
    }
}

// ---------------------------------------------------------------------------
// AnswerSchema
// ---------------------------------------------------------------------------

/// Ordered answer values; no two values target the same question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAnswerSchema", into = "RawAnswerSchema")]
pub struct AnswerSchema {
    values: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAnswerSchema {
    values: Vec<Value>,
}

impl AnswerSchema {
    pub fn new(values: Vec<Value>) -> Result<Self, ValidationError> {
        let mut targets = HashSet::new();
        for value in &values {
            if !targets.insert(value.question_id()) {
                return Err(ValidationError {
                    question_id: value.question_id(),
                    violation: Violation::DuplicateTarget,
                });
            }
        }
        Ok(AnswerSchema { values })
    }

    /// A schema holding one value; cannot violate target uniqueness.
    pub fn single(value: Value) -> Self {
        AnswerSchema {
            values: vec![value],
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl TryFrom<RawAnswerSchema> for AnswerSchema {
    type Error = ValidationError;

    fn try_from(raw: RawAnswerSchema) -> Result<Self, Self::Error> {
        AnswerSchema::new(raw.values)
    }
}

impl From<AnswerSchema> for RawAnswerSchema {
    fn from(schema: AnswerSchema) -> Self {
        RawAnswerSchema {
            values: schema.values,
        }
    }
}

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

/// A stored answer as returned by the submission endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub poll: Poll,
    pub answerer: Option<User>,
    pub answer: AnswerSchema,
}

impl Answer {
    /// Check the stored schema against the poll snapshot it was saved with.
    pub fn verify(&self) -> Result<(), ValidationError> {
        validate::validate(&self.answer, &self.poll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qid(n: u128) -> QuestionId {
        QuestionId(uuid::Uuid::from_u128(n))
    }

    #[test]
    fn value_serializes_with_kind_tag_and_payload() {
        let value = Value::Selector {
            question_id: qid(1),
            selected: BTreeSet::from([1]),
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["question_type"], 1);
        assert_eq!(json["selected"], serde_json::json!([1]));
        assert!(json.get("text").is_none());
    }

    #[test]
    fn value_requires_payload_for_its_kind() {
        let json = format!(r#"{{"question_id": "{}", "question_type": 2, "ranks": [0]}}"#, qid(1));
        assert!(serde_json::from_str::<Value>(&json).is_err());
    }

    #[test]
    fn schema_rejects_duplicate_targets() {
        let a = Value::Text {
            question_id: qid(1),
            text: "a".into(),
        };
        let b = Value::Text {
            question_id: qid(1),
            text: "b".into(),
        };
        let err = AnswerSchema::new(vec![a, b]).unwrap_err();
        assert_eq!(err.violation, Violation::DuplicateTarget);
        assert_eq!(err.question_id, qid(1));
    }

    #[test]
    fn schema_deserialization_rejects_duplicate_targets() {
        let json = format!(
            r#"{{"values": [
                {{"question_id": "{id}", "question_type": 4, "text": "x"}},
                {{"question_id": "{id}", "question_type": 4, "text": "y"}}
            ]}}"#,
            id = qid(3)
        );
        assert!(serde_json::from_str::<AnswerSchema>(&json).is_err());
    }
}
