// Poll model: plots grouping same-kind questions, and the poll envelope.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::question::{Question, QuestionId, QuestionKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("poll name must not be empty")]
    EmptyName,

    #[error("plot name must not be empty")]
    EmptyPlotName,

    #[error("len(plots) >= 1")]
    NoPlots,

    #[error("plot `{plot}` must contain at least one question")]
    EmptyPlot { plot: String },

    #[error("all questions in plot `{plot}` must be of the same type ({expected} != {found})")]
    MixedKinds {
        plot: String,
        expected: QuestionKind,
        found: QuestionKind,
    },

    #[error("{plot_type:?} plots only accept selector, slider and top_list questions, got {kind}")]
    UnsupportedKind { plot_type: PlotType, kind: QuestionKind },

    #[error("question id {0} appears more than once in the poll")]
    DuplicateQuestion(QuestionId),
}

// ---------------------------------------------------------------------------
// Identifiers and accounts
// ---------------------------------------------------------------------------

/// Poll identifier. Also used as the connection code a participant types in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(pub i64);

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PollId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(PollId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Plots
// ---------------------------------------------------------------------------

/// How a plot renders its results. Encoded on the wire as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PlotType {
    Bar,
    Pie,
    Doughnut,
    Radar,
    Area,
    WordCloud,
}

impl PlotType {
    /// Whether questions of `kind` can be grouped under this plot type.
    /// Numeric plots cannot chart free text.
    pub fn accepts(self, kind: QuestionKind) -> bool {
        match self {
            PlotType::WordCloud => true,
            _ => kind != QuestionKind::Text,
        }
    }
}

impl From<PlotType> for u8 {
    fn from(plot_type: PlotType) -> u8 {
        match plot_type {
            PlotType::Bar => 1,
            PlotType::Pie => 2,
            PlotType::Doughnut => 3,
            PlotType::Radar => 4,
            PlotType::Area => 5,
            PlotType::WordCloud => 6,
        }
    }
}

impl TryFrom<u8> for PlotType {
    type Error = String;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(PlotType::Bar),
            2 => Ok(PlotType::Pie),
            3 => Ok(PlotType::Doughnut),
            4 => Ok(PlotType::Radar),
            5 => Ok(PlotType::Area),
            6 => Ok(PlotType::WordCloud),
            other => Err(format!("unknown plot type {other}")),
        }
    }
}

/// A named group of same-kind questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPlot", into = "RawPlot")]
pub struct Plot {
    plot_type: PlotType,
    name: String,
    questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPlot {
    plot_type: PlotType,
    name: String,
    #[serde(default)]
    questions: Vec<Question>,
}

impl Plot {
    pub fn new(
        plot_type: PlotType,
        name: impl Into<String>,
        questions: Vec<Question>,
    ) -> Result<Self, PollError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PollError::EmptyPlotName);
        }
        let Some(first) = questions.first() else {
            return Err(PollError::EmptyPlot { plot: name });
        };

        let expected = first.kind();
        let mut seen = HashSet::new();
        for question in &questions {
            if question.kind() != expected {
                return Err(PollError::MixedKinds {
                    plot: name,
                    expected,
                    found: question.kind(),
                });
            }
            if !plot_type.accepts(question.kind()) {
                return Err(PollError::UnsupportedKind {
                    plot_type,
                    kind: question.kind(),
                });
            }
            if !seen.insert(question.id()) {
                return Err(PollError::DuplicateQuestion(question.id()));
            }
        }

        Ok(Plot {
            plot_type,
            name,
            questions,
        })
    }

    pub fn plot_type(&self) -> PlotType {
        self.plot_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
}

impl TryFrom<RawPlot> for Plot {
    type Error = PollError;

    fn try_from(raw: RawPlot) -> Result<Self, Self::Error> {
        Plot::new(raw.plot_type, raw.name, raw.questions)
    }
}

impl From<Plot> for RawPlot {
    fn from(plot: Plot) -> Self {
        RawPlot {
            plot_type: plot.plot_type,
            name: plot.name,
            questions: plot.questions,
        }
    }
}

// ---------------------------------------------------------------------------
// Poll
// ---------------------------------------------------------------------------

/// The authored content of a poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPollSchema", into = "RawPollSchema")]
pub struct PollSchema {
    name: String,
    plots: Vec<Plot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPollSchema {
    name: String,
    #[serde(default)]
    plots: Vec<Plot>,
}

impl PollSchema {
    pub fn new(name: impl Into<String>, plots: Vec<Plot>) -> Result<Self, PollError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PollError::EmptyName);
        }
        if plots.is_empty() {
            return Err(PollError::NoPlots);
        }

        let mut seen = HashSet::new();
        for question in plots.iter().flat_map(Plot::questions) {
            if !seen.insert(question.id()) {
                return Err(PollError::DuplicateQuestion(question.id()));
            }
        }

        Ok(PollSchema { name, plots })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plots(&self) -> &[Plot] {
        &self.plots
    }

    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.plots.iter().flat_map(Plot::questions)
    }

    /// Lookup table from question id to question across every plot.
    pub fn index(&self) -> HashMap<QuestionId, &Question> {
        self.questions().map(|q| (q.id(), q)).collect()
    }

    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions().find(|q| q.id() == id)
    }
}

impl TryFrom<RawPollSchema> for PollSchema {
    type Error = PollError;

    fn try_from(raw: RawPollSchema) -> Result<Self, Self::Error> {
        PollSchema::new(raw.name, raw.plots)
    }
}

impl From<PollSchema> for RawPollSchema {
    fn from(schema: PollSchema) -> Self {
        RawPollSchema {
            name: schema.name,
            plots: schema.plots,
        }
    }
}

/// A poll as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub owner: User,
    pub poll: PollSchema,
}

impl Poll {
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.poll.question(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{QuestionBase, QuestionOption, SelectorQuestion, TextQuestion};

    fn selector(label: &str) -> Question {
        SelectorQuestion::new(
            QuestionBase::new(label),
            vec![QuestionOption::new("a"), QuestionOption::new("b")],
            1,
            None,
        )
        .unwrap()
        .into()
    }

    fn text(label: &str) -> Question {
        TextQuestion::new(QuestionBase::new(label), None, None)
            .unwrap()
            .into()
    }

    #[test]
    fn plot_rejects_mixed_kinds() {
        let err = Plot::new(PlotType::WordCloud, "mixed", vec![selector("a"), text("b")])
            .unwrap_err();
        assert!(matches!(err, PollError::MixedKinds { .. }));
    }

    #[test]
    fn numeric_plot_rejects_text_questions() {
        let err = Plot::new(PlotType::Bar, "bar", vec![text("a")]).unwrap_err();
        assert!(matches!(
            err,
            PollError::UnsupportedKind {
                plot_type: PlotType::Bar,
                kind: QuestionKind::Text
            }
        ));
        assert!(Plot::new(PlotType::WordCloud, "cloud", vec![text("a")]).is_ok());
    }

    #[test]
    fn plot_requires_a_question() {
        let err = Plot::new(PlotType::Pie, "pie", vec![]).unwrap_err();
        assert_eq!(err, PollError::EmptyPlot { plot: "pie".into() });
    }

    #[test]
    fn poll_rejects_ids_shared_across_plots() {
        let q = selector("shared");
        let first = Plot::new(PlotType::Bar, "one", vec![q.clone()]).unwrap();
        let second = Plot::new(PlotType::Pie, "two", vec![q.clone()]).unwrap();
        let err = PollSchema::new("poll", vec![first, second]).unwrap_err();
        assert_eq!(err, PollError::DuplicateQuestion(q.id()));
    }

    #[test]
    fn index_covers_all_plots() {
        let a = selector("a");
        let b = text("b");
        let schema = PollSchema::new(
            "poll",
            vec![
                Plot::new(PlotType::Radar, "one", vec![a.clone()]).unwrap(),
                Plot::new(PlotType::WordCloud, "two", vec![b.clone()]).unwrap(),
            ],
        )
        .unwrap();

        let index = schema.index();
        assert_eq!(index.len(), 2);
        assert_eq!(index[&a.id()].label(), "a");
        assert_eq!(schema.question(b.id()).map(Question::kind), Some(QuestionKind::Text));
    }

    #[test]
    fn poll_id_parses_connection_code() {
        assert_eq!(" 42 ".parse::<PollId>().unwrap(), PollId(42));
        assert!("abc".parse::<PollId>().is_err());
    }

    #[test]
    fn poll_deserializes_from_backend_json() {
        let json = r#"{
            "id": 7,
            "owner": {"id": 1, "username": "presenter"},
            "poll": {
                "name": "Demo",
                "plots": [{
                    "plot_type": 6,
                    "name": "Words",
                    "questions": [{"question_type": 4, "label": "One word"}]
                }]
            }
        }"#;
        let poll: Poll = serde_json::from_str(json).unwrap();
        assert_eq!(poll.id, PollId(7));
        assert_eq!(poll.poll.plots()[0].plot_type(), PlotType::WordCloud);
        assert_eq!(poll.poll.plots()[0].questions()[0].kind(), QuestionKind::Text);
    }
}
