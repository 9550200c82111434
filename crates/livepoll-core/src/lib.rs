// Poll domain model: questions, polls, answer values and their validation.

pub mod answer;
pub mod poll;
pub mod protocol;
pub mod question;
pub mod validate;

pub use answer::{Answer, AnswerSchema, Value};
pub use poll::{Plot, PlotType, Poll, PollId, PollSchema, User};
pub use question::{
    Question, QuestionBase, QuestionId, QuestionKind, QuestionOption, SelectorQuestion,
    SliderQuestion, TextQuestion, TopListQuestion,
};
pub use validate::{validate, ValidationError, Violation};
