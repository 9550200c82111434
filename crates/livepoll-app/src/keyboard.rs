// Choice sets (inline keyboards) and message texts shown during a session.
//
// Every button carries an `Action`. Transports whose buttons can only carry
// strings use the `Display` / `FromStr` codec (`option:3`, `change:accept`).

use std::fmt;
use std::str::FromStr;

use livepoll_core::Question;
use thiserror::Error;

use crate::drafts::{SelectorDraft, SliderDraft, TopListDraft};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Answer to the "queue changed" notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueChoice {
    /// Keep answering the current question.
    Stay,
    /// Abandon the current question and take the next queued one.
    Advance,
}

/// What a button does when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Option index (selector, slider, top-list picker) or rank slot (top list).
    Option(usize),
    QueueChanged(QueueChoice),
    Exit,
    Cancel,
    /// Remove a rank slot.
    Remove(usize),
    Add,
    Send,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized button data `{0}`")]
pub struct ActionParseError(pub String);

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Option(index) => write!(f, "option:{index}"),
            Action::QueueChanged(QueueChoice::Stay) => f.write_str("change:cancel"),
            Action::QueueChanged(QueueChoice::Advance) => f.write_str("change:accept"),
            Action::Exit => f.write_str("exit"),
            Action::Cancel => f.write_str("cancel"),
            Action::Remove(index) => write!(f, "delete:{index}"),
            Action::Add => f.write_str("add"),
            Action::Send => f.write_str("send"),
        }
    }
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ActionParseError(s.to_string());
        let index = |raw: &str| raw.parse::<usize>().map_err(|_| err());

        match s.split_once(':') {
            Some(("option", raw)) => Ok(Action::Option(index(raw)?)),
            Some(("delete", raw)) => Ok(Action::Remove(index(raw)?)),
            Some(("change", "cancel")) => Ok(Action::QueueChanged(QueueChoice::Stay)),
            Some(("change", "accept")) => Ok(Action::QueueChanged(QueueChoice::Advance)),
            Some(_) => Err(err()),
            None => match s {
                "exit" => Ok(Action::Exit),
                "cancel" => Ok(Action::Cancel),
                "add" => Ok(Action::Add),
                "send" => Ok(Action::Send),
                _ => Err(err()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Keyboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Button {
            label: label.into(),
            action,
        }
    }
}

/// Rows of buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Keyboard::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    pub fn push(&mut self, buttons: Vec<Button>) {
        self.rows.push(buttons);
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    /// Whether any button triggers `action`.
    pub fn offers(&self, action: Action) -> bool {
        self.buttons().any(|b| b.action == action)
    }
}

fn send_button() -> Button {
    Button::new("Send", Action::Send)
}

fn cancel_button() -> Button {
    Button::new("Cancel", Action::Cancel)
}

pub fn exit_keyboard() -> Keyboard {
    Keyboard::new().row(vec![Button::new("Exit from presentation", Action::Exit)])
}

pub fn cancel_keyboard() -> Keyboard {
    Keyboard::new().row(vec![cancel_button()])
}

pub fn send_keyboard() -> Keyboard {
    Keyboard::new().row(vec![send_button()])
}

pub fn queue_changed_keyboard() -> Keyboard {
    Keyboard::new().row(vec![
        Button::new(
            "Stay on the current question",
            Action::QueueChanged(QueueChoice::Stay),
        ),
        Button::new(
            "Go to next question",
            Action::QueueChanged(QueueChoice::Advance),
        ),
    ])
}

/// Options with a toggle marker; once the upper bound is reached only the
/// checked options stay visible so they can be unchecked.
pub fn selector_keyboard(draft: &SelectorDraft) -> Keyboard {
    let mut keyboard = Keyboard::new();
    for index in draft.visible_options() {
        let marker = if draft.is_selected(index) { '●' } else { '○' };
        let label = &draft.question().options[index].label;
        keyboard.push(vec![Button::new(
            format!("{marker} {label}"),
            Action::Option(index),
        )]);
    }
    if draft.can_submit() {
        keyboard.push(vec![send_button()]);
    }
    keyboard
}

pub fn slider_keyboard(draft: &SliderDraft) -> Keyboard {
    let mut keyboard = Keyboard::new();
    for (index, (option, value)) in draft
        .question()
        .options
        .iter()
        .zip(draft.values())
        .enumerate()
    {
        let shown = value.map_or_else(|| "⛶".to_string(), |v| v.to_string());
        keyboard.push(vec![Button::new(
            format!("{} - {shown}", option.label),
            Action::Option(index),
        )]);
    }
    if draft.is_complete() {
        keyboard.push(vec![send_button()]);
    }
    keyboard
}

/// Current ranking with edit/remove per slot, plus add and send when allowed.
pub fn top_list_keyboard(draft: &TopListDraft) -> Keyboard {
    let mut keyboard = Keyboard::new();
    for (slot, option) in draft.ranks().iter().enumerate() {
        let label = &draft.question().options[*option].label;
        keyboard.push(vec![
            Button::new(format!("{} - {label}", slot + 1), Action::Option(slot)),
            Button::new("Remove", Action::Remove(slot)),
        ]);
    }
    if draft.can_add() {
        keyboard.push(vec![Button::new("+", Action::Add)]);
    }
    if draft.can_submit() {
        keyboard.push(vec![send_button()]);
    }
    keyboard
}

/// Options not ranked yet, followed by a cancel button.
pub fn top_list_picker(draft: &TopListDraft) -> Keyboard {
    let mut keyboard = Keyboard::new();
    for index in draft.unranked() {
        let label = &draft.question().options[index].label;
        keyboard.push(vec![Button::new(label.clone(), Action::Option(index))]);
    }
    keyboard.push(vec![cancel_button()]);
    keyboard
}

// ---------------------------------------------------------------------------
// Texts
// ---------------------------------------------------------------------------

pub const CONNECTED_TEXT: &str =
    "You are connected to the presentation, please wait for the new questions. Type /exit to exit.";
pub const DISCONNECTED_TEXT: &str = "You are disconnected from the presentation. \
     To connect again scan the QR code from the presentation or enter /start and enter the connection code.";
pub const QUEUE_CHANGED_TEXT: &str = "The question queue was changed.";
pub const SENDING_TEXT: &str = "Sending ...";
pub const THANKS_TEXT: &str = "Thanks for the answer, please wait for the next questions.";
pub const PICK_OPTION_TEXT: &str = "Select an option";
pub const SUBMIT_FAILED_TEXT: &str = "Failed to send the answer.";
pub const CONNECTION_LOST_TEXT: &str = "Connection to the presentation was lost.";

/// Question view with a note explaining why the answer was not sent.
pub fn rejected_answer_text(view: &str, reason: &str) -> String {
    format!(
        "{view}\n\nThe answer was not accepted: {}",
        escape_html(reason)
    )
}

/// Question heading: bold label, then the description in italics.
pub fn question_text(question: &Question) -> String {
    let base = question.base();
    match &base.description {
        Some(description) => format!(
            "<b>{}</b>\n\n<i>{}</i>",
            escape_html(&base.label),
            escape_html(description)
        ),
        None => format!("<b>{}</b>\n", escape_html(&base.label)),
    }
}

pub fn slider_prompt(option: &str, min: i64, max: i64) -> String {
    format!(
        "Send me the value for \"{}\".\nValue must be between {min} and {max}.",
        escape_html(option)
    )
}

pub fn text_answer_text(text: &str) -> String {
    format!("Your answer is «{}».", escape_html(text))
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
