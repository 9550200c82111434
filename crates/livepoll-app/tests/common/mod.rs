// In-memory doubles for the chat transport, poll backend and question stream,
// plus builders for the questions and polls used across the suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use livepoll_app::api::{ApiError, PollApi};
use livepoll_app::chat::{ChatError, ChatId, ChatTransport, MessageHandle};
use livepoll_app::keyboard::{Action, Keyboard};
use livepoll_app::listener::{ListenerError, PayloadStream, QuestionSource};
use livepoll_app::session::Session;
use livepoll_core::{
    Answer, AnswerSchema, Plot, PlotType, Poll, PollId, PollSchema, Question, QuestionBase,
    QuestionKind, QuestionOption, SelectorQuestion, SliderQuestion, TextQuestion,
    TopListQuestion, User,
};
use reqwest::StatusCode;
use tokio::sync::mpsc;

pub const CHAT: ChatId = ChatId(1);
pub const POLL: PollId = PollId(42);

// ===========================================================================
// Chat transport
// ===========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ChatOp {
    Sent {
        message: MessageHandle,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edited {
        message: MessageHandle,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Deleted(MessageHandle),
}

/// Records every call and keeps the latest content of each message.
#[derive(Default)]
pub struct RecordingChat {
    ops: Mutex<Vec<ChatOp>>,
    views: Mutex<HashMap<MessageHandle, (String, Option<Keyboard>)>>,
    next_id: AtomicI64,
}

impl RecordingChat {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingChat::default())
    }

    pub fn ops(&self) -> Vec<ChatOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Texts of every newly sent message, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                ChatOp::Sent { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count_sent(&self, text: &str) -> usize {
        self.sent_texts().iter().filter(|t| *t == text).count()
    }

    pub fn deleted(&self) -> Vec<MessageHandle> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                ChatOp::Deleted(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// The first message sent, which a session keeps editing.
    pub fn session_message(&self) -> MessageHandle {
        match self.ops().first() {
            Some(ChatOp::Sent { message, .. }) => *message,
            other => panic!("no session message yet: {other:?}"),
        }
    }

    pub fn view(&self, message: MessageHandle) -> (String, Option<Keyboard>) {
        self.views
            .lock()
            .unwrap()
            .get(&message)
            .cloned()
            .unwrap_or_else(|| panic!("message {message} was never shown"))
    }

    pub fn session_text(&self) -> String {
        self.view(self.session_message()).0
    }

    pub fn session_keyboard(&self) -> Option<Keyboard> {
        self.view(self.session_message()).1
    }

    pub fn offers(&self, action: Action) -> bool {
        self.session_keyboard()
            .map(|kb| kb.offers(action))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageHandle, ChatError> {
        let message = MessageHandle {
            chat,
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.views
            .lock()
            .unwrap()
            .insert(message, (text.to_string(), keyboard.cloned()));
        self.ops.lock().unwrap().push(ChatOp::Sent {
            message,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(message)
    }

    async fn edit(
        &self,
        message: MessageHandle,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChatError> {
        let mut views = self.views.lock().unwrap();
        let Some(view) = views.get_mut(&message) else {
            return Err(ChatError::MessageGone(message));
        };
        *view = (text.to_string(), keyboard.cloned());
        self.ops.lock().unwrap().push(ChatOp::Edited {
            message,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn delete(&self, message: MessageHandle) -> Result<(), ChatError> {
        if self.views.lock().unwrap().remove(&message).is_none() {
            return Err(ChatError::MessageGone(message));
        }
        self.ops.lock().unwrap().push(ChatOp::Deleted(message));
        Ok(())
    }
}

// ===========================================================================
// Poll backend
// ===========================================================================

#[derive(Default)]
pub struct FakePollApi {
    polls: Mutex<HashMap<PollId, Poll>>,
    submitted: Mutex<Vec<(PollId, AnswerSchema)>>,
    fetches: AtomicUsize,
    fail_submit: AtomicBool,
}

impl FakePollApi {
    pub fn with_poll(poll: Poll) -> Arc<Self> {
        let api = FakePollApi::default();
        api.polls.lock().unwrap().insert(poll.id, poll);
        Arc::new(api)
    }

    pub fn replace_poll(&self, poll: Poll) {
        self.polls.lock().unwrap().insert(poll.id, poll);
    }

    pub fn fail_submissions(&self) {
        self.fail_submit.store(true, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<(PollId, AnswerSchema)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollApi for FakePollApi {
    async fn fetch_poll(&self, poll_id: PollId) -> Result<Poll, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .get(&poll_id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: StatusCode::NOT_FOUND,
                message: format!("poll {poll_id} not found"),
            })
    }

    async fn submit(&self, poll_id: PollId, schema: &AnswerSchema) -> Result<Answer, ApiError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "database unavailable".into(),
            });
        }
        let poll = self.fetch_poll(poll_id).await?;
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((poll_id, schema.clone()));
        Ok(Answer {
            id: submitted.len() as i64,
            poll,
            answerer: None,
            answer: schema.clone(),
        })
    }
}

// ===========================================================================
// Question stream
// ===========================================================================

/// Question source fed by the test through an unbounded channel. Supports a
/// single subscription.
pub struct ChannelSource {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<String, ListenerError>>>>,
}

pub type PushSender = mpsc::UnboundedSender<Result<String, ListenerError>>;

impl ChannelSource {
    pub fn new() -> (Arc<Self>, PushSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = ChannelSource {
            rx: Mutex::new(Some(rx)),
        };
        (Arc::new(source), tx)
    }
}

#[async_trait]
impl QuestionSource for ChannelSource {
    async fn subscribe(&self, _poll_id: PollId) -> Result<PayloadStream, ListenerError> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ListenerError::Connect("already subscribed".into()))?;
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

pub fn push(tx: &PushSender, question: &Question) {
    let payload = serde_json::to_string(question).unwrap();
    tx.send(Ok(payload)).unwrap();
}

// ===========================================================================
// Builders
// ===========================================================================

pub fn options(n: usize) -> Vec<QuestionOption> {
    (0..n).map(|i| QuestionOption::new(format!("Option {i}"))).collect()
}

pub fn selector(label: &str, min: usize, max: Option<usize>, n: usize) -> Question {
    SelectorQuestion::new(QuestionBase::new(label), options(n), min, max)
        .unwrap()
        .into()
}

pub fn slider(label: &str, min: i64, max: i64, n: usize) -> Question {
    SliderQuestion::new(QuestionBase::new(label), options(n), min, max)
        .unwrap()
        .into()
}

pub fn top_list(label: &str, min: usize, max: Option<usize>, n: usize) -> Question {
    TopListQuestion::new(QuestionBase::new(label), options(n), min, max)
        .unwrap()
        .into()
}

pub fn text(label: &str, min: Option<usize>, max: Option<usize>) -> Question {
    TextQuestion::new(QuestionBase::new(label), min, max)
        .unwrap()
        .into()
}

/// A poll with one plot per question.
pub fn poll_of(questions: &[Question]) -> Poll {
    let plots = questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let plot_type = match q.kind() {
                QuestionKind::Text => PlotType::WordCloud,
                _ => PlotType::Bar,
            };
            Plot::new(plot_type, format!("plot {i}"), vec![q.clone()]).unwrap()
        })
        .collect();
    Poll {
        id: POLL,
        owner: User {
            id: 7,
            username: "presenter".into(),
        },
        poll: PollSchema::new("Live poll", plots).unwrap(),
    }
}

pub async fn open_session(
    questions: &[Question],
) -> (Session, Arc<RecordingChat>, Arc<FakePollApi>) {
    let chat = RecordingChat::new();
    let api = FakePollApi::with_poll(poll_of(questions));
    let session = Session::open(CHAT, poll_of(questions), chat.clone(), api.clone())
        .await
        .unwrap();
    (session, chat, api)
}

/// Poll `check` until it holds, failing the test after a second.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
