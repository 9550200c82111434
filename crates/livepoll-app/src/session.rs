// Per-participant answer session.
//
// A session owns all state for one participant's connection to a poll: the
// pending queue and delivered-id set, the active question with its draft, the
// "queue changed" notice and the poll snapshot used for validation. The
// listener never touches this state; it hands raw payloads over a channel and
// `run` applies them one at a time, interleaved with user events.

use std::mem;
use std::sync::Arc;

use livepoll_core::{
    protocol, validate, AnswerSchema, Poll, PollId, Question, QuestionId, ValidationError, Value,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, PollApi};
use crate::chat::{ChatError, ChatId, ChatTransport, MessageHandle};
use crate::drafts::{SelectorDraft, SliderDraft, TextDraft, TopListDraft};
use crate::keyboard::{
    cancel_keyboard, exit_keyboard, question_text, queue_changed_keyboard, rejected_answer_text,
    selector_keyboard, send_keyboard, slider_keyboard, slider_prompt, text_answer_text,
    top_list_keyboard, top_list_picker, Action, Keyboard, QueueChoice, CONNECTED_TEXT,
    CONNECTION_LOST_TEXT, DISCONNECTED_TEXT, PICK_OPTION_TEXT, QUEUE_CHANGED_TEXT, SENDING_TEXT,
    SUBMIT_FAILED_TEXT, THANKS_TEXT,
};
use crate::listener::{ListenerError, ListenerEvent, ListenerHandle};
use crate::queue::{Arrival, SessionQueue};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("question listener lost: {0}")]
    Listener(#[from] ListenerError),

    #[error("answer submission failed: {0}")]
    Submit(#[from] ApiError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Input from the participant, already decoded by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    Pressed(Action),
    Text(String),
    /// The `/exit` command.
    Exit,
}

/// Whether the session keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

// ---------------------------------------------------------------------------
// AnswerState
// ---------------------------------------------------------------------------

/// What input the session accepts right now. Each answering state carries the
/// draft for the active question.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerState {
    WaitQuestion,
    Selector(SelectorDraft),
    Slider(SliderDraft),
    /// Waiting for a typed value for option `index`.
    WaitSliderValue { draft: SliderDraft, index: usize },
    TopList(TopListDraft),
    /// Waiting for an option pick; `edit` is the slot being replaced, or
    /// `None` to append.
    WaitTopListRank { draft: TopListDraft, edit: Option<usize> },
    Text(TextDraft),
}

impl AnswerState {
    fn for_question(question: &Question) -> Self {
        match question {
            Question::Selector(q) => AnswerState::Selector(SelectorDraft::new(q.clone())),
            Question::Slider(q) => AnswerState::Slider(SliderDraft::new(q.clone())),
            Question::TopList(q) => AnswerState::TopList(TopListDraft::new(q.clone())),
            Question::Text(q) => AnswerState::Text(TextDraft::new(q.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnswerState::WaitQuestion => "wait_question",
            AnswerState::Selector(_) => "selector",
            AnswerState::Slider(_) => "slider",
            AnswerState::WaitSliderValue { .. } => "wait_slider_value",
            AnswerState::TopList(_) => "top_list",
            AnswerState::WaitTopListRank { .. } => "wait_top_list_rank",
            AnswerState::Text(_) => "text",
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    chat: ChatId,
    poll: Poll,
    /// The message that shows the active question; edited in place.
    message: MessageHandle,
    notice: Option<MessageHandle>,
    queue: SessionQueue,
    active: Option<Question>,
    state: AnswerState,
    transport: Arc<dyn ChatTransport>,
    api: Arc<dyn PollApi>,
}

impl Session {
    /// Greet the participant and start in `WaitQuestion`.
    pub async fn open(
        chat: ChatId,
        poll: Poll,
        transport: Arc<dyn ChatTransport>,
        api: Arc<dyn PollApi>,
    ) -> Result<Self, SessionError> {
        let message = transport
            .send(chat, CONNECTED_TEXT, Some(&exit_keyboard()))
            .await?;
        info!("Session opened for chat {chat} on poll {}", poll.id);
        Ok(Session {
            chat,
            poll,
            message,
            notice: None,
            queue: SessionQueue::new(),
            active: None,
            state: AnswerState::WaitQuestion,
            transport,
            api,
        })
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    pub fn poll_id(&self) -> PollId {
        self.poll.id
    }

    pub fn state(&self) -> &AnswerState {
        &self.state
    }

    pub fn active(&self) -> Option<&Question> {
        self.active.as_ref()
    }

    pub fn queue(&self) -> &SessionQueue {
        &self.queue
    }

    pub fn notice_shown(&self) -> bool {
        self.notice.is_some()
    }

    // -----------------------------------------------------------------------
    // Arrivals
    // -----------------------------------------------------------------------

    /// Decode a raw push payload and treat it as an arrival. Undecodable
    /// payloads are dropped.
    pub async fn on_payload(&mut self, raw: &str) {
        match protocol::decode_question(raw) {
            Ok(question) => self.on_question(question).await,
            Err(e) => warn!("Dropping question payload in chat {}: {e}", self.chat),
        }
    }

    pub async fn on_question(&mut self, question: Question) {
        let id = question.id();
        let active = self.active.as_ref().map(Question::id);
        match self.queue.offer(question, active) {
            Arrival::Duplicate => debug!(%id, "question already delivered"),
            Arrival::Active => debug!(%id, "question is already being answered"),
            Arrival::Queued { preempts: false } => self.advance().await,
            Arrival::Queued { preempts: true } => {
                debug!(%id, queued = self.queue.len(), "question queued behind active one");
                self.show_notice().await;
            }
        }
    }

    /// Present the next queued question. With an empty queue the session
    /// goes back to waiting.
    pub async fn advance(&mut self) {
        let Some(question) = self.queue.pop() else {
            self.active = None;
            self.state = AnswerState::WaitQuestion;
            return;
        };
        self.clear_notice().await;
        info!(
            "Presenting {} question {} in chat {}",
            question.kind(),
            question.id(),
            self.chat
        );
        self.state = AnswerState::for_question(&question);
        self.active = Some(question);
        self.render().await;
    }

    async fn show_notice(&mut self) {
        if self.notice.is_some() {
            return;
        }
        let keyboard = queue_changed_keyboard();
        match self
            .transport
            .send(self.chat, QUEUE_CHANGED_TEXT, Some(&keyboard))
            .await
        {
            Ok(handle) => self.notice = Some(handle),
            Err(e) => warn!("Failed to show queue notice in chat {}: {e}", self.chat),
        }
    }

    async fn clear_notice(&mut self) {
        if let Some(notice) = self.notice.take() {
            if let Err(e) = self.transport.delete(notice).await {
                warn!("Failed to delete queue notice {notice}: {e}");
            }
        }
    }

    // -----------------------------------------------------------------------
    // User events
    // -----------------------------------------------------------------------

    pub async fn handle(&mut self, event: UserEvent) -> Result<Flow, SessionError> {
        match event {
            UserEvent::Exit | UserEvent::Pressed(Action::Exit) => return Ok(Flow::Exit),
            UserEvent::Pressed(Action::QueueChanged(choice)) => self.on_queue_choice(choice).await,
            UserEvent::Pressed(Action::Send) => self.submit().await?,
            UserEvent::Pressed(action) => self.on_press(action).await,
            UserEvent::Text(text) => self.on_text(&text).await,
        }
        Ok(Flow::Continue)
    }

    async fn on_queue_choice(&mut self, choice: QueueChoice) {
        if self.notice.is_none() {
            debug!(?choice, "no queue notice shown, ignoring");
            return;
        }
        self.clear_notice().await;

        let current = self.active.as_ref().map(Question::id);
        match (choice, current) {
            (QueueChoice::Advance, Some(abandoned)) if !self.queue.is_empty() => {
                self.queue.release(abandoned);
                info!(%abandoned, "Question abandoned for the next one in queue");
                self.advance().await;
            }
            (QueueChoice::Advance, _) => debug!("nothing queued, staying on the current question"),
            (QueueChoice::Stay, _) => debug!("staying on the current question"),
        }
    }

    async fn on_press(&mut self, action: Action) {
        let state = mem::replace(&mut self.state, AnswerState::WaitQuestion);
        let (state, changed) = match (state, action) {
            (AnswerState::Selector(mut draft), Action::Option(index)) => {
                let changed = draft.toggle(index);
                (AnswerState::Selector(draft), changed)
            }
            (AnswerState::Slider(draft), Action::Option(index)) if draft.has_option(index) => {
                (AnswerState::WaitSliderValue { draft, index }, true)
            }
            (AnswerState::WaitSliderValue { draft, .. }, Action::Cancel) => {
                (AnswerState::Slider(draft), true)
            }
            (AnswerState::TopList(draft), Action::Add) if draft.can_add() => {
                (AnswerState::WaitTopListRank { draft, edit: None }, true)
            }
            (AnswerState::TopList(draft), Action::Option(slot)) if draft.has_slot(slot) => (
                AnswerState::WaitTopListRank {
                    draft,
                    edit: Some(slot),
                },
                true,
            ),
            (AnswerState::TopList(mut draft), Action::Remove(slot)) => {
                let changed = draft.remove(slot);
                (AnswerState::TopList(draft), changed)
            }
            (AnswerState::WaitTopListRank { mut draft, edit }, Action::Option(option)) => {
                if draft.place(option, edit) {
                    (AnswerState::TopList(draft), true)
                } else {
                    (AnswerState::WaitTopListRank { draft, edit }, false)
                }
            }
            (AnswerState::WaitTopListRank { draft, .. }, Action::Cancel) => {
                (AnswerState::TopList(draft), true)
            }
            (state, _) => (state, false),
        };
        self.state = state;

        if changed {
            self.render().await;
        } else {
            debug!(%action, state = self.state.name(), "ignoring stale button");
        }
    }

    async fn on_text(&mut self, input: &str) {
        let state = mem::replace(&mut self.state, AnswerState::WaitQuestion);
        let (state, rejection) = match state {
            AnswerState::WaitSliderValue { mut draft, index } => {
                match draft.set_from_input(index, input) {
                    Ok(_) => (AnswerState::Slider(draft), None),
                    Err(e) => (
                        AnswerState::WaitSliderValue { draft, index },
                        Some((e.to_string(), Some(cancel_keyboard()))),
                    ),
                }
            }
            AnswerState::Text(mut draft) => match draft.accept(input) {
                Ok(()) => (AnswerState::Text(draft), None),
                Err(e) => {
                    let keyboard = draft.text().map(|_| send_keyboard());
                    (AnswerState::Text(draft), Some((e.to_string(), keyboard)))
                }
            },
            other => {
                debug!(state = other.name(), "ignoring text input");
                self.state = other;
                return;
            }
        };
        self.state = state;

        match rejection {
            Some((text, keyboard)) => self.edit(&text, keyboard.as_ref()).await,
            None => self.render().await,
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    fn pending_value(&self) -> Option<Value> {
        match &self.state {
            AnswerState::Selector(draft) if draft.can_submit() => Some(draft.to_value()),
            AnswerState::Slider(draft) => draft.to_value(),
            AnswerState::TopList(draft) if draft.can_submit() => Some(draft.to_value()),
            AnswerState::Text(draft) => draft.to_value(),
            _ => None,
        }
    }

    /// Validate against the poll snapshot. A question missing from the
    /// snapshot triggers one refetch of the poll first.
    async fn check(
        &mut self,
        question_id: QuestionId,
        schema: &AnswerSchema,
    ) -> Result<(), ValidationError> {
        if self.poll.question(question_id).is_none() {
            debug!(%question_id, "question missing from poll snapshot, refetching");
            match self.api.fetch_poll(self.poll.id).await {
                Ok(poll) => self.poll = poll,
                Err(e) => warn!("Failed to refresh poll {}: {e}", self.poll.id),
            }
        }
        validate(schema, &self.poll)
    }

    async fn submit(&mut self) -> Result<(), SessionError> {
        let Some(value) = self.pending_value() else {
            debug!(state = self.state.name(), "nothing to submit, ignoring send");
            return Ok(());
        };
        let question_id = value.question_id();
        let schema = AnswerSchema::single(value);

        if let Err(e) = self.check(question_id, &schema).await {
            warn!("Refusing to submit answer in chat {}: {e}", self.chat);
            if let Some((text, keyboard)) = self.view() {
                let text = rejected_answer_text(&text, &e.violation.to_string());
                self.edit(&text, keyboard.as_ref()).await;
            }
            return Ok(());
        }

        self.edit(SENDING_TEXT, None).await;
        match self.api.submit(self.poll.id, &schema).await {
            Ok(answer) => info!(
                "Stored answer {} for question {question_id} in chat {}",
                answer.id, self.chat
            ),
            Err(e) => {
                self.say(SUBMIT_FAILED_TEXT).await;
                return Err(e.into());
            }
        }
        self.edit(THANKS_TEXT, None).await;

        self.active = None;
        self.state = AnswerState::WaitQuestion;
        self.advance().await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Text and buttons for the current state, or `None` while waiting.
    fn view(&self) -> Option<(String, Option<Keyboard>)> {
        let question = self.active.as_ref()?;
        let view = match &self.state {
            AnswerState::WaitQuestion => return None,
            AnswerState::Selector(draft) => {
                (question_text(question), Some(selector_keyboard(draft)))
            }
            AnswerState::Slider(draft) => (question_text(question), Some(slider_keyboard(draft))),
            AnswerState::WaitSliderValue { draft, index } => {
                let q = draft.question();
                let option = q.options.get(*index).map_or("", |o| o.label.as_str());
                (
                    slider_prompt(option, q.min_value, q.max_value),
                    Some(cancel_keyboard()),
                )
            }
            AnswerState::TopList(draft) => {
                (question_text(question), Some(top_list_keyboard(draft)))
            }
            AnswerState::WaitTopListRank { draft, .. } => {
                (PICK_OPTION_TEXT.to_string(), Some(top_list_picker(draft)))
            }
            AnswerState::Text(draft) => match draft.text() {
                Some(text) => (text_answer_text(text), Some(send_keyboard())),
                None => (question_text(question), None),
            },
        };
        Some(view)
    }

    async fn render(&self) {
        if let Some((text, keyboard)) = self.view() {
            self.edit(&text, keyboard.as_ref()).await;
        }
    }

    /// Edit the session message. Failures are logged; the next edit replaces
    /// whatever is shown anyway.
    async fn edit(&self, text: &str, keyboard: Option<&Keyboard>) {
        match self.transport.edit(self.message, text, keyboard).await {
            Ok(()) | Err(ChatError::NotModified) => {}
            Err(e) => warn!("Failed to update message {}: {e}", self.message),
        }
    }

    async fn say(&self, text: &str) {
        if let Err(e) = self.transport.send(self.chat, text, None).await {
            warn!("Failed to send message to chat {}: {e}", self.chat);
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Remove the notice and leave the disconnected text on the session
    /// message. Queue and drafts are dropped with the session.
    pub async fn close(mut self) {
        self.clear_notice().await;
        self.edit(DISCONNECTED_TEXT, None).await;
        info!(
            "Session closed for chat {} on poll {} ({} questions left unanswered in queue)",
            self.chat,
            self.poll.id,
            self.queue.len()
        );
    }

    /// Drive the session until the participant exits, the listener is lost or
    /// a submission fails.
    ///
    /// Listens on two channels using `tokio::select!`:
    /// 1. question payloads from the listener
    /// 2. participant events from the transport
    ///
    /// On the way out the listener is cancelled and awaited before the session
    /// state is torn down, so no payload is applied after teardown begins.
    pub async fn run(
        mut self,
        listener: ListenerHandle,
        mut questions: mpsc::Receiver<ListenerEvent>,
        mut events: mpsc::Receiver<UserEvent>,
    ) -> Result<(), SessionError> {
        let result = loop {
            tokio::select! {
                // --- Pushed questions ---
                event = questions.recv() => match event {
                    Some(ListenerEvent::Payload(raw)) => self.on_payload(&raw).await,
                    Some(ListenerEvent::Lost(e)) => {
                        self.say(CONNECTION_LOST_TEXT).await;
                        break Err(e.into());
                    }
                    None => {
                        self.say(CONNECTION_LOST_TEXT).await;
                        break Err(ListenerError::Closed.into());
                    }
                },

                // --- Participant events ---
                event = events.recv() => match event {
                    Some(event) => match self.handle(event).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Exit) => break Ok(()),
                        Err(e) => break Err(e),
                    },
                    None => break Ok(()),
                },
            }
        };

        listener.shutdown().await;
        drop(questions);
        if let Err(e) = &result {
            warn!("Session for chat {} ended: {e}", self.chat);
        }
        self.close().await;
        result
    }
}
