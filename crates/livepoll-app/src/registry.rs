// Live sessions keyed by chat.
//
// The registry is owned by whoever accepts participants (the router). Each
// entry pairs the sender for the session's user events with the join handle of
// its task; the listener handle lives inside the task and is shut down there.

use std::collections::HashMap;
use std::sync::Arc;

use livepoll_core::PollId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{ApiError, PollApi};
use crate::chat::{ChatId, ChatTransport};
use crate::listener::{ListenerHandle, QuestionSource};
use crate::session::{Session, SessionError, UserEvent};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("chat {0} is already connected to a poll")]
    AlreadyConnected(ChatId),

    #[error("failed to load poll: {0}")]
    Poll(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Channel capacities for new sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Payloads buffered between listener and session; the listener waits
    /// when it is full.
    pub queue_capacity: usize,
    /// User events buffered for a busy session.
    pub event_capacity: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        SessionLimits {
            queue_capacity: 64,
            event_capacity: 16,
        }
    }
}

pub struct SessionHandle {
    poll_id: PollId,
    events: mpsc::Sender<UserEvent>,
    task: JoinHandle<Result<(), SessionError>>,
}

impl SessionHandle {
    pub fn poll_id(&self) -> PollId {
        self.poll_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    async fn join(self, chat: ChatId) {
        match self.task.await {
            Ok(Ok(())) => info!("Session for chat {chat} finished"),
            Ok(Err(e)) => info!("Session for chat {chat} finished with error: {e}"),
            Err(e) => warn!("Session task for chat {chat} failed: {e}"),
        }
    }
}

pub struct SessionRegistry {
    transport: Arc<dyn ChatTransport>,
    api: Arc<dyn PollApi>,
    source: Arc<dyn QuestionSource>,
    limits: SessionLimits,
    sessions: HashMap<ChatId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        api: Arc<dyn PollApi>,
        source: Arc<dyn QuestionSource>,
        limits: SessionLimits,
    ) -> Self {
        SessionRegistry {
            transport,
            api,
            source,
            limits,
            sessions: HashMap::new(),
        }
    }

    /// Connect `chat` to `poll_id`: load the poll, greet the participant and
    /// start the listener and session tasks.
    pub async fn subscribe(&mut self, chat: ChatId, poll_id: PollId) -> Result<(), RegistryError> {
        if self.is_connected(chat).await {
            return Err(RegistryError::AlreadyConnected(chat));
        }

        let poll = self.api.fetch_poll(poll_id).await?;
        let session = Session::open(chat, poll, self.transport.clone(), self.api.clone()).await?;

        let (question_tx, question_rx) = mpsc::channel(self.limits.queue_capacity);
        let (event_tx, event_rx) = mpsc::channel(self.limits.event_capacity);
        let listener = ListenerHandle::spawn(self.source.clone(), poll_id, question_tx);
        let task = tokio::spawn(session.run(listener, question_rx, event_rx));

        self.sessions.insert(
            chat,
            SessionHandle {
                poll_id,
                events: event_tx,
                task,
            },
        );
        info!("Chat {chat} subscribed to poll {poll_id}");
        Ok(())
    }

    /// Route `event` to the live session of `chat`. Returns `false` when there
    /// is none.
    pub async fn dispatch(&mut self, chat: ChatId, event: UserEvent) -> bool {
        if !self.is_connected(chat).await {
            return false;
        }
        match self.sessions.get(&chat) {
            Some(handle) => handle.events.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Whether `chat` has a running session. Sessions that ended on their own
    /// are reaped here.
    pub async fn is_connected(&mut self, chat: ChatId) -> bool {
        let finished = match self.sessions.get(&chat) {
            Some(handle) => handle.is_finished(),
            None => return false,
        };
        if finished {
            if let Some(handle) = self.sessions.remove(&chat) {
                handle.join(chat).await;
            }
            return false;
        }
        true
    }

    /// End the session of `chat` and wait for its teardown. Returns `false` if
    /// there was nothing to end.
    pub async fn unsubscribe(&mut self, chat: ChatId) -> bool {
        let Some(handle) = self.sessions.remove(&chat) else {
            return false;
        };
        let live = !handle.is_finished();
        if live {
            // Fails only if the session ended in the meantime.
            let _ = handle.events.send(UserEvent::Exit).await;
        }
        handle.join(chat).await;
        live
    }

    pub async fn shutdown(&mut self) {
        let chats: Vec<ChatId> = self.sessions.keys().copied().collect();
        info!("Shutting down {} session(s)", chats.len());
        for chat in chats {
            self.unsubscribe(chat).await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn poll_of(&self, chat: ChatId) -> Option<PollId> {
        self.sessions.get(&chat).map(SessionHandle::poll_id)
    }
}
