// Entry flow: turns chat input into connect/cancel/exit decisions and forwards
// everything else to the participant's live session.

use std::collections::HashMap;
use std::sync::Arc;

use livepoll_core::PollId;
use tracing::{debug, warn};

use crate::chat::{ChatId, ChatTransport};
use crate::keyboard::Action;
use crate::registry::SessionRegistry;
use crate::session::UserEvent;

pub const CODE_PROMPT_TEXT: &str =
    "Please send me connection code.\nType /cancel to cancel connection";
pub const INCORRECT_CODE_TEXT: &str =
    "Connection code is incorrect.\nTry again or type /cancel to cancel connection.";
pub const CANCELED_TEXT: &str = "Operation canceled. Send me /start to try again.";
pub const CONNECT_FAILED_TEXT: &str =
    "Failed to connect to the presentation. Send me /start to try again.";

/// One piece of participant input as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command { name: String, args: String },
    Text(String),
    Pressed(Action),
}

impl Inbound {
    /// `/name args` becomes a command; anything else is text.
    pub fn from_text(text: &str) -> Self {
        match text.strip_prefix('/') {
            Some(rest) if !rest.is_empty() && !rest.starts_with(char::is_whitespace) => {
                let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                Inbound::Command {
                    name: name.to_string(),
                    args: args.trim().to_string(),
                }
            }
            _ => Inbound::Text(text.to_string()),
        }
    }
}

/// Where a chat without a session is in the connect flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryState {
    #[default]
    Idle,
    WaitCode,
}

pub struct Router {
    transport: Arc<dyn ChatTransport>,
    registry: SessionRegistry,
    entry: HashMap<ChatId, EntryState>,
}

impl Router {
    pub fn new(transport: Arc<dyn ChatTransport>, registry: SessionRegistry) -> Self {
        Router {
            transport,
            registry,
            entry: HashMap::new(),
        }
    }

    pub fn registry(&mut self) -> &mut SessionRegistry {
        &mut self.registry
    }

    pub fn entry_state(&self, chat: ChatId) -> EntryState {
        self.entry.get(&chat).copied().unwrap_or_default()
    }

    pub async fn handle(&mut self, chat: ChatId, inbound: Inbound) {
        if self.registry.is_connected(chat).await {
            self.in_session(chat, inbound).await;
            return;
        }

        match (self.entry_state(chat), inbound) {
            (_, Inbound::Command { name, args }) if name == "start" => {
                if args.is_empty() {
                    self.entry.insert(chat, EntryState::WaitCode);
                    self.reply(chat, CODE_PROMPT_TEXT).await;
                } else {
                    self.connect(chat, &args).await;
                }
            }
            (EntryState::WaitCode, Inbound::Command { name, .. }) if name == "cancel" => {
                self.entry.remove(&chat);
                self.reply(chat, CANCELED_TEXT).await;
            }
            (EntryState::WaitCode, Inbound::Text(code)) => self.connect(chat, &code).await,
            (state, inbound) => debug!(%chat, ?state, ?inbound, "ignoring input outside a session"),
        }
    }

    async fn in_session(&mut self, chat: ChatId, inbound: Inbound) {
        let event = match inbound {
            Inbound::Command { name, .. } if name == "exit" => UserEvent::Exit,
            Inbound::Pressed(Action::Exit) => UserEvent::Exit,
            Inbound::Command { name, .. } => {
                debug!(%chat, command = %name, "ignoring command during session");
                return;
            }
            Inbound::Text(text) => UserEvent::Text(text),
            Inbound::Pressed(action) => UserEvent::Pressed(action),
        };

        if event == UserEvent::Exit {
            self.registry.unsubscribe(chat).await;
        } else if !self.registry.dispatch(chat, event).await {
            debug!(%chat, "session ended before the event was delivered");
        }
    }

    async fn connect(&mut self, chat: ChatId, code: &str) {
        let Ok(poll_id) = code.parse::<PollId>() else {
            self.reply(chat, INCORRECT_CODE_TEXT).await;
            return;
        };
        self.entry.remove(&chat);
        if let Err(e) = self.registry.subscribe(chat, poll_id).await {
            warn!("Chat {chat} failed to connect to poll {poll_id}: {e}");
            self.reply(chat, CONNECT_FAILED_TEXT).await;
        }
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.transport.send(chat, text, None).await {
            warn!("Failed to reply in chat {chat}: {e}");
        }
    }

    /// End every live session.
    pub async fn shutdown(&mut self) {
        self.registry.shutdown().await;
        self.entry.clear();
    }
}
