// Chat transport contract consumed by the answer session.
//
// The session only shows, edits and deletes messages. Rendering of text and
// buttons is up to the transport.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::keyboard::Keyboard;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message {0} no longer exists")]
    MessageGone(MessageHandle),

    #[error("message was not modified")]
    NotModified,

    #[error("chat transport error: {0}")]
    Transport(String),
}

/// Conversation with one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle to a message previously shown by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub chat: ChatId,
    pub id: i64,
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat, self.id)
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Show a new message, optionally with a choice set attached.
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageHandle, ChatError>;

    /// Replace the text and choice set of an existing message.
    async fn edit(
        &self,
        message: MessageHandle,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChatError>;

    async fn delete(&self, message: MessageHandle) -> Result<(), ChatError>;
}
