// Answer sessions for live polls: push listener, per-participant queue and
// state machine, backend client and the entry flow that ties them to a chat.

pub mod api;
pub mod chat;
pub mod drafts;
pub mod keyboard;
pub mod listener;
pub mod queue;
pub mod registry;
pub mod router;
pub mod session;
