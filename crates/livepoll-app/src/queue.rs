// Per-session queue of questions that have been pushed but not presented.

use std::collections::{HashSet, VecDeque};

use livepoll_core::{Question, QuestionId};

/// Outcome of offering a pushed question to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Already delivered to this session; dropped.
    Duplicate,
    /// Same id as the question being answered; nothing queued.
    Active,
    /// Appended to the queue. `preempts` is set when another question is
    /// being answered, i.e. the participant should be told the queue changed.
    Queued { preempts: bool },
}

/// Ordered buffer of pending questions plus the set of ids ever delivered.
///
/// An id enters the delivered set the first time it is offered and stays
/// there until `release`d, so each question reaches the session at most once.
#[derive(Debug, Default)]
pub struct SessionQueue {
    pending: VecDeque<Question>,
    delivered: HashSet<QuestionId>,
}

impl SessionQueue {
    pub fn new() -> Self {
        SessionQueue::default()
    }

    pub fn offer(&mut self, question: Question, active: Option<QuestionId>) -> Arrival {
        let id = question.id();
        if !self.delivered.insert(id) {
            return Arrival::Duplicate;
        }
        match active {
            Some(active) if active == id => Arrival::Active,
            Some(_) => {
                self.pending.push_back(question);
                Arrival::Queued { preempts: true }
            }
            None => {
                self.pending.push_back(question);
                Arrival::Queued { preempts: false }
            }
        }
    }

    pub fn pop(&mut self) -> Option<Question> {
        self.pending.pop_front()
    }

    /// Forget that `id` was delivered so a later push queues it again.
    pub fn release(&mut self, id: QuestionId) -> bool {
        self.delivered.remove(&id)
    }

    pub fn was_delivered(&self, id: QuestionId) -> bool {
        self.delivered.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_ids(&self) -> impl Iterator<Item = QuestionId> + '_ {
        self.pending.iter().map(Question::id)
    }
}
