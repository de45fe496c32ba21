//! Message list for the open conversation.
//!
//! Three sources feed the thread: the history fetch when a conversation is
//! opened, the local user's sends, and pushes from the realtime channel. The
//! reconciler merges them into one ordered list in which every message
//! appears once under its effective identity, and walks each outgoing message
//! through `Pending -> Confirmed` or `Pending -> Removed`.
//!
//! Every call runs to completion on the caller's event loop; there is no
//! internal locking.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{Conversation, LocalId, Message, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No conversation is open.
    NoConversation,
    /// The message belongs to a thread that is not open.
    OtherConversation,
    /// A message with the same identity is already in the list.
    Duplicate,
    /// Pushes must carry a server id.
    Unconfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Applied,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    RolledBack,
    NotFound,
}

/// Emitted to the presentation layer after every mutation of the list.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadChange {
    Reset { len: usize },
    Appended { id: MessageId },
    Replaced { position: usize, old: MessageId, new: MessageId },
    Removed { id: MessageId },
}

#[derive(Debug, Default)]
pub struct MessageStreamReconciler {
    conversation: Option<Conversation>,
    messages: Vec<Message>,
    /// Effective identity -> position in `messages`.
    index: HashMap<MessageId, usize>,
    notify: Option<mpsc::UnboundedSender<ThreadChange>>,
}

impl MessageStreamReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciler that reports every change on the given channel. The app
    /// uses it to keep the scroll position steady.
    pub fn with_notifier(notify: mpsc::UnboundedSender<ThreadChange>) -> Self {
        Self {
            notify: Some(notify),
            ..Self::default()
        }
    }

    /// Switch to a new conversation. The previous thread is discarded, not merged.
    pub fn open(&mut self, conversation: Conversation) {
        debug!(peer = %conversation.peer, "opening conversation");
        self.conversation = Some(conversation);
        self.messages.clear();
        self.index.clear();
        self.emit(ThreadChange::Reset { len: 0 });
    }

    /// Leave the current conversation without opening another one.
    pub fn close(&mut self) {
        self.conversation = None;
        self.messages.clear();
        self.index.clear();
        self.emit(ThreadChange::Reset { len: 0 });
    }

    /// Replace the thread with a fetched history, kept in the order given.
    ///
    /// The caller must only pass a history fetched for the conversation that
    /// is currently open; stale fetch results are not detected here.
    pub fn reset(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.index.clear();
        for (position, message) in self.messages.iter().enumerate() {
            self.index.entry(message.id.clone()).or_insert(position);
        }
        let len = self.messages.len();
        debug!(len, "thread reset from history");
        self.emit(ThreadChange::Reset { len });
    }

    /// Apply a message delivered by the realtime channel.
    ///
    /// Messages outside the open conversation and messages already present
    /// (by identity, not content) are ignored. An in-flight optimistic entry
    /// is never touched by a push.
    pub fn apply_remote_push(&mut self, message: Message) -> PushOutcome {
        let Some(conversation) = &self.conversation else {
            return PushOutcome::Ignored(IgnoreReason::NoConversation);
        };
        if !conversation.includes(&message) {
            trace!(id = %message.id, "push for another conversation");
            return PushOutcome::Ignored(IgnoreReason::OtherConversation);
        }
        if !message.id.is_server() {
            return PushOutcome::Ignored(IgnoreReason::Unconfirmed);
        }
        if self.index.contains_key(&message.id) {
            debug!(id = %message.id, "duplicate push suppressed");
            return PushOutcome::Ignored(IgnoreReason::Duplicate);
        }

        let id = message.id.clone();
        self.push_tail(message);
        self.emit(ThreadChange::Appended { id });
        PushOutcome::Applied
    }

    /// Append an unconfirmed entry for `body` and return its local id.
    ///
    /// Returns `None` when no conversation is open. The caller is expected to
    /// have rejected empty bodies already.
    pub fn begin_optimistic_send(&mut self, body: &str) -> Option<LocalId> {
        let conversation = self.conversation.as_ref()?;
        let local_id = LocalId::next();
        let message = Message::pending(local_id, &conversation.me, &conversation.peer, body);
        self.push_tail(message);
        self.emit(ThreadChange::Appended {
            id: MessageId::Local(local_id),
        });
        Some(local_id)
    }

    /// Promote the placeholder `local_id` to the server's copy, in place.
    ///
    /// If the channel already delivered the server copy, the placeholder is
    /// dropped instead so the thread never shows the message twice.
    ///
    /// A server copy without a server id, or addressed outside the open
    /// conversation, is refused with `NotFound` and the placeholder is left
    /// for the caller to roll back.
    pub fn confirm_send(&mut self, local_id: LocalId, server_message: Message) -> ConfirmOutcome {
        let local_key = MessageId::Local(local_id);
        let Some(position) = self.index.get(&local_key).copied() else {
            debug!(%local_id, "confirmation for a message no longer in the thread");
            return ConfirmOutcome::NotFound;
        };
        let belongs = self
            .conversation
            .as_ref()
            .is_some_and(|c| c.includes(&server_message));
        if !server_message.id.is_server() || !belongs {
            warn!(%local_id, id = %server_message.id, "refusing confirmation that does not fit the thread");
            return ConfirmOutcome::NotFound;
        }

        if self.index.contains_key(&server_message.id) {
            debug!(%local_id, id = %server_message.id, "push arrived before confirmation");
            self.remove_at(position);
            self.emit(ThreadChange::Removed { id: local_key });
            return ConfirmOutcome::Confirmed;
        }

        let new_id = server_message.id.clone();
        self.index.remove(&local_key);
        self.index.insert(new_id.clone(), position);
        self.messages[position] = server_message;
        self.emit(ThreadChange::Replaced {
            position,
            old: local_key,
            new: new_id,
        });
        ConfirmOutcome::Confirmed
    }

    /// Roll back the placeholder `local_id` after the send failed.
    pub fn fail_send(&mut self, local_id: LocalId) -> RollbackOutcome {
        let key = MessageId::Local(local_id);
        match self.index.get(&key).copied() {
            Some(position) => {
                self.remove_at(position);
                self.emit(ThreadChange::Removed { id: key });
                RollbackOutcome::RolledBack
            }
            None => RollbackOutcome::NotFound,
        }
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.position(id).map(|position| &self.messages[position])
    }

    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_confirmed()).count()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push_tail(&mut self, message: Message) {
        self.index.insert(message.id.clone(), self.messages.len());
        self.messages.push(message);
    }

    fn remove_at(&mut self, position: usize) {
        let removed = self.messages.remove(position);
        self.index.remove(&removed.id);
        for (offset, message) in self.messages[position..].iter().enumerate() {
            self.index.insert(message.id.clone(), position + offset);
        }
    }

    fn emit(&self, change: ThreadChange) {
        if let Some(tx) = &self.notify {
            let _ = tx.send(change);
        }
    }
}
