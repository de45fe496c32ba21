use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use message::{LocalId, Message, MessageId, UserRef, WireMessage};
pub use reconciler::{
    ConfirmOutcome, IgnoreReason, MessageStreamReconciler, PushOutcome, RollbackOutcome,
    ThreadChange,
};

mod message;
mod reconciler;

/// The active thread: the signed-in user and the selected peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conversation {
    pub me: String,
    pub peer: String,
}

impl Conversation {
    pub fn new(me: &str, peer: &str) -> Self {
        Self {
            me: me.to_string(),
            peer: peer.to_string(),
        }
    }

    /// True if the message was exchanged between the two participants, in either direction.
    pub fn includes(&self, message: &Message) -> bool {
        (message.sender_id == self.me && message.receiver_id == self.peer)
            || (message.sender_id == self.peer && message.receiver_id == self.me)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn presence_label(&self) -> String {
        if self.is_online {
            return "Online".to_string();
        }
        match self.last_seen {
            Some(seen) => format!("Last seen {}", seen.with_timezone(&Local).format("%H:%M:%S")),
            None => "Offline".to_string(),
        }
    }
}

/// Users the signed-in user can open a conversation with.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    users: Vec<User>,
    unread: HashMap<String, usize>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with a fresh listing, dropping the signed-in user if present.
    pub fn replace(&mut self, users: Vec<User>, me: &str) {
        self.users = users.into_iter().filter(|u| u.id != me).collect();
        let known: Vec<&str> = self.users.iter().map(|u| u.id.as_str()).collect();
        self.unread.retain(|id, _| known.contains(&id.as_str()));
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn by_index(&self, index: usize) -> Option<&User> {
        self.users.get(index)
    }

    /// Resolve a `/open` argument: exact id, then case-insensitive name, then 1-based index.
    pub fn find(&self, query: &str) -> Option<&User> {
        if let Some(user) = self.get(query) {
            return Some(user);
        }
        let lowered = query.to_lowercase();
        if let Some(user) = self.users.iter().find(|u| u.name.to_lowercase() == lowered) {
            return Some(user);
        }
        query
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.by_index(i))
    }

    /// Names starting with the given prefix (case-insensitive), online users first.
    pub fn matching_names(&self, prefix: &str) -> Vec<String> {
        let prefix_lower = prefix.to_lowercase();
        let mut matches: Vec<&User> = self
            .users
            .iter()
            .filter(|u| u.name.to_lowercase().starts_with(&prefix_lower))
            .collect();
        matches.sort_by(|a, b| b.is_online.cmp(&a.is_online));

        let mut names: Vec<String> = Vec::with_capacity(matches.len());
        for user in matches {
            if !names.contains(&user.name) {
                names.push(user.name.clone());
            }
        }
        names
    }

    pub fn mark_unread(&mut self, user_id: &str) {
        *self.unread.entry(user_id.to_string()).or_insert(0) += 1;
    }

    pub fn clear_unread(&mut self, user_id: &str) {
        self.unread.remove(user_id);
    }

    pub fn unread_count(&self, user_id: &str) -> usize {
        self.unread.get(user_id).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
