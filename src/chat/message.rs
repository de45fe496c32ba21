use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Client-side id of a message the server has not accepted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(u64);

impl LocalId {
    /// Issue a fresh id. Ids are never reused for the lifetime of the process.
    pub fn next() -> Self {
        Self(NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Effective identity of a message: the server id once confirmed, the local id before.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Local(LocalId),
    Server(String),
}

impl MessageId {
    pub fn is_server(&self) -> bool {
        matches!(self, MessageId::Server(_))
    }

    pub fn as_server(&self) -> Option<&str> {
        match self {
            MessageId::Server(id) => Some(id),
            MessageId::Local(_) => None,
        }
    }

    pub fn as_local(&self) -> Option<LocalId> {
        match self {
            MessageId::Local(id) => Some(*id),
            MessageId::Server(_) => None,
        }
    }
}

impl From<LocalId> for MessageId {
    fn from(id: LocalId) -> Self {
        MessageId::Local(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Local(id) => fmt::Display::fmt(id, f),
            MessageId::Server(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Message {
    /// Optimistic placeholder for a message the local user is sending right now.
    pub fn pending(id: LocalId, sender_id: &str, receiver_id: &str, body: &str) -> Self {
        Self {
            id: MessageId::Local(id),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            is_read: false,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.id.is_server()
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }

    pub fn time_label(&self) -> String {
        self.created_at.with_timezone(&Local).format("%H:%M").to_string()
    }

    /// Wire form of a confirmed message. Pending messages have no wire form.
    pub fn to_wire(&self) -> Option<WireMessage> {
        let id = self.id.as_server()?;
        Some(WireMessage {
            id: id.to_string(),
            sender: UserRef::Id(self.sender_id.clone()),
            receiver: UserRef::Id(self.receiver_id.clone()),
            message: self.body.clone(),
            created_at: self.created_at,
            is_read: self.is_read,
        })
    }
}

/// A participant reference as the backend sends it: either a bare id or a
/// populated `{ _id, name }` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Populated {
        #[serde(rename = "_id")]
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Id(String),
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            UserRef::Populated { id, .. } => id,
            UserRef::Id(id) => id,
        }
    }
}

/// Message as serialized by the chat backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender: UserRef,
    pub receiver: UserRef,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Self {
            id: MessageId::Server(wire.id),
            sender_id: wire.sender.id().to_string(),
            receiver_id: wire.receiver.id().to_string(),
            body: wire.message,
            created_at: wire.created_at,
            is_read: wire.is_read,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_are_strictly_increasing() {
        let a = LocalId::next();
        let b = LocalId::next();
        assert!(b > a);
        assert_ne!(MessageId::from(a), MessageId::from(b));
    }

    #[test]
    fn decodes_populated_participants() {
        let json = r#"{
            "_id": "665f",
            "sender": {"_id": "u1", "name": "Ada"},
            "receiver": {"_id": "u2", "name": "Bob"},
            "message": "hello",
            "createdAt": "2024-06-04T10:15:30.000Z",
            "isRead": true,
            "__v": 0
        }"#;
        let message: Message = serde_json::from_str::<WireMessage>(json).unwrap().into();
        assert_eq!(message.id, MessageId::Server("665f".into()));
        assert_eq!(message.sender_id, "u1");
        assert_eq!(message.receiver_id, "u2");
        assert!(message.is_read);
        assert!(message.is_confirmed());
    }

    #[test]
    fn decodes_bare_participant_ids() {
        let json = r#"{"_id":"m9","sender":"u2","receiver":"u1","message":"yo","createdAt":"2024-06-04T10:15:30Z"}"#;
        let message: Message = serde_json::from_str::<WireMessage>(json).unwrap().into();
        assert_eq!(message.sender_id, "u2");
        assert!(!message.is_read);
    }

    #[test]
    fn pending_messages_have_no_wire_form() {
        let message = Message::pending(LocalId::next(), "u1", "u2", "hi");
        assert!(!message.is_confirmed());
        assert!(message.to_wire().is_none());
    }
}
