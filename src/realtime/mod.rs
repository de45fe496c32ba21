use serde_json::Value;
use tokio::sync::mpsc;

use crate::chat::Message;
use crate::error::ChannelError;

pub use client::SocketClient;
pub use packet::{Handshake, Packet};

mod client;
pub mod packet;

/// Event names owned by the chat backend.
pub const JOIN: &str = "join";
pub const RECEIVE_MESSAGE: &str = "receiveMessage";
pub const SEND_MESSAGE: &str = "sendMessage";

/// What the realtime channel reports to the app.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    MessageReceived(Message),
    Disconnected(String),
}

/// Request queued for the socket writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Event { name: String, payload: Value },
    Close,
}

/// Emit side of the channel. Cheap to clone; the socket task exits once
/// every handle is gone or `close` is called.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl ChannelHandle {
    pub fn new(tx: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, name: &str, payload: Value) -> Result<(), ChannelError> {
        self.tx
            .send(Outgoing::Event {
                name: name.to_string(),
                payload,
            })
            .map_err(|_| ChannelError::Closed)
    }

    /// Best-effort broadcast of a confirmed message.
    ///
    /// The payload is the stored message plus flat `senderId`/`receiverId`
    /// fields, which the server uses to route the event to the peer's room.
    pub fn emit_send(&self, message: &Message) -> Result<(), ChannelError> {
        let wire = message.to_wire().ok_or_else(|| {
            ChannelError::Protocol(format!("message {} is not confirmed", message.id))
        })?;
        let mut payload =
            serde_json::to_value(wire).map_err(|e| ChannelError::Protocol(e.to_string()))?;
        if let Value::Object(map) = &mut payload {
            map.insert("senderId".to_string(), Value::String(message.sender_id.clone()));
            map.insert("receiverId".to_string(), Value::String(message.receiver_id.clone()));
        }
        self.emit(SEND_MESSAGE, payload)
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}
