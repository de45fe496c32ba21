//! Text frame codec for Socket.IO v4 on the Engine.IO v4 websocket transport.
//!
//! A frame is one Engine.IO packet: a type digit followed by data. Socket.IO
//! packets travel inside Engine.IO `message` (4) packets, so an event on the
//! default namespace looks like `42["receiveMessage",{...}]`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ChannelError;

/// Engine.IO `open` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    // Engine.IO
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    // Socket.IO, default namespace
    Connect { sid: Option<String> },
    Disconnect,
    Event { name: String, args: Vec<Value> },
    Ack,
    ConnectError(String),
}

impl Packet {
    pub fn event(name: &str, payload: Value) -> Self {
        Packet::Event {
            name: name.to_string(),
            args: vec![payload],
        }
    }

    /// Encode a client-originated packet as a text frame.
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(_) => "0".to_string(),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect { .. } => "40".to_string(),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!("42{}", Value::Array(items))
            }
            Packet::Ack => "43[]".to_string(),
            Packet::ConnectError(message) => {
                format!("44{}", serde_json::json!({ "message": message }))
            }
        }
    }

    pub fn decode(frame: &str) -> Result<Self, ChannelError> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ChannelError::Protocol("empty frame".to_string()))?;
        let data = chars.as_str();

        match kind {
            '0' => serde_json::from_str(data)
                .map(Packet::Open)
                .map_err(|e| ChannelError::Protocol(format!("bad handshake: {}", e))),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket(data),
            '6' => Ok(Packet::Noop),
            other => Err(ChannelError::Protocol(format!(
                "unsupported engine packet type {:?}",
                other
            ))),
        }
    }
}

fn decode_socket(data: &str) -> Result<Packet, ChannelError> {
    let mut chars = data.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ChannelError::Protocol("empty socket packet".to_string()))?;
    let mut rest = chars.as_str();

    if rest.starts_with('/') {
        let (namespace, tail) = rest.split_once(',').unwrap_or((rest, ""));
        if namespace != "/" {
            return Err(ChannelError::Protocol(format!(
                "unexpected namespace {}",
                namespace
            )));
        }
        rest = tail;
    }

    // Optional ack id.
    let payload = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        '0' => {
            let sid = if payload.is_empty() {
                None
            } else {
                let value: Value = parse_json(payload)?;
                value.get("sid").and_then(Value::as_str).map(str::to_string)
            };
            Ok(Packet::Connect { sid })
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let value: Value = parse_json(payload)?;
            let Value::Array(mut items) = value else {
                return Err(ChannelError::Protocol("event payload is not an array".to_string()));
            };
            if items.is_empty() {
                return Err(ChannelError::Protocol("event without a name".to_string()));
            }
            let Value::String(name) = items.remove(0) else {
                return Err(ChannelError::Protocol("event name is not a string".to_string()));
            };
            Ok(Packet::Event { name, args: items })
        }
        '3' => Ok(Packet::Ack),
        '4' => {
            let message = match parse_json(payload) {
                Ok(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connection refused")
                    .to_string(),
                Ok(Value::String(s)) => s,
                _ => payload.to_string(),
            };
            Ok(Packet::ConnectError(message))
        }
        other => Err(ChannelError::Protocol(format!(
            "unsupported socket packet type {:?}",
            other
        ))),
    }
}

fn parse_json(payload: &str) -> Result<Value, ChannelError> {
    serde_json::from_str(payload).map_err(|e| ChannelError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_handshake() {
        let frame = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        match Packet::decode(frame).unwrap() {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(handshake.ping_interval, 25000);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn decodes_event_with_ack_id() {
        let packet = Packet::decode(r#"4212["receiveMessage",{"_id":"m1"}]"#).unwrap();
        assert_eq!(packet, Packet::event("receiveMessage", json!({"_id": "m1"})));
    }

    #[test]
    fn encodes_event() {
        let frame = Packet::event("join", json!("u1")).encode();
        assert_eq!(frame, r#"42["join","u1"]"#);
    }

    #[test]
    fn rejects_other_namespaces() {
        assert!(Packet::decode(r#"42/admin,["x"]"#).is_err());
        assert_eq!(
            Packet::decode(r#"40/,{"sid":"abc"}"#).unwrap(),
            Packet::Connect { sid: Some("abc".into()) }
        );
    }
}
