use futures_util::{Sink, SinkExt, StreamExt};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::{ChannelEvent, ChannelHandle, Outgoing, Packet, JOIN, RECEIVE_MESSAGE};
use crate::chat::{Message, WireMessage};
use crate::error::ChannelError;

// Used until the server's handshake says otherwise.
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(45);

/// Socket.IO client for the chat backend's realtime channel.
pub struct SocketClient {
    url: String,
    user_id: String,
}

impl SocketClient {
    pub fn new(socket_url: &str, user_id: &str) -> Result<Self, ChannelError> {
        let base = socket_url
            .trim_end_matches('/')
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        let endpoint = format!("{}/socket.io/", base);
        let url = Url::parse_with_params(
            &endpoint,
            &[("EIO", "4"), ("transport", "websocket"), ("userId", user_id)],
        )
        .map_err(|e| ChannelError::Connect {
            url: endpoint.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            url: url.to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the websocket and spawn the socket task.
    ///
    /// Returns the emit handle and the stream of channel events. Dropping the
    /// receiver unsubscribes; the connection stays up until closed.
    pub async fn connect(
        self,
    ) -> Result<(ChannelHandle, mpsc::UnboundedReceiver<ChannelEvent>), ChannelError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| ChannelError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        info!(url = %self.url, "realtime channel connected");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ws_tx, ws_rx) = ws_stream.split();

        tokio::spawn(run_socket(ws_tx, ws_rx, out_rx, event_tx, self.user_id));

        Ok((ChannelHandle::new(out_tx), event_rx))
    }
}

async fn run_socket<S, R>(
    mut ws_tx: S,
    mut ws_rx: R,
    mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    user_id: String,
) where
    S: Sink<WsMessage> + Unpin,
    R: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut heartbeat = DEFAULT_HEARTBEAT;
    let mut deadline = Instant::now() + heartbeat;

    let reason = loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => break "connection closed".to_string(),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break e.to_string(),
                };

                let packet = match Packet::decode(&text) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("skipping frame: {}", e);
                        continue;
                    }
                };

                match packet {
                    Packet::Open(handshake) => {
                        if handshake.ping_interval > 0 {
                            heartbeat = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
                        }
                        deadline = Instant::now() + heartbeat;
                        debug!(sid = %handshake.sid, "engine open");
                        if !send_frame(&mut ws_tx, Packet::Connect { sid: None }.encode()).await {
                            break "write failed".to_string();
                        }
                    }
                    Packet::Ping => {
                        deadline = Instant::now() + heartbeat;
                        if !send_frame(&mut ws_tx, Packet::Pong.encode()).await {
                            break "write failed".to_string();
                        }
                    }
                    Packet::Connect { .. } => {
                        let join = Packet::event(JOIN, Value::String(user_id.clone()));
                        if !send_frame(&mut ws_tx, join.encode()).await {
                            break "write failed".to_string();
                        }
                        let _ = event_tx.send(ChannelEvent::Connected);
                    }
                    Packet::Event { name, args } if name == RECEIVE_MESSAGE => {
                        match args.into_iter().next().map(serde_json::from_value::<WireMessage>) {
                            Some(Ok(wire)) => {
                                let _ = event_tx.send(ChannelEvent::MessageReceived(Message::from(wire)));
                            }
                            Some(Err(e)) => warn!("malformed {} payload: {}", RECEIVE_MESSAGE, e),
                            None => warn!("{} without payload", RECEIVE_MESSAGE),
                        }
                    }
                    Packet::Event { name, .. } => debug!(event = %name, "unhandled event"),
                    Packet::ConnectError(message) => break message,
                    Packet::Disconnect | Packet::Close => break "server closed the session".to_string(),
                    Packet::Pong | Packet::Noop | Packet::Ack => {}
                }
            }
            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(Outgoing::Event { name, payload }) => {
                        let frame = Packet::event(&name, payload).encode();
                        if !send_frame(&mut ws_tx, frame).await {
                            break "write failed".to_string();
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = send_frame(&mut ws_tx, Packet::Disconnect.encode()).await;
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break "closed by client".to_string();
                    }
                }
            }
            _ = sleep_until(deadline) => {
                break "heartbeat timed out".to_string();
            }
        }
    };

    info!(%reason, "realtime channel disconnected");
    let _ = event_tx.send(ChannelEvent::Disconnected(reason));
}

async fn send_frame<S>(sink: &mut S, frame: String) -> bool
where
    S: Sink<WsMessage> + Unpin,
{
    sink.send(WsMessage::Text(frame)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_websocket_url_from_http_base() {
        let client = SocketClient::new("https://chat.example.com/", "u1").unwrap();
        assert_eq!(
            client.url(),
            "wss://chat.example.com/socket.io/?EIO=4&transport=websocket&userId=u1"
        );
        let local = SocketClient::new("http://localhost:5000", "u2").unwrap();
        assert!(local.url().starts_with("ws://localhost:5000/socket.io/"));
    }

    #[test]
    fn encodes_user_id_in_query() {
        let client = SocketClient::new("http://localhost:5000", "a b&c=d").unwrap();
        assert!(client.url().ends_with("&userId=a+b%26c%3Dd"));
    }

    #[test]
    fn rejects_unparseable_base() {
        assert!(matches!(
            SocketClient::new("not a url", "u1"),
            Err(ChannelError::Connect { .. })
        ));
    }
}
