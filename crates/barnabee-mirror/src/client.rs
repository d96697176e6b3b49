//! Connection handling for the home-automation websocket (spec.md §4.3
//! "Connection protocol"). One connection, authenticated once, then a
//! bulk fetch followed by an event subscription. tokio-tungstenite is not
//! part of the teacher's stack; it's the obvious crate for a raw
//! authenticate-then-subscribe websocket protocol like this one, the same
//! role other_examples' agent backends give it for their own event streams.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{MirrorError, MirrorResult};
use crate::protocol::{InboundMessage, OutboundMessage};

pub struct Connection {
    socket: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    next_id: u64,
}

impl Connection {
    /// Opens the socket and completes the auth handshake. Returns once
    /// `auth_ok` has been received; any other response is an error.
    pub async fn connect(ws_url: &str, access_token: &str) -> MirrorResult<Self> {
        let (socket, _response) = connect_async(ws_url).await?;
        let mut conn = Self { socket, next_id: 1 };

        match conn.recv().await? {
            InboundMessage::AuthRequired { .. } => {}
            other => return Err(MirrorError::Protocol(format!("expected auth_required, got {other:?}"))),
        }

        conn.send(&OutboundMessage::Auth { access_token: access_token.to_string() }).await?;

        match conn.recv().await? {
            InboundMessage::AuthOk { .. } => Ok(conn),
            InboundMessage::AuthInvalid { .. } => Err(MirrorError::AuthRejected),
            other => Err(MirrorError::Protocol(format!("expected auth_ok, got {other:?}"))),
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn send(&mut self, msg: &OutboundMessage) -> MirrorResult<()> {
        let text = serde_json::to_string(msg).map_err(|e| MirrorError::Protocol(e.to_string()))?;
        self.socket.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> MirrorResult<InboundMessage> {
        loop {
            let msg = self
                .socket
                .next()
                .await
                .ok_or_else(|| MirrorError::Protocol("connection closed".into()))??;
            match msg {
                Message::Text(text) => {
                    return serde_json::from_str(&text).map_err(|e| MirrorError::Protocol(e.to_string()));
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => return Err(MirrorError::Protocol("connection closed by peer".into())),
                _ => continue,
            }
        }
    }

    /// One-shot request/response pair: sends `get_states` and waits for the
    /// matching `result` message.
    pub async fn bulk_fetch(&mut self) -> MirrorResult<Vec<crate::protocol::RawState>> {
        let id = self.allocate_id();
        self.send(&OutboundMessage::GetStates { id }).await?;
        loop {
            match self.recv().await? {
                InboundMessage::Result { id: rid, success, result, error } if rid == id => {
                    if !success {
                        let err = error.map(|e| e.message).unwrap_or_default();
                        return Err(MirrorError::Protocol(format!("get_states failed: {err}")));
                    }
                    let value = result.ok_or_else(|| MirrorError::Protocol("get_states missing result".into()))?;
                    return serde_json::from_value(value).map_err(|e| MirrorError::Protocol(e.to_string()));
                }
                _ => continue,
            }
        }
    }

    pub async fn subscribe_state_changed(&mut self) -> MirrorResult<()> {
        let id = self.allocate_id();
        self.send(&OutboundMessage::SubscribeEvents { id, event_type: "state_changed" }).await?;
        match self.recv().await? {
            InboundMessage::Result { id: rid, success: true, .. } if rid == id => Ok(()),
            other => Err(MirrorError::Protocol(format!("subscribe_events rejected: {other:?}"))),
        }
    }

    /// Blocks until the next `state_changed` event arrives, skipping any
    /// unrelated frames (pings, stray results).
    pub async fn next_state_changed(&mut self) -> MirrorResult<crate::protocol::StateChangedData> {
        loop {
            match self.recv().await? {
                InboundMessage::Event { event, .. } if event.event_type == "state_changed" => {
                    return Ok(event.data);
                }
                _ => continue,
            }
        }
    }

    pub async fn call_service(&mut self, domain: &str, service: &str, target: serde_json::Value, data: serde_json::Value) -> MirrorResult<()> {
        let id = self.allocate_id();
        self.send(&OutboundMessage::CallService {
            id,
            domain: domain.to_string(),
            service: service.to_string(),
            target,
            service_data: data,
        })
        .await?;
        match self.recv().await? {
            InboundMessage::Result { id: rid, success: true, .. } if rid == id => Ok(()),
            InboundMessage::Result { id: rid, success: false, error, .. } if rid == id => {
                Err(MirrorError::Protocol(error.map(|e| e.message).unwrap_or_else(|| "call_service failed".into())))
            }
            other => Err(MirrorError::Protocol(format!("unexpected call_service reply: {other:?}"))),
        }
    }
}
