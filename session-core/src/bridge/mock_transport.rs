// ABOUTME: In-memory ClientTransport for exercising the bridge without a real WebSocket.
// ABOUTME: Used by session-core's own tests; the axum adapter lives in the root crate.

use super::{ClientFrame, ClientSink, ClientStream, ClientTransport};
use crate::error::BridgeError;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug)]
pub enum ServerEvent {
    Binary(Vec<u8>),
    Control(serde_json::Value),
    Ping,
    Close(String),
}

/// Server-side half, handed to `bridge::run`.
pub struct ChannelTransport {
    inbound: mpsc::Receiver<ClientFrame>,
    outbound: mpsc::Sender<ServerEvent>,
}

/// Test-driver half: feeds client frames in, observes server events out.
pub struct ChannelClient {
    inbound: mpsc::Sender<ClientFrame>,
    outbound: Mutex<mpsc::Receiver<ServerEvent>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, ChannelClient) {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, out_rx) = mpsc::channel(64);
        (
            Self {
                inbound: in_rx,
                outbound: out_tx,
            },
            ChannelClient {
                inbound: in_tx,
                outbound: Mutex::new(out_rx),
            },
        )
    }
}

impl ChannelClient {
    pub async fn send_binary(&self, data: Vec<u8>) {
        let _ = self.inbound.send(ClientFrame::Binary(data)).await;
    }

    pub async fn send_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(ClientFrame::Text(text.into())).await;
    }

    /// Drains non-binary events until a binary frame arrives, or the transport closes.
    pub async fn recv_binary(&self) -> Option<Vec<u8>> {
        let mut outbound = self.outbound.lock().await;
        loop {
            match outbound.recv().await {
                Some(ServerEvent::Binary(data)) => return Some(data),
                Some(_) => continue,
                None => return None,
            }
        }
    }

    pub async fn recv_event(&self) -> Option<ServerEvent> {
        self.outbound.lock().await.recv().await
    }
}

struct ChannelSink(mpsc::Sender<ServerEvent>);

#[async_trait::async_trait]
impl ClientSink for ChannelSink {
    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), BridgeError> {
        self.0
            .send(ServerEvent::Binary(data))
            .await
            .map_err(|_| BridgeError::Transport("channel closed".into()))
    }

    async fn send_control(&mut self, payload: serde_json::Value) -> Result<(), BridgeError> {
        self.0
            .send(ServerEvent::Control(payload))
            .await
            .map_err(|_| BridgeError::Transport("channel closed".into()))
    }

    async fn send_ping(&mut self) -> Result<(), BridgeError> {
        self.0
            .send(ServerEvent::Ping)
            .await
            .map_err(|_| BridgeError::Transport("channel closed".into()))
    }

    async fn close(&mut self, reason: &str) -> Result<(), BridgeError> {
        let _ = self.0.send(ServerEvent::Close(reason.to_string())).await;
        Ok(())
    }
}

struct ChannelStream(mpsc::Receiver<ClientFrame>);

#[async_trait::async_trait]
impl ClientStream for ChannelStream {
    async fn recv(&mut self) -> Result<Option<ClientFrame>, BridgeError> {
        Ok(self.0.recv().await)
    }
}

impl ClientTransport for ChannelTransport {
    fn split(self: Box<Self>) -> (Box<dyn ClientSink>, Box<dyn ClientStream>) {
        let this = *self;
        (
            Box::new(ChannelSink(this.outbound)),
            Box::new(ChannelStream(this.inbound)),
        )
    }
}
