// ABOUTME: Adapts an axum WebSocket to session-core's framework-agnostic ClientTransport.
// ABOUTME: Binary frames carry raw PTY bytes; text frames carry resize/control JSON.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{stream::SplitSink, stream::SplitStream, SinkExt, StreamExt};
use session_core::{BridgeError, ClientFrame, ClientSink, ClientStream, ClientTransport};
use std::time::Duration;

pub struct AxumWsTransport {
    socket: WebSocket,
    write_timeout: Duration,
}

impl AxumWsTransport {
    pub fn new(socket: WebSocket, write_timeout: Duration) -> Self {
        Self {
            socket,
            write_timeout,
        }
    }
}

impl ClientTransport for AxumWsTransport {
    fn split(self: Box<Self>) -> (Box<dyn ClientSink>, Box<dyn ClientStream>) {
        let (sink, stream) = self.socket.split();
        (
            Box::new(AxumWsSink {
                sink,
                write_timeout: self.write_timeout,
            }),
            Box::new(AxumWsStream(stream)),
        )
    }
}

struct AxumWsSink {
    sink: SplitSink<WebSocket, Message>,
    write_timeout: Duration,
}

impl AxumWsSink {
    async fn send(&mut self, message: Message) -> Result<(), BridgeError> {
        tokio::time::timeout(self.write_timeout, self.sink.send(message))
            .await
            .map_err(|_| BridgeError::Transport("write to client timed out".into()))?
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }
}

#[async_trait::async_trait]
impl ClientSink for AxumWsSink {
    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), BridgeError> {
        self.send(Message::Binary(data.into())).await
    }

    async fn send_control(&mut self, payload: serde_json::Value) -> Result<(), BridgeError> {
        self.send(Message::Text(payload.to_string().into())).await
    }

    async fn send_ping(&mut self) -> Result<(), BridgeError> {
        self.send(Message::Ping(Vec::new().into())).await
    }

    async fn close(&mut self, reason: &str) -> Result<(), BridgeError> {
        let frame = axum::extract::ws::CloseFrame {
            code: axum::extract::ws::close_code::NORMAL,
            reason: reason.to_string().into(),
        };
        let _ = self.sink.send(Message::Close(Some(frame))).await;
        let _ = self.sink.close().await;
        Ok(())
    }
}

struct AxumWsStream(SplitStream<WebSocket>);

#[async_trait::async_trait]
impl ClientStream for AxumWsStream {
    async fn recv(&mut self) -> Result<Option<ClientFrame>, BridgeError> {
        loop {
            return match self.0.next().await {
                None => Ok(None),
                Some(Ok(Message::Binary(data))) => Ok(Some(ClientFrame::Binary(data.to_vec()))),
                Some(Ok(Message::Text(text))) => Ok(Some(ClientFrame::Text(text.to_string()))),
                Some(Ok(Message::Pong(_))) => Ok(Some(ClientFrame::Pong)),
                Some(Ok(Message::Ping(_))) => continue,
                Some(Ok(Message::Close(_))) => Ok(None),
                Some(Err(e)) => Err(BridgeError::Transport(e.to_string())),
            };
        }
    }
}
