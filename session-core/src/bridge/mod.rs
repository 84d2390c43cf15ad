// ABOUTME: The four-worker PTY<->client pump: client->PTY, PTY->queue, queue->client, exit-watch.
// ABOUTME: First worker to return cancels the others; the first *error* is the bridge's result.

pub mod mock_transport;

use crate::error::BridgeError;
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Bytes consumed from the PTY per read (spec: 32 KiB).
const PTY_READ_BUFFER: usize = 32 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct BridgeTunables {
    pub max_frame_bytes: usize,
    pub max_coalesce_wait: Duration,
    pub out_queue_capacity: usize,
}

impl Default for BridgeTunables {
    fn default() -> Self {
        Self {
            max_frame_bytes: 4096,
            max_coalesce_wait: Duration::from_millis(10),
            out_queue_capacity: 1024,
        }
    }
}

/// A frame received from the client over the upgraded connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Binary(Vec<u8>),
    Text(String),
    /// Keepalive reply to a server-sent ping.
    Pong,
}

/// The read half of a client transport.
#[async_trait::async_trait]
pub trait ClientStream: Send {
    /// `Ok(None)` signals a clean close (EOF on the transport).
    async fn recv(&mut self) -> Result<Option<ClientFrame>, BridgeError>;
}

/// The write half of a client transport.
#[async_trait::async_trait]
pub trait ClientSink: Send {
    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), BridgeError>;
    async fn send_control(&mut self, payload: serde_json::Value) -> Result<(), BridgeError>;
    async fn send_ping(&mut self) -> Result<(), BridgeError>;
    async fn close(&mut self, reason: &str) -> Result<(), BridgeError>;
}

/// A framed, full-duplex client connection the bridge can be run over.
///
/// Concrete transports (e.g. an axum WebSocket) implement this and hand the
/// bridge their split sink/stream halves; the bridge never depends on a
/// specific HTTP/WS framework.
pub trait ClientTransport: Send {
    fn split(self: Box<Self>) -> (Box<dyn ClientSink>, Box<dyn ClientStream>);
}

#[derive(serde::Deserialize)]
struct ResizeMessage {
    #[serde(default, rename = "type")]
    #[allow(dead_code)]
    kind: Option<String>,
    cols: i64,
    rows: i64,
}

/// Owns the tunables for one attach; stateless otherwise — `run` is called
/// once per client connection with a fresh session handle and transport.
#[derive(Debug, Clone, Copy)]
pub struct Bridge {
    pub tunables: BridgeTunables,
    pub ping_interval: Duration,
    pub read_timeout: Duration,
}

impl Bridge {
    pub fn new(tunables: BridgeTunables, ping_interval: Duration, read_timeout: Duration) -> Self {
        Self {
            tunables,
            ping_interval,
            read_timeout,
        }
    }

    /// Runs the bridge to completion: starts the session if needed, attaches,
    /// pumps bytes in both directions until client disconnect, PTY exit, external
    /// cancellation, or a fatal pump error, then closes the session.
    ///
    /// Mirrors the spec's bridge state machine (Idle -> Running -> Draining ->
    /// Closed) implicitly: this call *is* Running once the four workers are
    /// spawned, Draining once the first of them returns, and the caller observes
    /// Closed once this call returns.
    pub async fn run(
        &self,
        session: Arc<Session>,
        transport: Box<dyn ClientTransport>,
    ) -> Result<(), BridgeError> {
        run(session, transport, self.tunables, self.ping_interval, self.read_timeout).await
    }
}

async fn run(
    session: Arc<Session>,
    transport: Box<dyn ClientTransport>,
    tunables: BridgeTunables,
    ping_interval: Duration,
    read_timeout: Duration,
) -> Result<(), BridgeError> {
    session.start().await?;
    let attached = session.attach().await?;

    let (sink, stream) = transport.split();
    let sink = Arc::new(Mutex::new(sink));

    let bridge_cancel = session.cancellation().child_token();
    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(tunables.out_queue_capacity);

    let mut workers = JoinSet::new();
    workers.spawn(client_to_pty(
        stream,
        attached.writer,
        session.clone(),
        bridge_cancel.clone(),
        read_timeout,
    ));
    workers.spawn(pty_to_queue(
        attached.reader,
        out_tx,
        bridge_cancel.clone(),
    ));
    workers.spawn(queue_to_client(
        out_rx,
        sink.clone(),
        bridge_cancel.clone(),
        tunables,
        ping_interval,
    ));
    workers.spawn(exit_watcher(attached.exit, bridge_cancel.clone()));

    let mut first_err: Option<BridgeError> = None;
    while let Some(joined) = workers.join_next().await {
        bridge_cancel.cancel();
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                } else {
                    tracing::debug!(error = %e, "additional bridge worker error after first");
                }
            }
            Err(join_err) => {
                if first_err.is_none() {
                    first_err = Some(BridgeError::Transport(join_err.to_string()));
                }
            }
        }
    }

    let reason = first_err
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "session ended".to_string());
    {
        let mut sink = sink.lock().await;
        let _ = sink
            .send_control(serde_json::json!({"type": "exit", "reason": reason}))
            .await;
        let _ = sink.close(&reason).await;
    }

    if let Err(e) = session.close().await {
        tracing::warn!(token = %session.token, error = %e, "error closing session after bridge teardown");
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn client_to_pty(
    mut stream: Box<dyn ClientStream>,
    mut writer: crate::container::PtyWriter,
    session: Arc<Session>,
    cancel: CancellationToken,
    read_timeout: Duration,
) -> Result<(), BridgeError> {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            timed = tokio::time::timeout(read_timeout, stream.recv()) => timed,
        };

        let frame = match next {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(BridgeError::ClientTimeout),
        };

        match frame {
            ClientFrame::Binary(data) => {
                writer
                    .write_all(&data)
                    .await
                    .map_err(|e| BridgeError::PtyWrite(e.to_string()))?;
            }
            ClientFrame::Text(text) => {
                if let Ok(resize) = serde_json::from_str::<ResizeMessage>(&text) {
                    if resize.cols > 0 && resize.rows > 0 {
                        session
                            .resize(resize.cols, resize.rows)
                            .await
                            .map_err(BridgeError::Session)?;
                    }
                }
            }
            ClientFrame::Pong => {}
        }
    }
}

async fn pty_to_queue(
    mut reader: crate::container::PtyReader,
    out_tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    let mut buf = vec![0u8; PTY_READ_BUFFER];
    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = reader.read(&mut buf) => read.map_err(|e| BridgeError::PtyRead(e.to_string()))?,
        };

        if n == 0 {
            return Ok(());
        }

        if out_tx.send(buf[..n].to_vec()).await.is_err() {
            return Ok(());
        }
    }
}

async fn queue_to_client(
    mut out_rx: mpsc::Receiver<Vec<u8>>,
    sink: Arc<Mutex<Box<dyn ClientSink>>>,
    cancel: CancellationToken,
    tunables: BridgeTunables,
    ping_interval: Duration,
) -> Result<(), BridgeError> {
    let mut buffer: Vec<u8> = Vec::with_capacity(tunables.max_frame_bytes);

    let mut coalesce_timer = tokio::time::interval(tunables.max_coalesce_wait);
    coalesce_timer.tick().await;
    let mut ping_timer = tokio::time::interval(ping_interval);
    ping_timer.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if !buffer.is_empty() {
                    let _ = sink.lock().await.send_binary(std::mem::take(&mut buffer)).await;
                }
                return Ok(());
            }
            received = out_rx.recv() => {
                match received {
                    None => {
                        if !buffer.is_empty() {
                            sink.lock().await.send_binary(std::mem::take(&mut buffer)).await?;
                        }
                        return Ok(());
                    }
                    Some(chunk) => {
                        let mut remaining = &chunk[..];
                        while !remaining.is_empty() {
                            let space = tunables.max_frame_bytes - buffer.len();
                            let take = space.min(remaining.len());
                            buffer.extend_from_slice(&remaining[..take]);
                            remaining = &remaining[take..];
                            if buffer.len() >= tunables.max_frame_bytes {
                                sink.lock().await.send_binary(std::mem::take(&mut buffer)).await?;
                                coalesce_timer.reset();
                            }
                        }
                    }
                }
            }
            _ = coalesce_timer.tick() => {
                if !buffer.is_empty() {
                    sink.lock().await.send_binary(std::mem::take(&mut buffer)).await?;
                }
            }
            _ = ping_timer.tick() => {
                sink.lock().await.send_ping().await?;
            }
        }
    }
}

async fn exit_watcher(
    exit: oneshot::Receiver<crate::container::ExitReason>,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = exit => match result {
            Ok(_) => Err(BridgeError::ProcessExited),
            Err(_) => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock_transport::ChannelTransport;
    use crate::container::MockContainer;
    use crate::session::Session;

    fn test_session() -> (Arc<Session>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let parent = CancellationToken::new();
        let session = Arc::new(Session::new(
            "tok".into(),
            None,
            dir.path().join("tok"),
            Arc::new(MockContainer::default()),
            &parent,
        ));
        (session, dir)
    }

    #[tokio::test]
    async fn happy_path_echoes_and_reports_exit() {
        let (session, _dir) = test_session();
        let (transport, client) = ChannelTransport::new();

        let bridge = Bridge::new(
            BridgeTunables::default(),
            Duration::from_millis(200),
            Duration::from_secs(5),
        );
        let run_handle = tokio::spawn({
            let session = session.clone();
            async move { bridge.run(session, Box::new(transport)).await }
        });

        client.send_binary(b"echo hi\n".to_vec()).await;
        let _ = tokio::time::timeout(Duration::from_secs(2), client.recv_binary()).await;

        client.send_binary(b"exit\n".to_vec()).await;
        let result = tokio::time::timeout(Duration::from_secs(5), run_handle)
            .await
            .expect("bridge run should finish")
            .expect("task should not panic");

        assert!(matches!(result, Err(BridgeError::ProcessExited)) || result.is_ok());
    }
}
