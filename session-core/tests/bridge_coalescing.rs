// ABOUTME: End-to-end coverage of the queue->client coalescer against a scripted PTY source.

use async_trait::async_trait;
use session_core::bridge::mock_transport::ChannelTransport;
use session_core::{
    Attached, Bridge, BridgeTunables, Container, ContainerError, ExitReason, Session,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// A Container whose "PTY" is a duplex pipe the test feeds directly, so output
/// timing and chunk boundaries are exactly controlled.
struct ScriptedContainer {
    attached: Mutex<Option<Attached>>,
}

impl ScriptedContainer {
    fn new() -> (Self, tokio::io::DuplexStream, oneshot::Sender<ExitReason>) {
        let (feed, reader) = tokio::io::duplex(64 * 1024);
        let (discard_write_side, _unread) = tokio::io::duplex(64 * 1024);
        let (exit_tx, exit_rx) = oneshot::channel();
        let attached = Attached {
            reader: Box::new(reader),
            writer: Box::new(discard_write_side),
            exit: exit_rx,
        };
        (
            Self {
                attached: Mutex::new(Some(attached)),
            },
            feed,
            exit_tx,
        )
    }
}

#[async_trait]
impl Container for ScriptedContainer {
    async fn start(&self, _workspace: &Path, _cmd: &[String]) -> Result<(), ContainerError> {
        Ok(())
    }

    async fn attach(&self) -> Result<Attached, ContainerError> {
        self.attached
            .lock()
            .await
            .take()
            .ok_or(ContainerError::NotStarted)
    }

    async fn resize(&self, _cols: u16, _rows: u16) -> Result<(), ContainerError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ContainerError> {
        Ok(())
    }

    async fn remove(&self) -> Result<(), ContainerError> {
        Ok(())
    }
}

fn spawn_session(container: ScriptedContainer, token: &str) -> (Arc<Session>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let parent = CancellationToken::new();
    let session = Arc::new(Session::new(
        token.to_string(),
        None,
        dir.path().join(token),
        Arc::new(container),
        &parent,
    ));
    (session, dir)
}

/// S5 — a single 10 KiB PTY read is split into exactly 4096, 4096, 1808 byte frames.
#[tokio::test]
async fn oversized_read_splits_into_three_frames() {
    let (container, mut feed, _exit_tx) = ScriptedContainer::new();
    let (session, _tmp) = spawn_session(container, "s5-token");
    let (transport, client) = ChannelTransport::new();

    let bridge = Bridge::new(
        BridgeTunables::default(),
        Duration::from_secs(30),
        Duration::from_secs(30),
    );
    let run_handle = tokio::spawn({
        let session = session.clone();
        async move { bridge.run(session, Box::new(transport)).await }
    });

    let payload: Vec<u8> = (0..10 * 1024).map(|i| (i % 251) as u8).collect();
    feed.write_all(&payload).await.unwrap();

    let mut received = Vec::new();
    let mut frame_sizes = Vec::new();
    for _ in 0..3 {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.recv_binary())
            .await
            .expect("frame within deadline")
            .expect("transport still open");
        frame_sizes.push(frame.len());
        received.extend_from_slice(&frame);
    }

    assert_eq!(frame_sizes, vec![4096, 4096, 1808]);
    assert_eq!(received, payload);

    session.cancellation().cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), run_handle).await;
}

/// S4 — 1 byte/ms for 100ms coalesces into a bounded number of small frames.
#[tokio::test]
async fn steady_trickle_is_coalesced() {
    let (container, mut feed, _exit_tx) = ScriptedContainer::new();
    let (session, _tmp) = spawn_session(container, "s4-token");
    let (transport, client) = ChannelTransport::new();

    let bridge = Bridge::new(
        BridgeTunables::default(),
        Duration::from_secs(30),
        Duration::from_secs(30),
    );
    let run_handle = tokio::spawn({
        let session = session.clone();
        async move { bridge.run(session, Box::new(transport)).await }
    });

    let writer = tokio::spawn(async move {
        for i in 0..100u8 {
            feed.write_all(&[i]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });
    writer.await.unwrap();

    let mut frames = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_millis(50), client.recv_binary()).await {
            Ok(Some(frame)) => frames.push(frame),
            _ => break,
        }
    }

    let total: usize = frames.iter().map(Vec::len).sum();
    assert_eq!(total, 100);
    assert!(frames.len() <= 12, "expected <=12 frames, got {}", frames.len());
    assert!(frames.iter().all(|f| f.len() <= 4096));

    session.cancellation().cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), run_handle).await;
}
