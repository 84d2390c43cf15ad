// ABOUTME: In-process container backend for tests, built on portable-pty and a local shell.
// ABOUTME: Exercises the same Container contract the docker-cli backend does, without docker.

use super::{Attached, Container, ExitReason};
use crate::error::ContainerError;
use async_trait::async_trait;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::mpsc as std_mpsc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};

/// Local-process stand-in for a container, grounded in the teacher's own
/// portable-pty terminal spawner (`gorp/src/terminal.rs`), adapted to the
/// `Container` contract instead of owning a session registry itself.
pub struct MockContainer {
    shell: String,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    child: Mutex<Option<Box<dyn Child + Send + Sync>>>,
}

impl MockContainer {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            master: Mutex::new(None),
            child: Mutex::new(None),
        }
    }
}

impl Default for MockContainer {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

#[async_trait]
impl Container for MockContainer {
    async fn start(&self, workspace: &Path, cmd: &[String]) -> Result<(), ContainerError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ContainerError::Create(e.to_string()))?;

        let program = if cmd.is_empty() {
            self.shell.clone()
        } else {
            cmd[0].clone()
        };
        let mut builder = CommandBuilder::new(program);
        for arg in cmd.iter().skip(1) {
            builder.arg(arg);
        }
        builder.cwd(workspace);
        builder.env("TERM", "xterm-256color");
        builder.env("COLORTERM", "truecolor");

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| ContainerError::Start(e.to_string()))?;
        drop(pair.slave);

        *self.master.lock().await = Some(pair.master);
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn attach(&self) -> Result<Attached, ContainerError> {
        let sync_reader;
        let sync_writer;
        {
            let master_guard = self.master.lock().await;
            let master = master_guard.as_ref().ok_or(ContainerError::NotStarted)?;
            sync_reader = master
                .try_clone_reader()
                .map_err(|e| ContainerError::Attach(e.to_string()))?;
            sync_writer = master
                .take_writer()
                .map_err(|e| ContainerError::Attach(e.to_string()))?;
        }

        let reader = bridge_pty_reader(sync_reader);
        let writer = bridge_pty_writer(sync_writer);

        let mut child_guard = self.child.lock().await;
        let mut child = child_guard.take().ok_or(ContainerError::NotStarted)?;
        drop(child_guard);

        let (exit_tx, exit_rx) = oneshot::channel();
        std::thread::spawn(move || {
            let _ = child.wait();
            let _ = exit_tx.send(ExitReason::Exited);
        });

        Ok(Attached {
            reader,
            writer,
            exit: exit_rx,
        })
    }

    async fn resize(&self, cols: u16, rows: u16) -> Result<(), ContainerError> {
        let master_guard = self.master.lock().await;
        let master = master_guard.as_ref().ok_or(ContainerError::NotStarted)?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ContainerError::Resize(e.to_string()))
    }

    async fn stop(&self) -> Result<(), ContainerError> {
        let mut child_guard = self.child.lock().await;
        if let Some(child) = child_guard.as_mut() {
            let _ = child.kill();
        }
        Ok(())
    }

    async fn remove(&self) -> Result<(), ContainerError> {
        *self.child.lock().await = None;
        *self.master.lock().await = None;
        Ok(())
    }
}

/// Pump bytes from a blocking PTY reader into an async `AsyncRead` half.
fn bridge_pty_reader(mut sync_reader: Box<dyn Read + Send>) -> Box<dyn AsyncRead + Unpin + Send> {
    let (duplex_reader, mut duplex_writer) = tokio::io::duplex(8192);
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);

    std::thread::spawn(move || loop {
        let mut buf = [0u8; 4096];
        match sync_reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });

    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if duplex_writer.write_all(&chunk).await.is_err() {
                break;
            }
        }
    });

    Box::new(duplex_reader)
}

/// Pump bytes from an async `AsyncWrite` half into a blocking PTY writer.
fn bridge_pty_writer(mut sync_writer: Box<dyn Write + Send>) -> Box<dyn AsyncWrite + Unpin + Send> {
    let (duplex_reader, duplex_writer) = tokio::io::duplex(8192);
    let (tx, rx) = std_mpsc::channel::<Vec<u8>>();

    std::thread::spawn(move || {
        while let Ok(chunk) = rx.recv() {
            if sync_writer.write_all(&chunk).is_err() {
                break;
            }
            if sync_writer.flush().is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut duplex_reader = duplex_reader;
        let mut buf = [0u8; 4096];
        loop {
            match duplex_reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    Box::new(duplex_writer)
}
