// ABOUTME: Error enums for the container capability, session lifecycle, and PTY bridge.
// ABOUTME: thiserror at these library boundaries; callers add anyhow context as needed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container is not started")]
    NotStarted,
    #[error("failed to create container: {0}")]
    Create(String),
    #[error("failed to start container: {0}")]
    Start(String),
    #[error("failed to attach to container: {0}")]
    Attach(String),
    #[error("failed to resize container pty: {0}")]
    Resize(String),
    #[error("failed to stop container: {0}")]
    Stop(String),
    #[error("failed to remove container: {0}")]
    Remove(String),
    #[error("container operation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to prepare workspace directory {path}: {source}")]
    Workspace {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("container error: {0}")]
    Container(#[from] ContainerError),
    #[error("session is not ready (state = {0:?})")]
    NotReady(crate::session::SessionState),
    #[error("session was closed concurrently")]
    ClosedDuringStart,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("client transport closed or errored: {0}")]
    Transport(String),
    #[error("client read timed out")]
    ClientTimeout,
    #[error("short write to pty")]
    ShortWrite,
    #[error("pty read error: {0}")]
    PtyRead(String),
    #[error("pty write error: {0}")]
    PtyWrite(String),
    #[error("container process exited")]
    ProcessExited,
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("bridge cancelled")]
    Cancelled,
}
