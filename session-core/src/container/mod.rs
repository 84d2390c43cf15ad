// ABOUTME: Container capability contract (spec §4.4) — the only surface Session depends on.
// ABOUTME: Concrete adapters live in docker_cli.rs (real) and mock.rs (tests).

pub mod docker_cli;
pub mod mock;

use crate::error::ContainerError;
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

pub use docker_cli::DockerCliContainer;
pub use mock::MockContainer;

pub type PtyReader = Box<dyn AsyncRead + Unpin + Send>;
pub type PtyWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Why an attached container's exit-waiter resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The contained process exited (any exit code — even 0 is a reason to tear down).
    Exited,
    /// The governing context was cancelled before the process exited.
    Cancelled,
}

/// Byte streams and exit signal returned by `Container::attach`.
pub struct Attached {
    pub reader: PtyReader,
    pub writer: PtyWriter,
    pub exit: oneshot::Receiver<ExitReason>,
}

/// What a Session needs from any container backend (spec §4.4).
///
/// Implementations must provide: PTY allocation, merged stdio over the PTY,
/// a read-write bind mount of the workspace at a fixed in-container path,
/// `TERM`/`COLORTERM` set, working directory at the mount point, and
/// container logging disabled.
#[async_trait]
pub trait Container: Send + Sync {
    /// Create and start a container with `workspace` bind-mounted, running `cmd`.
    async fn start(&self, workspace: &Path, cmd: &[String]) -> Result<(), ContainerError>;

    /// Attach to the running container's PTY. Requires a prior successful `start`.
    async fn attach(&self) -> Result<Attached, ContainerError>;

    /// Resize the container's PTY. Caller is responsible for clamping (see `session::clamp_size`).
    async fn resize(&self, cols: u16, rows: u16) -> Result<(), ContainerError>;

    /// Signal the container to stop (graceful).
    async fn stop(&self) -> Result<(), ContainerError>;

    /// Remove the (stopped) container.
    async fn remove(&self) -> Result<(), ContainerError>;
}
