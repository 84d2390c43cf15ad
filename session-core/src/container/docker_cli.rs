// ABOUTME: Container backend that drives the `docker` CLI via tokio::process::Command.
// ABOUTME: No vendored SDK bindings — the binary on $PATH is the only dependency.

use super::{Attached, Container, ExitReason};
use crate::error::ContainerError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::{oneshot, Mutex};

/// Fixed in-container mount point for the workspace.
pub const WORKSPACE_MOUNT: &str = "/workspace";
/// Fixed in-container mount point for an optional editor config bind mount.
pub const NVIM_CONFIG_MOUNT: &str = "/home/nvim/.config/nvim";
/// Fallback image when none is configured.
pub const DEFAULT_IMAGE: &str = "ghcr.io/neovim/neovim:v0.10.3";

pub struct DockerCliContainer {
    image: String,
    nvim_config_path: Option<PathBuf>,
    id: Mutex<Option<String>>,
}

impl DockerCliContainer {
    pub fn new(image: impl Into<String>, nvim_config_path: Option<PathBuf>) -> Self {
        let image = image.into();
        Self {
            image: if image.is_empty() { DEFAULT_IMAGE.to_string() } else { image },
            nvim_config_path,
            id: Mutex::new(None),
        }
    }

    async fn id(&self) -> Result<String, ContainerError> {
        self.id
            .lock()
            .await
            .clone()
            .ok_or(ContainerError::NotStarted)
    }
}

#[async_trait]
impl Container for DockerCliContainer {
    async fn start(&self, workspace: &Path, cmd: &[String]) -> Result<(), ContainerError> {
        let cmd_args: Vec<String> = if cmd.is_empty() {
            vec!["nvim".to_string()]
        } else {
            cmd.to_vec()
        };

        let mut create = Command::new("docker");
        create
            .arg("create")
            .arg("-i")
            .arg("-t")
            .arg("--log-driver")
            .arg("none")
            .arg("--workdir")
            .arg(WORKSPACE_MOUNT)
            .arg("-e")
            .arg("TERM=xterm-256color")
            .arg("-e")
            .arg("COLORTERM=truecolor")
            .arg("-e")
            .arg("NVIM_LOG_FILE=/workspace/tmp/nvim.log")
            .arg("-e")
            .arg("NVIM_LOG_LEVEL=debug")
            .arg("-v")
            .arg(format!("{}:{}:rw", workspace.display(), WORKSPACE_MOUNT));

        if let Some(cfg) = &self.nvim_config_path {
            create
                .arg("-v")
                .arg(format!("{}:{}:rw", cfg.display(), NVIM_CONFIG_MOUNT));
        }

        create.arg(&self.image).args(&cmd_args);

        let output = create
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ContainerError::Create(e.to_string()))?;

        if !output.status.success() {
            return Err(ContainerError::Create(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();

        let start_status = Command::new("docker")
            .arg("start")
            .arg(&id)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ContainerError::Start(e.to_string()))?;

        if !start_status.status.success() {
            return Err(ContainerError::Start(
                String::from_utf8_lossy(&start_status.stderr)
                    .trim()
                    .to_string(),
            ));
        }

        *self.id.lock().await = Some(id);
        Ok(())
    }

    async fn attach(&self) -> Result<Attached, ContainerError> {
        let id = self.id().await?;

        let mut child = Command::new("docker")
            .arg("attach")
            .arg(&id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ContainerError::Attach(e.to_string()))?;

        let reader = child
            .stdout
            .take()
            .ok_or_else(|| ContainerError::Attach("no stdout on docker attach".into()))?;
        let writer = child
            .stdin
            .take()
            .ok_or_else(|| ContainerError::Attach("no stdin on docker attach".into()))?;

        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = child.wait().await;
            let _ = exit_tx.send(ExitReason::Exited);
        });

        Ok(Attached {
            reader: Box::new(reader),
            writer: Box::new(writer),
            exit: exit_rx,
        })
    }

    async fn resize(&self, cols: u16, rows: u16) -> Result<(), ContainerError> {
        let id = self.id().await?;
        let status = Command::new("docker")
            .arg("container")
            .arg("resize")
            .arg("--width")
            .arg(cols.to_string())
            .arg("--height")
            .arg(rows.to_string())
            .arg(&id)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ContainerError::Resize(e.to_string()))?;

        if !status.status.success() {
            return Err(ContainerError::Resize(
                String::from_utf8_lossy(&status.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ContainerError> {
        let id = self.id().await?;
        let status = Command::new("docker")
            .arg("stop")
            .arg(&id)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ContainerError::Stop(e.to_string()))?;

        if !status.status.success() {
            return Err(ContainerError::Stop(
                String::from_utf8_lossy(&status.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn remove(&self) -> Result<(), ContainerError> {
        let id = self.id().await?;
        let status = Command::new("docker")
            .arg("rm")
            .arg(&id)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ContainerError::Remove(e.to_string()))?;

        if !status.status.success() {
            return Err(ContainerError::Remove(
                String::from_utf8_lossy(&status.stderr).trim().to_string(),
            ));
        }
        *self.id.lock().await = None;
        Ok(())
    }
}
