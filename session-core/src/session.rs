// ABOUTME: One ephemeral editor session: workspace directory, container instance, lifecycle.
// ABOUTME: Drives the Init->Starting->Ready->Closed state machine (Failed reachable from either).

use crate::container::{Attached, Container};
use crate::error::{ContainerError, SessionError};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

const CLONE_ARGS: &[&str] = &["--depth=1", "--filter=blob:none", "--single-branch", "--no-tags"];
const MAX_COLS: u16 = 500;
const MAX_ROWS: u16 = 200;
const RESIZE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Starting,
    Ready,
    Failed,
    Closed,
}

pub struct Session {
    pub token: String,
    pub created_at: DateTime<Utc>,
    repo_url: Option<String>,
    root_path: PathBuf,
    container: Arc<dyn Container>,
    state: RwLock<SessionState>,
    last_error: Arc<Mutex<Option<String>>>,
    error_set: Arc<AtomicBool>,
    start_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        token: String,
        repo_url: Option<String>,
        root_path: PathBuf,
        container: Arc<dyn Container>,
        parent_cancel: &CancellationToken,
    ) -> Self {
        Self {
            token,
            created_at: Utc::now(),
            repo_url,
            root_path,
            container,
            state: RwLock::new(SessionState::Init),
            last_error: Arc::new(Mutex::new(None)),
            error_set: Arc::new(AtomicBool::new(false)),
            start_lock: Mutex::new(()),
            cancel: parent_cancel.child_token(),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn root_path(&self) -> &std::path::Path {
        &self.root_path
    }

    /// Record the first failure only; later calls are no-ops (spec: "set once").
    async fn fail(&self, message: String) {
        record_failure(&self.error_set, &self.last_error, &self.token, message).await;
    }

    /// Init -> Starting -> Ready (or Failed). Idempotent: a second call returns
    /// immediately with the outcome of the first.
    pub async fn start(&self) -> Result<(), SessionError> {
        let _guard = self.start_lock.lock().await;

        {
            let state = *self.state.read().await;
            if state != SessionState::Init {
                return match state {
                    SessionState::Ready => Ok(()),
                    SessionState::Failed => Err(SessionError::Container(ContainerError::Start(
                        self.last_error
                            .lock()
                            .await
                            .clone()
                            .unwrap_or_else(|| "session previously failed to start".into()),
                    ))),
                    other => Err(SessionError::NotReady(other)),
                };
            }
            *self.state.write().await = SessionState::Starting;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.root_path).await {
            *self.state.write().await = SessionState::Failed;
            let err = SessionError::Workspace {
                path: self.root_path.display().to_string(),
                source: e,
            };
            self.fail(err.to_string()).await;
            return Err(err);
        }

        if let Some(url) = self.repo_url.clone() {
            let root_path = self.root_path.clone();
            let cancel = self.cancel.clone();
            let error_set = self.error_set.clone();
            let last_error = self.last_error.clone();
            let token = self.token.clone();
            tokio::spawn(Self::clone_workspace_task(
                url, root_path, cancel, error_set, last_error, token,
            ));
        }

        if *self.state.read().await == SessionState::Closed {
            return Err(SessionError::ClosedDuringStart);
        }

        match self.container.start(&self.root_path, &[]).await {
            Ok(()) => {
                // A concurrent Close() may have fired while we were awaiting
                // container start; only transition Starting -> Ready. If the
                // state moved to Closed underneath us, the container we just
                // started must be unwound rather than resurrected.
                let became_ready = {
                    let mut state = self.state.write().await;
                    if *state == SessionState::Starting {
                        *state = SessionState::Ready;
                        true
                    } else {
                        false
                    }
                };

                if became_ready {
                    Ok(())
                } else {
                    let _ = self.container.stop().await;
                    let _ = self.container.remove().await;
                    Err(SessionError::ClosedDuringStart)
                }
            }
            Err(e) => {
                *self.state.write().await = SessionState::Failed;
                self.fail(e.to_string()).await;
                let _ = tokio::fs::remove_dir_all(&self.root_path).await;
                Err(SessionError::Container(e))
            }
        }
    }

    async fn clone_workspace_task(
        url: String,
        root_path: PathBuf,
        cancel: CancellationToken,
        error_set: Arc<AtomicBool>,
        last_error: Arc<Mutex<Option<String>>>,
        token: String,
    ) {
        let mut cmd = tokio::process::Command::new("git");
        cmd.arg("clone").args(CLONE_ARGS).arg(&url).arg(&root_path);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::piped());

        let output = tokio::select! {
            _ = cancel.cancelled() => return,
            result = cmd.output() => result,
        };

        let failure = match output {
            Ok(out) if out.status.success() => {
                match tokio::fs::read_dir(&root_path).await {
                    Ok(mut entries) => match entries.next_entry().await {
                        Ok(Some(_)) => None,
                        Ok(None) => Some("workspace is empty after clone".to_string()),
                        Err(e) => Some(format!("failed to check workspace: {e}")),
                    },
                    Err(e) => Some(format!("failed to check workspace: {e}")),
                }
            }
            Ok(out) => Some(format!(
                "git clone failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) => Some(format!("failed to run git clone: {e}")),
        };

        if let Some(message) = failure {
            tracing::warn!(url, token = %token, message, "workspace clone failed (non-fatal)");
            record_failure(&error_set, &last_error, &token, message).await;
        }
    }

    /// Requires state == Ready.
    pub async fn attach(&self) -> Result<Attached, SessionError> {
        if *self.state.read().await != SessionState::Ready {
            return Err(SessionError::NotReady(*self.state.read().await));
        }
        Ok(self.container.attach().await?)
    }

    /// Invalid sizes (<=0 either dimension) are silently ignored. Valid sizes are
    /// clamped to cols<=500, rows<=200 before being forwarded.
    pub async fn resize(&self, cols: i64, rows: i64) -> Result<(), SessionError> {
        let Some((cols, rows)) = clamp_size(cols, rows) else {
            return Ok(());
        };
        tokio::time::timeout(RESIZE_TIMEOUT, self.container.resize(cols, rows))
            .await
            .map_err(|_| SessionError::Container(ContainerError::Resize("timed out".into())))??;
        Ok(())
    }

    /// Idempotent. Aggregates teardown errors; the first is returned, the rest logged.
    pub async fn close(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.write().await;
            if *state == SessionState::Closed {
                return Ok(());
            }
            *state = SessionState::Closed;
        }
        self.cancel.cancel();

        let mut first_err: Option<SessionError> = None;

        if let Err(e) = self.container.stop().await {
            first_err = Some(SessionError::Container(e));
        }
        if let Err(e) = self.container.remove().await {
            let err = SessionError::Container(e);
            if first_err.is_none() {
                first_err = Some(err);
            } else {
                tracing::warn!(token = %self.token, error = %err, "additional teardown error");
            }
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.root_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                let err = SessionError::Workspace {
                    path: self.root_path.display().to_string(),
                    source: e,
                };
                if first_err.is_none() {
                    first_err = Some(err);
                } else {
                    tracing::warn!(token = %self.token, error = %err, "additional teardown error");
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Records the first failure only; later calls are logged but don't overwrite
/// `last_error` (spec: "set once"). Shared by `Session::fail` and the
/// detached clone task, neither of which can both hold `&Session` and `.await`
/// across the task boundary.
async fn record_failure(
    error_set: &AtomicBool,
    last_error: &Mutex<Option<String>>,
    token: &str,
    message: String,
) {
    if error_set
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        *last_error.lock().await = Some(message);
    } else {
        tracing::debug!(token = %token, message, "additional failure after last_error already set");
    }
}

/// `None` if either dimension is <= 0 (caller should silently ignore); otherwise
/// the dimensions clamped to the runtime's supported range.
pub fn clamp_size(cols: i64, rows: i64) -> Option<(u16, u16)> {
    if cols <= 0 || rows <= 0 {
        return None;
    }
    let cols = cols.min(MAX_COLS as i64) as u16;
    let rows = rows.min(MAX_ROWS as i64) as u16;
    Some((cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MockContainer;

    fn new_session(root: PathBuf) -> Session {
        let parent = CancellationToken::new();
        Session::new(
            "test-token".into(),
            None,
            root,
            Arc::new(MockContainer::default()),
            &parent,
        )
    }

    #[test]
    fn clamp_rejects_non_positive_dimensions() {
        assert_eq!(clamp_size(0, 24), None);
        assert_eq!(clamp_size(80, 0), None);
        assert_eq!(clamp_size(-1, -1), None);
    }

    #[test]
    fn clamp_caps_to_runtime_maximums() {
        assert_eq!(clamp_size(9000, 9000), Some((500, 200)));
        assert_eq!(clamp_size(80, 24), Some((80, 24)));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let session = new_session(dir.path().join("tok"));
        session.start().await.unwrap();
        assert_eq!(session.state().await, SessionState::Ready);
        session.start().await.unwrap();
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_removes_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tok");
        let session = new_session(root.clone());
        session.start().await.unwrap();
        assert!(root.exists());
        session.close().await.unwrap();
        assert!(!root.exists());
        assert_eq!(session.state().await, SessionState::Closed);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn attach_requires_ready_state() {
        let dir = tempfile::tempdir().unwrap();
        let session = new_session(dir.path().join("tok"));
        assert!(session.attach().await.is_err());
    }

    /// S3 — a clone failure is recorded into `last_error` but does not fail the session.
    #[tokio::test]
    async fn clone_failure_is_recorded_in_last_error_and_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let parent = CancellationToken::new();
        let session = Session::new(
            "clone-fail-token".into(),
            Some("file:///nonexistent/path-does-not-exist.git".into()),
            dir.path().join("tok"),
            Arc::new(MockContainer::default()),
            &parent,
        );

        session.start().await.unwrap();
        assert_eq!(session.state().await, SessionState::Ready);

        let mut observed = None;
        for _ in 0..50 {
            observed = session.last_error().await;
            if observed.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert!(
            observed.is_some(),
            "a failed clone should populate last_error"
        );
        assert_eq!(
            session.state().await,
            SessionState::Ready,
            "clone failure must not fail the session"
        );
    }

    /// A Close() racing the tail of Start() must unwind the container it just
    /// started rather than overwriting Closed back to Ready.
    #[tokio::test]
    async fn start_unwinds_instead_of_resurrecting_a_concurrently_closed_session() {
        use std::sync::atomic::AtomicUsize;

        struct SlowStartContainer {
            gate: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
            stop_calls: Arc<AtomicUsize>,
            remove_calls: Arc<AtomicUsize>,
        }

        #[async_trait::async_trait]
        impl Container for SlowStartContainer {
            async fn start(
                &self,
                _workspace: &std::path::Path,
                _cmd: &[String],
            ) -> Result<(), ContainerError> {
                let gate = self.gate.lock().await.take();
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(())
            }

            async fn attach(&self) -> Result<Attached, ContainerError> {
                Err(ContainerError::NotStarted)
            }

            async fn resize(&self, _cols: u16, _rows: u16) -> Result<(), ContainerError> {
                Ok(())
            }

            async fn stop(&self) -> Result<(), ContainerError> {
                self.stop_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            async fn remove(&self) -> Result<(), ContainerError> {
                self.remove_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let (release_tx, release_rx) = tokio::sync::oneshot::channel();
        let stop_calls = Arc::new(AtomicUsize::new(0));
        let remove_calls = Arc::new(AtomicUsize::new(0));
        let container = Arc::new(SlowStartContainer {
            gate: Mutex::new(Some(release_rx)),
            stop_calls: stop_calls.clone(),
            remove_calls: remove_calls.clone(),
        });

        let dir = tempfile::tempdir().unwrap();
        let parent = CancellationToken::new();
        let session = Arc::new(Session::new(
            "race-token".into(),
            None,
            dir.path().join("tok"),
            container,
            &parent,
        ));

        let start_handle = tokio::spawn({
            let session = session.clone();
            async move { session.start().await }
        });

        // Give start() time to reach container.start() and block on the gate.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        session.close().await.unwrap();
        let _ = release_tx.send(());

        let result = start_handle.await.unwrap();
        assert!(matches!(result, Err(SessionError::ClosedDuringStart)));
        assert_eq!(session.state().await, SessionState::Closed);
        assert_eq!(stop_calls.load(Ordering::SeqCst), 2);
        assert_eq!(remove_calls.load(Ordering::SeqCst), 2);
    }
}
