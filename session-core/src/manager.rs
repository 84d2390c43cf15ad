// ABOUTME: Registry of live sessions keyed by opaque token; create/claim/shutdown.
// ABOUTME: Mutex-protected maps, no I/O held under the lock (spec: Create must not block).

use crate::container::Container;
use crate::session::Session;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Builds a fresh container backend for each new session.
pub type ContainerFactory = Arc<dyn Fn() -> Arc<dyn Container> + Send + Sync>;

pub struct SessionManager {
    base_path: PathBuf,
    factory: ContainerFactory,
    cancel: CancellationToken,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    claimable: Mutex<HashSet<String>>,
}

impl SessionManager {
    pub fn new(base_path: PathBuf, factory: ContainerFactory) -> Self {
        Self {
            base_path,
            factory,
            cancel: CancellationToken::new(),
            sessions: Mutex::new(HashMap::new()),
            claimable: Mutex::new(HashSet::new()),
        }
    }

    /// Parent cancellation scope for process shutdown; every Session derives
    /// its own token as a child of this one.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Allocates a token, builds a Session in Init, registers it. Pure
    /// bookkeeping — no workspace or container I/O happens here.
    pub async fn create(&self, repo_url: Option<String>) -> (String, String) {
        let token = crate::token::generate();
        let root_path = self.base_path.join(&token);
        let container = (self.factory)();
        let session = Arc::new(Session::new(
            token.clone(),
            repo_url,
            root_path,
            container,
            &self.cancel,
        ));

        self.sessions.lock().await.insert(token.clone(), session);
        self.claimable.lock().await.insert(token.clone());

        let endpoint = format!("sessions/{token}");
        (token, endpoint)
    }

    /// Atomic lookup-and-remove from the claimable set. A token can be
    /// claimed at most once; the session itself stays registered (for
    /// `Shutdown`) until the caller removes it with `forget`.
    pub async fn claim(&self, token: &str) -> Option<Arc<Session>> {
        let claimed = self.claimable.lock().await.remove(token);
        if !claimed {
            return None;
        }
        self.sessions.lock().await.get(token).cloned()
    }

    /// Whether a token was ever issued by `create` and hasn't been forgotten yet.
    /// Used to distinguish an unknown token (404) from one that is merely
    /// already claimed (401).
    pub async fn exists(&self, token: &str) -> bool {
        self.sessions.lock().await.contains_key(token)
    }

    /// Drops a session from the registry once its owning bridge has closed it.
    pub async fn forget(&self, token: &str) {
        self.sessions.lock().await.remove(token);
        self.claimable.lock().await.remove(token);
    }

    /// Cancels every registered and attached session and waits (bounded by
    /// `grace_period`) for their teardown to finish. `Session::close` is
    /// idempotent, so racing with a bridge that is closing the same session
    /// concurrently is safe.
    pub async fn shutdown(&self, grace_period: Duration) {
        self.cancel.cancel();

        let sessions: Vec<Arc<Session>> = self.sessions.lock().await.values().cloned().collect();
        let closers = sessions.iter().map(|s| s.close());

        if tokio::time::timeout(grace_period, futures_util::future::join_all(closers))
            .await
            .is_err()
        {
            tracing::warn!("session shutdown did not complete within the grace period");
        }

        self.sessions.lock().await.clear();
        self.claimable.lock().await.clear();
    }
}
