//! Shared root of the namespace tree and its refresh loop.
//!
//! Statements take a snapshot of the root when they start and resolve
//! against it until they finish. A refresh builds a new root and swaps it in
//! under the write lock, so a resolution in progress never sees a half
//! updated tree.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use nascli_core::memory::MemoryCollaborator;
//! use nascli_core::namespace::tree::{NamespaceTree, TreeWatcher};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(MemoryCollaborator::from_json(r#"{"children": []}"#).unwrap());
//!     let tree = Arc::new(NamespaceTree::new(backend, Duration::from_secs(5)));
//!
//!     if let Some(handle) = TreeWatcher::spawn(Arc::clone(&tree)) {
//!         // ... run statements ...
//!         handle.stop().await;
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::remote::{Collaborator, RemoteEvent};

use super::root::RootNamespace;
use super::NamespaceRef;

pub struct NamespaceTree {
    collaborator: Arc<dyn Collaborator>,
    timeout: Duration,
    root: RwLock<NamespaceRef>,
    generation: AtomicU64,
}

impl NamespaceTree {
    pub fn new(collaborator: Arc<dyn Collaborator>, timeout: Duration) -> Self {
        let root = RootNamespace::new(Arc::clone(&collaborator), timeout);
        Self {
            collaborator,
            timeout,
            root: RwLock::new(root),
            generation: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current root.
    pub async fn root(&self) -> NamespaceRef {
        self.root.read().await.clone()
    }

    /// Incremented on every observed remote change.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn collaborator(&self) -> &Arc<dyn Collaborator> {
        &self.collaborator
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Swap in a freshly built root.
    pub async fn rebuild(&self) {
        let fresh = RootNamespace::new(Arc::clone(&self.collaborator), self.timeout);
        *self.root.write().await = fresh;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "namespace tree rebuilt");
    }

    /// Apply one collaborator event.
    pub async fn apply(&self, event: &RemoteEvent) {
        match event {
            RemoteEvent::Changed { path } => {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(path = %path, generation, "remote object changed");
            }
            RemoteEvent::Removed { path } => {
                debug!(path = %path, "remote object removed");
                self.rebuild().await;
            }
            RemoteEvent::Reset => self.rebuild().await,
        }
    }
}

/// Handle for a running [`TreeWatcher`].
pub struct WatcherHandle {
    cancel_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stops the watcher and waits for it to finish.
    pub async fn stop(self) {
        self.cancel_token.cancel();
        let _ = self.join_handle.await;
    }

    pub fn is_running(&self) -> bool {
        !self.join_handle.is_finished()
    }
}

/// Background task that keeps a [`NamespaceTree`] in step with collaborator
/// events.
pub struct TreeWatcher;

impl TreeWatcher {
    /// Spawn the watcher. Returns `None` if the collaborator publishes no
    /// events.
    pub fn spawn(tree: Arc<NamespaceTree>) -> Option<WatcherHandle> {
        let events = tree.collaborator().subscribe()?;
        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let join_handle = tokio::spawn(async move {
            Self::run_loop(tree, events, token_clone).await;
        });

        Some(WatcherHandle {
            cancel_token,
            join_handle,
        })
    }

    async fn run_loop(
        tree: Arc<NamespaceTree>,
        mut events: broadcast::Receiver<RemoteEvent>,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => tree.apply(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed remote events, rebuilding tree");
                        tree.rebuild().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("remote event stream closed");
                        break;
                    }
                },
            }
        }
    }
}
