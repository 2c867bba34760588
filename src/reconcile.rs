//! Consumer-side reconciliation. Two patterns:
//!
//! * discrete actions (like/unlike, pin/unpin, delete): mutate the local tree
//!   immediately, fire the server call, then replace local state with the
//!   authoritative tree on success or revert on failure;
//! * debounced per-field merge for high-frequency text edits, so concurrent
//!   edits to different fields never clobber each other.
//!
//! A view runs on a single logical thread of control; server calls are
//! awaited in place and a closed view discards in-flight results.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::{Id, ThreadNode};
use crate::repo::EngagementRepo;
use crate::service::EngagementService;

/// Typed result of the startup health probe. Replaces any cached global
/// "is the store there" flag: callers receive the capability explicitly.
#[derive(Debug, Clone)]
pub enum StoreCapability {
    Available,
    Unavailable(String),
}

impl StoreCapability {
    pub async fn probe(repo: &dyn EngagementRepo) -> Self {
        match repo.ping().await {
            Ok(()) => StoreCapability::Available,
            Err(e) => StoreCapability::Unavailable(e.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, StoreCapability::Available)
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub capability: StoreCapability,
    /// Quiescence window for the field merger.
    pub debounce_window: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            capability: StoreCapability::Available,
            debounce_window: Duration::from_millis(1000),
        }
    }
}

impl ReconcilerConfig {
    /// A zero window would flush on every keystroke; clamp it.
    pub fn normalized(mut self) -> Self {
        if self.debounce_window.is_zero() {
            self.debounce_window = Duration::from_millis(1);
        }
        self
    }
}

/// Server surface the view reconciles against. `EngagementService` implements
/// it directly; tests substitute failing or counting backends.
#[async_trait]
pub trait ThreadBackend: Send + Sync {
    async fn fetch_thread(
        &self,
        subject_id: &str,
        viewer_id: Option<&str>,
    ) -> Result<Vec<ThreadNode>, EngineError>;
    async fn like(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError>;
    async fn unlike(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError>;
    async fn pin(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError>;
    async fn unpin(&self, subject_id: &str, user_id: &str) -> Result<(), EngineError>;
    async fn delete(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError>;
}

#[async_trait]
impl ThreadBackend for EngagementService {
    async fn fetch_thread(
        &self,
        subject_id: &str,
        viewer_id: Option<&str>,
    ) -> Result<Vec<ThreadNode>, EngineError> {
        self.list_thread(subject_id, viewer_id).await
    }
    async fn like(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError> {
        self.like_comment(comment_id, user_id).await
    }
    async fn unlike(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError> {
        self.unlike_comment(comment_id, user_id).await
    }
    async fn pin(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError> {
        self.pin_comment(comment_id, user_id).await
    }
    async fn unpin(&self, subject_id: &str, user_id: &str) -> Result<(), EngineError> {
        self.unpin_comment(subject_id, user_id).await
    }
    async fn delete(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError> {
        self.delete_comment(comment_id, user_id).await
    }
}

/// Optimistic local copy of one subject's thread for one viewer.
pub struct ThreadView {
    backend: Arc<dyn ThreadBackend>,
    subject_id: String,
    viewer_id: String,
    nodes: Vec<ThreadNode>,
    /// Bumped on close; refresh results from an older epoch are discarded.
    epoch: u64,
    closed: bool,
}

impl std::fmt::Debug for ThreadView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadView")
            .field("subject_id", &self.subject_id)
            .field("viewer_id", &self.viewer_id)
            .field("nodes", &self.nodes)
            .field("epoch", &self.epoch)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ThreadView {
    pub async fn open(
        backend: Arc<dyn ThreadBackend>,
        subject_id: &str,
        viewer_id: &str,
        config: &ReconcilerConfig,
    ) -> Result<Self, EngineError> {
        if let StoreCapability::Unavailable(reason) = &config.capability {
            return Err(EngineError::Storage(reason.clone()));
        }
        let nodes = backend.fetch_thread(subject_id, Some(viewer_id)).await?;
        Ok(Self {
            backend,
            subject_id: subject_id.to_string(),
            viewer_id: viewer_id.to_string(),
            nodes,
            epoch: 0,
            closed: false,
        })
    }

    pub fn nodes(&self) -> &[ThreadNode] {
        &self.nodes
    }

    /// Tear down the view. Any reconciliation still in flight is discarded;
    /// no write-after-cancel.
    pub fn close(&mut self) {
        self.closed = true;
        self.epoch += 1;
    }

    pub async fn like(&mut self, comment_id: Id) -> Result<(), EngineError> {
        let snapshot = self.nodes.clone();
        self.for_view(comment_id, |v| {
            if !v.viewer_has_liked {
                v.viewer_has_liked = true;
                v.like_count += 1;
            }
        });
        let backend = Arc::clone(&self.backend);
        let outcome = backend.like(comment_id, &self.viewer_id).await;
        self.settle(snapshot, outcome).await
    }

    pub async fn unlike(&mut self, comment_id: Id) -> Result<(), EngineError> {
        let snapshot = self.nodes.clone();
        self.for_view(comment_id, |v| {
            if v.viewer_has_liked {
                v.viewer_has_liked = false;
                v.like_count = (v.like_count - 1).max(0);
            }
        });
        let backend = Arc::clone(&self.backend);
        let outcome = backend.unlike(comment_id, &self.viewer_id).await;
        self.settle(snapshot, outcome).await
    }

    pub async fn pin(&mut self, comment_id: Id) -> Result<(), EngineError> {
        let snapshot = self.nodes.clone();
        for node in self.nodes.iter_mut() {
            node.comment.is_pinned = node.comment.id == comment_id;
        }
        let backend = Arc::clone(&self.backend);
        let outcome = backend.pin(comment_id, &self.viewer_id).await;
        self.settle(snapshot, outcome).await
    }

    pub async fn unpin(&mut self) -> Result<(), EngineError> {
        let snapshot = self.nodes.clone();
        for node in self.nodes.iter_mut() {
            node.comment.is_pinned = false;
        }
        let backend = Arc::clone(&self.backend);
        let outcome = backend.unpin(&self.subject_id, &self.viewer_id).await;
        self.settle(snapshot, outcome).await
    }

    pub async fn delete(&mut self, comment_id: Id) -> Result<(), EngineError> {
        let snapshot = self.nodes.clone();
        // mirror the server's soft-delete policy locally
        self.nodes.retain_mut(|node| {
            if node.comment.id == comment_id {
                if node.replies.is_empty() {
                    return false;
                }
                node.comment.deleted = true;
                node.comment.content.clear();
                node.comment.is_pinned = false;
                node.comment.like_count = 0;
                node.comment.viewer_has_liked = false;
            } else {
                node.replies.retain(|r| r.id != comment_id);
            }
            true
        });
        let backend = Arc::clone(&self.backend);
        let outcome = backend.delete(comment_id, &self.viewer_id).await;
        self.settle(snapshot, outcome).await
    }

    fn for_view(&mut self, comment_id: Id, f: impl Fn(&mut crate::models::CommentView)) {
        for node in self.nodes.iter_mut() {
            if node.comment.id == comment_id {
                f(&mut node.comment);
            }
            for reply in node.replies.iter_mut() {
                if reply.id == comment_id {
                    f(reply);
                }
            }
        }
    }

    /// On success replace local state with the authoritative tree; on failure
    /// roll the optimistic change back and surface the error.
    async fn settle(
        &mut self,
        snapshot: Vec<ThreadNode>,
        outcome: Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        match outcome {
            Ok(()) => {
                let epoch = self.epoch;
                let fresh = self
                    .backend
                    .fetch_thread(&self.subject_id, Some(&self.viewer_id))
                    .await?;
                if self.closed || self.epoch != epoch {
                    debug!(subject_id = %self.subject_id, "view closed; discarding refresh");
                    return Ok(());
                }
                self.nodes = fresh;
                Ok(())
            }
            Err(e) => {
                if !self.closed {
                    warn!(subject_id = %self.subject_id, error = %e, "reverting optimistic change");
                    self.nodes = snapshot;
                }
                Err(e)
            }
        }
    }
}

/// Where the merger fetches and persists the entity's editable fields.
#[async_trait]
pub trait FieldStore<K>: Send + Sync {
    async fn fetch(&self) -> Result<HashMap<K, String>, EngineError>;
    async fn persist(&self, fields: HashMap<K, String>) -> Result<(), EngineError>;
}

struct PendingEdit {
    value: String,
    deadline: Instant,
}

/// Per-field debounce-and-merge buffer. Every `edit` restarts only that
/// field's quiescence timer; when a timer elapses the flush fetches the
/// current authoritative state, overlays the due local edits (per-field
/// last-local-edit-wins, untouched fields keep the server value), persists
/// the merged map and clears the flushed entries.
pub struct DebouncedFieldMerger<K> {
    store: Arc<dyn FieldStore<K>>,
    window: Duration,
    pending: HashMap<K, PendingEdit>,
}

impl<K: Eq + Hash + Clone + Send + Sync> DebouncedFieldMerger<K> {
    pub fn new(store: Arc<dyn FieldStore<K>>, window: Duration) -> Self {
        let window = if window.is_zero() {
            Duration::from_millis(1)
        } else {
            window
        };
        Self {
            store,
            window,
            pending: HashMap::new(),
        }
    }

    /// Buffer a keystroke-level update; restarts this field's timer only.
    pub fn edit(&mut self, key: K, value: String) {
        self.pending.insert(
            key,
            PendingEdit {
                value,
                deadline: Instant::now() + self.window,
            },
        );
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Earliest pending deadline, for the caller's driver loop.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Flush every field whose quiescence window has elapsed. Returns how
    /// many fields were persisted. On failure the buffer is kept so a later
    /// flush retries; nothing is assumed durable.
    pub async fn flush_due(&mut self) -> Result<usize, EngineError> {
        let now = Instant::now();
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        if due.is_empty() {
            return Ok(0);
        }

        let mut merged = self.store.fetch().await?;
        for key in &due {
            if let Some(p) = self.pending.get(key) {
                merged.insert(key.clone(), p.value.clone());
            }
        }
        self.store.persist(merged).await?;
        for key in &due {
            self.pending.remove(key);
        }
        Ok(due.len())
    }

    /// Drive timers until the buffer drains. Intended for view teardown and
    /// tests; interactive callers sleep until `next_deadline` themselves.
    pub async fn run_until_idle(&mut self) -> Result<(), EngineError> {
        while let Some(deadline) = self.next_deadline() {
            tokio::time::sleep_until(deadline).await;
            self.flush_due().await?;
        }
        Ok(())
    }
}
