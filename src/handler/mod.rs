// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! The glyph handler: cache, edits, persistence and change watching.
//!
//! `GlyphHandler` owns the cache of materialized glyphs. Reads come from
//! the cache and load through it on a miss. Edits are applied to a
//! working copy, committed to the cache before `edit` returns and then
//! written by a background worker. A second worker evicts entries whose
//! backing data was changed by someone else.
//!
//! Between an external change and the watcher noticing it, `get` keeps
//! returning the old value. That window is bounded by the watch interval.

pub mod cache;
pub mod record;
pub mod watcher;
pub mod write_queue;

use anyhow::anyhow;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use self::cache::{GlyphCache, LoadFuture, Lookup};
use self::write_queue::{WriteJob, WriteQueue};
use crate::backend::Backend;
use crate::changes::{Change, FunctionRegistry, GLYPHS_KEY, apply_change_in_place};
use crate::error::{ChangeError, HandlerError};
use crate::model::glyph::VariableGlyph;
use crate::settings::HandlerConfig;

pub use record::{ChangeNotification, EditRecord, PersistStatus};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// State shared between the handler and its workers
pub(crate) struct HandlerInner {
    pub backend: Arc<dyn Backend>,
    pub registry: FunctionRegistry,
    pub config: HandlerConfig,
    pub cache: GlyphCache,
    pub queue: WriteQueue,
    edit_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    history: Mutex<VecDeque<EditRecord>>,
    notifications: broadcast::Sender<ChangeNotification>,
    next_record_id: AtomicU64,
    closed: AtomicBool,
}

enum WorkerState {
    Idle,
    Running {
        shutdown: watch::Sender<bool>,
        watcher: JoinHandle<()>,
        writer: JoinHandle<()>,
    },
    Stopped,
}

/// Live-editing front end over a glyph backend
pub struct GlyphHandler {
    inner: Arc<HandlerInner>,
    workers: Mutex<WorkerState>,
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

impl GlyphHandler {
    pub fn new(backend: Arc<dyn Backend>, registry: FunctionRegistry, config: HandlerConfig) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            inner: Arc::new(HandlerInner {
                backend,
                registry,
                config,
                cache: GlyphCache::default(),
                queue: WriteQueue::default(),
                edit_locks: Mutex::new(HashMap::new()),
                history: Mutex::new(VecDeque::new()),
                notifications,
                next_record_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
            workers: Mutex::new(WorkerState::Idle),
        }
    }

    /// Handler with the glyph change functions and default settings
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self::new(backend, FunctionRegistry::glyph_changes(), HandlerConfig::default())
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.inner.registry
    }

    fn workers(&self) -> MutexGuard<'_, WorkerState> {
        lock_or_recover(&self.workers, "GlyphHandler worker state")
    }
}

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("{} mutex was poisoned, recovering", what);
        poisoned.into_inner()
    })
}

// ============================================================================
// READING
// ============================================================================

impl GlyphHandler {
    /// Get a glyph, loading it on a cache miss.
    ///
    /// Concurrent calls for an uncached glyph share one backend load and
    /// receive the same value or the same error. A failed load leaves no
    /// cache entry, so the next call retries.
    pub async fn get(&self, name: &str) -> Result<Arc<VariableGlyph>, HandlerError> {
        self.inner.ensure_open()?;
        let lookup = self
            .inner
            .cache
            .lookup(name, |token| load_future(&self.inner, name, token));
        match lookup {
            Lookup::Hit(glyph) => {
                tracing::debug!("Cache hit for '{}'", name);
                Ok(glyph)
            }
            Lookup::Load(future) => future.await,
        }
    }

    /// Same as [`get`](Self::get).
    ///
    /// Freshness is decided only by the handler's own invalidation: a
    /// value turns stale once the watcher (or a local edit) has acted,
    /// never through a read-through to the backend here.
    pub async fn get_fresh(&self, name: &str) -> Result<Arc<VariableGlyph>, HandlerError> {
        self.get(name).await
    }

    /// The cached value, without loading
    pub fn cached(&self, name: &str) -> Option<Arc<VariableGlyph>> {
        self.inner.cache.cached(name)
    }
}

fn load_future(inner: &Arc<HandlerInner>, name: &str, token: u64) -> LoadFuture {
    let inner = Arc::clone(inner);
    let name = name.to_string();
    async move {
        tracing::info!("Loading glyph '{}'", name);
        let backend = Arc::clone(&inner.backend);
        let glyph_name = name.clone();
        let loaded = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            // Read the version first so a change racing the load is caught
            let version = backend.source_version(&glyph_name).ok();
            let glyph = backend.load_glyph(&glyph_name)?;
            Ok((glyph, version))
        })
        .await
        .unwrap_or_else(|e| Err(anyhow!("load task failed: {e}")))
        .map_err(|e| {
            tracing::warn!("Failed to load glyph '{}': {:#}", name, e);
            HandlerError::load(name.as_str(), e)
        });
        inner.cache.finish_load(&name, token, loaded)
    }
    .boxed()
    .shared()
}

// ============================================================================
// EDITING
// ============================================================================

impl GlyphHandler {
    /// Apply `change` to the glyph it addresses and commit it.
    ///
    /// The new value is in the cache when this returns; writing it to the
    /// backend happens later (see [`EditRecord::wait_persisted`] and
    /// [`flush`](Self::flush)). On error the cache is unchanged. Edits to
    /// one glyph are applied in the order they are submitted.
    pub async fn edit(
        &self,
        change: Change,
        rollback: Change,
        comment: impl Into<String>,
        originator: Option<String>,
    ) -> Result<EditRecord, HandlerError> {
        self.inner.ensure_open()?;
        let (name, _) = change.glyph_target()?;
        let lock = self.inner.edit_lock(&name);
        let _guard = lock.lock().await;

        let updated = loop {
            self.inner.ensure_open()?;
            let current = self.get(&name).await?;
            let updated = Arc::new(self.inner.apply_to_glyph(&name, &current, &change)?);
            if self.inner.cache.commit(&name, &current, Arc::clone(&updated)) {
                break updated;
            }
            // Evicted while we worked: redo against the reloaded glyph
            tracing::debug!("'{}' changed during edit, retrying", name);
        };

        let id = self.inner.next_record_id.fetch_add(1, Ordering::Relaxed);
        let (status_tx, status_rx) = watch::channel(PersistStatus::Pending);
        let record = EditRecord::new(
            id,
            name.clone(),
            change,
            rollback,
            comment.into(),
            originator,
            status_rx,
        );
        self.inner.queue.push(
            &name,
            WriteJob {
                record_id: id,
                glyph: updated,
            },
            status_tx,
        );
        tracing::debug!("Committed edit {} to '{}': {}", id, name, record.comment());

        // No subscribers is fine
        let _ = self.inner.notifications.send(ChangeNotification {
            glyph_name: name,
            change: record.change().clone(),
            originator: record.originator().map(str::to_string),
        });
        self.inner.remember(record.clone());
        Ok(record)
    }

    /// Apply a record's rollback as a new edit
    pub async fn revert(
        &self,
        record: &EditRecord,
        originator: Option<String>,
    ) -> Result<EditRecord, HandlerError> {
        self.edit(
            record.rollback().clone(),
            record.change().clone(),
            format!("Revert: {}", record.comment()),
            originator,
        )
        .await
    }

    /// Recent edit records, oldest first
    pub fn history(&self) -> Vec<EditRecord> {
        lock_or_recover(&self.inner.history, "Edit history")
            .iter()
            .cloned()
            .collect()
    }

    /// Receive a notification for every committed edit
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.inner.notifications.subscribe()
    }
}

impl HandlerInner {
    fn ensure_open(&self) -> Result<(), HandlerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(HandlerError::Closed)
        } else {
            Ok(())
        }
    }

    fn edit_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = lock_or_recover(&self.edit_locks, "Edit lock table");
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Run `change` against a working copy of `glyph`.
    ///
    /// The copy sits in a `{"glyphs": {name: glyph}}` document so paths
    /// and error locations are the same as the caller's.
    fn apply_to_glyph(
        &self,
        name: &str,
        glyph: &VariableGlyph,
        change: &Change,
    ) -> Result<VariableGlyph, ChangeError> {
        let working =
            serde_json::to_value(glyph).map_err(|e| ChangeError::InvalidDocument(e.to_string()))?;
        let mut glyphs = Map::new();
        glyphs.insert(name.to_string(), working);
        let mut root = Map::new();
        root.insert(GLYPHS_KEY.to_string(), Value::Object(glyphs));
        let mut document = Value::Object(root);

        apply_change_in_place(&self.registry, &mut document, change)?;

        let working = document
            .get_mut(GLYPHS_KEY)
            .and_then(|glyphs| glyphs.get_mut(name))
            .map(Value::take)
            .ok_or_else(|| ChangeError::InvalidDocument(format!("glyph '{name}' was removed")))?;
        let updated: VariableGlyph = serde_json::from_value(working)
            .map_err(|e| ChangeError::InvalidDocument(e.to_string()))?;
        if updated.name != name {
            return Err(ChangeError::InvalidDocument(format!(
                "glyph '{name}' cannot be renamed to '{}'",
                updated.name
            )));
        }
        updated.validate()?;
        Ok(updated)
    }

    fn remember(&self, record: EditRecord) {
        let limit = self.config.history_limit;
        if limit == 0 {
            return;
        }
        let mut history = lock_or_recover(&self.history, "Edit history");
        while history.len() >= limit {
            history.pop_front();
        }
        history.push_back(record);
    }
}

// ============================================================================
// PERSISTENCE & LIFECYCLE
// ============================================================================

impl GlyphHandler {
    /// Start the watcher and the write worker. Calling it again is a no-op.
    pub async fn start(&self) -> Result<(), HandlerError> {
        let mut workers = self.workers();
        match &*workers {
            WorkerState::Running { .. } => Ok(()),
            WorkerState::Stopped => Err(HandlerError::Closed),
            WorkerState::Idle => {
                let (shutdown, rx) = watch::channel(false);
                let watcher = tokio::spawn(watcher::run_watcher(Arc::clone(&self.inner), rx.clone()));
                let writer = tokio::spawn(write_queue::run_writer(Arc::clone(&self.inner), rx));
                *workers = WorkerState::Running {
                    shutdown,
                    watcher,
                    writer,
                };
                tracing::info!(
                    "Glyph handler started (watch interval {:?})",
                    self.inner.config.watch_interval()
                );
                Ok(())
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.workers(), WorkerState::Running { .. })
    }

    /// Wait until every edit committed before this call is written or has
    /// permanently failed. Edits committed later are not waited for.
    pub async fn flush(&self) {
        // Snapshot first so batches another task is writing are waited for too
        let pending = self.inner.queue.pending_statuses();
        if !self.is_running() {
            self.flush_once().await;
        }
        wait_settled(pending).await;
    }

    /// [`flush`](Self::flush) with a deadline
    pub async fn flush_timeout(&self, limit: Duration) -> Result<(), HandlerError> {
        tokio::time::timeout(limit, self.flush())
            .await
            .map_err(|_| HandlerError::Timeout(limit))
    }

    /// Write everything queued in the calling task. Returns the number of
    /// batches written.
    ///
    /// For embedders that drive persistence themselves instead of calling
    /// [`start`](Self::start).
    pub async fn flush_once(&self) -> usize {
        write_queue::flush_queue(&self.inner).await
    }

    /// Check all idle cache entries for external changes once. Returns
    /// the number of evicted entries.
    pub async fn poll_once(&self) -> usize {
        watcher::poll_once(&self.inner).await
    }

    /// Stop the workers, write out queued edits and release the backend.
    ///
    /// Queued edits get up to `stop_timeout_ms` to be written; whatever is
    /// still unwritten then is marked failed. Afterwards `get` and `edit`
    /// return `Closed`. Safe to call more than once, or without `start`.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.workers(), WorkerState::Stopped);
        if matches!(previous, WorkerState::Stopped) {
            return;
        }
        self.inner.closed.store(true, Ordering::SeqCst);
        let deadline = self.inner.config.stop_timeout();

        match previous {
            WorkerState::Running {
                shutdown,
                watcher,
                mut writer,
            } => {
                let _ = shutdown.send(true);
                if let Err(e) = watcher.await {
                    tracing::warn!("Watcher task ended abnormally: {}", e);
                }
                if tokio::time::timeout(deadline, &mut writer).await.is_err() {
                    tracing::warn!("Write worker did not drain within {:?}", deadline);
                    writer.abort();
                }
            }
            WorkerState::Idle => {
                // Includes batches a concurrent `flush` is still writing
                let pending = self.inner.queue.pending_statuses();
                let drain = async {
                    self.flush_once().await;
                    wait_settled(pending).await;
                };
                if tokio::time::timeout(deadline, drain).await.is_err() {
                    tracing::warn!("Queued writes did not finish within {:?}", deadline);
                }
            }
            WorkerState::Stopped => {}
        }

        let abandoned = self
            .inner
            .queue
            .close("handler stopped before the edit was written");
        if abandoned > 0 {
            tracing::error!("{} edits were not written before stop", abandoned);
        }
        self.inner.cache.clear();
        lock_or_recover(&self.inner.history, "Edit history").clear();
        self.inner.backend.close();
        tracing::info!("Glyph handler stopped");
    }
}

async fn wait_settled(statuses: Vec<watch::Receiver<PersistStatus>>) {
    for mut status in statuses {
        // A closed channel means the record was settled or abandoned
        let _ = status.wait_for(PersistStatus::is_settled).await;
    }
}

impl Drop for GlyphHandler {
    fn drop(&mut self) {
        let state = std::mem::replace(&mut *self.workers(), WorkerState::Stopped);
        if let WorkerState::Running { watcher, writer, .. } = state {
            tracing::warn!("GlyphHandler dropped while running; queued writes are abandoned");
            watcher.abort();
            writer.abort();
        }
    }
}
