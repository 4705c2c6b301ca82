// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Ordered asynchronous persistence.
//!
//! Committed edits queue up per glyph. Glyphs are scheduled in the order
//! they first received work, and a glyph is never written by two tasks at
//! once, so writes for one glyph land in commit order. Everything queued
//! for a glyph when its turn comes is written as one store of the newest
//! snapshot; all records in that batch share the outcome.

use anyhow::anyhow;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, watch};
use tokio::task::JoinSet;

use super::HandlerInner;
use super::record::PersistStatus;
use crate::backend::SourceVersion;
use crate::model::glyph::VariableGlyph;

pub(crate) struct WriteJob {
    pub record_id: u64,
    pub glyph: Arc<VariableGlyph>,
}

/// Queued jobs of one glyph, collapsed to the newest snapshot
pub(crate) struct Batch {
    pub name: String,
    pub record_ids: Vec<u64>,
    pub glyph: Arc<VariableGlyph>,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, VecDeque<WriteJob>>,
    /// Glyphs with queued jobs that are not being written
    ready: VecDeque<String>,
    /// Glyphs with a batch in flight
    busy: HashSet<String>,
    /// Status senders of every unsettled record
    statuses: BTreeMap<u64, watch::Sender<PersistStatus>>,
    /// Set once the queue is closed; later jobs fail with this message
    closed: Option<String>,
}

#[derive(Default)]
pub(crate) struct WriteQueue {
    state: Mutex<QueueState>,
    wakeup: Notify,
}

impl WriteQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Write queue mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Queue a job, or fail it at once if the queue is closed
    pub fn push(&self, name: &str, job: WriteJob, status: watch::Sender<PersistStatus>) {
        {
            let mut state = self.lock();
            if let Some(message) = &state.closed {
                status.send_replace(PersistStatus::Failed {
                    attempts: 0,
                    message: message.clone(),
                });
                tracing::warn!("Write for '{}' refused, queue is closed", name);
                return;
            }
            state.statuses.insert(job.record_id, status);
            let queue = state.jobs.entry(name.to_string()).or_default();
            let was_empty = queue.is_empty();
            queue.push_back(job);
            if was_empty && !state.busy.contains(name) {
                state.ready.push_back(name.to_string());
            }
        }
        tracing::debug!("Queued write for '{}'", name);
        self.wakeup.notify_one();
    }

    /// Take the next glyph's jobs and mark the glyph busy
    pub fn take_batch(&self) -> Option<Batch> {
        let mut state = self.lock();
        while let Some(name) = state.ready.pop_front() {
            let Some(jobs) = state.jobs.remove(&name) else {
                continue;
            };
            let Some(glyph) = jobs.back().map(|job| Arc::clone(&job.glyph)) else {
                continue;
            };
            state.busy.insert(name.clone());
            return Some(Batch {
                record_ids: jobs.iter().map(|job| job.record_id).collect(),
                name,
                glyph,
            });
        }
        None
    }

    /// Settle a batch's records and release its glyph
    pub fn finish_batch(&self, batch: &Batch, status: PersistStatus) {
        let requeued = {
            let mut state = self.lock();
            for id in &batch.record_ids {
                if let Some(sender) = state.statuses.remove(id) {
                    sender.send_replace(status.clone());
                }
            }
            state.busy.remove(&batch.name);
            let more = state.jobs.get(&batch.name).is_some_and(|q| !q.is_empty());
            if more {
                state.ready.push_back(batch.name.clone());
            }
            more
        };
        if requeued {
            self.wakeup.notify_one();
        }
    }

    /// Status receivers of every record not yet settled
    pub fn pending_statuses(&self) -> Vec<watch::Receiver<PersistStatus>> {
        self.lock()
            .statuses
            .values()
            .map(watch::Sender::subscribe)
            .collect()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.busy.is_empty() && state.jobs.values().all(VecDeque::is_empty)
    }

    /// Mark every unsettled record failed, empty the queue and refuse
    /// further jobs
    pub fn close(&self, message: &str) -> usize {
        let mut state = self.lock();
        state.closed = Some(message.to_string());
        let statuses = std::mem::take(&mut state.statuses);
        state.jobs.clear();
        state.ready.clear();
        state.busy.clear();
        for sender in statuses.values() {
            sender.send_replace(PersistStatus::Failed {
                attempts: 0,
                message: message.to_string(),
            });
        }
        statuses.len()
    }

    pub async fn wait_for_work(&self) {
        self.wakeup.notified().await;
    }
}

// ============================================================================
// PERSISTENCE
// ============================================================================

/// Write one batch, retrying with backoff, then settle it
pub(crate) async fn persist_batch(inner: &Arc<HandlerInner>, batch: Batch) {
    let max_attempts = inner.config.persist_max_attempts;
    let mut attempt = 0;
    let outcome: Result<SourceVersion, String> = loop {
        attempt += 1;
        let backend = Arc::clone(&inner.backend);
        let name = batch.name.clone();
        let glyph = Arc::clone(&batch.glyph);
        let stored = tokio::task::spawn_blocking(move || -> anyhow::Result<SourceVersion> {
            backend.store_glyph(&name, &glyph)?;
            backend.source_version(&name)
        })
        .await
        .unwrap_or_else(|e| Err(anyhow!("store task failed: {e}")));

        match stored {
            Ok(version) => break Ok(version),
            Err(e) if attempt < max_attempts => {
                let delay = inner.config.backoff(attempt);
                tracing::warn!(
                    "Writing '{}' failed (attempt {}/{}), retrying in {:?}: {:#}",
                    batch.name,
                    attempt,
                    max_attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => break Err(format!("{e:#}")),
        }
    };

    let count = batch.record_ids.len();
    let status = match outcome {
        Ok(version) => {
            inner.cache.finish_writes(&batch.name, count, Some(version));
            tracing::debug!("Persisted '{}' ({} edits)", batch.name, count);
            PersistStatus::Committed
        }
        Err(message) => {
            inner.cache.finish_writes(&batch.name, count, None);
            tracing::error!(
                "Giving up on '{}' after {} attempts ({} edits not saved): {}",
                batch.name,
                attempt,
                count,
                message
            );
            PersistStatus::Failed {
                attempts: attempt,
                message,
            }
        }
    };
    inner.queue.finish_batch(&batch, status);
}

/// Persist everything queued, one batch at a time, in the calling task
pub(crate) async fn flush_queue(inner: &Arc<HandlerInner>) -> usize {
    let mut batches = 0;
    while let Some(batch) = inner.queue.take_batch() {
        persist_batch(inner, batch).await;
        batches += 1;
    }
    batches
}

/// The persistence worker.
///
/// Runs one task per busy glyph. On shutdown it stops waiting for new
/// work and returns once the queue is empty.
pub(crate) async fn run_writer(inner: Arc<HandlerInner>, mut shutdown: watch::Receiver<bool>) {
    let mut tasks = JoinSet::new();
    let mut draining = false;
    loop {
        while let Some(batch) = inner.queue.take_batch() {
            let inner = Arc::clone(&inner);
            tasks.spawn(async move { persist_batch(&inner, batch).await });
        }
        if draining && tasks.is_empty() && inner.queue.is_idle() {
            break;
        }
        tokio::select! {
            _ = inner.queue.wait_for_work() => {}
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("Write task failed: {}", e);
                }
            }
            _ = shutdown.changed(), if !draining => {
                tracing::debug!("Write worker draining");
                draining = true;
            }
        }
    }
    tracing::debug!("Write worker stopped");
}
