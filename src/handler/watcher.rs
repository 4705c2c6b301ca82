// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! External-change watcher.
//!
//! Polls the backend's version markers on a fixed interval and evicts
//! cache entries whose backing data moved on. When the backend names
//! directories to watch, `notify` events (inotify on Linux, FSEvents on
//! macOS) trigger an extra poll after a short quiet period, so most
//! external saves are picked up well before the next tick. Our own writes
//! also fire events; they are told apart by the version the write queue
//! records after each store.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use super::HandlerInner;

/// OS file events, reduced to "something changed"
struct FsEvents {
    // Kept alive for as long as events are wanted
    _watcher: Option<RecommendedWatcher>,
    // Holds the channel open when there is no watcher
    _idle: Option<mpsc::Sender<()>>,
    rx: mpsc::Receiver<()>,
}

impl FsEvents {
    fn disabled() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            _watcher: None,
            _idle: Some(tx),
            rx,
        }
    }

    fn watch(paths: &[PathBuf]) -> Self {
        if paths.is_empty() {
            return Self::disabled();
        }

        let (tx, rx) = mpsc::channel::<()>(64);
        let mut watcher =
            match notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                if let Ok(event) = result {
                    use notify::EventKind::*;
                    if matches!(event.kind, Create(_) | Modify(_) | Remove(_)) {
                        // A full channel already holds a wakeup
                        let _ = tx.try_send(());
                    }
                }
            }) {
                Ok(w) => w,
                Err(e) => {
                    tracing::error!("Failed to create file watcher: {}", e);
                    return Self::disabled();
                }
            };

        for path in paths {
            if let Err(e) = watcher.watch(path, RecursiveMode::Recursive) {
                tracing::error!("Failed to watch {}: {}", path.display(), e);
            } else {
                tracing::info!("Watching for external changes: {}", path.display());
            }
        }

        Self {
            _watcher: Some(watcher),
            _idle: None,
            rx,
        }
    }

    /// Wait for an event, then for `debounce` of quiet
    async fn next_burst(&mut self, debounce: std::time::Duration) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
        while let Ok(Some(())) = tokio::time::timeout(debounce, self.rx.recv()).await {}
    }
}

/// Check every idle cache entry once and evict the stale ones.
///
/// Returns the number of evicted entries. Backend errors are logged and
/// leave the affected entries in place.
pub(crate) async fn poll_once(inner: &Arc<HandlerInner>) -> usize {
    let candidates = inner.cache.watch_candidates();
    if candidates.is_empty() {
        return 0;
    }

    let names: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
    let backend = Arc::clone(&inner.backend);
    let versions = match tokio::task::spawn_blocking(move || backend.source_versions(&names)).await
    {
        Ok(versions) => versions,
        Err(e) => {
            tracing::warn!("External change poll failed: {}", e);
            return 0;
        }
    };

    let mut evicted = 0;
    for (candidate, version) in candidates.iter().zip(versions) {
        match version {
            Ok(current) => {
                if inner.cache.evict_if_stale(candidate, current) {
                    tracing::info!("External change to '{}', dropped from cache", candidate.name);
                    evicted += 1;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to check '{}' for external changes: {:#}", candidate.name, e);
            }
        }
    }
    evicted
}

/// The watcher loop. Exits when `shutdown` changes or its sender is dropped.
pub(crate) async fn run_watcher(inner: Arc<HandlerInner>, mut shutdown: watch::Receiver<bool>) {
    let mut events = if inner.config.use_fs_events {
        FsEvents::watch(&inner.backend.watch_paths())
    } else {
        FsEvents::disabled()
    };
    let debounce = inner.config.watch_debounce();
    let mut interval = tokio::time::interval(inner.config.watch_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = events.next_burst(debounce) => {
                tracing::debug!("File events seen, polling for external changes");
            }
            _ = shutdown.changed() => break,
        }
        poll_once(&inner).await;
    }
    tracing::debug!("External change watcher stopped");
}
