// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! The glyph cache.
//!
//! Each name maps to a slot that is either loading (holding the shared
//! load future every concurrent `get` awaits) or ready. A ready entry
//! carries the version marker of the backend data it matches and a count
//! of committed edits that are not yet written. The map lock is a plain
//! std mutex and is never held across an await.

use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::SourceVersion;
use crate::error::HandlerError;
use crate::model::glyph::VariableGlyph;

pub(crate) type LoadResult = Result<Arc<VariableGlyph>, HandlerError>;
pub(crate) type LoadFuture = Shared<BoxFuture<'static, LoadResult>>;

pub(crate) struct Entry {
    pub glyph: Arc<VariableGlyph>,
    /// Backend version this entry matches, `None` if it could not be read
    pub version: Option<SourceVersion>,
    /// Bumped on every install and commit
    pub generation: u64,
    /// Committed edits not yet settled by the write queue
    pub pending_writes: usize,
}

pub(crate) enum Slot {
    Loading { token: u64, future: LoadFuture },
    Ready(Entry),
}

/// Outcome of a cache lookup
pub(crate) enum Lookup {
    Hit(Arc<VariableGlyph>),
    Load(LoadFuture),
}

/// A ready entry the watcher may check
#[derive(Debug, Clone)]
pub(crate) struct WatchCandidate {
    pub name: String,
    pub generation: u64,
}

#[derive(Default)]
pub(crate) struct GlyphCache {
    slots: Mutex<HashMap<String, Slot>>,
    counter: AtomicU64,
}

impl GlyphCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Glyph cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Return the cached glyph, join an in-flight load, or start one.
    ///
    /// `start` builds the load future for a fresh token; it runs under the
    /// map lock so only one load per name is ever started.
    pub fn lookup(&self, name: &str, start: impl FnOnce(u64) -> LoadFuture) -> Lookup {
        let mut slots = self.lock();
        match slots.get(name) {
            Some(Slot::Ready(entry)) => Lookup::Hit(Arc::clone(&entry.glyph)),
            Some(Slot::Loading { future, .. }) => Lookup::Load(future.clone()),
            None => {
                let token = self.next();
                let future = start(token);
                slots.insert(
                    name.to_string(),
                    Slot::Loading {
                        token,
                        future: future.clone(),
                    },
                );
                Lookup::Load(future)
            }
        }
    }

    /// Install the result of load `token`, or drop the slot if it failed
    pub fn finish_load(
        &self,
        name: &str,
        token: u64,
        loaded: Result<(VariableGlyph, Option<SourceVersion>), HandlerError>,
    ) -> LoadResult {
        let mut slots = self.lock();
        let ours = matches!(slots.get(name), Some(Slot::Loading { token: t, .. }) if *t == token);
        match loaded {
            Ok((glyph, version)) => {
                let glyph = Arc::new(glyph);
                if ours {
                    let generation = self.next();
                    slots.insert(
                        name.to_string(),
                        Slot::Ready(Entry {
                            glyph: Arc::clone(&glyph),
                            version,
                            generation,
                            pending_writes: 0,
                        }),
                    );
                }
                Ok(glyph)
            }
            Err(e) => {
                if ours {
                    slots.remove(name);
                }
                Err(e)
            }
        }
    }

    /// Replace `base` with `updated` if `base` is still the cached value.
    ///
    /// On success the entry counts one more pending write.
    pub fn commit(
        &self,
        name: &str,
        base: &Arc<VariableGlyph>,
        updated: Arc<VariableGlyph>,
    ) -> bool {
        let mut slots = self.lock();
        match slots.get_mut(name) {
            Some(Slot::Ready(entry)) if Arc::ptr_eq(&entry.glyph, base) => {
                entry.glyph = updated;
                entry.generation = self.next();
                entry.pending_writes += 1;
                true
            }
            _ => false,
        }
    }

    /// Settle `count` pending writes, recording the written version
    pub fn finish_writes(&self, name: &str, count: usize, version: Option<SourceVersion>) {
        let mut slots = self.lock();
        if let Some(Slot::Ready(entry)) = slots.get_mut(name) {
            entry.pending_writes = entry.pending_writes.saturating_sub(count);
            if version.is_some() {
                entry.version = version;
            }
        }
    }

    /// Ready entries with no unwritten edits
    pub fn watch_candidates(&self) -> Vec<WatchCandidate> {
        self.lock()
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Ready(entry) if entry.pending_writes == 0 => Some(WatchCandidate {
                    name: name.clone(),
                    generation: entry.generation,
                }),
                _ => None,
            })
            .collect()
    }

    /// Evict the candidate if the backend moved past the version it matches.
    ///
    /// Entries that were committed to, reloaded or given pending writes
    /// since the candidate was taken are left alone.
    pub fn evict_if_stale(&self, candidate: &WatchCandidate, current: SourceVersion) -> bool {
        let mut slots = self.lock();
        let Some(Slot::Ready(entry)) = slots.get_mut(&candidate.name) else {
            return false;
        };
        if entry.generation != candidate.generation || entry.pending_writes > 0 {
            return false;
        }
        let known = entry.version;
        match known {
            Some(known) if known == current => false,
            Some(_) => {
                slots.remove(&candidate.name);
                true
            }
            None => {
                entry.version = Some(current);
                false
            }
        }
    }

    /// The cached glyph, if one is ready
    pub fn cached(&self, name: &str) -> Option<Arc<VariableGlyph>> {
        match self.lock().get(name) {
            Some(Slot::Ready(entry)) => Some(Arc::clone(&entry.glyph)),
            _ => None,
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
