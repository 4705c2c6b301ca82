// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! In-memory backend.
//!
//! Keeps glyphs in a map with a revision counter per glyph. Besides
//! serving embedders that have no files, it exposes hooks to simulate an
//! external editor (`modify`), to count backend traffic, and to inject
//! slow loads and failing writes.

use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{Backend, SourceVersion};
use crate::model::glyph::VariableGlyph;

#[derive(Debug, Default)]
struct MemoryState {
    glyphs: HashMap<String, StoredGlyph>,
    next_revision: u64,
    load_delay: Duration,
}

#[derive(Debug, Clone)]
struct StoredGlyph {
    glyph: VariableGlyph,
    revision: u64,
}

/// Glyph storage held in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    loads: AtomicUsize,
    stores: AtomicUsize,
    failing_stores: AtomicU32,
    failing_loads: AtomicBool,
    failing_versions: AtomicBool,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend holding `glyphs`
    pub fn with_glyphs(glyphs: impl IntoIterator<Item = VariableGlyph>) -> Self {
        let backend = Self::new();
        for glyph in glyphs {
            backend.insert(glyph);
        }
        backend
    }

    /// Add or replace a glyph, bumping its revision
    pub fn insert(&self, glyph: VariableGlyph) {
        let mut state = self.lock();
        state.next_revision += 1;
        let revision = state.next_revision;
        state
            .glyphs
            .insert(glyph.name.clone(), StoredGlyph { glyph, revision });
    }

    /// Change a stored glyph behind the handler's back.
    ///
    /// Returns false if the glyph does not exist.
    pub fn modify(&self, name: &str, edit: impl FnOnce(&mut VariableGlyph)) -> bool {
        let mut state = self.lock();
        state.next_revision += 1;
        let revision = state.next_revision;
        match state.glyphs.get_mut(name) {
            Some(stored) => {
                edit(&mut stored.glyph);
                stored.revision = revision;
                true
            }
            None => false,
        }
    }

    /// Read a glyph directly, bypassing any handler
    pub fn stored(&self, name: &str) -> Option<VariableGlyph> {
        self.lock().glyphs.get(name).map(|s| s.glyph.clone())
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    /// Make every load sleep for `delay` before reading
    pub fn set_load_delay(&self, delay: Duration) {
        self.lock().load_delay = delay;
    }

    /// Make the next `count` stores fail
    pub fn fail_next_stores(&self, count: u32) {
        self.failing_stores.store(count, Ordering::SeqCst);
    }

    /// Make loads fail until switched off again
    pub fn set_failing_loads(&self, failing: bool) {
        self.failing_loads.store(failing, Ordering::SeqCst);
    }

    /// Make version lookups fail until switched off again
    pub fn set_failing_versions(&self, failing: bool) {
        self.failing_versions.store(failing, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Lock the state, recovering from poison
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("MemoryBackend mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Backend for MemoryBackend {
    fn load_glyph(&self, name: &str) -> Result<VariableGlyph> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = self.lock().load_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.failing_loads.load(Ordering::SeqCst) {
            bail!("simulated load failure for '{name}'");
        }
        self.stored(name)
            .ok_or_else(|| anyhow!("glyph '{name}' not found"))
    }

    fn store_glyph(&self, name: &str, glyph: &VariableGlyph) -> Result<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failing_stores
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            bail!("simulated store failure for '{name}'");
        }
        let mut state = self.lock();
        state.next_revision += 1;
        let revision = state.next_revision;
        state.glyphs.insert(
            name.to_string(),
            StoredGlyph {
                glyph: glyph.clone(),
                revision,
            },
        );
        Ok(())
    }

    fn source_version(&self, name: &str) -> Result<SourceVersion> {
        if self.failing_versions.load(Ordering::SeqCst) {
            bail!("simulated version lookup failure for '{name}'");
        }
        let state = self.lock();
        // A missing glyph still has a version so deletions are noticed
        let revision = state.glyphs.get(name).map(|s| s.revision).unwrap_or(0);
        Ok(SourceVersion::new(revision))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
