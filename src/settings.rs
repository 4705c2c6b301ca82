// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Handler settings and configuration constants.
//!
//! The constants below are the defaults. A `HandlerConfig` can override
//! any of them from a TOML file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// WATCHER SETTINGS
// ============================================================================
/// How often the watcher compares version markers (milliseconds)
const WATCH_INTERVAL_MS: u64 = 100;

/// Quiet period after a file event before polling (milliseconds)
const WATCH_DEBOUNCE_MS: u64 = 50;

/// Whether OS file events nudge the poll loop
const USE_FS_EVENTS: bool = true;

// ============================================================================
// PERSISTENCE SETTINGS
// ============================================================================
/// Store attempts per batch before a write is marked failed
const PERSIST_MAX_ATTEMPTS: u32 = 5;

/// First retry delay (milliseconds), doubled after each failure
const PERSIST_BACKOFF_INITIAL_MS: u64 = 25;

/// Upper bound on the retry delay (milliseconds)
const PERSIST_BACKOFF_MAX_MS: u64 = 1000;

// ============================================================================
// HANDLER SETTINGS
// ============================================================================
/// Edit records kept for history and revert
const HISTORY_LIMIT: usize = 256;

/// Buffered change notifications per subscriber
const NOTIFICATION_CAPACITY: usize = 256;

/// How long `stop()` waits for queued writes (milliseconds)
const STOP_TIMEOUT_MS: u64 = 10_000;

/// Environment variable naming a TOML config file for the binary
const CONFIG_ENV_VAR: &str = "RUNEBENDER_SYNC_CONFIG";

// ============================================================================
// PUBLIC API
// ============================================================================

/// External-change watcher
pub mod watcher {
    pub const INTERVAL_MS: u64 = super::WATCH_INTERVAL_MS;
    pub const DEBOUNCE_MS: u64 = super::WATCH_DEBOUNCE_MS;
    pub const USE_FS_EVENTS: bool = super::USE_FS_EVENTS;
}

/// Write queue retry policy
pub mod persist {
    pub const MAX_ATTEMPTS: u32 = super::PERSIST_MAX_ATTEMPTS;
    pub const BACKOFF_INITIAL_MS: u64 = super::PERSIST_BACKOFF_INITIAL_MS;
    pub const BACKOFF_MAX_MS: u64 = super::PERSIST_BACKOFF_MAX_MS;
}

/// Handler bookkeeping
pub mod handler {
    pub const HISTORY_LIMIT: usize = super::HISTORY_LIMIT;
    pub const NOTIFICATION_CAPACITY: usize = super::NOTIFICATION_CAPACITY;
    pub const STOP_TIMEOUT_MS: u64 = super::STOP_TIMEOUT_MS;
    pub const CONFIG_ENV_VAR: &str = super::CONFIG_ENV_VAR;
}

// ============================================================================
// HANDLER CONFIG
// ============================================================================

/// Runtime configuration for a `GlyphHandler`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    pub watch_interval_ms: u64,
    pub watch_debounce_ms: u64,
    pub use_fs_events: bool,
    pub persist_max_attempts: u32,
    pub persist_backoff_initial_ms: u64,
    pub persist_backoff_max_ms: u64,
    pub history_limit: usize,
    pub notification_capacity: usize,
    pub stop_timeout_ms: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            watch_interval_ms: watcher::INTERVAL_MS,
            watch_debounce_ms: watcher::DEBOUNCE_MS,
            use_fs_events: watcher::USE_FS_EVENTS,
            persist_max_attempts: persist::MAX_ATTEMPTS,
            persist_backoff_initial_ms: persist::BACKOFF_INITIAL_MS,
            persist_backoff_max_ms: persist::BACKOFF_MAX_MS,
            history_limit: handler::HISTORY_LIMIT,
            notification_capacity: handler::NOTIFICATION_CAPACITY,
            stop_timeout_ms: handler::STOP_TIMEOUT_MS,
        }
    }
}

impl HandlerConfig {
    /// Parse a config from TOML text. Missing fields keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Invalid handler config")?;
        Ok(config.sanitized())
    }

    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("In {}", path.display()))
    }

    /// Load the file named by `RUNEBENDER_SYNC_CONFIG`, or the defaults
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(handler::CONFIG_ENV_VAR) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Clamp values that would stall the workers
    fn sanitized(mut self) -> Self {
        self.watch_interval_ms = self.watch_interval_ms.max(1);
        self.persist_max_attempts = self.persist_max_attempts.max(1);
        self.notification_capacity = self.notification_capacity.max(1);
        self.persist_backoff_max_ms = self
            .persist_backoff_max_ms
            .max(self.persist_backoff_initial_ms);
        self
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let ms = self
            .persist_backoff_initial_ms
            .saturating_mul(factor)
            .min(self.persist_backoff_max_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HandlerConfig::default();
        assert_eq!(config.watch_interval(), Duration::from_millis(100));
        assert_eq!(config.persist_max_attempts, 5);
        assert_eq!(config.history_limit, 256);
        assert!(config.use_fs_events);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HandlerConfig::from_toml_str(
            "watch_interval_ms = 20\nuse_fs_events = false\npersist_max_attempts = 2\n",
        )
        .unwrap();
        assert_eq!(config.watch_interval_ms, 20);
        assert!(!config.use_fs_events);
        assert_eq!(config.persist_max_attempts, 2);
        assert_eq!(config.stop_timeout_ms, 10_000);
    }

    #[test]
    fn test_rejects_unknown_fields_and_bad_types() {
        assert!(HandlerConfig::from_toml_str("watch_intervall_ms = 20").is_err());
        assert!(HandlerConfig::from_toml_str("history_limit = \"lots\"").is_err());
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config =
            HandlerConfig::from_toml_str("watch_interval_ms = 0\npersist_max_attempts = 0").unwrap();
        assert_eq!(config.watch_interval_ms, 1);
        assert_eq!(config.persist_max_attempts, 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = HandlerConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(25));
        assert_eq!(config.backoff(2), Duration::from_millis(50));
        assert_eq!(config.backoff(3), Duration::from_millis(100));
        assert_eq!(config.backoff(10), Duration::from_millis(1000));
        assert_eq!(config.backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sync.toml");
        std::fs::write(&path, "history_limit = 8\n").unwrap();
        assert_eq!(HandlerConfig::load(&path).unwrap().history_limit, 8);
        assert!(HandlerConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
