// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Error types for change dispatch and the glyph handler.
//!
//! `ChangeError` covers everything that can go wrong while applying a
//! change to a document: bad paths, unknown functions and argument
//! violations. These are raised synchronously and never leave partial
//! state behind. `HandlerError` adds the failures that come from the
//! backend and from the handler's own lifecycle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::changes::registry::Arity;

/// Result type for change application.
pub type ChangeResult<T> = Result<T, ChangeError>;

/// Errors raised while resolving or applying a change.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChangeError {
    /// A path segment is missing, out of range, or of the wrong kind.
    #[error("cannot resolve path {path}: no '{segment}'")]
    PathResolution { path: String, segment: String },

    /// The change names a function that is not in the registry.
    #[error("unknown change function '{0}'")]
    UnknownFunction(String),

    /// The change carries the wrong number of arguments.
    #[error("'{function}' expects {expected} arguments, got {got}")]
    Arity {
        function: String,
        expected: Arity,
        got: usize,
    },

    /// An index argument points outside its sequence.
    #[error("{what} index {index} out of range (length {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// An argument has the wrong type or violates a structural rule.
    #[error("invalid argument for '{function}': {message}")]
    InvalidArgument { function: String, message: String },

    /// The resolved node is not the kind of value the function works on.
    #[error("'{function}' must target a {expected}")]
    InvalidTarget {
        function: String,
        expected: &'static str,
    },

    /// The working copy no longer describes a valid glyph.
    #[error("change produced an invalid document: {0}")]
    InvalidDocument(String),
}

impl ChangeError {
    pub fn path_resolution(path: impl Into<String>, segment: impl fmt::Display) -> Self {
        Self::PathResolution {
            path: path.into(),
            segment: segment.to_string(),
        }
    }

    pub fn index_out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { what, index, len }
    }

    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the glyph handler.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The change could not be applied; the cache is untouched.
    #[error(transparent)]
    Change(#[from] ChangeError),

    /// The backend could not load the glyph. Nothing was cached.
    #[error("failed to load glyph '{name}': {cause:#}")]
    Load {
        name: String,
        cause: Arc<anyhow::Error>,
    },

    /// The backend rejected a write after all retries.
    #[error("failed to persist glyph '{name}' after {attempts} attempts: {message}")]
    Persist {
        name: String,
        attempts: u32,
        message: String,
    },

    /// The handler has been stopped.
    #[error("glyph handler is closed")]
    Closed,

    /// A caller-imposed deadline elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl HandlerError {
    pub fn load(name: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Load {
            name: name.into(),
            cause: Arc::new(cause),
        }
    }
}
