// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Registry of change functions.
//!
//! Every function a change can name is a `ChangeFunction` variant with a
//! fixed arity, a target kind and one handler. A `FunctionRegistry` maps
//! wire names to the variants it was built with; it is constructed once
//! and handed to whatever applies changes, so tests can use a registry
//! that only knows a few functions.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::{base, outline};
use crate::error::{ChangeError, ChangeResult};

/// Signature shared by all change function handlers
pub type Handler = fn(&mut Value, &[Value]) -> ChangeResult<()>;

/// Number of arguments a function accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(n) => count == n,
            Self::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "exactly {n}"),
            Self::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// Kind of node a function operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A mapping or a sequence; the function sets a terminal value in it
    Container,
    Mapping,
    Sequence,
    /// A packed path record
    Outline,
}

impl Target {
    pub fn matches(self, node: &Value) -> bool {
        match self {
            Self::Container => node.is_object() || node.is_array(),
            Self::Mapping => node.is_object(),
            Self::Sequence => node.is_array(),
            Self::Outline => node
                .as_object()
                .is_some_and(|map| map.contains_key("coordinates")),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Container => "mapping or sequence",
            Self::Mapping => "mapping",
            Self::Sequence => "sequence",
            Self::Outline => "packed path",
        }
    }
}

/// Every change function known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeFunction {
    /// `=`: assign a value to a key or an existing index
    SetItem,
    /// `d`: remove a key from a mapping
    DeleteKey,
    /// `-`: remove a run of items from a sequence
    DeleteItems,
    /// `+`: insert items into a sequence
    InsertItems,
    /// `:`: replace a run of items in a sequence
    ReplaceItems,
    /// `=xy`
    SetPointPosition,
    InsertPoint,
    DeletePoint,
    InsertContour,
    DeleteContour,
}

impl ChangeFunction {
    /// Container-generic functions
    pub const BASE: [Self; 5] = [
        Self::SetItem,
        Self::DeleteKey,
        Self::DeleteItems,
        Self::InsertItems,
        Self::ReplaceItems,
    ];

    /// Packed path functions
    pub const OUTLINE: [Self; 5] = [
        Self::SetPointPosition,
        Self::InsertPoint,
        Self::DeletePoint,
        Self::InsertContour,
        Self::DeleteContour,
    ];

    /// Name used on the wire
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::SetItem => "=",
            Self::DeleteKey => "d",
            Self::DeleteItems => "-",
            Self::InsertItems => "+",
            Self::ReplaceItems => ":",
            Self::SetPointPosition => "=xy",
            Self::InsertPoint => "insertPoint",
            Self::DeletePoint => "deletePoint",
            Self::InsertContour => "insertContour",
            Self::DeleteContour => "deleteContour",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Self::SetItem => Arity::Exact(2),
            Self::DeleteKey => Arity::Exact(1),
            Self::DeleteItems => Arity::Exact(2),
            Self::InsertItems => Arity::AtLeast(1),
            Self::ReplaceItems => Arity::AtLeast(2),
            Self::SetPointPosition => Arity::Exact(3),
            Self::InsertPoint => Arity::Exact(3),
            Self::DeletePoint => Arity::Exact(2),
            Self::InsertContour => Arity::Exact(2),
            Self::DeleteContour => Arity::Exact(1),
        }
    }

    pub fn target(self) -> Target {
        match self {
            Self::SetItem => Target::Container,
            Self::DeleteKey => Target::Mapping,
            Self::DeleteItems | Self::InsertItems | Self::ReplaceItems => Target::Sequence,
            _ => Target::Outline,
        }
    }

    fn handler(self) -> Handler {
        match self {
            Self::SetItem => base::set_item,
            Self::DeleteKey => base::delete_key,
            Self::DeleteItems => base::delete_items,
            Self::InsertItems => base::insert_items,
            Self::ReplaceItems => base::replace_items,
            Self::SetPointPosition => outline::set_point_position,
            Self::InsertPoint => outline::insert_point,
            Self::DeletePoint => outline::delete_point,
            Self::InsertContour => outline::insert_contour,
            Self::DeleteContour => outline::delete_contour,
        }
    }
}

/// A function as registered: its variant plus the checks applied before
/// the handler runs
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub function: ChangeFunction,
    pub arity: Arity,
    pub target: Target,
    handler: Handler,
}

impl Registration {
    fn new(function: ChangeFunction) -> Self {
        Self {
            function,
            arity: function.arity(),
            target: function.target(),
            handler: function.handler(),
        }
    }

    /// Check arity and target, then run the handler on `node`
    pub fn invoke(&self, node: &mut Value, args: &[Value]) -> ChangeResult<()> {
        let name = self.function.wire_name();
        if !self.arity.accepts(args.len()) {
            return Err(ChangeError::Arity {
                function: name.to_string(),
                expected: self.arity,
                got: args.len(),
            });
        }
        if !self.target.matches(node) {
            return Err(ChangeError::InvalidTarget {
                function: name.to_string(),
                expected: self.target.describe(),
            });
        }
        (self.handler)(node, args)
    }
}

/// Name -> function table
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    entries: HashMap<&'static str, Registration>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry glyph editing uses: base plus outline functions
    pub fn glyph_changes() -> Self {
        Self::new().with_base().with_outline()
    }

    pub fn with_base(mut self) -> Self {
        for function in ChangeFunction::BASE {
            self.register(function);
        }
        self
    }

    pub fn with_outline(mut self) -> Self {
        for function in ChangeFunction::OUTLINE {
            self.register(function);
        }
        self
    }

    /// Register a single function under its wire name
    pub fn register(&mut self, function: ChangeFunction) -> &mut Self {
        self.entries
            .insert(function.wire_name(), Registration::new(function));
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Registration> {
        self.entries.get(name)
    }

    /// Registered wire names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
