// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Path-addressed changes to a font document.
//!
//! A `Change` either calls a registered function on the node its path
//! resolves to (a leaf) or carries child changes whose paths are relative
//! to its own (a branch). The wire shape is
//!
//! ```json
//! { "path": ["glyphs", "A", "layers", 0, "glyph", "path"],
//!   "function": "=xy",
//!   "args": [0, 20, 55] }
//! ```
//!
//! or `{ "path": [...], "children": [...] }`. The compact keys `p`, `f`,
//! `a` and `c` are accepted on input.

pub mod apply;
pub mod base;
pub mod outline;
pub mod registry;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{ChangeError, ChangeResult};

pub use apply::{apply_change, apply_change_in_place};
pub use registry::{Arity, ChangeFunction, FunctionRegistry, Registration, Target};

/// Top-level document key under which glyphs are addressed
pub const GLYPHS_KEY: &str = "glyphs";

// ============================================================================
// PATH KEYS
// ============================================================================

/// One step of a change path: a mapping key or a sequence index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Key(key) => f.write_str(key),
        }
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathKey {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

/// Render a path as `/glyphs/A/layers/0` for error messages
pub fn render_path(path: &[PathKey]) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.iter().map(|key| format!("/{key}")).collect()
}

// ============================================================================
// CHANGES
// ============================================================================

/// A path-addressed change, leaf or branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChange", into = "RawChange")]
pub struct Change {
    pub path: Vec<PathKey>,
    pub body: ChangeBody,
}

/// What a change does at the end of its path
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeBody {
    /// Call a registered function with arguments
    Leaf { function: String, args: Vec<Value> },
    /// Apply children in order, relative to this change's path
    Branch(Vec<Change>),
}

impl Change {
    pub fn leaf(path: Vec<PathKey>, function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            path,
            body: ChangeBody::Leaf {
                function: function.into(),
                args,
            },
        }
    }

    pub fn branch(path: Vec<PathKey>, children: Vec<Change>) -> Self {
        Self {
            path,
            body: ChangeBody::Branch(children),
        }
    }

    /// A change that does nothing
    pub fn empty() -> Self {
        Self::branch(Vec::new(), Vec::new())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, ChangeBody::Leaf { .. })
    }

    /// Same change with `prefix` prepended to its path
    pub fn prefixed(&self, prefix: &[PathKey]) -> Self {
        let mut path = prefix.to_vec();
        path.extend(self.path.iter().cloned());
        Self {
            path,
            body: self.body.clone(),
        }
    }

    /// Split a document-level change into the glyph it targets and the
    /// change relative to that glyph.
    ///
    /// The path must start with `"glyphs", <name>`. A branch with a
    /// shorter path is accepted when all of its children land on the same
    /// glyph.
    pub fn glyph_target(&self) -> ChangeResult<(String, Change)> {
        if self.path.len() >= 2 {
            let name = match (&self.path[0], &self.path[1]) {
                (PathKey::Key(root), PathKey::Key(name)) if root == GLYPHS_KEY => name.clone(),
                (PathKey::Key(root), key) if root == GLYPHS_KEY => {
                    return Err(ChangeError::path_resolution(render_path(&self.path[..1]), key));
                }
                (root, _) => {
                    return Err(ChangeError::path_resolution("/", root));
                }
            };
            let relative = Self {
                path: self.path[2..].to_vec(),
                body: self.body.clone(),
            };
            return Ok((name, relative));
        }

        let ChangeBody::Branch(children) = &self.body else {
            let missing = if self.path.is_empty() { GLYPHS_KEY } else { "<glyph name>" };
            return Err(ChangeError::path_resolution(render_path(&self.path), missing));
        };

        let mut target: Option<String> = None;
        let mut relative_children = Vec::with_capacity(children.len());
        for child in children {
            let (name, relative) = child.prefixed(&self.path).glyph_target()?;
            match &target {
                Some(existing) if *existing != name => {
                    return Err(ChangeError::path_resolution(
                        render_path(&self.path),
                        format!("single glyph (found '{existing}' and '{name}')"),
                    ));
                }
                Some(_) => {}
                None => target = Some(name),
            }
            relative_children.push(relative);
        }
        match target {
            Some(name) => Ok((name, Self::branch(Vec::new(), relative_children))),
            None => Err(ChangeError::path_resolution(
                render_path(&self.path),
                "<glyph name>",
            )),
        }
    }
}

/// Flat serde shape of a change
#[derive(Serialize, Deserialize)]
struct RawChange {
    #[serde(default, alias = "p")]
    path: Vec<PathKey>,
    #[serde(default, alias = "f", skip_serializing_if = "Option::is_none")]
    function: Option<String>,
    #[serde(default, alias = "a", skip_serializing_if = "Vec::is_empty")]
    args: Vec<Value>,
    #[serde(default, alias = "c", skip_serializing_if = "Vec::is_empty")]
    children: Vec<Change>,
}

impl TryFrom<RawChange> for Change {
    type Error = String;

    fn try_from(raw: RawChange) -> Result<Self, Self::Error> {
        match raw.function {
            Some(_) if !raw.children.is_empty() => {
                Err("a change has either a function or children, not both".to_string())
            }
            Some(function) => Ok(Self::leaf(raw.path, function, raw.args)),
            None if !raw.args.is_empty() => Err("change arguments without a function".to_string()),
            None => Ok(Self::branch(raw.path, raw.children)),
        }
    }
}

impl From<Change> for RawChange {
    fn from(change: Change) -> Self {
        match change.body {
            ChangeBody::Leaf { function, args } => Self {
                path: change.path,
                function: Some(function),
                args,
                children: Vec::new(),
            },
            ChangeBody::Branch(children) => Self {
                path: change.path,
                function: None,
                args: Vec::new(),
                children,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leaf_long_and_short_keys() {
        let long: Change = serde_json::from_value(json!({
            "path": ["glyphs", "A", "layers", 0, "glyph", "path"],
            "function": "=xy",
            "args": [0, 20, 55]
        }))
        .unwrap();
        let short: Change = serde_json::from_value(json!({
            "p": ["glyphs", "A", "layers", 0, "glyph", "path"],
            "f": "=xy",
            "a": [0, 20, 55]
        }))
        .unwrap();

        assert_eq!(long, short);
        assert_eq!(long.path[3], PathKey::Index(0));
        assert_eq!(long.path[1], PathKey::Key("A".to_string()));
        assert!(long.is_leaf());
    }

    #[test]
    fn test_parse_branch_and_empty() {
        let change: Change = serde_json::from_value(json!({
            "path": ["glyphs", "A"],
            "children": [
                {"path": ["layers", 0, "glyph", "path"], "function": "=xy", "args": [0, 1, 2]},
                {"path": [], "children": []}
            ]
        }))
        .unwrap();
        let ChangeBody::Branch(children) = &change.body else {
            panic!("expected a branch");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[1], Change::empty());

        let empty: Change = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, Change::empty());
    }

    #[test]
    fn test_reject_function_with_children() {
        let result: Result<Change, _> = serde_json::from_value(json!({
            "path": [],
            "function": "=",
            "args": ["x", 1],
            "children": [{"path": [], "function": "=", "args": ["y", 2]}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_uses_long_keys() {
        let change = Change::leaf(vec!["glyphs".into(), "A".into()], "d", vec![json!("x")]);
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(
            value,
            json!({"path": ["glyphs", "A"], "function": "d", "args": ["x"]})
        );
    }

    #[test]
    fn test_glyph_target_strips_prefix() {
        let change = Change::leaf(
            vec!["glyphs".into(), "A".into(), "layers".into(), 0.into()],
            "=",
            vec![json!("name"), json!("x")],
        );
        let (name, relative) = change.glyph_target().unwrap();
        assert_eq!(name, "A");
        assert_eq!(relative.path, vec![PathKey::from("layers"), PathKey::from(0)]);
    }

    #[test]
    fn test_glyph_target_from_root_branch() {
        let change = Change::branch(
            vec!["glyphs".into()],
            vec![
                Change::leaf(vec!["B".into(), "name".into()], "=", vec![]),
                Change::branch(vec!["B".into()], vec![]),
            ],
        );
        let (name, relative) = change.glyph_target().unwrap();
        assert_eq!(name, "B");
        let ChangeBody::Branch(children) = relative.body else {
            panic!("expected a branch");
        };
        assert_eq!(children[0].path, vec![PathKey::from("name")]);
        assert!(children[1].path.is_empty());
    }

    #[test]
    fn test_glyph_target_rejects_multiple_glyphs() {
        let change = Change::branch(
            Vec::new(),
            vec![
                Change::leaf(vec!["glyphs".into(), "A".into()], "=", vec![]),
                Change::leaf(vec!["glyphs".into(), "B".into()], "=", vec![]),
            ],
        );
        assert!(matches!(
            change.glyph_target(),
            Err(ChangeError::PathResolution { .. })
        ));
    }

    #[test]
    fn test_glyph_target_rejects_other_roots() {
        let change = Change::leaf(vec!["axes".into(), 0.into()], "=", vec![]);
        assert_eq!(
            change.glyph_target().unwrap_err(),
            ChangeError::path_resolution("/", "axes")
        );
        let short = Change::leaf(vec!["glyphs".into()], "d", vec![json!("A")]);
        assert!(short.glyph_target().is_err());
    }
}
