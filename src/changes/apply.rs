// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Applying changes to a JSON document.

use serde_json::Value;

use super::registry::FunctionRegistry;
use super::{Change, ChangeBody, PathKey, render_path};
use crate::error::{ChangeError, ChangeResult};

/// Apply `change` to a copy of `root` and return the copy.
///
/// `root` is never modified, so a failing change leaves no trace. The
/// same `(root, change)` always yields the same result or error.
pub fn apply_change(
    registry: &FunctionRegistry,
    root: &Value,
    change: &Change,
) -> ChangeResult<Value> {
    let mut working = root.clone();
    apply_change_in_place(registry, &mut working, change)?;
    Ok(working)
}

/// Apply `change` directly to `root`.
///
/// On error `root` may be partially modified: only call this on a working
/// copy that is discarded when it fails.
pub fn apply_change_in_place(
    registry: &FunctionRegistry,
    root: &mut Value,
    change: &Change,
) -> ChangeResult<()> {
    let mut trail = Vec::new();
    apply_at(registry, root, change, &mut trail)
}

fn apply_at(
    registry: &FunctionRegistry,
    node: &mut Value,
    change: &Change,
    trail: &mut Vec<PathKey>,
) -> ChangeResult<()> {
    let depth = trail.len();
    let target = resolve(node, &change.path, trail)?;
    let result = match &change.body {
        ChangeBody::Branch(children) => children
            .iter()
            .try_for_each(|child| apply_at(registry, &mut *target, child, trail)),
        ChangeBody::Leaf { function, args } => {
            let registration = registry
                .lookup(function)
                .ok_or_else(|| ChangeError::UnknownFunction(function.clone()))?;
            registration
                .invoke(target, args)
                .map_err(|e| locate(e, trail))
        }
    };
    trail.truncate(depth);
    result
}

/// Walk `path` down from `node`, recording visited keys in `trail`
fn resolve<'a>(
    mut node: &'a mut Value,
    path: &[PathKey],
    trail: &mut Vec<PathKey>,
) -> ChangeResult<&'a mut Value> {
    for key in path {
        let next = match (node, key) {
            (Value::Object(map), PathKey::Key(name)) => map.get_mut(name),
            (Value::Array(items), PathKey::Index(index)) => items.get_mut(*index),
            _ => None,
        };
        node = next.ok_or_else(|| ChangeError::path_resolution(render_path(trail), key))?;
        trail.push(key.clone());
    }
    Ok(node)
}

/// Fill in the location of path errors raised inside a function
fn locate(error: ChangeError, trail: &[PathKey]) -> ChangeError {
    match error {
        ChangeError::PathResolution { path, segment } if path.is_empty() => {
            ChangeError::PathResolution {
                path: render_path(trail),
                segment,
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeFunction;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "glyphs": {
                "A": {
                    "name": "A",
                    "layers": [{
                        "name": "LightCondensed/foreground",
                        "glyph": {
                            "xAdvance": 396,
                            "path": {
                                "coordinates": [20, 0, 376, 0, 198, 700],
                                "pointTypes": [0, 0, 0],
                                "contourInfo": [{"endPoint": 2, "isClosed": true}]
                            }
                        }
                    }]
                }
            }
        })
    }

    fn path_to_outline() -> Vec<PathKey> {
        vec![
            "glyphs".into(),
            "A".into(),
            "layers".into(),
            0.into(),
            "glyph".into(),
            "path".into(),
        ]
    }

    #[test]
    fn test_apply_leaf() {
        let registry = FunctionRegistry::glyph_changes();
        let change = Change::leaf(path_to_outline(), "=xy", vec![json!(0), json!(20), json!(55)]);
        let result = apply_change(&registry, &document(), &change).unwrap();
        let coords = &result["glyphs"]["A"]["layers"][0]["glyph"]["path"]["coordinates"];
        assert_eq!(coords[0], 20.0);
        assert_eq!(coords[1], 55.0);
    }

    #[test]
    fn test_apply_is_deterministic() {
        let registry = FunctionRegistry::glyph_changes();
        let change = Change::leaf(path_to_outline(), "deleteContour", vec![json!(0)]);
        let first = apply_change(&registry, &document(), &change);
        let second = apply_change(&registry, &document(), &change);
        assert_eq!(first, second);
    }

    #[test]
    fn test_branch_children_apply_in_order() {
        let registry = FunctionRegistry::glyph_changes();
        let doc = json!({"items": [0, 1, 2, 3]});
        // Deleting index 0 twice removes the first two items
        let change = Change::branch(
            vec!["items".into()],
            vec![
                Change::leaf(vec![], "-", vec![json!(0), json!(1)]),
                Change::leaf(vec![], "-", vec![json!(0), json!(1)]),
                Change::leaf(vec![], "+", vec![json!(2), json!("end")]),
            ],
        );
        let result = apply_change(&registry, &doc, &change).unwrap();
        assert_eq!(result, json!({"items": [2, 3, "end"]}));
    }

    #[test]
    fn test_nested_branch_paths_are_relative() {
        let registry = FunctionRegistry::glyph_changes();
        let change = Change::branch(
            vec!["glyphs".into(), "A".into()],
            vec![Change::branch(
                vec!["layers".into(), 0.into()],
                vec![
                    Change::leaf(vec!["glyph".into()], "=", vec![json!("xAdvance"), json!(500)]),
                    Change::leaf(vec![], "=", vec![json!("name"), json!("renamed")]),
                ],
            )],
        );
        let result = apply_change(&registry, &document(), &change).unwrap();
        let layer = &result["glyphs"]["A"]["layers"][0];
        assert_eq!(layer["glyph"]["xAdvance"], 500);
        assert_eq!(layer["name"], "renamed");
    }

    #[test]
    fn test_bad_path_reports_location() {
        let registry = FunctionRegistry::glyph_changes();
        let change = Change::leaf(
            vec!["glyphs".into(), "A".into(), "layers".into(), 3.into()],
            "=",
            vec![json!("name"), json!("x")],
        );
        let err = apply_change(&registry, &document(), &change).unwrap_err();
        assert_eq!(err, ChangeError::path_resolution("/glyphs/A/layers", "3"));

        let change = Change::leaf(vec!["glyphs".into(), 0.into()], "=", vec![]);
        assert!(matches!(
            apply_change(&registry, &document(), &change),
            Err(ChangeError::PathResolution { .. })
        ));
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::glyph_changes();
        let change = Change::leaf(path_to_outline(), "explode", vec![]);
        assert_eq!(
            apply_change(&registry, &document(), &change).unwrap_err(),
            ChangeError::UnknownFunction("explode".to_string())
        );
    }

    #[test]
    fn test_failed_branch_leaves_input_untouched() {
        let registry = FunctionRegistry::glyph_changes();
        let doc = document();
        let change = Change::branch(
            path_to_outline(),
            vec![
                Change::leaf(vec![], "=xy", vec![json!(0), json!(1), json!(1)]),
                Change::leaf(vec![], "=xy", vec![json!(9), json!(1), json!(1)]),
            ],
        );
        let err = apply_change(&registry, &doc, &change).unwrap_err();
        assert_eq!(err, ChangeError::index_out_of_range("point", 9, 3));
        assert_eq!(doc, document());
    }

    #[test]
    fn test_minimal_registry_rejects_outline_functions() {
        let mut registry = FunctionRegistry::new();
        registry.register(ChangeFunction::SetItem);
        let change = Change::leaf(path_to_outline(), "=xy", vec![json!(0), json!(1), json!(1)]);
        assert_eq!(
            apply_change(&registry, &document(), &change).unwrap_err(),
            ChangeError::UnknownFunction("=xy".to_string())
        );
    }

    #[test]
    fn test_delete_missing_key_is_located() {
        let registry = FunctionRegistry::glyph_changes();
        let change = Change::leaf(vec!["glyphs".into()], "d", vec![json!("B")]);
        assert_eq!(
            apply_change(&registry, &document(), &change).unwrap_err(),
            ChangeError::path_resolution("/glyphs", "B")
        );
    }
}
