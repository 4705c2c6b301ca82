// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Change functions that edit a packed path node.
//!
//! Each handler decodes the node into a [`PackedPath`], runs the matching
//! mutator and writes the result back. A failing mutator leaves the node
//! as it was.

use serde::Deserialize;
use serde_json::Value;

use super::base::{decode_arg, index_arg, number_arg};
use crate::error::{ChangeError, ChangeResult};
use crate::model::packed_path::{Contour, PackedPath, Point};

fn with_packed_path<T>(
    function: &str,
    node: &mut Value,
    edit: impl FnOnce(&mut PackedPath) -> ChangeResult<T>,
) -> ChangeResult<T> {
    let mut path = PackedPath::deserialize(&*node).map_err(|e| {
        ChangeError::invalid_argument(function, format!("target is not a packed path: {e}"))
    })?;
    path.validate()?;
    let result = edit(&mut path)?;
    *node = serde_json::to_value(&path).map_err(|e| ChangeError::InvalidDocument(e.to_string()))?;
    Ok(result)
}

/// `=xy` `[pointIndex, x, y]`
pub(crate) fn set_point_position(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    let point_index = index_arg("=xy", args, 0)?;
    let x = number_arg("=xy", args, 1)?;
    let y = number_arg("=xy", args, 2)?;
    with_packed_path("=xy", node, |path| path.set_point_position(point_index, x, y))
}

/// `insertPoint` `[contourIndex, contourPointIndex, point]`
pub(crate) fn insert_point(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    let contour_index = index_arg("insertPoint", args, 0)?;
    let contour_point_index = index_arg("insertPoint", args, 1)?;
    let point: Point = decode_arg("insertPoint", args, 2)?;
    with_packed_path("insertPoint", node, |path| {
        path.insert_point(contour_index, contour_point_index, &point)
    })
}

/// `deletePoint` `[contourIndex, contourPointIndex]`
pub(crate) fn delete_point(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    let contour_index = index_arg("deletePoint", args, 0)?;
    let contour_point_index = index_arg("deletePoint", args, 1)?;
    with_packed_path("deletePoint", node, |path| {
        path.delete_point(contour_index, contour_point_index)
            .map(|_| ())
    })
}

/// `insertContour` `[contourIndex, contour]`
pub(crate) fn insert_contour(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    let contour_index = index_arg("insertContour", args, 0)?;
    let contour: Contour = decode_arg("insertContour", args, 1)?;
    with_packed_path("insertContour", node, |path| {
        path.insert_contour(contour_index, &contour)
    })
}

/// `deleteContour` `[contourIndex]`
pub(crate) fn delete_contour(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    let contour_index = index_arg("deleteContour", args, 0)?;
    with_packed_path("deleteContour", node, |path| {
        path.delete_contour(contour_index).map(|_| ())
    })
}
