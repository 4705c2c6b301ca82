// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Container-generic change functions and argument helpers.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ChangeError, ChangeResult};

// ============================================================================
// ARGUMENT HELPERS
// ============================================================================

/// Read a non-negative integer argument
pub(crate) fn index_arg(function: &str, args: &[Value], position: usize) -> ChangeResult<usize> {
    args[position]
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            ChangeError::invalid_argument(
                function,
                format!("argument {position} must be a non-negative integer, got {}", args[position]),
            )
        })
}

/// Read a numeric argument
pub(crate) fn number_arg(function: &str, args: &[Value], position: usize) -> ChangeResult<f64> {
    args[position].as_f64().ok_or_else(|| {
        ChangeError::invalid_argument(
            function,
            format!("argument {position} must be a number, got {}", args[position]),
        )
    })
}

/// Decode a structured argument
pub(crate) fn decode_arg<T: DeserializeOwned>(
    function: &str,
    args: &[Value],
    position: usize,
) -> ChangeResult<T> {
    T::deserialize(&args[position]).map_err(|e| {
        ChangeError::invalid_argument(function, format!("argument {position}: {e}"))
    })
}

fn key_arg<'a>(function: &str, args: &'a [Value], position: usize) -> ChangeResult<&'a str> {
    args[position].as_str().ok_or_else(|| {
        ChangeError::invalid_argument(
            function,
            format!("argument {position} must be a string key, got {}", args[position]),
        )
    })
}

fn sequence<'a>(function: &str, node: &'a mut Value) -> ChangeResult<&'a mut Vec<Value>> {
    node.as_array_mut().ok_or_else(|| ChangeError::InvalidTarget {
        function: function.to_string(),
        expected: "sequence",
    })
}

/// Check that `start..start + count` lies within a sequence of `len`
fn check_range(start: usize, count: usize, len: usize) -> ChangeResult<()> {
    if start > len {
        return Err(ChangeError::index_out_of_range("item", start, len));
    }
    match start.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(ChangeError::index_out_of_range(
            "item",
            start.saturating_add(count),
            len,
        )),
    }
}

// ============================================================================
// FUNCTIONS
// ============================================================================

/// `=` `[key, value]`
pub(crate) fn set_item(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    match node {
        Value::Object(map) => {
            let key = key_arg("=", args, 0)?;
            map.insert(key.to_string(), args[1].clone());
            Ok(())
        }
        Value::Array(items) => {
            let index = index_arg("=", args, 0)?;
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or_else(|| ChangeError::index_out_of_range("item", index, len))?;
            *slot = args[1].clone();
            Ok(())
        }
        _ => Err(ChangeError::InvalidTarget {
            function: "=".to_string(),
            expected: "mapping or sequence",
        }),
    }
}

/// `d` `[key]`
pub(crate) fn delete_key(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    let key = key_arg("d", args, 0)?;
    let map = node.as_object_mut().ok_or_else(|| ChangeError::InvalidTarget {
        function: "d".to_string(),
        expected: "mapping",
    })?;
    match map.remove(key) {
        Some(_) => Ok(()),
        None => Err(ChangeError::path_resolution(String::new(), key)),
    }
}

/// `-` `[index, count]`
pub(crate) fn delete_items(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    let start = index_arg("-", args, 0)?;
    let count = index_arg("-", args, 1)?;
    let items = sequence("-", node)?;
    check_range(start, count, items.len())?;
    items.drain(start..start + count);
    Ok(())
}

/// `+` `[index, item...]`
pub(crate) fn insert_items(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    let start = index_arg("+", args, 0)?;
    let items = sequence("+", node)?;
    check_range(start, 0, items.len())?;
    items.splice(start..start, args[1..].iter().cloned());
    Ok(())
}

/// `:` `[index, count, item...]`
pub(crate) fn replace_items(node: &mut Value, args: &[Value]) -> ChangeResult<()> {
    let start = index_arg(":", args, 0)?;
    let count = index_arg(":", args, 1)?;
    let items = sequence(":", node)?;
    check_range(start, count, items.len())?;
    items.splice(start..start + count, args[2..].iter().cloned());
    Ok(())
}
