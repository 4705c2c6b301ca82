// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Font data model

pub mod glyph;
pub mod packed_path;

pub use glyph::{Component, GlyphSource, Layer, StaticGlyph, VariableGlyph};
pub use packed_path::{Contour, ContourInfo, OffCurveKind, PackedPath, Point, PointType};
