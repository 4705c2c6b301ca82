// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Glyph data model shared by the change engine and the handler.
//!
//! A `VariableGlyph` is the materialized value the handler caches: one
//! `Layer` per design-space source (and per extra UFO layer), each holding
//! a `StaticGlyph` with a packed outline. The serde shape is the document
//! that change paths address, e.g.
//! `["layers", 0, "glyph", "path"]` relative to the glyph.

use kurbo::Affine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::packed_path::PackedPath;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A glyph with all of its layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableGlyph {
    pub name: String,
    /// Design-space sources, each pointing at one of `layers`
    #[serde(default)]
    pub sources: Vec<GlyphSource>,
    pub layers: Vec<Layer>,
}

/// A design-space location that uses one of the glyph's layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlyphSource {
    pub name: String,
    /// Axis name -> user-space value
    #[serde(default)]
    pub location: BTreeMap<String, f64>,
    pub layer_name: String,
}

/// A named layer of a glyph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// `"<source>/<ufo layer>"`, e.g. `"LightCondensed/foreground"`
    pub name: String,
    pub glyph: StaticGlyph,
}

/// Outline, components and metrics of one layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticGlyph {
    #[serde(default)]
    pub path: PackedPath,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub x_advance: f64,
}

/// A reference to another glyph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Name of the referenced glyph
    pub name: String,
    /// Affine coefficients `[xx, xy, yx, yy, dx, dy]`, the order of both
    /// `kurbo::Affine::as_coeffs` and a UFO component transform
    /// (`x' = xx*x + yx*y + dx`, `y' = xy*x + yy*y + dy`)
    #[serde(default = "identity_coeffs")]
    pub transformation: [f64; 6],
}

fn identity_coeffs() -> [f64; 6] {
    Affine::IDENTITY.as_coeffs()
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl Component {
    pub fn new(name: impl Into<String>, transform: Affine) -> Self {
        Self {
            name: name.into(),
            transformation: transform.as_coeffs(),
        }
    }

    pub fn affine(&self) -> Affine {
        Affine::new(self.transformation)
    }
}

impl VariableGlyph {
    /// Get a layer by name
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    /// Check every layer's outline invariants
    pub fn validate(&self) -> crate::error::ChangeResult<()> {
        for layer in &self.layers {
            layer.glyph.path.validate()?;
        }
        Ok(())
    }
}
