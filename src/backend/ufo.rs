// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! UFO and designspace backend.
//!
//! Glyphs are read straight from their `.glif` files rather than by
//! loading whole fonts, so a load or store touches only the files of the
//! glyph in question. Every layer of every source UFO that contains the
//! glyph becomes one `Layer`, named `"<source>/<ufo layer>"` where the
//! default UFO layer is called `foreground`.

use anyhow::{Context, Result, anyhow, bail};
use norad::designspace::DesignSpaceDocument;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::{Backend, SourceVersion};
use crate::model::glyph::{Component, GlyphSource, Layer, StaticGlyph, VariableGlyph};
use crate::model::packed_path::{
    Contour, OffCurveKind, PackedPath, Point, PointType, SMOOTH_FLAG,
};

/// Directory of the default layer inside a UFO
const DEFAULT_LAYER_DIR: &str = "glyphs";

/// Display name of the default layer
const DEFAULT_LAYER_NAME: &str = "foreground";

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Glyph storage backed by UFO sources on disk
#[derive(Debug)]
pub struct UfoBackend {
    ufos: Vec<UfoSource>,
    sources: Vec<DesignSource>,
}

#[derive(Debug)]
struct UfoSource {
    /// Short name used as the layer name prefix
    short_name: String,
    path: PathBuf,
}

/// A designspace `<source>` resolved against `UfoBackend::ufos`
#[derive(Debug)]
struct DesignSource {
    name: String,
    location: BTreeMap<String, f64>,
    ufo: usize,
    /// UFO layer name, `None` for the default layer
    layer: Option<String>,
}

/// Layer and glyph file tables of all UFOs, read once per operation
struct FileIndex<'a> {
    ufos: Vec<UfoIndex<'a>>,
}

struct UfoIndex<'a> {
    source: &'a UfoSource,
    layers: Vec<LayerIndex>,
}

struct LayerIndex {
    name: String,
    dir: PathBuf,
    /// Glyph name -> file name
    contents: BTreeMap<String, String>,
}

/// One glyph file and the layer it belongs to
#[derive(Debug, Clone, PartialEq)]
struct LayerFile {
    layer_name: String,
    glif: PathBuf,
}

// ============================================================================
// OPENING
// ============================================================================

impl UfoBackend {
    /// Open a `.designspace` file or a single `.ufo` directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if is_designspace_file(path) {
            Self::open_designspace(path)
        } else {
            Self::open_ufo(path)
        }
    }

    fn open_designspace(path: &Path) -> Result<Self> {
        tracing::info!("Opening designspace: {}", path.display());
        let doc = DesignSpaceDocument::load(path)
            .with_context(|| format!("Failed to parse designspace: {}", path.display()))?;
        let base_dir = path
            .parent()
            .ok_or_else(|| anyhow!("Invalid designspace path"))?;

        let mut ufo_paths: Vec<PathBuf> = Vec::new();
        let mut sources = Vec::new();
        for source in &doc.sources {
            let ufo_path = base_dir.join(&source.filename);
            let ufo = match ufo_paths.iter().position(|p| *p == ufo_path) {
                Some(index) => index,
                None => {
                    ufo_paths.push(ufo_path.clone());
                    ufo_paths.len() - 1
                }
            };
            let location = source
                .location
                .iter()
                .filter_map(|dim| dim.xvalue.map(|v| (dim.name.clone(), v as f64)))
                .collect();
            let name = source
                .name
                .clone()
                .unwrap_or_else(|| file_stem(&ufo_path));
            sources.push(DesignSource {
                name,
                location,
                ufo,
                layer: source.layer.clone(),
            });
        }
        if sources.is_empty() {
            bail!("Designspace has no sources");
        }

        let ufos = short_names(&ufo_paths)
            .into_iter()
            .zip(ufo_paths)
            .map(|(short_name, path)| UfoSource { short_name, path })
            .collect::<Vec<_>>();
        for ufo in &ufos {
            if !ufo.path.is_dir() {
                bail!("Source UFO not found: {}", ufo.path.display());
            }
        }
        tracing::info!("Found {} sources in {} UFOs", sources.len(), ufos.len());

        Ok(Self {
            ufos,
            sources,
        })
    }

    fn open_ufo(path: &Path) -> Result<Self> {
        tracing::info!("Opening UFO: {}", path.display());
        if !path.join("metainfo.plist").is_file() {
            bail!("Not a UFO directory: {}", path.display());
        }
        let short_name = file_stem(path);
        Ok(Self {
            ufos: vec![UfoSource {
                short_name: short_name.clone(),
                path: path.to_path_buf(),
            }],
            sources: vec![DesignSource {
                name: short_name,
                location: BTreeMap::new(),
                ufo: 0,
                layer: None,
            }],
        })
    }

    /// Names of all glyphs in any source, sorted
    pub fn glyph_names(&self) -> Result<Vec<String>> {
        let index = self.file_index()?;
        let mut names: Vec<String> = index
            .ufos
            .iter()
            .flat_map(|ufo| &ufo.layers)
            .flat_map(|layer| layer.contents.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn file_index(&self) -> Result<FileIndex<'_>> {
        let mut ufos = Vec::with_capacity(self.ufos.len());
        for source in &self.ufos {
            ufos.push(UfoIndex {
                source,
                layers: read_layers(&source.path)?,
            });
        }
        Ok(FileIndex { ufos })
    }
}

// ============================================================================
// FILE INDEX
// ============================================================================

impl FileIndex<'_> {
    /// Every existing file of `glyph_name`, in source and layer order
    fn glyph_files(&self, glyph_name: &str) -> Vec<LayerFile> {
        let mut files = Vec::new();
        for ufo in &self.ufos {
            for layer in &ufo.layers {
                if let Some(file) = layer.contents.get(glyph_name) {
                    files.push(LayerFile {
                        layer_name: format!("{}/{}", ufo.source.short_name, layer.name),
                        glif: layer.dir.join(file),
                    });
                }
            }
        }
        files
    }

    fn version(&self, glyph_name: &str) -> Result<SourceVersion> {
        let mut stamps = Vec::new();
        for file in self.glyph_files(glyph_name) {
            let meta = fs::metadata(&file.glif)
                .with_context(|| format!("Failed to stat {}", file.glif.display()))?;
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            stamps.push((file.glif, modified, meta.len()));
        }
        Ok(SourceVersion::from_hashable(stamps))
    }
}

/// Read a UFO's layer table and each layer's glyph table
fn read_layers(ufo: &Path) -> Result<Vec<LayerIndex>> {
    let table_path = ufo.join("layercontents.plist");
    let table: Vec<(String, String)> = if table_path.is_file() {
        plist::from_file(&table_path)
            .with_context(|| format!("Failed to read {}", table_path.display()))?
    } else {
        vec![("public.default".to_string(), DEFAULT_LAYER_DIR.to_string())]
    };

    let mut layers = Vec::with_capacity(table.len());
    for (layer_name, dir_name) in table {
        let dir = ufo.join(&dir_name);
        let contents_path = dir.join("contents.plist");
        let contents: BTreeMap<String, String> = if contents_path.is_file() {
            plist::from_file(&contents_path)
                .with_context(|| format!("Failed to read {}", contents_path.display()))?
        } else {
            BTreeMap::new()
        };
        let name = if dir_name == DEFAULT_LAYER_DIR {
            DEFAULT_LAYER_NAME.to_string()
        } else {
            layer_name
        };
        layers.push(LayerIndex {
            name,
            dir,
            contents,
        });
    }
    Ok(layers)
}

// ============================================================================
// BACKEND
// ============================================================================

impl Backend for UfoBackend {
    fn load_glyph(&self, name: &str) -> Result<VariableGlyph> {
        let index = self.file_index()?;
        let files = index.glyph_files(name);
        if files.is_empty() {
            bail!("glyph '{name}' not found in any source");
        }

        let mut layers = Vec::with_capacity(files.len());
        for file in &files {
            let glyph = norad::Glyph::load(&file.glif)
                .with_context(|| format!("Failed to load {}", file.glif.display()))?;
            layers.push(Layer {
                name: file.layer_name.clone(),
                glyph: static_glyph_from_norad(&glyph)?,
            });
        }

        let sources = self
            .sources
            .iter()
            .filter_map(|source| {
                let ufo = &self.ufos[source.ufo];
                let layer_name = format!(
                    "{}/{}",
                    ufo.short_name,
                    source.layer.as_deref().unwrap_or(DEFAULT_LAYER_NAME)
                );
                layers
                    .iter()
                    .any(|layer| layer.name == layer_name)
                    .then(|| GlyphSource {
                        name: source.name.clone(),
                        location: source.location.clone(),
                        layer_name,
                    })
            })
            .collect();

        tracing::debug!("Loaded glyph '{}' with {} layers", name, layers.len());
        Ok(VariableGlyph {
            name: name.to_string(),
            sources,
            layers,
        })
    }

    fn store_glyph(&self, name: &str, glyph: &VariableGlyph) -> Result<()> {
        let index = self.file_index()?;
        let files: HashMap<String, PathBuf> = index
            .glyph_files(name)
            .into_iter()
            .map(|file| (file.layer_name, file.glif))
            .collect();

        for layer in &glyph.layers {
            let glif = files.get(&layer.name).ok_or_else(|| {
                anyhow!("layer '{}' of glyph '{}' has no glyph file", layer.name, name)
            })?;
            // Start from the file on disk so lib, anchors and the rest survive
            let mut norad_glyph = norad::Glyph::load(glif)
                .with_context(|| format!("Failed to load {}", glif.display()))?;
            apply_static_glyph(&mut norad_glyph, &layer.glyph)?;
            let xml = norad_glyph
                .encode_xml()
                .with_context(|| format!("Failed to encode glyph '{name}'"))?;
            write_atomic(glif, &xml)?;
        }

        tracing::debug!("Stored glyph '{}' ({} layers)", name, glyph.layers.len());
        Ok(())
    }

    fn source_version(&self, name: &str) -> Result<SourceVersion> {
        self.file_index()?.version(name)
    }

    fn source_versions(&self, names: &[String]) -> Vec<Result<SourceVersion>> {
        match self.file_index() {
            Ok(index) => names.iter().map(|name| index.version(name)).collect(),
            Err(e) => {
                let message = format!("{e:#}");
                names.iter().map(|_| Err(anyhow!("{message}"))).collect()
            }
        }
    }

    fn watch_paths(&self) -> Vec<PathBuf> {
        self.ufos.iter().map(|ufo| ufo.path.clone()).collect()
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("glif.tmp");
    fs::write(&tmp, data).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

// ============================================================================
// NORAD CONVERSION
// ============================================================================

fn static_glyph_from_norad(glyph: &norad::Glyph) -> Result<StaticGlyph> {
    let mut path = PackedPath::new();
    for contour in &glyph.contours {
        if let Some(converted) = contour_from_norad(contour) {
            path.insert_contour(path.contour_count(), &converted)?;
        }
    }
    let components = glyph
        .components
        .iter()
        .map(|c| {
            let t = &c.transform;
            Component {
                name: c.base.to_string(),
                transformation: [
                    t.x_scale, t.xy_scale, t.yx_scale, t.y_scale, t.x_offset, t.y_offset,
                ],
            }
        })
        .collect();
    Ok(StaticGlyph {
        path,
        components,
        x_advance: glyph.width,
    })
}

/// Convert a UFO contour. Off-curve points take their kind from the next
/// on-curve point.
fn contour_from_norad(contour: &norad::Contour) -> Option<Contour> {
    let first = contour.points.first()?;
    let is_closed = !matches!(first.typ, norad::PointType::Move);
    let points: Vec<Point> = contour
        .points
        .iter()
        .enumerate()
        .map(|(i, pt)| {
            if matches!(pt.typ, norad::PointType::OffCurve) {
                let kind = if next_on_curve_is_quad(&contour.points, i, is_closed) {
                    OffCurveKind::Quad
                } else {
                    OffCurveKind::Cubic
                };
                Point::off_curve(pt.x, pt.y, kind)
            } else {
                Point {
                    smooth: pt.smooth,
                    ..Point::on_curve(pt.x, pt.y)
                }
            }
        })
        .collect();
    Some(Contour::from_points(&points, is_closed))
}

fn next_on_curve_is_quad(points: &[norad::ContourPoint], index: usize, is_closed: bool) -> bool {
    let n = points.len();
    for step in 1..n {
        let next = index + step;
        if !is_closed && next >= n {
            break;
        }
        match points[next % n].typ {
            norad::PointType::OffCurve => continue,
            norad::PointType::QCurve => return true,
            _ => return false,
        }
    }
    // An all off-curve contour is a closed TrueType loop
    n > 0 && points.iter().all(|p| matches!(p.typ, norad::PointType::OffCurve))
}

/// Replace the outline, components and advance of a norad glyph
fn apply_static_glyph(target: &mut norad::Glyph, glyph: &StaticGlyph) -> Result<()> {
    target.width = glyph.x_advance;
    target.contours = contours_to_norad(&glyph.path);
    target.components = glyph
        .components
        .iter()
        .map(|c| -> Result<norad::Component> {
            let [xx, xy, yx, yy, dx, dy] = c.transformation;
            let transform = norad::AffineTransform {
                x_scale: xx,
                xy_scale: xy,
                yx_scale: yx,
                y_scale: yy,
                x_offset: dx,
                y_offset: dy,
            };
            let base = norad::Name::new(&c.name)
                .map_err(|e| anyhow!("invalid component name '{}': {e}", c.name))?;
            Ok(norad::Component::new(base, transform, None, None))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(())
}

fn contours_to_norad(path: &PackedPath) -> Vec<norad::Contour> {
    (0..path.contour_count())
        .filter_map(|ci| path.contour(ci))
        .map(|contour| {
            let types: Vec<PointType> = contour
                .point_types
                .iter()
                .map(|&flags| PointType::from_flags(flags).unwrap_or(PointType::OnCurve))
                .collect();
            let n = types.len();
            let points = types
                .iter()
                .enumerate()
                .map(|(i, typ)| {
                    let x = contour.coordinates[2 * i];
                    let y = contour.coordinates[2 * i + 1];
                    let smooth = contour.point_types[i] & SMOOTH_FLAG != 0;
                    let norad_type = if typ.is_off_curve() {
                        norad::PointType::OffCurve
                    } else if !contour.is_closed && i == 0 {
                        norad::PointType::Move
                    } else {
                        // The incoming segment decides the on-curve type
                        match types[(i + n - 1) % n] {
                            PointType::OffCurveQuad => norad::PointType::QCurve,
                            PointType::OffCurveCubic => norad::PointType::Curve,
                            PointType::OnCurve => norad::PointType::Line,
                        }
                    };
                    norad::ContourPoint::new(
                        x,
                        y,
                        norad_type,
                        smooth && !typ.is_off_curve(),
                        None, // name
                        None, // identifier
                        None, // lib
                    )
                })
                .collect();
            norad::Contour::new(points, None, None)
        })
        .collect()
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a path is a designspace file
pub fn is_designspace_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("designspace"))
        .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

/// Short source names: UFO file stems minus their common prefix.
///
/// Falls back to the full stems when stripping would leave any name empty.
fn short_names(paths: &[PathBuf]) -> Vec<String> {
    let stems: Vec<String> = paths.iter().map(|p| file_stem(p)).collect();
    if stems.len() < 2 {
        return stems;
    }
    let first = &stems[0];
    let mut prefix_len = first.len();
    for stem in &stems[1..] {
        let common = first
            .char_indices()
            .zip(stem.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map(|((i, c), _)| i + c.len_utf8())
            .unwrap_or(0);
        prefix_len = prefix_len.min(common);
    }
    let stripped: Vec<String> = stems.iter().map(|s| s[prefix_len..].to_string()).collect();
    if stripped.iter().any(|s| s.is_empty()) {
        stems
    } else {
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn norad_point(x: f64, y: f64, typ: norad::PointType) -> norad::ContourPoint {
        norad::ContourPoint::new(x, y, typ, false, None, None, None)
    }

    fn glyph_a() -> norad::Glyph {
        let mut glyph = norad::Glyph::new("A");
        glyph.width = 396.0;
        glyph.contours = vec![norad::Contour::new(
            vec![
                norad_point(20.0, 0.0, norad::PointType::Line),
                norad_point(376.0, 0.0, norad::PointType::Line),
                norad_point(198.0, 700.0, norad::PointType::Line),
            ],
            None,
            None,
        )];
        glyph
            .lib
            .insert("com.example.note".to_string(), "keep me".to_string().into());
        glyph
    }

    fn glyph_o() -> norad::Glyph {
        let mut glyph = norad::Glyph::new("o");
        glyph.width = 500.0;
        glyph.contours = vec![norad::Contour::new(
            vec![
                norad_point(250.0, 0.0, norad::PointType::Line),
                norad_point(390.0, 0.0, norad::PointType::OffCurve),
                norad_point(450.0, 120.0, norad::PointType::OffCurve),
                norad_point(450.0, 250.0, norad::PointType::Curve),
                norad_point(450.0, 500.0, norad::PointType::Line),
            ],
            None,
            None,
        )];
        glyph
    }

    fn write_ufo(dir: &Path, file_name: &str, glyphs: Vec<norad::Glyph>) -> PathBuf {
        let mut font = norad::Font::new();
        for glyph in glyphs {
            font.default_layer_mut().insert_glyph(glyph);
        }
        let path = dir.join(file_name);
        font.save(&path).unwrap();
        path
    }

    fn write_designspace(dir: &Path) -> PathBuf {
        write_ufo(dir, "TestLightCondensed.ufo", vec![glyph_a(), glyph_o()]);
        write_ufo(dir, "TestBoldWide.ufo", vec![glyph_a()]);
        let path = dir.join("Test.designspace");
        fs::write(
            &path,
            r#"<?xml version='1.0' encoding='UTF-8'?>
<designspace format="4.1">
  <axes>
    <axis tag="wght" name="weight" minimum="100" maximum="900" default="100"/>
  </axes>
  <sources>
    <source filename="TestLightCondensed.ufo" name="Light" familyname="Test" stylename="Light">
      <location><dimension name="weight" xvalue="100"/></location>
    </source>
    <source filename="TestBoldWide.ufo" name="Bold" familyname="Test" stylename="Bold">
      <location><dimension name="weight" xvalue="900"/></location>
    </source>
  </sources>
  <instances>
    <instance familyname="Test" stylename="Regular" name="Test Regular" filename="instances/Test-Regular.ufo">
      <location><dimension name="weight" xvalue="400"/></location>
    </instance>
  </instances>
</designspace>
"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_is_designspace_file() {
        assert!(is_designspace_file(Path::new("font.designspace")));
        assert!(is_designspace_file(Path::new("font.DESIGNSPACE")));
        assert!(!is_designspace_file(Path::new("font.ufo")));
    }

    #[test]
    fn test_short_names() {
        let paths = [
            PathBuf::from("MutatorSansLightCondensed.ufo"),
            PathBuf::from("MutatorSansBoldWide.ufo"),
        ];
        assert_eq!(short_names(&paths), ["LightCondensed", "BoldWide"]);

        let same = [PathBuf::from("Font.ufo"), PathBuf::from("FontBold.ufo")];
        assert_eq!(short_names(&same), ["Font", "FontBold"]);
        assert_eq!(short_names(&[PathBuf::from("Solo.ufo")]), ["Solo"]);
    }

    #[test]
    fn test_load_single_ufo() {
        let dir = TempDir::new().unwrap();
        let ufo = write_ufo(dir.path(), "Solo.ufo", vec![glyph_a()]);
        let backend = UfoBackend::open(&ufo).unwrap();

        let glyph = backend.load_glyph("A").unwrap();
        assert_eq!(glyph.layers.len(), 1);
        assert_eq!(glyph.layers[0].name, "Solo/foreground");
        assert_eq!(glyph.sources[0].layer_name, "Solo/foreground");
        let layer = &glyph.layers[0].glyph;
        assert_eq!(layer.x_advance, 396.0);
        assert_eq!(layer.path.coordinates, [20.0, 0.0, 376.0, 0.0, 198.0, 700.0]);
        assert!(layer.path.contour_info[0].is_closed);

        assert!(backend.load_glyph("Z").is_err());
        assert_eq!(backend.glyph_names().unwrap(), ["A"]);
    }

    #[test]
    fn test_load_designspace_layers_and_sources() {
        let dir = TempDir::new().unwrap();
        let backend = UfoBackend::open(write_designspace(dir.path())).unwrap();

        let glyph = backend.load_glyph("A").unwrap();
        let names: Vec<&str> = glyph.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["LightCondensed/foreground", "BoldWide/foreground"]);
        assert_eq!(glyph.sources.len(), 2);
        assert_eq!(glyph.sources[1].name, "Bold");
        assert_eq!(glyph.sources[1].location["weight"], 900.0);

        // Glyphs missing from a source only get the layers that exist
        let o = backend.load_glyph("o").unwrap();
        assert_eq!(o.layers.len(), 1);
        assert_eq!(o.sources.len(), 1);
        assert_eq!(backend.watch_paths().len(), 2);
    }

    #[test]
    fn test_cubic_contour_conversion() {
        let dir = TempDir::new().unwrap();
        let ufo = write_ufo(dir.path(), "Solo.ufo", vec![glyph_o()]);
        let backend = UfoBackend::open(&ufo).unwrap();
        let glyph = backend.load_glyph("o").unwrap();
        let path = &glyph.layers[0].glyph.path;
        assert_eq!(path.point_types, [0, 2, 2, 0, 0]);

        let contours = contours_to_norad(path);
        let types: Vec<bool> = contours[0]
            .points
            .iter()
            .map(|p| matches!(p.typ, norad::PointType::Curve))
            .collect();
        assert_eq!(types, [false, false, false, true, false]);
    }

    #[test]
    fn test_quadratic_off_curves() {
        let contour = norad::Contour::new(
            vec![
                norad_point(0.0, 0.0, norad::PointType::Move),
                norad_point(50.0, 100.0, norad::PointType::OffCurve),
                norad_point(100.0, 0.0, norad::PointType::QCurve),
            ],
            None,
            None,
        );
        let converted = contour_from_norad(&contour).unwrap();
        assert!(!converted.is_closed);
        assert_eq!(converted.point_types, [0, 1, 0]);

        let mut path = PackedPath::new();
        path.insert_contour(0, &converted).unwrap();
        let back = contours_to_norad(&path);
        assert!(matches!(back[0].points[0].typ, norad::PointType::Move));
        assert!(matches!(back[0].points[2].typ, norad::PointType::QCurve));
    }

    #[test]
    fn test_store_preserves_lib_and_changes_version() {
        let dir = TempDir::new().unwrap();
        let ufo = write_ufo(dir.path(), "Solo.ufo", vec![glyph_a()]);
        let backend = UfoBackend::open(&ufo).unwrap();

        let before = backend.source_version("A").unwrap();
        let mut glyph = backend.load_glyph("A").unwrap();
        glyph.layers[0].glyph.path.set_point_position(0, 20.0, 55.0).unwrap();
        glyph.layers[0].glyph.x_advance = 400.0;
        // Make sure the rewrite lands in a later mtime tick
        std::thread::sleep(std::time::Duration::from_millis(20));
        backend.store_glyph("A", &glyph).unwrap();

        assert_ne!(backend.source_version("A").unwrap(), before);
        let reloaded = backend.load_glyph("A").unwrap();
        assert_eq!(reloaded.layers[0].glyph, glyph.layers[0].glyph);

        let on_disk = norad::Glyph::load(ufo.join("glyphs").join("A_.glif")).unwrap();
        assert!(on_disk.lib.contains_key("com.example.note"));
    }

    #[test]
    fn test_store_unknown_layer_fails() {
        let dir = TempDir::new().unwrap();
        let ufo = write_ufo(dir.path(), "Solo.ufo", vec![glyph_a()]);
        let backend = UfoBackend::open(&ufo).unwrap();
        let mut glyph = backend.load_glyph("A").unwrap();
        glyph.layers[0].name = "Solo/background".to_string();
        assert!(backend.store_glyph("A", &glyph).is_err());
    }

    #[test]
    fn test_component_skew_keeps_its_axis() {
        let dir = TempDir::new().unwrap();
        let ufo = write_ufo(dir.path(), "Solo.ufo", vec![glyph_a()]);
        let backend = UfoBackend::open(&ufo).unwrap();

        let mut glyph = backend.load_glyph("A").unwrap();
        let transform = kurbo::Affine::new([1.0, 0.1, 0.2, 1.0, 5.0, 6.0]);
        glyph.layers[0]
            .glyph
            .components
            .push(Component::new("B", transform));
        backend.store_glyph("A", &glyph).unwrap();

        let on_disk = norad::Glyph::load(ufo.join("glyphs").join("A_.glif")).unwrap();
        let stored = &on_disk.components[0].transform;
        assert_eq!(stored.xy_scale, 0.1);
        assert_eq!(stored.yx_scale, 0.2);

        let reloaded = backend.load_glyph("A").unwrap();
        let component = &reloaded.layers[0].glyph.components[0];
        assert_eq!(component.affine(), transform);
        // (1, 0) lands at (xx + dx, xy + dy)
        assert_eq!(
            component.affine() * kurbo::Point::new(1.0, 0.0),
            kurbo::Point::new(6.0, 6.1)
        );
    }

    #[test]
    fn test_open_rejects_non_ufo() {
        let dir = TempDir::new().unwrap();
        assert!(UfoBackend::open(dir.path()).is_err());
    }
}
