// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Packed outline representation and its structural mutators.
//!
//! A `PackedPath` stores every point of every contour in two flat, parallel
//! buffers: `coordinates` holds `x, y` pairs and `point_types` holds one flag
//! byte per point. `contour_info` marks where each contour ends. The layout
//! is compact to ship over the wire and cheap to patch with index
//! arithmetic, which is what the change functions in
//! [`crate::changes::outline`] do.
//!
//! Invariants kept by every mutator:
//! - `coordinates.len() == 2 * point_types.len()`
//! - contour end points are strictly increasing (no empty contours)
//! - the last end point is `point_count() - 1`

use kurbo::{Affine, BezPath, Point as KurboPoint, Rect};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{ChangeError, ChangeResult};

// ============================================================================
// POINT FLAGS
// ============================================================================

/// On-curve point
pub const ON_CURVE: u8 = 0x00;
/// Quadratic (TrueType) off-curve point
pub const OFF_CURVE_QUAD: u8 = 0x01;
/// Cubic (PostScript) off-curve point
pub const OFF_CURVE_CUBIC: u8 = 0x02;
/// Smooth flag, only meaningful on on-curve points
pub const SMOOTH_FLAG: u8 = 0x08;
/// Mask selecting the point type bits
pub const POINT_TYPE_MASK: u8 = 0x07;

/// Point type classification decoded from a flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointType {
    OnCurve,
    OffCurveQuad,
    OffCurveCubic,
}

impl PointType {
    /// Decode the type bits of a flag byte. Unknown types yield `None`.
    pub fn from_flags(flags: u8) -> Option<Self> {
        match flags & POINT_TYPE_MASK {
            ON_CURVE => Some(Self::OnCurve),
            OFF_CURVE_QUAD => Some(Self::OffCurveQuad),
            OFF_CURVE_CUBIC => Some(Self::OffCurveCubic),
            _ => None,
        }
    }

    pub fn is_off_curve(self) -> bool {
        !matches!(self, Self::OnCurve)
    }
}

/// Off-curve kind as it appears in a point record on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffCurveKind {
    Quad,
    Cubic,
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A single point, as passed to `insertPoint` and returned by `point()`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// `None` for on-curve points
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<OffCurveKind>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub smooth: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Point {
    pub fn on_curve(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            kind: None,
            smooth: false,
        }
    }

    pub fn off_curve(x: f64, y: f64, kind: OffCurveKind) -> Self {
        Self {
            x,
            y,
            kind: Some(kind),
            smooth: false,
        }
    }

    /// Encode type and smoothness into a flag byte
    pub fn flags(&self) -> u8 {
        let typ = match self.kind {
            None => ON_CURVE,
            Some(OffCurveKind::Quad) => OFF_CURVE_QUAD,
            Some(OffCurveKind::Cubic) => OFF_CURVE_CUBIC,
        };
        if self.smooth { typ | SMOOTH_FLAG } else { typ }
    }

    fn from_flags(x: f64, y: f64, flags: u8) -> Self {
        let kind = match PointType::from_flags(flags) {
            Some(PointType::OffCurveQuad) => Some(OffCurveKind::Quad),
            Some(PointType::OffCurveCubic) => Some(OffCurveKind::Cubic),
            _ => None,
        };
        Self {
            x,
            y,
            kind,
            smooth: flags & SMOOTH_FLAG != 0,
        }
    }
}

/// A standalone contour, as passed to `insertContour`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contour {
    pub coordinates: Vec<f64>,
    pub point_types: Vec<u8>,
    #[serde(default)]
    pub is_closed: bool,
}

impl Contour {
    /// Build a contour from points
    pub fn from_points(points: &[Point], is_closed: bool) -> Self {
        let mut contour = Self {
            coordinates: Vec::with_capacity(points.len() * 2),
            point_types: Vec::with_capacity(points.len()),
            is_closed,
        };
        for pt in points {
            contour.coordinates.extend([pt.x, pt.y]);
            contour.point_types.push(pt.flags());
        }
        contour
    }

    pub fn point_count(&self) -> usize {
        self.point_types.len()
    }
}

/// Boundary record for one contour inside a `PackedPath`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContourInfo {
    /// Absolute index of the contour's last point
    pub end_point: usize,
    pub is_closed: bool,
}

/// Outline stored as flat coordinate and flag buffers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedPath {
    pub coordinates: Vec<f64>,
    pub point_types: Vec<u8>,
    pub contour_info: Vec<ContourInfo>,
}

// ============================================================================
// QUERIES
// ============================================================================

impl PackedPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point_count(&self) -> usize {
        self.point_types.len()
    }

    pub fn contour_count(&self) -> usize {
        self.contour_info.len()
    }

    /// End point index of every contour, in order
    pub fn contour_ends(&self) -> Vec<usize> {
        self.contour_info.iter().map(|c| c.end_point).collect()
    }

    /// Absolute index of the first point of `contour_index`.
    ///
    /// `contour_index == contour_count()` yields the insertion point after
    /// the last contour.
    fn contour_start(&self, contour_index: usize) -> usize {
        match contour_index {
            0 => 0,
            i => self.contour_info[i - 1].end_point + 1,
        }
    }

    fn contour_range(&self, contour_index: usize) -> Range<usize> {
        self.contour_start(contour_index)..self.contour_info[contour_index].end_point + 1
    }

    /// Get a point by absolute index
    pub fn point(&self, index: usize) -> Option<Point> {
        let flags = *self.point_types.get(index)?;
        Some(Point::from_flags(
            self.coordinates[index * 2],
            self.coordinates[index * 2 + 1],
            flags,
        ))
    }

    /// Copy out a single contour
    pub fn contour(&self, contour_index: usize) -> Option<Contour> {
        let info = *self.contour_info.get(contour_index)?;
        let range = self.contour_range(contour_index);
        Some(Contour {
            coordinates: self.coordinates[range.start * 2..range.end * 2].to_vec(),
            point_types: self.point_types[range].to_vec(),
            is_closed: info.is_closed,
        })
    }

    /// Check the structural invariants
    pub fn validate(&self) -> ChangeResult<()> {
        if self.coordinates.len() != self.point_types.len() * 2 {
            return Err(ChangeError::InvalidDocument(format!(
                "{} coordinates for {} points",
                self.coordinates.len(),
                self.point_types.len()
            )));
        }
        let mut next_start = 0;
        for (i, info) in self.contour_info.iter().enumerate() {
            if info.end_point < next_start {
                return Err(ChangeError::InvalidDocument(format!(
                    "contour {i} ends at {} before its start {next_start}",
                    info.end_point
                )));
            }
            next_start = info.end_point + 1;
        }
        if next_start != self.point_count() {
            return Err(ChangeError::InvalidDocument(format!(
                "contours cover {next_start} of {} points",
                self.point_count()
            )));
        }
        Ok(())
    }

    fn check_contour_index(&self, contour_index: usize, allow_end: bool) -> ChangeResult<()> {
        let len = self.contour_count();
        if contour_index < len || (allow_end && contour_index == len) {
            Ok(())
        } else {
            Err(ChangeError::index_out_of_range("contour", contour_index, len))
        }
    }
}

// ============================================================================
// MUTATORS
// ============================================================================

impl PackedPath {
    /// Move the point at `point_index` to `(x, y)`
    pub fn set_point_position(&mut self, point_index: usize, x: f64, y: f64) -> ChangeResult<()> {
        if point_index >= self.point_count() {
            return Err(ChangeError::index_out_of_range(
                "point",
                point_index,
                self.point_count(),
            ));
        }
        self.coordinates[point_index * 2] = x;
        self.coordinates[point_index * 2 + 1] = y;
        Ok(())
    }

    /// Insert `point` before `contour_point_index` of contour `contour_index`.
    ///
    /// `contour_point_index` may equal the contour's point count to append.
    pub fn insert_point(
        &mut self,
        contour_index: usize,
        contour_point_index: usize,
        point: &Point,
    ) -> ChangeResult<()> {
        self.check_contour_index(contour_index, false)?;
        let range = self.contour_range(contour_index);
        if contour_point_index > range.len() {
            return Err(ChangeError::index_out_of_range(
                "contour point",
                contour_point_index,
                range.len(),
            ));
        }
        let index = range.start + contour_point_index;
        self.coordinates
            .splice(index * 2..index * 2, [point.x, point.y]);
        self.point_types.insert(index, point.flags());
        self.shift_end_points(contour_index, 1);
        Ok(())
    }

    /// Remove point `contour_point_index` of contour `contour_index`,
    /// returning it.
    ///
    /// The last remaining point of a contour cannot be deleted; delete the
    /// contour instead.
    pub fn delete_point(
        &mut self,
        contour_index: usize,
        contour_point_index: usize,
    ) -> ChangeResult<Point> {
        self.check_contour_index(contour_index, false)?;
        let range = self.contour_range(contour_index);
        if contour_point_index >= range.len() {
            return Err(ChangeError::index_out_of_range(
                "contour point",
                contour_point_index,
                range.len(),
            ));
        }
        if range.len() == 1 {
            return Err(ChangeError::invalid_argument(
                "deletePoint",
                format!("contour {contour_index} would become empty"),
            ));
        }
        let index = range.start + contour_point_index;
        let removed: Vec<f64> = self.coordinates.drain(index * 2..index * 2 + 2).collect();
        let flags = self.point_types.remove(index);
        self.shift_end_points(contour_index, -1);
        Ok(Point::from_flags(removed[0], removed[1], flags))
    }

    /// Insert a whole contour before `contour_index`.
    ///
    /// `contour_index` may equal `contour_count()` to append.
    pub fn insert_contour(&mut self, contour_index: usize, contour: &Contour) -> ChangeResult<()> {
        self.check_contour_index(contour_index, true)?;
        let count = contour.point_count();
        if count == 0 {
            return Err(ChangeError::invalid_argument(
                "insertContour",
                "contour has no points",
            ));
        }
        if contour.coordinates.len() != count * 2 {
            return Err(ChangeError::invalid_argument(
                "insertContour",
                format!(
                    "{} coordinates for {count} points",
                    contour.coordinates.len()
                ),
            ));
        }
        let start = self.contour_start(contour_index);
        self.coordinates
            .splice(start * 2..start * 2, contour.coordinates.iter().copied());
        self.point_types
            .splice(start..start, contour.point_types.iter().copied());
        self.contour_info.insert(
            contour_index,
            ContourInfo {
                end_point: start + count - 1,
                is_closed: contour.is_closed,
            },
        );
        self.shift_end_points(contour_index + 1, count as isize);
        Ok(())
    }

    /// Remove contour `contour_index`, returning it.
    pub fn delete_contour(&mut self, contour_index: usize) -> ChangeResult<Contour> {
        self.check_contour_index(contour_index, false)?;
        let range = self.contour_range(contour_index);
        let count = range.len();
        let coordinates: Vec<f64> = self
            .coordinates
            .drain(range.start * 2..range.end * 2)
            .collect();
        let point_types: Vec<u8> = self.point_types.drain(range).collect();
        let info = self.contour_info.remove(contour_index);
        self.shift_end_points(contour_index, -(count as isize));
        Ok(Contour {
            coordinates,
            point_types,
            is_closed: info.is_closed,
        })
    }

    /// Shift the end points of `first_contour` and every later contour
    fn shift_end_points(&mut self, first_contour: usize, delta: isize) {
        for info in &mut self.contour_info[first_contour..] {
            info.end_point = info.end_point.wrapping_add_signed(delta);
        }
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

impl PackedPath {
    /// Apply an affine transform to every point
    pub fn transformed(&self, transform: Affine) -> Self {
        let mut coordinates = Vec::with_capacity(self.coordinates.len());
        for pair in self.coordinates.chunks_exact(2) {
            let pt = transform * KurboPoint::new(pair[0], pair[1]);
            coordinates.extend([pt.x, pt.y]);
        }
        Self {
            coordinates,
            point_types: self.point_types.clone(),
            contour_info: self.contour_info.clone(),
        }
    }

    /// Bounding box of all points, on- and off-curve
    pub fn control_bounds(&self) -> Option<Rect> {
        let mut pairs = self.coordinates.chunks_exact(2);
        let first = pairs.next()?;
        let start = KurboPoint::new(first[0], first[1]);
        Some(pairs.fold(Rect::from_points(start, start), |rect, pair| {
            rect.union_pt(KurboPoint::new(pair[0], pair[1]))
        }))
    }

    /// Convert to a kurbo `BezPath`.
    ///
    /// Runs of quadratic off-curves get implied on-curve midpoints. A cubic
    /// run that is not exactly two off-curves is drawn as a line.
    pub fn to_bez_path(&self) -> BezPath {
        let mut path = BezPath::new();
        for contour_index in 0..self.contour_count() {
            let range = self.contour_range(contour_index);
            let is_closed = self.contour_info[contour_index].is_closed;
            self.draw_contour(&mut path, range, is_closed);
        }
        path
    }

    fn kurbo_point(&self, index: usize) -> KurboPoint {
        KurboPoint::new(self.coordinates[index * 2], self.coordinates[index * 2 + 1])
    }

    fn point_type(&self, index: usize) -> PointType {
        PointType::from_flags(self.point_types[index]).unwrap_or(PointType::OnCurve)
    }

    fn draw_contour(&self, path: &mut BezPath, range: Range<usize>, is_closed: bool) {
        let start = range.start;
        let count = range.len();
        let Some(first_on_curve) = range
            .clone()
            .position(|i| self.point_type(i) == PointType::OnCurve)
        else {
            if is_closed {
                self.draw_implied_quad_contour(path, range);
            }
            return;
        };

        let last = if is_closed {
            count
        } else {
            count - 1 - first_on_curve
        };
        let mut segment: Vec<KurboPoint> = Vec::new();
        let mut segment_type = PointType::OnCurve;
        for i in 0..=last {
            let index = if is_closed {
                start + (first_on_curve + i) % count
            } else {
                start + first_on_curve + i
            };
            let pt = self.kurbo_point(index);
            if i == 0 {
                path.move_to(pt);
                continue;
            }
            segment.push(pt);
            match self.point_type(index) {
                PointType::OnCurve => {
                    draw_segment(path, segment_type, &segment);
                    segment.clear();
                    segment_type = PointType::OnCurve;
                }
                typ => segment_type = typ,
            }
        }
        if is_closed {
            path.close_path();
        }
    }

    /// Closed contour made only of quadratic off-curves
    fn draw_implied_quad_contour(&self, path: &mut BezPath, range: Range<usize>) {
        let points: Vec<KurboPoint> = range.map(|i| self.kurbo_point(i)).collect();
        let Some(last) = points.last() else {
            return;
        };
        let start = last.midpoint(points[0]);
        path.move_to(start);
        for (i, ctrl) in points.iter().enumerate() {
            let end = match points.get(i + 1) {
                Some(next) => ctrl.midpoint(*next),
                None => start,
            };
            path.quad_to(*ctrl, end);
        }
        path.close_path();
    }
}

fn draw_segment(path: &mut BezPath, segment_type: PointType, segment: &[KurboPoint]) {
    let Some(&end) = segment.last() else {
        return;
    };
    match segment_type {
        PointType::OnCurve => path.line_to(end),
        PointType::OffCurveQuad => {
            let mut ctrl = segment[0];
            for &next in &segment[1..segment.len() - 1] {
                path.quad_to(ctrl, ctrl.midpoint(next));
                ctrl = next;
            }
            path.quad_to(ctrl, end);
        }
        PointType::OffCurveCubic => {
            if segment.len() == 3 {
                path.curve_to(segment[0], segment[1], end);
            } else {
                path.line_to(end);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::PathEl;

    /// Two contours: a closed triangle and an open two-point line
    fn make_path() -> PackedPath {
        let mut path = PackedPath::new();
        let triangle = Contour::from_points(
            &[
                Point::on_curve(20.0, 0.0),
                Point::on_curve(300.0, 0.0),
                Point::on_curve(160.0, 700.0),
            ],
            true,
        );
        let line = Contour::from_points(
            &[Point::on_curve(0.0, 100.0), Point::on_curve(50.0, 100.0)],
            false,
        );
        path.insert_contour(0, &triangle).unwrap();
        path.insert_contour(1, &line).unwrap();
        path
    }

    #[test]
    fn test_set_point_position() {
        let mut path = make_path();
        let before = path.clone();
        path.set_point_position(3, 20.0, 55.0).unwrap();

        assert_eq!(path.coordinates[6], 20.0);
        assert_eq!(path.coordinates[7], 55.0);
        for (i, (a, b)) in before.coordinates.iter().zip(&path.coordinates).enumerate() {
            if i != 6 && i != 7 {
                assert_eq!(a, b, "coordinate {i} changed");
            }
        }
    }

    #[test]
    fn test_set_point_position_out_of_range() {
        let mut path = make_path();
        let before = path.clone();
        let err = path.set_point_position(5, 1.0, 1.0).unwrap_err();
        assert_eq!(err, ChangeError::index_out_of_range("point", 5, 5));
        assert_eq!(path, before);
    }

    #[test]
    fn test_insert_point_shifts_later_contours() {
        let mut path = make_path();
        let pt = Point::off_curve(200.0, 300.0, OffCurveKind::Cubic);
        path.insert_point(0, 1, &pt).unwrap();

        assert_eq!(path.contour_ends(), vec![3, 5]);
        assert_eq!(path.point(1), Some(pt));
        assert_eq!(path.point(2), Some(Point::on_curve(300.0, 0.0)));
        path.validate().unwrap();
    }

    #[test]
    fn test_insert_point_at_contour_end() {
        let mut path = make_path();
        path.insert_point(1, 2, &Point::on_curve(90.0, 100.0)).unwrap();
        assert_eq!(path.contour_ends(), vec![2, 5]);
        assert_eq!(path.point(5), Some(Point::on_curve(90.0, 100.0)));
    }

    #[test]
    fn test_insert_then_delete_point_round_trips() {
        let original = make_path();
        let mut path = original.clone();
        let mut pt = Point::on_curve(1.0, 2.0);
        pt.smooth = true;

        path.insert_point(1, 1, &pt).unwrap();
        assert_ne!(path, original);
        let removed = path.delete_point(1, 1).unwrap();

        assert_eq!(removed, pt);
        assert_eq!(path, original);
    }

    #[test]
    fn test_delete_last_point_of_contour_rejected() {
        let mut path = PackedPath::new();
        path.insert_contour(0, &Contour::from_points(&[Point::on_curve(0.0, 0.0)], false))
            .unwrap();
        let err = path.delete_point(0, 0).unwrap_err();
        assert!(matches!(err, ChangeError::InvalidArgument { .. }));
        assert_eq!(path.point_count(), 1);
    }

    #[test]
    fn test_insert_then_delete_contour_round_trips() {
        let original = make_path();
        let mut path = original.clone();
        let square = Contour::from_points(
            &[
                Point::on_curve(0.0, 0.0),
                Point::on_curve(10.0, 0.0),
                Point::on_curve(10.0, 10.0),
                Point::on_curve(0.0, 10.0),
            ],
            true,
        );

        path.insert_contour(1, &square).unwrap();
        assert_eq!(path.contour_ends(), vec![2, 6, 8]);
        path.validate().unwrap();

        let removed = path.delete_contour(1).unwrap();
        assert_eq!(removed, square);
        assert_eq!(path, original);
    }

    #[test]
    fn test_delete_then_insert_contour_round_trips() {
        let original = make_path();
        let mut path = original.clone();
        let removed = path.delete_contour(0).unwrap();
        assert_eq!(path.contour_ends(), vec![1]);
        path.insert_contour(0, &removed).unwrap();
        assert_eq!(path, original);
    }

    #[test]
    fn test_contour_index_out_of_range() {
        let mut path = make_path();
        assert_eq!(
            path.delete_contour(2).unwrap_err(),
            ChangeError::index_out_of_range("contour", 2, 2)
        );
        assert_eq!(
            path.insert_point(2, 0, &Point::on_curve(0.0, 0.0))
                .unwrap_err(),
            ChangeError::index_out_of_range("contour", 2, 2)
        );
        assert_eq!(
            path.delete_point(1, 2).unwrap_err(),
            ChangeError::index_out_of_range("contour point", 2, 2)
        );
    }

    #[test]
    fn test_validate_rejects_inconsistent_buffers() {
        let mut path = make_path();
        path.coordinates.pop();
        assert!(path.validate().is_err());

        let mut path = make_path();
        path.contour_info[1].end_point = 3;
        assert!(path.validate().is_err());
    }

    #[test]
    fn test_wire_shape() {
        let path = make_path();
        let value = serde_json::to_value(&path).unwrap();
        assert_eq!(value["contourInfo"][0]["endPoint"], 2);
        assert_eq!(value["contourInfo"][1]["isClosed"], false);
        assert_eq!(value["pointTypes"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_to_bez_path_closed_and_open() {
        let bez = make_path().to_bez_path();
        let elements = bez.elements();
        assert_eq!(elements[0], PathEl::MoveTo(KurboPoint::new(20.0, 0.0)));
        assert_eq!(elements[3], PathEl::LineTo(KurboPoint::new(20.0, 0.0)));
        assert_eq!(elements[4], PathEl::ClosePath);
        assert_eq!(elements[5], PathEl::MoveTo(KurboPoint::new(0.0, 100.0)));
        assert_eq!(elements[6], PathEl::LineTo(KurboPoint::new(50.0, 100.0)));
        assert_eq!(elements.len(), 7);
    }

    #[test]
    fn test_to_bez_path_implied_quad_points() {
        let mut path = PackedPath::new();
        let contour = Contour::from_points(
            &[
                Point::on_curve(0.0, 0.0),
                Point::off_curve(0.0, 100.0, OffCurveKind::Quad),
                Point::off_curve(100.0, 100.0, OffCurveKind::Quad),
                Point::on_curve(100.0, 0.0),
            ],
            false,
        );
        path.insert_contour(0, &contour).unwrap();
        let bez = path.to_bez_path();
        assert_eq!(
            bez.elements()[1],
            PathEl::QuadTo(KurboPoint::new(0.0, 100.0), KurboPoint::new(50.0, 100.0))
        );
        assert_eq!(
            bez.elements()[2],
            PathEl::QuadTo(KurboPoint::new(100.0, 100.0), KurboPoint::new(100.0, 0.0))
        );
    }

    #[test]
    fn test_transformed_and_bounds() {
        let path = make_path().transformed(Affine::translate((10.0, 5.0)));
        let bounds = path.control_bounds().unwrap();
        assert_eq!(bounds, Rect::new(10.0, 5.0, 310.0, 705.0));
        assert_eq!(PackedPath::new().control_bounds(), None);
    }
}
