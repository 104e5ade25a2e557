#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Viewport canonicalization.
//!
//! A map viewport moves in sub-pixel increments while the user pans and
//! zooms. The [`Canonicalizer`] turns each raw [`Viewport`] into a
//! [`BoundingBox`] whose [`BboxKey`] is stable and comparable, so the
//! query cache can tell when two viewports describe the same query.
//!
//! Keys and API parameters both use the `west,south,east,north` order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Approximate meters per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Tolerance used when deciding whether a value already sits on the
/// quantization grid, in grid units.
const GRID_EPSILON: f64 = 1e-6;

/// Errors produced while building a bounding box.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewportError {
    /// One of the coordinates is NaN or infinite.
    #[error("viewport has a non-finite coordinate")]
    NonFinite,

    /// The rectangle has no area (`south >= north` or `west >= east`).
    #[error("degenerate bounding box: south={south} north={north} west={west} east={east}")]
    Degenerate {
        /// Southern latitude.
        south: f64,
        /// Northern latitude.
        north: f64,
        /// Western longitude.
        west: f64,
        /// Eastern longitude.
        east: f64,
    },

    /// A `west,south,east,north` string could not be parsed.
    #[error("invalid bbox {input:?}: expected 'west,south,east,north'")]
    Parse {
        /// The rejected input.
        input: String,
    },

    /// A radius was zero, negative, or non-finite.
    #[error("invalid radius {radius_m} m")]
    InvalidRadius {
        /// The rejected radius in meters.
        radius_m: f64,
    },
}

/// A raw viewport rectangle as reported by the map, possibly carrying
/// floating-point noise from pan/zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Southern latitude.
    pub south: f64,
    /// Western longitude.
    pub west: f64,
    /// Northern latitude.
    pub north: f64,
    /// Eastern longitude.
    pub east: f64,
}

impl Viewport {
    /// Creates a viewport from its four edges.
    #[must_use]
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Returns this viewport shifted by the given deltas in degrees.
    #[must_use]
    pub fn panned(self, d_lat: f64, d_lon: f64) -> Self {
        Self::new(
            self.south + d_lat,
            self.west + d_lon,
            self.north + d_lat,
            self.east + d_lon,
        )
    }
}

impl From<BoundingBox> for Viewport {
    fn from(bbox: BoundingBox) -> Self {
        Self::new(bbox.south, bbox.west, bbox.north, bbox.east)
    }
}

/// A geographic bounding box in WGS84 coordinates.
///
/// Constructed through [`BoundingBox::try_new`], [`parse_bbox`], or a
/// [`Canonicalizer`], all of which enforce `south < north` and
/// `west < east`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a bounding box, validating that every coordinate is finite
    /// and that the rectangle is non-degenerate.
    ///
    /// # Errors
    ///
    /// Returns [`ViewportError`] if a coordinate is non-finite or the box
    /// has no area.
    pub fn try_new(west: f64, south: f64, east: f64, north: f64) -> Result<Self, ViewportError> {
        if ![west, south, east, north].iter().all(|v| v.is_finite()) {
            return Err(ViewportError::NonFinite);
        }
        if south >= north || west >= east {
            return Err(ViewportError::Degenerate {
                south,
                north,
                west,
                east,
            });
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    /// Builds the box spanning `span_lat`/`span_lon` degrees on each side of
    /// a center point.
    ///
    /// # Errors
    ///
    /// Returns [`ViewportError`] if the result is degenerate.
    pub fn from_center_span(
        lat: f64,
        lon: f64,
        span_lat: f64,
        span_lon: f64,
    ) -> Result<Self, ViewportError> {
        Self::try_new(lon - span_lon, lat - span_lat, lon + span_lon, lat + span_lat)
    }

    /// Builds the box enclosing a circle of `radius_m` meters around a
    /// point, using the 1° ≈ 111 km approximation.
    ///
    /// # Errors
    ///
    /// Returns [`ViewportError`] if the radius is not positive or the
    /// resulting box is degenerate.
    pub fn around(lat: f64, lon: f64, radius_m: f64) -> Result<Self, ViewportError> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(ViewportError::InvalidRadius { radius_m });
        }
        let lat_offset = radius_m / METERS_PER_DEGREE;
        // Near the poles a degree of longitude shrinks to nothing.
        let cos_lat = lat.to_radians().cos().abs().max(1e-6);
        let lon_offset = radius_m / (METERS_PER_DEGREE * cos_lat);
        Self::try_new(
            (lon - lon_offset).max(-180.0),
            (lat - lat_offset).max(-90.0),
            (lon + lon_offset).min(180.0),
            (lat + lat_offset).min(90.0),
        )
    }

    /// Center point as `(lat, lon)`.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            f64::midpoint(self.south, self.north),
            f64::midpoint(self.west, self.east),
        )
    }

    /// Returns `true` if the point lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }

    /// Serializes the box as `west,south,east,north` for the API.
    #[must_use]
    pub fn to_param(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }

    /// Canonical cache key for this box.
    #[must_use]
    pub fn key(&self) -> BboxKey {
        BboxKey(self.to_param())
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_param())
    }
}

/// Canonical, comparable form of a [`BoundingBox`].
///
/// The inner string is the `west,south,east,north` wire form, so a key can
/// be sent to the API as-is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BboxKey(String);

impl BboxKey {
    /// The key as a `west,south,east,north` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the key back into a bounding box.
    ///
    /// # Errors
    ///
    /// Returns [`ViewportError`] if the key is not a valid bbox string.
    pub fn to_bbox(&self) -> Result<BoundingBox, ViewportError> {
        parse_bbox(&self.0)
    }
}

impl fmt::Display for BboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BboxKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parses a bounding box string `"west,south,east,north"` into a
/// [`BoundingBox`].
///
/// # Errors
///
/// Returns [`ViewportError::Parse`] if the string does not hold four
/// numbers, or the validation errors of [`BoundingBox::try_new`].
pub fn parse_bbox(s: &str) -> Result<BoundingBox, ViewportError> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ViewportError::Parse {
            input: s.to_string(),
        })?;

    match parts.as_slice() {
        [west, south, east, north] => BoundingBox::try_new(*west, *south, *east, *north),
        _ => Err(ViewportError::Parse {
            input: s.to_string(),
        }),
    }
}

/// Turns raw viewports into canonical bounding boxes.
///
/// With `precision: None` the box keeps the viewport's exact coordinates
/// (after clamping). With `Some(p)` each edge is snapped outward onto a
/// grid of `10^-p` degrees, so small pans inside one grid cell map to the
/// same key at the cost of fetching a slightly larger area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canonicalizer {
    precision: Option<u32>,
}

impl Canonicalizer {
    /// Creates a canonicalizer with optional decimal-place quantization.
    #[must_use]
    pub const fn new(precision: Option<u32>) -> Self {
        Self { precision }
    }

    /// Quantization precision in decimal places, if any.
    #[must_use]
    pub const fn precision(&self) -> Option<u32> {
        self.precision
    }

    /// Canonicalizes a viewport.
    ///
    /// Latitudes are clamped to `[-90, 90]` and longitudes to
    /// `[-180, 180]` before the degeneracy check. Canonicalizing an
    /// already-canonical box returns the same box.
    ///
    /// # Errors
    ///
    /// Returns [`ViewportError`] for non-finite or degenerate input; no
    /// query should be issued in that case.
    pub fn canonicalize(&self, viewport: Viewport) -> Result<BoundingBox, ViewportError> {
        let Viewport {
            south,
            west,
            north,
            east,
        } = viewport;
        if ![south, west, north, east].iter().all(|v| v.is_finite()) {
            return Err(ViewportError::NonFinite);
        }

        let south = south.clamp(-90.0, 90.0);
        let north = north.clamp(-90.0, 90.0);
        let west = west.clamp(-180.0, 180.0);
        let east = east.clamp(-180.0, 180.0);

        // Reject before snapping so a sliver never grows into a real query.
        BoundingBox::try_new(west, south, east, north)?;

        let (west, south, east, north) = match self.precision {
            None => (west, south, east, north),
            Some(p) => {
                let scale = 10_f64.powi(i32::try_from(p).unwrap_or(i32::MAX).min(12));
                (
                    snap_down(west, scale).max(-180.0),
                    snap_down(south, scale).max(-90.0),
                    snap_up(east, scale).min(180.0),
                    snap_up(north, scale).min(90.0),
                )
            }
        };

        BoundingBox::try_new(
            normalize_zero(west),
            normalize_zero(south),
            normalize_zero(east),
            normalize_zero(north),
        )
    }

    /// Canonicalizes a viewport and returns its key.
    ///
    /// # Errors
    ///
    /// See [`Canonicalizer::canonicalize`].
    pub fn key(&self, viewport: Viewport) -> Result<BboxKey, ViewportError> {
        self.canonicalize(viewport).map(|bbox| bbox.key())
    }
}

fn snap_down(value: f64, scale: f64) -> f64 {
    let scaled = value * scale;
    let nearest = scaled.round();
    if (scaled - nearest).abs() < GRID_EPSILON {
        nearest / scale
    } else {
        scaled.floor() / scale
    }
}

fn snap_up(value: f64, scale: f64) -> f64 {
    let scaled = value * scale;
    let nearest = scaled.round();
    if (scaled - nearest).abs() < GRID_EPSILON {
        nearest / scale
    } else {
        scaled.ceil() / scale
    }
}

/// Maps `-0.0` to `0.0` so both produce the same key text.
fn normalize_zero(value: f64) -> f64 {
    value + 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy() -> Viewport {
        Viewport::new(36.123_456_789, -86.987_654_321, 36.456_789_012, -86.543_210_987)
    }

    #[test]
    fn key_uses_west_south_east_north_order() {
        let bbox = BoundingBox::try_new(-86.9, 36.1, -86.5, 36.4).unwrap();
        assert_eq!(bbox.key().as_str(), "-86.9,36.1,-86.5,36.4");
        assert_eq!(bbox.to_param(), bbox.key().to_string());
    }

    #[test]
    fn canonicalize_is_idempotent_without_quantization() {
        let c = Canonicalizer::new(None);
        let once = c.canonicalize(noisy()).unwrap();
        let twice = c.canonicalize(Viewport::from(once)).unwrap();
        assert_eq!(once.key(), twice.key());
        assert_eq!(once, twice);
    }

    #[test]
    fn canonicalize_is_idempotent_with_quantization() {
        for p in 0..=6 {
            let c = Canonicalizer::new(Some(p));
            let once = c.canonicalize(noisy()).unwrap();
            let twice = c.canonicalize(Viewport::from(once)).unwrap();
            assert_eq!(once.key(), twice.key(), "precision {p} not idempotent");
        }
    }

    #[test]
    fn quantization_snaps_outward_and_covers_viewport() {
        let c = Canonicalizer::new(Some(2));
        let v = noisy();
        let bbox = c.canonicalize(v).unwrap();
        assert_eq!(bbox.key().as_str(), "-86.99,36.12,-86.54,36.46");
        assert!(bbox.south <= v.south && bbox.north >= v.north);
        assert!(bbox.west <= v.west && bbox.east >= v.east);
    }

    #[test]
    fn sub_cell_pans_share_a_key_when_quantized() {
        let c = Canonicalizer::new(Some(1));
        let a = c.key(Viewport::new(36.12, -86.98, 36.45, -86.54)).unwrap();
        let b = c.key(Viewport::new(36.13, -86.97, 36.44, -86.55)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_degenerate_viewports() {
        let c = Canonicalizer::default();
        assert!(matches!(
            c.canonicalize(Viewport::new(36.5, -86.9, 36.5, -86.5)),
            Err(ViewportError::Degenerate { .. })
        ));
        assert!(matches!(
            c.canonicalize(Viewport::new(36.1, -86.5, 36.5, -86.9)),
            Err(ViewportError::Degenerate { .. })
        ));
        assert_eq!(
            c.canonicalize(Viewport::new(f64::NAN, -86.9, 36.5, -86.5)),
            Err(ViewportError::NonFinite)
        );
    }

    #[test]
    fn clamps_out_of_range_coordinates() {
        let c = Canonicalizer::default();
        let bbox = c.canonicalize(Viewport::new(-95.0, -200.0, 95.0, 200.0)).unwrap();
        assert_eq!(bbox.key().as_str(), "-180,-90,180,90");
    }

    #[test]
    fn negative_zero_and_zero_share_a_key() {
        let c = Canonicalizer::default();
        let a = c.key(Viewport::new(-0.0, -1.0, 1.0, 1.0)).unwrap();
        let b = c.key(Viewport::new(0.0, -1.0, 1.0, 1.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parses_bbox_strings() {
        let bbox = parse_bbox(" -86.9, 36.1 ,-86.5,36.4").unwrap();
        assert_eq!(bbox, BoundingBox::try_new(-86.9, 36.1, -86.5, 36.4).unwrap());
        assert!(matches!(parse_bbox("1,2,3"), Err(ViewportError::Parse { .. })));
        assert!(matches!(parse_bbox("a,b,c,d"), Err(ViewportError::Parse { .. })));
        assert!(matches!(
            parse_bbox("1,2,0,3"),
            Err(ViewportError::Degenerate { .. })
        ));
    }

    #[test]
    fn key_round_trips_through_parse() {
        let bbox = Canonicalizer::default().canonicalize(noisy()).unwrap();
        assert_eq!(bbox.key().to_bbox().unwrap(), bbox);
    }

    #[test]
    fn around_builds_symmetric_box() {
        let bbox = BoundingBox::around(36.1627, -86.7816, 5000.0).unwrap();
        let (lat, lon) = bbox.center();
        assert!((lat - 36.1627).abs() < 1e-9);
        assert!((lon - -86.7816).abs() < 1e-9);
        assert!((bbox.north - bbox.south - 2.0 * 5000.0 / METERS_PER_DEGREE).abs() < 1e-9);
        assert!(bbox.east - bbox.west > bbox.north - bbox.south);
        assert!(bbox.contains(36.1627, -86.7816));
        assert!(matches!(
            BoundingBox::around(36.0, -86.0, 0.0),
            Err(ViewportError::InvalidRadius { .. })
        ));
    }

    #[test]
    fn center_span_matches_default_dashboard_box() {
        let bbox = BoundingBox::from_center_span(36.1627, -86.7816, 0.35, 0.45).unwrap();
        assert!((bbox.west - (-86.7816 - 0.45)).abs() < 1e-12);
        assert!((bbox.north - (36.1627 + 0.35)).abs() < 1e-12);
    }
}
