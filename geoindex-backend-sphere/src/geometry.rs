//! Unit-sphere geometry: points as 3D unit vectors and latitude/longitude
//! rectangles with a conservative Cartesian envelope.

use std::f64::consts::{FRAC_PI_2, PI};

use geoindex_core::Coordinate;
use rstar::AABB;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_010.0;

/// Padding applied to envelopes so rounding never excludes a boundary point.
const ENVELOPE_SLACK: f64 = 1e-12;

/// Unit vector for a geographic coordinate.
#[must_use]
pub fn unit_vector(coordinate: Coordinate) -> [f64; 3] {
    let (lat, lon) = (coordinate.lat.to_radians(), coordinate.lon.to_radians());
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat]
}

/// Squared chord length between two unit vectors.
#[must_use]
pub fn chord_squared(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(p, q)| (p - q) * (p - q)).sum()
}

/// Chord length subtending a surface distance of `metres`.
///
/// Distances of half the circumference or more cover the whole sphere and
/// map to the diameter.
#[must_use]
pub fn chord_for_distance(metres: f64) -> f64 {
    let angle = (metres / EARTH_RADIUS_M).clamp(0.0, PI);
    2.0 * (angle / 2.0).sin()
}

/// A query centre on the unit sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpherePoint {
    /// Geographic position in degrees.
    pub coordinate: Coordinate,
    /// Unit vector of `coordinate`.
    pub vector: [f64; 3],
}

impl From<Coordinate> for SpherePoint {
    fn from(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            vector: unit_vector(coordinate),
        }
    }
}

/// Closed latitude/longitude rectangle in degrees.
///
/// Longitudes are taken as written, so a rectangle from 170 to 190 is valid
/// while one from 170 to -170 is empty in longitude. Rectangles wrapping the
/// antimeridian are not modelled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLngRect {
    lat: (f64, f64),
    lon: (f64, f64),
    envelope: AABB<[f64; 3]>,
}

impl LatLngRect {
    /// Rectangle spanned by two opposite corners in any order.
    #[must_use]
    pub fn from_corners(a: Coordinate, b: Coordinate) -> Self {
        let lat = (a.lat.min(b.lat), a.lat.max(b.lat));
        let lon = (a.lon.min(b.lon), a.lon.max(b.lon));
        Self {
            lat,
            lon,
            envelope: envelope(lat, lon),
        }
    }

    /// Latitude bounds, low then high.
    #[must_use]
    pub const fn lat(&self) -> (f64, f64) {
        self.lat
    }

    /// Longitude bounds, low then high.
    #[must_use]
    pub const fn lon(&self) -> (f64, f64) {
        self.lon
    }

    /// Cartesian box containing every unit vector inside the rectangle.
    #[must_use]
    pub const fn envelope(&self) -> &AABB<[f64; 3]> {
        &self.envelope
    }

    /// Whether `coordinate` lies inside the rectangle, boundary included.
    #[must_use]
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        (self.lat.0..=self.lat.1).contains(&coordinate.lat)
            && (self.lon.0..=self.lon.1).contains(&coordinate.lon)
    }
}

/// Range of `f` over `[lo, hi]` radians, where `f` is sine or cosine.
///
/// Extremes occur at the interval ends or at multiples of a quarter turn
/// inside it.
fn trig_range(lo: f64, hi: f64, f: fn(f64) -> f64) -> (f64, f64) {
    if hi - lo >= 2.0 * PI {
        return (-1.0, 1.0);
    }
    let (mut min, mut max) = (f(lo).min(f(hi)), f(lo).max(f(hi)));
    let mut k = (lo / FRAC_PI_2).ceil();
    while k * FRAC_PI_2 <= hi {
        let value = f(k * FRAC_PI_2);
        min = min.min(value);
        max = max.max(value);
        k += 1.0;
    }
    (min, max)
}

/// Bounds of the product of two intervals.
fn product_range(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    let products = [a.0 * b.0, a.0 * b.1, a.1 * b.0, a.1 * b.1];
    products
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), p| {
            (min.min(*p), max.max(*p))
        })
}

fn envelope(lat: (f64, f64), lon: (f64, f64)) -> AABB<[f64; 3]> {
    let lat_lo = lat.0.clamp(-90.0, 90.0).to_radians();
    let lat_hi = lat.1.clamp(-90.0, 90.0).to_radians();
    let (lon_lo, lon_hi) = (lon.0.to_radians(), lon.1.to_radians());

    let cos_lat = trig_range(lat_lo, lat_hi, f64::cos);
    let sin_lat = trig_range(lat_lo, lat_hi, f64::sin);
    let x = product_range(cos_lat, trig_range(lon_lo, lon_hi, f64::cos));
    let y = product_range(cos_lat, trig_range(lon_lo, lon_hi, f64::sin));

    AABB::from_corners(
        [
            x.0 - ENVELOPE_SLACK,
            y.0 - ENVELOPE_SLACK,
            sin_lat.0 - ENVELOPE_SLACK,
        ],
        [
            x.1 + ENVELOPE_SLACK,
            y.1 + ENVELOPE_SLACK,
            sin_lat.1 + ENVELOPE_SLACK,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstar::Envelope;
    use rstest::rstest;

    #[rstest]
    #[case(Coordinate::new(0.0, 0.0), [1.0, 0.0, 0.0])]
    #[case(Coordinate::new(90.0, 0.0), [0.0, 0.0, 1.0])]
    #[case(Coordinate::new(0.0, 90.0), [0.0, 1.0, 0.0])]
    fn unit_vectors_point_along_axes(#[case] coordinate: Coordinate, #[case] expected: [f64; 3]) {
        let vector = unit_vector(coordinate);
        assert!(chord_squared(&vector, &expected) < 1e-20, "{vector:?}");
    }

    #[rstest]
    fn one_degree_of_arc_is_about_111_km() {
        let a = unit_vector(Coordinate::new(0.0, 0.0));
        let b = unit_vector(Coordinate::new(0.0, 1.0));
        let chord = chord_squared(&a, &b).sqrt();
        assert!(chord <= chord_for_distance(111_200.0));
        assert!(chord > chord_for_distance(111_190.0));
    }

    #[rstest]
    fn half_circumference_covers_the_sphere() {
        assert!((chord_for_distance(EARTH_RADIUS_M * PI * 2.0) - 2.0).abs() < 1e-12);
    }

    #[rstest]
    #[case(Coordinate::new(-10.0, 170.0), Coordinate::new(10.0, 190.0), Coordinate::new(0.0, 180.0))]
    #[case(Coordinate::new(80.0, -30.0), Coordinate::new(89.0, 120.0), Coordinate::new(85.0, 45.0))]
    #[case(Coordinate::new(-5.0, -5.0), Coordinate::new(5.0, 5.0), Coordinate::new(5.0, -5.0))]
    fn envelope_contains_interior_and_corner_points(
        #[case] a: Coordinate,
        #[case] b: Coordinate,
        #[case] inside: Coordinate,
    ) {
        let rect = LatLngRect::from_corners(a, b);
        assert!(rect.contains(inside));
        assert!(rect.envelope().contains_point(&unit_vector(inside)));
    }

    #[rstest]
    fn corners_in_any_order() {
        let rect = LatLngRect::from_corners(Coordinate::new(1.0, 1.0), Coordinate::new(0.0, 0.0));
        assert_eq!(rect.lat(), (0.0, 1.0));
        assert_eq!(rect.lon(), (0.0, 1.0));
    }
}
