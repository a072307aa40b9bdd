//! Spherical point index for the geoindex benchmarks.
//!
//! Coordinates stay geographic: each point is stored as a unit vector in an
//! [`rstar::RTree`] over 3D space, next to its original latitude and
//! longitude. Distance queries take metres along the Earth's surface and are
//! answered by a chord-length cube followed by an exact chord comparison.
//! Range queries are latitude/longitude rectangles; a conservative Cartesian
//! box finds candidates and exact degree bounds decide membership.

#![forbid(unsafe_code)]

mod geometry;

pub use geometry::{
    EARTH_RADIUS_M, LatLngRect, SpherePoint, chord_for_distance, chord_squared, unit_vector,
};

use camino::Utf8Path;
use geoindex_core::{
    BuildError, Coordinate, DistanceQuery, IndexBackend, LoadError, Progress, RangeQuery,
};
use geoindex_data::{LoaderOptions, read_coordinates, read_distance_queries, read_range_queries};
use log::debug;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};

/// Unit vector tagged with the geometry's position and geographic location.
pub type SphereEntry = GeomWithData<[f64; 3], IndexedCoordinate>;

/// Payload stored next to each unit vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedCoordinate {
    /// Position in the loaded geometry collection.
    pub position: usize,
    /// Geographic location in degrees.
    pub coordinate: Coordinate,
}

/// [`IndexBackend`] over unit vectors on the sphere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphereBackend {
    options: LoaderOptions,
}

impl SphereBackend {
    /// Create a backend decoding inputs with `options`.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Decoding options.
    #[must_use]
    pub const fn options(&self) -> &LoaderOptions {
        &self.options
    }
}

fn validate(position: usize, coordinate: Coordinate) -> Result<(), BuildError> {
    if !coordinate.is_finite() {
        return Err(BuildError::InvalidGeometry {
            position,
            reason: format!("coordinate ({}, {}) is not finite", coordinate.lat, coordinate.lon),
        });
    }
    if !(-90.0..=90.0).contains(&coordinate.lat) {
        return Err(BuildError::InvalidGeometry {
            position,
            reason: format!("latitude {} is outside [-90, 90]", coordinate.lat),
        });
    }
    Ok(())
}

impl IndexBackend for SphereBackend {
    type Geometry = Coordinate;
    type Point = SpherePoint;
    type Region = LatLngRect;
    type Index = RTree<SphereEntry>;

    fn load_geometry(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<Coordinate>, LoadError> {
        read_coordinates(path, &self.options, progress)
    }

    fn load_distance_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<DistanceQuery<SpherePoint>>, LoadError> {
        let raw = read_distance_queries(path, &self.options, progress)?;
        Ok(raw
            .into_iter()
            .map(|query| DistanceQuery {
                point: SpherePoint::from(query.point),
                distance: query.distance,
            })
            .collect())
    }

    fn load_range_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<RangeQuery<LatLngRect>>, LoadError> {
        let raw = read_range_queries(path, &self.options, progress)?;
        Ok(raw
            .into_iter()
            .map(|query| {
                let (a, b) = query.range;
                RangeQuery {
                    range: LatLngRect::from_corners(a, b),
                }
            })
            .collect())
    }

    fn build_index(
        &self,
        geometry: &[Coordinate],
        progress: &Progress,
    ) -> Result<RTree<SphereEntry>, BuildError> {
        let total = geometry.len();
        progress.set(0, total);
        let mut entries = Vec::with_capacity(total);
        for (position, coordinate) in geometry.iter().enumerate() {
            validate(position, *coordinate)?;
            entries.push(GeomWithData::new(
                unit_vector(*coordinate),
                IndexedCoordinate {
                    position,
                    coordinate: *coordinate,
                },
            ));
        }
        let tree = RTree::bulk_load(entries);
        progress.set(total, total);
        debug!("bulk loaded {} unit vectors", tree.size());
        Ok(tree)
    }

    fn distance_query(&self, index: &RTree<SphereEntry>, query: &DistanceQuery<SpherePoint>) -> usize {
        let centre = query.point.vector;
        let chord = chord_for_distance(query.distance);
        let [x, y, z] = centre;
        let cube = AABB::from_corners(
            [x - chord, y - chord, z - chord],
            [x + chord, y + chord, z + chord],
        );
        let limit = chord * chord;
        index
            .locate_in_envelope(&cube)
            .filter(|entry| chord_squared(entry.geom(), &centre) <= limit)
            .count()
    }

    fn range_query(&self, index: &RTree<SphereEntry>, query: &RangeQuery<LatLngRect>) -> usize {
        index
            .locate_in_envelope(query.range.envelope())
            .filter(|entry| query.range.contains(entry.data.coordinate))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    /// Surface length of one degree of arc.
    const DEGREE_M: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

    #[fixture]
    fn backend() -> SphereBackend {
        SphereBackend::default()
    }

    fn equator() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(0.0, 2.0),
        ]
    }

    fn diagonal() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(2.0, 2.0),
        ]
    }

    #[rstest]
    #[case(1.5 * DEGREE_M, 2)]
    #[case(0.99 * DEGREE_M, 1)]
    #[case(2.5 * DEGREE_M, 3)]
    #[case(0.0, 1)]
    #[case(30_000_000.0, 3)]
    fn distance_is_measured_along_the_surface(
        backend: SphereBackend,
        #[case] distance: f64,
        #[case] expected: usize,
    ) {
        let index = backend
            .build_index(&equator(), &Progress::new())
            .expect("build");
        let query = DistanceQuery {
            point: SpherePoint::from(Coordinate::new(0.0, 0.0)),
            distance,
        };
        assert_eq!(backend.distance_query(&index, &query), expected);
    }

    #[rstest]
    fn range_includes_boundary(backend: SphereBackend) {
        let index = backend
            .build_index(&diagonal(), &Progress::new())
            .expect("build");
        let query = RangeQuery {
            range: LatLngRect::from_corners(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)),
        };
        assert_eq!(backend.range_query(&index, &query), 2);
    }

    #[rstest]
    fn range_near_the_pole(backend: SphereBackend) {
        let geometry = [
            Coordinate::new(89.5, -120.0),
            Coordinate::new(89.5, 60.0),
            Coordinate::new(88.0, 0.0),
        ];
        let index = backend.build_index(&geometry, &Progress::new()).expect("build");
        let query = RangeQuery {
            range: LatLngRect::from_corners(Coordinate::new(89.0, -180.0), Coordinate::new(90.0, 180.0)),
        };
        assert_eq!(backend.range_query(&index, &query), 2);
    }

    #[rstest]
    #[case(Coordinate::new(f64::NAN, 0.0))]
    #[case(Coordinate::new(91.0, 0.0))]
    fn invalid_geometry_is_rejected(backend: SphereBackend, #[case] bad: Coordinate) {
        let geometry = [Coordinate::new(0.0, 0.0), bad];
        let err = backend
            .build_index(&geometry, &Progress::new())
            .expect_err("rejected");
        assert!(matches!(err, BuildError::InvalidGeometry { position: 1, .. }));
    }

    #[rstest]
    fn empty_geometry_builds_empty_index(backend: SphereBackend) {
        let index = backend.build_index(&[], &Progress::new()).expect("build");
        assert_eq!(index.size(), 0);
        assert_eq!(backend.index_size(&index), None);
    }

    fn coordinate() -> impl Strategy<Value = Coordinate> {
        (-85.0..85.0_f64, -179.0..179.0_f64).prop_map(|(lat, lon)| Coordinate::new(lat, lon))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The chord cube never drops a point the exact chord test accepts.
        #[test]
        fn distance_matches_linear_scan(
            points in prop::collection::vec(coordinate(), 0..200),
            centre in coordinate(),
            distance in 0.0..5_000_000.0_f64,
        ) {
            let backend = SphereBackend::default();
            let index = backend.build_index(&points, &Progress::new()).expect("build");
            let point = SpherePoint::from(centre);
            let chord = chord_for_distance(distance);
            let limit = chord * chord;
            let expected = points
                .iter()
                .filter(|p| chord_squared(&unit_vector(**p), &point.vector) <= limit)
                .count();
            let query = DistanceQuery { point, distance };
            prop_assert_eq!(backend.distance_query(&index, &query), expected);
        }

        /// The Cartesian envelope never drops a point inside the rectangle.
        #[test]
        fn range_matches_linear_scan(
            points in prop::collection::vec(coordinate(), 0..200),
            a in coordinate(),
            b in coordinate(),
        ) {
            let backend = SphereBackend::default();
            let index = backend.build_index(&points, &Progress::new()).expect("build");
            let rect = LatLngRect::from_corners(a, b);
            let expected = points.iter().filter(|p| rect.contains(**p)).count();
            let query = RangeQuery { range: rect };
            prop_assert_eq!(backend.range_query(&index, &query), expected);
        }
    }
}
