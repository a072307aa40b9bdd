//! Point-region quadtree backend for the geoindex benchmarks.
//!
//! The tree's root covers the bounding box of the loaded geometry, so every
//! input point is insertable. Leaves split into quadrants past
//! [`NODE_CAPACITY`] points. The finished tree reports its own footprint,
//! which the runner prefers over a heap profile.

#![forbid(unsafe_code)]

mod tree;

pub use tree::{Entry, MAX_DEPTH, NODE_CAPACITY, Quadtree, QuadtreeBuilder};

use camino::Utf8Path;
use geo::{Coord, Rect};
use geoindex_core::{BuildError, DistanceQuery, IndexBackend, LoadError, Progress, RangeQuery};
use geoindex_data::PlanarLoader;
use log::debug;

/// [`IndexBackend`] over a [`Quadtree`].
#[derive(Debug, Clone)]
pub struct QuadtreeBackend {
    loader: PlanarLoader,
}

impl QuadtreeBackend {
    /// Create a backend loading inputs through `loader`.
    #[must_use]
    pub const fn new(loader: PlanarLoader) -> Self {
        Self { loader }
    }

    /// Input loader.
    #[must_use]
    pub const fn loader(&self) -> &PlanarLoader {
        &self.loader
    }
}

/// Bounding box of the finite points, or the unit square when there are
/// none.
fn root_bounds(geometry: &[Coord<f64>]) -> Rect<f64> {
    let mut finite = geometry
        .iter()
        .filter(|point| point.x.is_finite() && point.y.is_finite());
    let Some(first) = finite.next() else {
        return Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 });
    };
    let (min, max) = finite.fold((*first, *first), |(min, max), point| {
        (
            Coord {
                x: min.x.min(point.x),
                y: min.y.min(point.y),
            },
            Coord {
                x: max.x.max(point.x),
                y: max.y.max(point.y),
            },
        )
    });
    Rect::new(min, max)
}

impl IndexBackend for QuadtreeBackend {
    type Geometry = Coord<f64>;
    type Point = Coord<f64>;
    type Region = Rect<f64>;
    type Index = Quadtree;

    fn load_geometry(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<Coord<f64>>, LoadError> {
        self.loader.load_points(path, progress)
    }

    fn load_distance_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<DistanceQuery<Coord<f64>>>, LoadError> {
        self.loader.load_distance_queries(path, progress)
    }

    fn load_range_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<RangeQuery<Rect<f64>>>, LoadError> {
        self.loader.load_range_queries(path, progress)
    }

    fn build_index(
        &self,
        geometry: &[Coord<f64>],
        progress: &Progress,
    ) -> Result<Quadtree, BuildError> {
        let total = geometry.len();
        progress.set(0, total);
        let mut builder = QuadtreeBuilder::new(root_bounds(geometry));
        for (position, location) in geometry.iter().enumerate() {
            builder.insert(position, *location)?;
            if position % 4096 == 0 {
                progress.set(position, total);
            }
        }
        let tree = builder.finish();
        progress.set(total, total);
        debug!(
            "quadtree holds {} points in {} nodes, depth {}",
            tree.len(),
            tree.node_count(),
            tree.depth()
        );
        Ok(tree)
    }

    fn distance_query(&self, index: &Quadtree, query: &DistanceQuery<Coord<f64>>) -> usize {
        let Coord { x, y } = query.point;
        let d = query.distance;
        let square = Rect::new(Coord { x: x - d, y: y - d }, Coord { x: x + d, y: y + d });
        let limit = d * d;
        let mut count = 0;
        index.for_each_in(&square, |entry| {
            let dx = entry.location.x - x;
            let dy = entry.location.y - y;
            if dx * dx + dy * dy <= limit {
                count += 1;
            }
        });
        count
    }

    fn range_query(&self, index: &Quadtree, query: &RangeQuery<Rect<f64>>) -> usize {
        index.count_in(&query.range)
    }

    fn index_size(&self, index: &Quadtree) -> Option<u64> {
        u64::try_from(index.size_bytes()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoindex_data::{LoaderOptions, Projection};
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    fn identity_backend() -> QuadtreeBackend {
        QuadtreeBackend::new(PlanarLoader::new(
            LoaderOptions::default(),
            Projection::identity(),
        ))
    }

    #[fixture]
    fn backend() -> QuadtreeBackend {
        identity_backend()
    }

    fn diagonal() -> Vec<Coord<f64>> {
        vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 2.0, y: 2.0 },
        ]
    }

    #[rstest]
    #[case(1.5, 2)]
    #[case(1.0, 1)]
    #[case(3.0, 3)]
    #[case(0.0, 1)]
    fn distance_counts_exact_matches(
        backend: QuadtreeBackend,
        #[case] distance: f64,
        #[case] expected: usize,
    ) {
        let index = backend
            .build_index(&diagonal(), &Progress::new())
            .expect("build");
        let query = DistanceQuery {
            point: Coord { x: 0.0, y: 0.0 },
            distance,
        };
        assert_eq!(backend.distance_query(&index, &query), expected);
    }

    #[rstest]
    fn range_includes_boundary(backend: QuadtreeBackend) {
        let index = backend
            .build_index(&diagonal(), &Progress::new())
            .expect("build");
        let query = RangeQuery {
            range: Rect::new(Coord { x: 1.0, y: 1.0 }, Coord { x: 0.0, y: 0.0 }),
        };
        assert_eq!(backend.range_query(&index, &query), 2);
    }

    #[rstest]
    fn queries_outside_root_match_nothing(backend: QuadtreeBackend) {
        let index = backend
            .build_index(&diagonal(), &Progress::new())
            .expect("build");
        let query = RangeQuery {
            range: Rect::new(Coord { x: 10.0, y: 10.0 }, Coord { x: 11.0, y: 11.0 }),
        };
        assert_eq!(backend.range_query(&index, &query), 0);
    }

    #[rstest]
    fn empty_geometry_builds_empty_tree(backend: QuadtreeBackend) {
        let index = backend.build_index(&[], &Progress::new()).expect("build");
        assert!(index.is_empty());
        let query = DistanceQuery {
            point: Coord { x: 0.5, y: 0.5 },
            distance: 10.0,
        };
        assert_eq!(backend.distance_query(&index, &query), 0);
    }

    #[rstest]
    fn non_finite_geometry_is_rejected(backend: QuadtreeBackend) {
        let geometry = [Coord { x: 0.0, y: 0.0 }, Coord { x: f64::NAN, y: 1.0 }];
        let err = backend
            .build_index(&geometry, &Progress::new())
            .expect_err("NaN rejected");
        assert!(matches!(err, BuildError::InvalidGeometry { position: 1, .. }));
    }

    #[rstest]
    fn reports_its_own_size(backend: QuadtreeBackend) {
        let index = backend
            .build_index(&diagonal(), &Progress::new())
            .expect("build");
        let size = backend.index_size(&index).expect("self-reported");
        assert!(size > 0);
    }

    fn scan_range(points: &[Coord<f64>], rect: &Rect<f64>) -> usize {
        points
            .iter()
            .filter(|p| {
                p.x >= rect.min().x && p.x <= rect.max().x && p.y >= rect.min().y && p.y <= rect.max().y
            })
            .count()
    }

    fn scan_distance(points: &[Coord<f64>], centre: Coord<f64>, d: f64) -> usize {
        points
            .iter()
            .filter(|p| {
                let dx = p.x - centre.x;
                let dy = p.y - centre.y;
                dx * dx + dy * dy <= d * d
            })
            .count()
    }

    fn coord() -> impl Strategy<Value = Coord<f64>> {
        (-100.0..100.0_f64, -100.0..100.0_f64).prop_map(|(x, y)| Coord { x, y })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Range counts agree with a linear scan, whatever the split pattern.
        #[test]
        fn range_matches_linear_scan(
            points in prop::collection::vec(coord(), 0..300),
            a in coord(),
            b in coord(),
        ) {
            let backend = identity_backend();
            let index = backend.build_index(&points, &Progress::new()).expect("build");
            let rect = Rect::new(a, b);
            let query = RangeQuery { range: rect };
            prop_assert_eq!(backend.range_query(&index, &query), scan_range(&points, &rect));
        }

        /// Distance counts agree with a linear scan.
        #[test]
        fn distance_matches_linear_scan(
            points in prop::collection::vec(coord(), 0..300),
            centre in coord(),
            distance in 0.0..80.0_f64,
        ) {
            let backend = identity_backend();
            let index = backend.build_index(&points, &Progress::new()).expect("build");
            let query = DistanceQuery { point: centre, distance };
            prop_assert_eq!(
                backend.distance_query(&index, &query),
                scan_distance(&points, centre, distance)
            );
        }
    }
}
