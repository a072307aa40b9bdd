//! Bulk-loaded R\*-tree backend for the geoindex benchmarks.
//!
//! Points are projected into a planar working CRS at load time and packed
//! into an [`rstar::RTree`] in one bulk load. Distance queries fetch the
//! candidates in the `2 * distance` square around the query point and keep
//! those within the exact Euclidean distance; range queries count the points
//! inside the rectangle, boundary included.
//!
//! The tree does not report its own footprint, so runs measure it through the
//! heap profile scope.

#![forbid(unsafe_code)]

use camino::Utf8Path;
use geo::{Coord, Rect};
use geoindex_core::{BuildError, DistanceQuery, IndexBackend, LoadError, Progress, RangeQuery};
use geoindex_data::PlanarLoader;
use log::debug;
use rstar::{AABB, RTree, RTreeObject};

/// Point stored in the tree, tagged with its position in the geometry file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedPoint {
    /// Position in the loaded geometry collection.
    pub position: usize,
    /// Projected location.
    pub location: Coord<f64>,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.x, self.location.y])
    }
}

/// [`IndexBackend`] over a bulk-loaded R\*-tree.
#[derive(Debug, Clone)]
pub struct RTreeBackend {
    loader: PlanarLoader,
}

impl RTreeBackend {
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

fn envelope_of(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

impl IndexBackend for RTreeBackend {
    type Geometry = Coord<f64>;
    type Point = Coord<f64>;
    type Region = Rect<f64>;
    type Index = RTree<IndexedPoint>;

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
    ) -> Result<RTree<IndexedPoint>, BuildError> {
        let total = geometry.len();
        progress.set(0, total);
        let mut entries = Vec::with_capacity(total);
        for (position, location) in geometry.iter().enumerate() {
            if !(location.x.is_finite() && location.y.is_finite()) {
                return Err(BuildError::InvalidGeometry {
                    position,
                    reason: format!("projected coordinate ({}, {}) is not finite", location.x, location.y),
                });
            }
            entries.push(IndexedPoint {
                position,
                location: *location,
            });
        }
        let tree = RTree::bulk_load(entries);
        progress.set(total, total);
        debug!("bulk loaded {} points", tree.size());
        Ok(tree)
    }

    fn distance_query(
        &self,
        index: &RTree<IndexedPoint>,
        query: &DistanceQuery<Coord<f64>>,
    ) -> usize {
        let Coord { x, y } = query.point;
        let d = query.distance;
        let square = AABB::from_corners([x - d, y - d], [x + d, y + d]);
        let limit = d * d;
        index
            .locate_in_envelope(&square)
            .filter(|entry| {
                let dx = entry.location.x - x;
                let dy = entry.location.y - y;
                dx * dx + dy * dy <= limit
            })
            .count()
    }

    fn range_query(&self, index: &RTree<IndexedPoint>, query: &RangeQuery<Rect<f64>>) -> usize {
        index.locate_in_envelope(&envelope_of(&query.range)).count()
    }
}
