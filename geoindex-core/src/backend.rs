//! The capability contract every index backend implements.

use std::io;

use camino::Utf8Path;

use crate::{BuildError, DistanceQuery, LoadError, Progress, QueryOutcome, RangeQuery, TimeBox};

/// One spatial index implementation, as seen by the experiment runner.
///
/// A backend knows how to turn input files into its native geometry and
/// query representations, how to build its index and how to answer single
/// queries. Batch execution under the time box is shared by all backends via
/// the provided methods.
///
/// Distance queries follow the two-phase scheme of spatial indexes that only
/// answer region queries: fetch the candidates inside the square of side
/// `2 * distance` centred on the query point, then keep those within the
/// exact distance. Every backend applies the narrow phase, so the returned
/// counts are exact.
///
/// # Examples
///
/// ```rust
/// use camino::Utf8Path;
/// use geoindex_core::{
///     BuildError, Coordinate, DistanceQuery, IndexBackend, LoadError, Progress, RangeQuery,
/// };
///
/// /// Linear scan over points kept in memory.
/// struct Scan(Vec<Coordinate>);
///
/// impl IndexBackend for Scan {
///     type Geometry = Coordinate;
///     type Point = Coordinate;
///     type Region = (Coordinate, Coordinate);
///     type Index = Vec<Coordinate>;
///
///     fn load_geometry(&self, _: &Utf8Path, _: &Progress) -> Result<Vec<Coordinate>, LoadError> {
///         Ok(self.0.clone())
///     }
///     fn load_distance_queries(
///         &self,
///         _: &Utf8Path,
///         _: &Progress,
///     ) -> Result<Vec<DistanceQuery<Coordinate>>, LoadError> {
///         Ok(Vec::new())
///     }
///     fn load_range_queries(
///         &self,
///         _: &Utf8Path,
///         _: &Progress,
///     ) -> Result<Vec<RangeQuery<(Coordinate, Coordinate)>>, LoadError> {
///         Ok(Vec::new())
///     }
///     fn build_index(&self, geometry: &[Coordinate], _: &Progress) -> Result<Self::Index, BuildError> {
///         Ok(geometry.to_vec())
///     }
///     fn distance_query(&self, index: &Self::Index, query: &DistanceQuery<Coordinate>) -> usize {
///         index
///             .iter()
///             .filter(|c| (c.lat - query.point.lat).hypot(c.lon - query.point.lon) <= query.distance)
///             .count()
///     }
///     fn range_query(&self, index: &Self::Index, query: &RangeQuery<Self::Region>) -> usize {
///         let (a, b) = query.range;
///         index
///             .iter()
///             .filter(|c| {
///                 (a.lat.min(b.lat)..=a.lat.max(b.lat)).contains(&c.lat)
///                     && (a.lon.min(b.lon)..=a.lon.max(b.lon)).contains(&c.lon)
///             })
///             .count()
///     }
/// }
///
/// let backend = Scan(vec![Coordinate::new(0.0, 0.0), Coordinate::new(2.0, 2.0)]);
/// let index = backend.build_index(&backend.0, &Progress::new()).expect("build");
/// let query = DistanceQuery { point: Coordinate::new(0.0, 0.0), distance: 1.0 };
/// assert_eq!(backend.distance_query(&index, &query), 1);
/// ```
pub trait IndexBackend {
    /// Native geometry stored in the index.
    type Geometry;
    /// Native point used as the centre of distance queries.
    type Point;
    /// Native rectangular region used by range queries.
    type Region;
    /// The built, query-ready index.
    type Index;

    /// Read the geometry file at `path`, applying any coordinate transform
    /// the backend requires.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the file is unreadable.
    fn load_geometry(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<Self::Geometry>, LoadError>;

    /// Parse a distance query file into backend queries.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the file is unreadable or malformed.
    fn load_distance_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<DistanceQuery<Self::Point>>, LoadError>;

    /// Parse a range query file into backend queries.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the file is unreadable or malformed.
    fn load_range_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<RangeQuery<Self::Region>>, LoadError>;

    /// Insert every geometry into a fresh index and finalise it.
    ///
    /// The returned index is immediately safe to query. The runner keeps
    /// `geometry` alive for as long as the index exists.
    ///
    /// # Errors
    /// Returns [`BuildError`] when the backend rejects a geometry.
    fn build_index(
        &self,
        geometry: &[Self::Geometry],
        progress: &Progress,
    ) -> Result<Self::Index, BuildError>;

    /// Count the geometries within `query.distance` of `query.point`.
    fn distance_query(&self, index: &Self::Index, query: &DistanceQuery<Self::Point>) -> usize;

    /// Count the geometries inside `query.range`, boundary included.
    fn range_query(&self, index: &Self::Index, query: &RangeQuery<Self::Region>) -> usize;

    /// Memory held by the index in bytes, when the backend can report it.
    fn index_size(&self, _index: &Self::Index) -> Option<u64> {
        None
    }

    /// Check that a query file can be loaded later in the run.
    ///
    /// # Errors
    /// Returns [`LoadError::Open`] when `path` is missing or not a file.
    fn probe_source(&self, path: &Utf8Path) -> Result<(), LoadError> {
        match geoindex_fs::input_is_file(path) {
            Ok(true) => Ok(()),
            Ok(false) => Err(LoadError::Open {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            }),
            Err(source) => Err(LoadError::Open {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Run distance queries in order under `time_box`.
    fn execute_distance_queries(
        &self,
        index: &Self::Index,
        queries: &[DistanceQuery<Self::Point>],
        progress: &Progress,
        time_box: &TimeBox,
    ) -> QueryOutcome {
        time_box.run(queries, progress, |query| self.distance_query(index, query))
    }

    /// Run range queries in order under `time_box`.
    fn execute_range_queries(
        &self,
        index: &Self::Index,
        queries: &[RangeQuery<Self::Region>],
        progress: &Progress,
        time_box: &TimeBox,
    ) -> QueryOutcome {
        time_box.run(queries, progress, |query| self.range_query(index, query))
    }
}
