//! Test-only, in-memory `IndexBackend` used by unit and behaviour tests.
//!
//! Inputs are registered against paths instead of living on disk, and every
//! call the runner makes is recorded so tests can assert on phase ordering.

use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::{BuildError, Coordinate, DistanceQuery, IndexBackend, LoadError, Progress, RangeQuery};

/// Rectangle given by two opposite corners.
pub type CornerPair = (Coordinate, Coordinate);

/// A backend operation observed by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `load_geometry` on the given path.
    LoadGeometry(Utf8PathBuf),
    /// `probe_source` on the given path.
    ProbeSource(Utf8PathBuf),
    /// `build_index` over this many geometries.
    BuildIndex(usize),
    /// `load_distance_queries` on the given path.
    LoadDistanceQueries(Utf8PathBuf),
    /// `load_range_queries` on the given path.
    LoadRangeQueries(Utf8PathBuf),
    /// One distance query.
    DistanceQuery,
    /// One range query.
    RangeQuery,
}

/// Index produced by [`MemoryBackend`]: the points in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryIndex {
    points: Vec<Coordinate>,
}

impl MemoryIndex {
    /// Indexed points.
    #[must_use]
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }
}

/// Linear-scan backend over planar longitude/latitude degrees.
///
/// Unknown paths fail to load with [`io::ErrorKind::NotFound`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    geometry: HashMap<Utf8PathBuf, Vec<Coordinate>>,
    distance: HashMap<Utf8PathBuf, Vec<DistanceQuery<Coordinate>>>,
    range: HashMap<Utf8PathBuf, Vec<RangeQuery<CornerPair>>>,
    query_delay: Option<Duration>,
    self_reported_size: Option<u64>,
    calls: Mutex<Vec<BackendCall>>,
}

impl MemoryBackend {
    /// Create a backend with no registered inputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a geometry file.
    #[must_use]
    pub fn with_geometry(
        mut self,
        path: impl Into<Utf8PathBuf>,
        points: impl IntoIterator<Item = Coordinate>,
    ) -> Self {
        self.geometry.insert(path.into(), points.into_iter().collect());
        self
    }

    /// Register a distance query file.
    #[must_use]
    pub fn with_distance_queries(
        mut self,
        path: impl Into<Utf8PathBuf>,
        queries: impl IntoIterator<Item = DistanceQuery<Coordinate>>,
    ) -> Self {
        self.distance
            .insert(path.into(), queries.into_iter().collect());
        self
    }

    /// Register a range query file.
    #[must_use]
    pub fn with_range_queries(
        mut self,
        path: impl Into<Utf8PathBuf>,
        queries: impl IntoIterator<Item = RangeQuery<CornerPair>>,
    ) -> Self {
        self.range.insert(path.into(), queries.into_iter().collect());
        self
    }

    /// Sleep for `delay` inside every query.
    #[must_use]
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    /// Report `bytes` from [`IndexBackend::index_size`].
    #[must_use]
    pub fn with_self_reported_size(mut self, bytes: u64) -> Self {
        self.self_reported_size = Some(bytes);
        self
    }

    /// Calls recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: BackendCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn pause(&self) {
        if let Some(delay) = self.query_delay {
            thread::sleep(delay);
        }
    }
}

fn lookup<'a, T>(
    inputs: &'a HashMap<Utf8PathBuf, Vec<T>>,
    path: &Utf8Path,
) -> Result<&'a [T], LoadError> {
    inputs
        .get(path)
        .map(Vec::as_slice)
        .ok_or_else(|| LoadError::Open {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "not registered"),
        })
}

/// Whether `point` lies inside the rectangle spanned by `corners`.
#[must_use]
pub fn rect_contains(corners: CornerPair, point: Coordinate) -> bool {
    let (a, b) = corners;
    (a.lat.min(b.lat)..=a.lat.max(b.lat)).contains(&point.lat)
        && (a.lon.min(b.lon)..=a.lon.max(b.lon)).contains(&point.lon)
}

/// Planar distance between two coordinates in degrees.
#[must_use]
pub fn planar_distance(a: Coordinate, b: Coordinate) -> f64 {
    (a.lat - b.lat).hypot(a.lon - b.lon)
}

impl IndexBackend for MemoryBackend {
    type Geometry = Coordinate;
    type Point = Coordinate;
    type Region = CornerPair;
    type Index = MemoryIndex;

    fn load_geometry(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<Coordinate>, LoadError> {
        self.record(BackendCall::LoadGeometry(path.to_path_buf()));
        let points = lookup(&self.geometry, path)?.to_vec();
        progress.set(points.len(), points.len());
        Ok(points)
    }

    fn load_distance_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<DistanceQuery<Coordinate>>, LoadError> {
        self.record(BackendCall::LoadDistanceQueries(path.to_path_buf()));
        let queries = lookup(&self.distance, path)?.to_vec();
        progress.set(queries.len(), queries.len());
        Ok(queries)
    }

    fn load_range_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<RangeQuery<CornerPair>>, LoadError> {
        self.record(BackendCall::LoadRangeQueries(path.to_path_buf()));
        let queries = lookup(&self.range, path)?.to_vec();
        progress.set(queries.len(), queries.len());
        Ok(queries)
    }

    fn build_index(
        &self,
        geometry: &[Coordinate],
        progress: &Progress,
    ) -> Result<MemoryIndex, BuildError> {
        self.record(BackendCall::BuildIndex(geometry.len()));
        if let Some(position) = geometry.iter().position(|point| !point.is_finite()) {
            return Err(BuildError::InvalidGeometry {
                position,
                reason: "coordinate is not finite".to_owned(),
            });
        }
        progress.set(geometry.len(), geometry.len());
        Ok(MemoryIndex {
            points: geometry.to_vec(),
        })
    }

    fn distance_query(&self, index: &MemoryIndex, query: &DistanceQuery<Coordinate>) -> usize {
        self.record(BackendCall::DistanceQuery);
        self.pause();
        index
            .points
            .iter()
            .filter(|point| planar_distance(**point, query.point) <= query.distance)
            .count()
    }

    fn range_query(&self, index: &MemoryIndex, query: &RangeQuery<CornerPair>) -> usize {
        self.record(BackendCall::RangeQuery);
        self.pause();
        index
            .points
            .iter()
            .filter(|point| rect_contains(query.range, **point))
            .count()
    }

    fn index_size(&self, _index: &MemoryIndex) -> Option<u64> {
        self.self_reported_size
    }

    fn probe_source(&self, path: &Utf8Path) -> Result<(), LoadError> {
        self.record(BackendCall::ProbeSource(path.to_path_buf()));
        if self.distance.contains_key(path) || self.range.contains_key(path) {
            Ok(())
        } else {
            lookup(&self.geometry, path).map(|_| ())
        }
    }
}
