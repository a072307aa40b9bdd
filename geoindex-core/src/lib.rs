//! Experiment pipeline for benchmarking spatial indexes.
//!
//! The crate decouples *what* is measured (an [`IndexBackend`] wrapping one
//! spatial index implementation) from *how* a benchmark run is staged,
//! instrumented, time-boxed and reported ([`ExperimentRunner`]).
//!
//! Responsibilities:
//! - Define the query and coordinate types shared by every backend.
//! - Drive one run through a fixed phase sequence and write its report.
//! - Provide the instrumentation used while measuring: the progress channel,
//!   the heap profile scope around the index build and the query time box.
//!
//! Invariants:
//! - Measured work (loading, building, querying) runs on the caller's thread.
//! - An index is only queried after its build has returned.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::fmt;

mod backend;
mod error;
mod heap;
mod progress;
mod report;
mod runner;
mod timebox;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use backend::IndexBackend;
pub use error::{BuildError, ConfigError, LoadError, ReportError, RunError};
pub use heap::{DisabledProfiler, HeapProfileScope, HeapProfiler, HeapSample};
#[cfg(feature = "jemalloc")]
pub use heap::JemallocProfiler;
pub use progress::{Progress, ProgressReporter, RENDER_INTERVAL, render_progress_line};
pub use report::{
    IndexFootprint, IndexSizeSource, QueryThroughput, RunReport, ReportWriter, TIMING_FIELDS,
};
pub use runner::{Experiment, ExperimentRunner, Phase, ProgressMode, RunRequest, RunnerSettings};
pub use timebox::{DEFAULT_QUERY_BUDGET, QueryOutcome, TimeBox};

/// A WGS84 position in degrees.
///
/// # Examples
///
/// ```
/// use geoindex_core::Coordinate;
///
/// let times_square = Coordinate::new(40.758, -73.9855);
/// let shifted = times_square.translated(Coordinate::new(1.0, 0.0));
/// assert!((shifted.lat - 41.758).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Coordinate {
    /// Construct a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Return this coordinate shifted by `offset` on both axes.
    #[must_use]
    pub fn translated(self, offset: Self) -> Self {
        Self {
            lat: self.lat + offset.lat,
            lon: self.lon + offset.lon,
        }
    }

    /// Whether both components are finite numbers.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Find every indexed geometry within `distance` of `point`.
///
/// `P` is the backend's native point representation. The unit of `distance`
/// is defined by the backend: working-CRS units for planar backends and
/// metres for spherical ones.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceQuery<P> {
    /// Query centre.
    pub point: P,
    /// Search radius.
    pub distance: f64,
}

/// Find every indexed geometry inside a rectangular region.
///
/// `R` is the backend's native region type, built from two opposite corners.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery<R> {
    /// Query region.
    pub range: R,
}

/// The two query workloads a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Radius queries around a point.
    Distance,
    /// Rectangle queries.
    Range,
}

impl QueryKind {
    /// Lower-case label used in report keys and log messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Distance => "distance",
            Self::Range => "range",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
