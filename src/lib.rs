//! Facade crate for the geoindex spatial index benchmarks.
//!
//! This crate re-exports the experiment pipeline and input loaders and
//! exposes the index backends behind feature flags.

#![forbid(unsafe_code)]

pub use geoindex_core::{
    BuildError, ConfigError, Coordinate, DistanceQuery, Experiment, ExperimentRunner,
    HeapProfiler, IndexBackend, IndexFootprint, IndexSizeSource, LoadError, Phase, Progress,
    ProgressMode, QueryKind, QueryOutcome, QueryThroughput, RangeQuery, ReportError,
    ReportWriter, RunError, RunReport, RunRequest, RunnerSettings, TimeBox,
};

#[cfg(feature = "jemalloc")]
pub use geoindex_core::JemallocProfiler;

pub use geoindex_data::{CoordinateEncoding, Crs, LoaderOptions, PlanarLoader, Projection};

#[cfg(feature = "backend-rtree")]
pub use geoindex_backend_rtree::RTreeBackend;

#[cfg(feature = "backend-quadtree")]
pub use geoindex_backend_quadtree::QuadtreeBackend;

#[cfg(feature = "backend-sphere")]
pub use geoindex_backend_sphere::{LatLngRect, SphereBackend, SpherePoint};
