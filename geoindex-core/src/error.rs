//! Error types raised while loading inputs, building indexes and running
//! experiments.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::{Phase, QueryKind};

/// An input file could not be read or parsed.
///
/// Loads are all-or-nothing: a partially read file is never returned.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be opened or inspected.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Requested input path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Reading the opened file failed.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Input path being read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A record did not match the expected format.
    #[error("{path}:{line}: {reason}")]
    Malformed {
        /// Input path containing the record.
        path: Utf8PathBuf,
        /// One-based line number of the offending record.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
}

impl LoadError {
    /// Path of the input that failed to load.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Open { path, .. } | Self::Read { path, .. } | Self::Malformed { path, .. } => {
                path
            }
        }
    }
}

/// A backend refused to build its index.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    /// A geometry could not be inserted.
    #[error("geometry at position {position} is invalid: {reason}")]
    InvalidGeometry {
        /// Position of the geometry in the loaded collection.
        position: usize,
        /// Description of the problem.
        reason: String,
    },
}

/// Configuration was inconsistent or unsupported.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A CRS identifier could not be parsed.
    #[error("invalid CRS identifier {value:?}; expected EPSG:<code>")]
    InvalidCrs {
        /// Identifier as supplied.
        value: String,
    },
    /// The CRS parsed but has no transform implementation.
    #[error("CRS {crs} is not supported")]
    UnsupportedCrs {
        /// Normalised identifier.
        crs: String,
    },
    /// No transform exists between the two reference systems.
    #[error("cannot transform coordinates from {source_crs} to {target_crs}")]
    UnsupportedTransform {
        /// Source reference system.
        source_crs: String,
        /// Target reference system.
        target_crs: String,
    },
    /// A run was requested without any query files of one kind.
    #[error("a run requires at least one {kind} query file")]
    MissingQueryFiles {
        /// Workload kind that has no files.
        kind: QueryKind,
    },
    /// A process-wide heap profile scope is already open.
    #[error("heap profile scope {requested:?} cannot start while {active:?} is active")]
    ProfilerBusy {
        /// Scope currently holding the profiler.
        active: String,
        /// Scope that attempted to start.
        requested: String,
    },
}

/// Writing a run report failed.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report directory could not be created.
    #[error("failed to create report directory {path}: {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Appending the record failed.
    #[error("failed to write report {path}: {source}")]
    Write {
        /// Report file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// A benchmark run aborted. No report is written for a failed run.
#[derive(Debug, Error)]
pub enum RunError {
    /// An input file failed to load.
    #[error("run {run} failed in {phase} loading {path}: {source}")]
    Load {
        /// Full run name.
        run: String,
        /// Phase that was loading the file.
        phase: Phase,
        /// File that failed.
        path: Utf8PathBuf,
        /// Loader error.
        #[source]
        source: LoadError,
    },
    /// The backend rejected the geometry during the build.
    #[error("run {run} failed in {phase} building from {path}: {source}", phase = Phase::BuildIndex)]
    Build {
        /// Full run name.
        run: String,
        /// Geometry file the index was built from.
        path: Utf8PathBuf,
        /// Backend error.
        #[source]
        source: BuildError,
    },
    /// The run configuration was invalid.
    #[error("run {run} is misconfigured: {source}")]
    Config {
        /// Full run name.
        run: String,
        /// Configuration error.
        #[source]
        source: ConfigError,
    },
    /// The report could not be written.
    #[error("run {run} failed in {phase}: {source}", phase = Phase::WriteReport)]
    Report {
        /// Full run name.
        run: String,
        /// Writer error.
        #[source]
        source: ReportError,
    },
}

impl RunError {
    pub(crate) fn load(run: &str, phase: Phase, source: LoadError) -> Self {
        Self::Load {
            run: run.to_owned(),
            phase,
            path: source.path().to_path_buf(),
            source,
        }
    }

    /// Phase in which the run failed.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Load { phase, .. } => Some(*phase),
            Self::Build { .. } => Some(Phase::BuildIndex),
            Self::Report { .. } => Some(Phase::WriteReport),
            Self::Config { .. } => None,
        }
    }
}
