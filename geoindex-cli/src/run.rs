//! Run command implementation for the geoindex CLI.

use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, ValueEnum};
use geoindex_core::{
    Coordinate, Experiment, ExperimentRunner, ProgressMode, RunReport, RunRequest, RunnerSettings,
    TimeBox,
};
use geoindex_data::{CoordinateEncoding, Crs, LoaderOptions, PlanarLoader, Projection};
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_BACKEND, ARG_CRS, ARG_DATASET, ARG_DISTANCE_QUERIES, ARG_ENCODING, ARG_GEOMETRY,
    ARG_PREFIX, ARG_RANGE_QUERIES, ARG_REPORT_DIR, ARG_TIME_BUDGET_SECS, ARG_TRANSLATE_LAT,
    ARG_TRANSLATE_LON, CliError, ENV_DATASET, ENV_DISTANCE_QUERIES, ENV_GEOMETRY,
    ENV_RANGE_QUERIES,
};

pub(crate) const DEFAULT_PREFIX: &str = "geoindex";
pub(crate) const DEFAULT_REPORT_DIR: &str = "reports";

/// Index implementations the CLI can benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum BackendKind {
    /// Bulk-loaded R*-tree over projected points.
    Rtree,
    /// Point-region quadtree over projected points.
    Quadtree,
    /// Unit-vector index on the sphere; distances in metres.
    Sphere,
}

impl BackendKind {
    pub(crate) const ALL: [Self; 3] = [Self::Rtree, Self::Quadtree, Self::Sphere];

    const fn label(self) -> &'static str {
        match self {
            Self::Rtree => "rtree",
            Self::Quadtree => "quadtree",
            Self::Sphere => "sphere",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// CLI arguments for the `run` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Load a geometry file, build each selected index over it and \
                 time the distance and range query workloads. One report \
                 record per backend is appended beneath the report directory. \
                 Options can come from CLI flags, configuration files, or \
                 environment variables.",
    about = "Benchmark spatial indexes over one dataset"
)]
#[ortho_config(prefix = "GEOINDEX")]
pub(crate) struct RunArgs {
    /// Run name, used in report file names.
    #[arg(long = ARG_DATASET, value_name = "name")]
    #[serde(default)]
    pub(crate) dataset: Option<String>,
    /// Binary file of (lat, lon) pairs.
    #[arg(long = ARG_GEOMETRY, value_name = "path")]
    #[serde(default)]
    pub(crate) geometry: Option<Utf8PathBuf>,
    /// Distance query file (`lat,lon,distance` lines). Repeatable.
    #[arg(long = ARG_DISTANCE_QUERIES, value_name = "path")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) distance_queries: Vec<Utf8PathBuf>,
    /// Range query file (`lat_a,lon_a,lat_b,lon_b` lines). Repeatable.
    #[arg(long = ARG_RANGE_QUERIES, value_name = "path")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) range_queries: Vec<Utf8PathBuf>,
    /// Backend to benchmark. Repeatable; every backend runs when omitted.
    #[arg(long = ARG_BACKEND, value_enum)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) backend: Vec<BackendKind>,
    /// Prefix of every runner name.
    #[arg(long = ARG_PREFIX, value_name = "name")]
    #[serde(default)]
    pub(crate) prefix: Option<String>,
    /// Working CRS for planar backends, e.g. `EPSG:3857`.
    #[arg(long = ARG_CRS, value_name = "EPSG:code")]
    #[serde(default)]
    pub(crate) crs: Option<String>,
    /// Float width of the geometry file: `f32` or `f64`.
    #[arg(long = ARG_ENCODING, value_name = "width")]
    #[serde(default)]
    pub(crate) encoding: Option<String>,
    /// Degrees added to every latitude.
    #[arg(long = ARG_TRANSLATE_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) translate_lat: Option<f64>,
    /// Degrees added to every longitude.
    #[arg(long = ARG_TRANSLATE_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) translate_lon: Option<f64>,
    /// Directory receiving the report files.
    #[arg(long = ARG_REPORT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) report_dir: Option<Utf8PathBuf>,
    /// Wall-clock budget for each query file, in seconds.
    #[arg(long = ARG_TIME_BUDGET_SECS, value_name = "seconds")]
    #[serde(default)]
    pub(crate) time_budget_secs: Option<u64>,
    /// Disable the progress display.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) quiet: bool,
}

impl RunArgs {
    pub(crate) fn into_config(self) -> Result<RunConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        RunConfig::try_from(merged)
    }
}

/// Resolved `run` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunConfig {
    pub(crate) dataset: String,
    pub(crate) geometry: Utf8PathBuf,
    pub(crate) distance_queries: Vec<Utf8PathBuf>,
    pub(crate) range_queries: Vec<Utf8PathBuf>,
    /// Backends in the order they run, without duplicates.
    pub(crate) backends: Vec<BackendKind>,
    pub(crate) prefix: String,
    /// Projection applied by the planar backends.
    pub(crate) projection: Projection,
    pub(crate) options: LoaderOptions,
    pub(crate) report_dir: Utf8PathBuf,
    pub(crate) time_budget: Duration,
    pub(crate) progress: ProgressMode,
}

impl RunConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        Self::require_existing(&self.geometry, ARG_GEOMETRY)?;
        for path in &self.distance_queries {
            Self::require_existing(path, ARG_DISTANCE_QUERIES)?;
        }
        for path in &self.range_queries {
            Self::require_existing(path, ARG_RANGE_QUERIES)?;
        }
        Ok(())
    }

    fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        match geoindex_fs::input_is_file(path) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::SourcePathNotFile {
                field,
                path: path.to_path_buf(),
            }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(CliError::MissingSourceFile {
                    field,
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(CliError::InspectSourcePath {
                field,
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Request shared by every runner.
    pub(crate) fn request(&self) -> RunRequest {
        RunRequest::new(self.dataset.clone(), self.geometry.clone())
            .with_distance_queries(self.distance_queries.iter().cloned())
            .with_range_queries(self.range_queries.iter().cloned())
    }

    fn settings(&self) -> RunnerSettings {
        let settings = RunnerSettings::new(self.report_dir.clone())
            .with_time_box(TimeBox::new(self.time_budget))
            .with_progress(self.progress);
        // The binary installs jemalloc as the global allocator.
        #[cfg(feature = "jemalloc")]
        let settings =
            settings.with_profiler(std::sync::Arc::new(geoindex_core::JemallocProfiler));
        settings
    }

    fn runner_name(&self, kind: BackendKind) -> String {
        format!("{}-{kind}", self.prefix)
    }
}

fn finite(field: &'static str, value: Option<f64>) -> Result<f64, CliError> {
    match value {
        None => Ok(0.0),
        Some(degrees) if degrees.is_finite() => Ok(degrees),
        Some(degrees) => Err(CliError::InvalidValue {
            field,
            value: degrees.to_string(),
            reason: "translation must be a finite number of degrees".to_owned(),
        }),
    }
}

impl TryFrom<RunArgs> for RunConfig {
    type Error = CliError;

    fn try_from(args: RunArgs) -> Result<Self, Self::Error> {
        let dataset = args.dataset.ok_or(CliError::MissingArgument {
            field: ARG_DATASET,
            env: ENV_DATASET,
        })?;
        let geometry = args.geometry.ok_or(CliError::MissingArgument {
            field: ARG_GEOMETRY,
            env: ENV_GEOMETRY,
        })?;
        if args.distance_queries.is_empty() {
            return Err(CliError::MissingArgument {
                field: ARG_DISTANCE_QUERIES,
                env: ENV_DISTANCE_QUERIES,
            });
        }
        if args.range_queries.is_empty() {
            return Err(CliError::MissingArgument {
                field: ARG_RANGE_QUERIES,
                env: ENV_RANGE_QUERIES,
            });
        }

        let mut backends = Vec::new();
        for kind in args.backend {
            if !backends.contains(&kind) {
                backends.push(kind);
            }
        }
        if backends.is_empty() {
            backends.extend(BackendKind::ALL);
        }

        let crs: Crs = args.crs.as_deref().unwrap_or("EPSG:3857").parse()?;
        let projection = Projection::new(Crs::WGS84, crs)?;

        let encoding = match args.encoding {
            None => CoordinateEncoding::default(),
            Some(value) => value
                .parse()
                .map_err(|reason| CliError::InvalidValue {
                    field: ARG_ENCODING,
                    value,
                    reason,
                })?,
        };
        let translation = Coordinate::new(
            finite(ARG_TRANSLATE_LAT, args.translate_lat)?,
            finite(ARG_TRANSLATE_LON, args.translate_lon)?,
        );

        let time_budget = match args.time_budget_secs {
            Some(0) => {
                return Err(CliError::InvalidValue {
                    field: ARG_TIME_BUDGET_SECS,
                    value: "0".to_owned(),
                    reason: "the query budget must be at least one second".to_owned(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => geoindex_core::DEFAULT_QUERY_BUDGET,
        };

        Ok(Self {
            dataset,
            geometry,
            distance_queries: args.distance_queries,
            range_queries: args.range_queries,
            backends,
            prefix: args.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_owned()),
            projection,
            options: LoaderOptions::new(encoding).with_translation(translation),
            report_dir: args
                .report_dir
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_REPORT_DIR)),
            time_budget,
            progress: if args.quiet {
                ProgressMode::Silent
            } else {
                ProgressMode::Terminal
            },
        })
    }
}

/// Construct one runner per selected backend.
pub(crate) fn build_experiments(config: &RunConfig) -> Result<Vec<Box<dyn Experiment>>, CliError> {
    config
        .backends
        .iter()
        .map(|kind| build_experiment(config, *kind))
        .collect()
}

fn build_experiment(config: &RunConfig, kind: BackendKind) -> Result<Box<dyn Experiment>, CliError> {
    let name = config.runner_name(kind);
    let settings = config.settings();
    let loader = PlanarLoader::new(config.options, config.projection.clone());
    match kind {
        #[cfg(feature = "backend-rtree")]
        BackendKind::Rtree => Ok(Box::new(ExperimentRunner::new(
            name,
            geoindex_backend_rtree::RTreeBackend::new(loader),
            settings,
        ))),
        #[cfg(feature = "backend-quadtree")]
        BackendKind::Quadtree => Ok(Box::new(ExperimentRunner::new(
            name,
            geoindex_backend_quadtree::QuadtreeBackend::new(loader),
            settings,
        ))),
        #[cfg(feature = "backend-sphere")]
        BackendKind::Sphere => Ok(Box::new(ExperimentRunner::new(
            name,
            geoindex_backend_sphere::SphereBackend::new(config.options),
            settings,
        ))),
        #[cfg_attr(
            all(
                feature = "backend-rtree",
                feature = "backend-quadtree",
                feature = "backend-sphere"
            ),
            expect(unreachable_patterns, reason = "every backend feature is enabled")
        )]
        other => Err(CliError::MissingFeature {
            feature: feature_for(other),
            action: other.label(),
        }),
    }
}

const fn feature_for(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Rtree => "backend-rtree",
        BackendKind::Quadtree => "backend-quadtree",
        BackendKind::Sphere => "backend-sphere",
    }
}

pub(crate) fn resolve_run_config(args: RunArgs) -> Result<RunConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

/// Run every selected backend over the configured dataset, in order.
///
/// Stops at the first failing run; reports of earlier runs are already on
/// disk by then.
pub(crate) fn run_config(config: &RunConfig) -> Result<Vec<RunReport>, CliError> {
    let experiments = build_experiments(config)?;
    let request = config.request();
    let mut reports = Vec::with_capacity(experiments.len());
    for experiment in experiments {
        let report = experiment.run(&request)?;
        info!(
            "{} finished {} in {:.3} ms",
            experiment.name(),
            report.run,
            report.build_duration.as_secs_f64() * 1000.0
        );
        reports.push(report);
    }
    Ok(reports)
}

pub(super) fn run_command(args: RunArgs) -> Result<(), CliError> {
    let config = resolve_run_config(args)?;
    run_config(&config).map(|_| ())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<RunConfig, CliError> {
    let merged = RunArgs::merge_from_layers(layers).map_err(CliError::from)?;
    RunConfig::try_from(merged)
}
