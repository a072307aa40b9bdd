//! The experiment runner: one benchmark run staged through fixed phases.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};

use crate::{
    ConfigError, DEFAULT_QUERY_BUDGET, DisabledProfiler, HeapProfileScope, HeapProfiler,
    IndexBackend, IndexFootprint, IndexSizeSource, Progress, ProgressReporter, QueryKind,
    QueryOutcome, QueryThroughput, ReportWriter, RunError, RunReport, TimeBox,
};


/// Stage of a benchmark run.
///
/// Phases execute in declaration order; none is skipped or re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Geometry file parsed into backend geometry.
    LoadGeometry,
    /// Query inputs validated ahead of the build.
    LoadQueries,
    /// Index built inside the heap profile scope.
    BuildIndex,
    /// Distance workloads executed file by file.
    ExecuteDistanceQueries,
    /// Range workloads executed file by file.
    ExecuteRangeQueries,
    /// Report record appended.
    WriteReport,
}

impl Phase {
    /// Every phase in execution order.
    pub const ALL: [Self; 6] = [
        Self::LoadGeometry,
        Self::LoadQueries,
        Self::BuildIndex,
        Self::ExecuteDistanceQueries,
        Self::ExecuteRangeQueries,
        Self::WriteReport,
    ];

    /// Phase following this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::LoadGeometry => Some(Self::LoadQueries),
            Self::LoadQueries => Some(Self::BuildIndex),
            Self::BuildIndex => Some(Self::ExecuteDistanceQueries),
            Self::ExecuteDistanceQueries => Some(Self::ExecuteRangeQueries),
            Self::ExecuteRangeQueries => Some(Self::WriteReport),
            Self::WriteReport => None,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::LoadGeometry => "LOAD_GEOMETRY",
            Self::LoadQueries => "LOAD_QUERIES",
            Self::BuildIndex => "BUILD_INDEX",
            Self::ExecuteDistanceQueries => "EXECUTE_DISTANCE_QUERIES",
            Self::ExecuteRangeQueries => "EXECUTE_RANGE_QUERIES",
            Self::WriteReport => "WRITE_REPORT",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Logs phase transitions and checks their order in debug builds.
#[derive(Debug)]
struct PhaseTracker<'a> {
    run: &'a str,
    current: Option<Phase>,
}

impl<'a> PhaseTracker<'a> {
    const fn new(run: &'a str) -> Self {
        Self { run, current: None }
    }

    fn enter(&mut self, phase: Phase) {
        let expected = self.current.map_or(Some(Phase::LoadGeometry), Phase::next);
        debug_assert_eq!(expected, Some(phase), "phase entered out of order");
        info!("{} {phase}", self.run);
        self.current = Some(phase);
    }
}

/// Where progress is rendered while a phase runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressMode {
    /// Render a progress line on standard error.
    #[default]
    Terminal,
    /// Publish progress samples without rendering them.
    Silent,
}

/// Settings shared by every run of one runner.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    time_box: TimeBox,
    report_dir: Utf8PathBuf,
    progress: ProgressMode,
    profiler: Arc<dyn HeapProfiler>,
}

impl RunnerSettings {
    /// Settings writing reports beneath `report_dir`, with the default query
    /// budget and terminal progress.
    ///
    /// No heap profiler is attached: a backend that does not report its own
    /// size gets an unavailable footprint until
    /// [`with_profiler`](Self::with_profiler) supplies one.
    #[must_use]
    pub fn new(report_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            time_box: TimeBox::new(DEFAULT_QUERY_BUDGET),
            report_dir: report_dir.into(),
            progress: ProgressMode::Terminal,
            profiler: Arc::new(DisabledProfiler),
        }
    }

    /// Replace the query time box.
    #[must_use]
    pub fn with_time_box(mut self, time_box: TimeBox) -> Self {
        self.time_box = time_box;
        self
    }

    /// Replace the progress mode.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressMode) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the heap profiler.
    #[must_use]
    pub fn with_profiler(mut self, profiler: Arc<dyn HeapProfiler>) -> Self {
        self.profiler = profiler;
        self
    }

    /// Query time box.
    #[must_use]
    pub const fn time_box(&self) -> TimeBox {
        self.time_box
    }

    /// Report directory.
    #[must_use]
    pub fn report_dir(&self) -> &Utf8Path {
        &self.report_dir
    }
}

/// Inputs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Run (dataset) name.
    pub dataset: String,
    /// Geometry file.
    pub geometry: Utf8PathBuf,
    /// Distance query files, executed in order.
    pub distance_queries: Vec<Utf8PathBuf>,
    /// Range query files, executed in order.
    pub range_queries: Vec<Utf8PathBuf>,
}

impl RunRequest {
    /// Request a run named `dataset` over `geometry` with no query files.
    #[must_use]
    pub fn new(dataset: impl Into<String>, geometry: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
            geometry: geometry.into(),
            distance_queries: Vec::new(),
            range_queries: Vec::new(),
        }
    }

    /// Append distance query files.
    #[must_use]
    pub fn with_distance_queries<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.distance_queries.extend(files.into_iter().map(Into::into));
        self
    }

    /// Append range query files.
    #[must_use]
    pub fn with_range_queries<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.range_queries.extend(files.into_iter().map(Into::into));
        self
    }
}

/// Whether a phase ran to completion, deciding if its progress line closes
/// at 100 %.
trait PhaseOutcome {
    fn completed(&self) -> bool;
}

impl<T, E> PhaseOutcome for Result<T, E> {
    fn completed(&self) -> bool {
        self.is_ok()
    }
}

impl PhaseOutcome for QueryOutcome {
    fn completed(&self) -> bool {
        !self.time_boxed
    }
}

/// A runner whose backend type has been erased.
///
/// Lets runners over different backends share one collection, for example
/// `Vec<Box<dyn Experiment>>`.
pub trait Experiment {
    /// Runner name, used as the first half of every run name.
    fn name(&self) -> &str;

    /// Execute one run and append its report.
    ///
    /// # Errors
    /// Returns [`RunError`] naming the run and the failing phase. No report is
    /// written for a failed run.
    fn run(&self, request: &RunRequest) -> Result<RunReport, RunError>;
}

/// Drives one backend through the benchmark phases.
#[derive(Debug)]
pub struct ExperimentRunner<B> {
    name: String,
    backend: B,
    settings: RunnerSettings,
    writer: ReportWriter,
}

impl<B: IndexBackend> ExperimentRunner<B> {
    /// Create a runner called `name` around `backend`.
    #[must_use]
    pub fn new(name: impl Into<String>, backend: B, settings: RunnerSettings) -> Self {
        let writer = ReportWriter::new(settings.report_dir.clone());
        Self {
            name: name.into(),
            backend,
            settings,
            writer,
        }
    }

    /// Wrapped backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Full name of the run for `dataset`: `<runner>_<dataset>`.
    #[must_use]
    pub fn run_name(&self, dataset: &str) -> String {
        format!("{}_{dataset}", self.name)
    }

    fn with_progress<T: PhaseOutcome>(&self, work: impl FnOnce(&Progress) -> T) -> T {
        match self.settings.progress {
            ProgressMode::Silent => work(&Progress::new()),
            ProgressMode::Terminal => {
                let reporter = ProgressReporter::spawn(io::stderr());
                let result = work(reporter.progress());
                if result.completed() {
                    reporter.finish();
                }
                result
            }
        }
    }

    fn check_queries(&self, run: &str, request: &RunRequest) -> Result<(), RunError> {
        for (kind, files) in [
            (QueryKind::Distance, &request.distance_queries),
            (QueryKind::Range, &request.range_queries),
        ] {
            if files.is_empty() {
                return Err(RunError::Config {
                    run: run.to_owned(),
                    source: ConfigError::MissingQueryFiles { kind },
                });
            }
            for file in files {
                self.backend
                    .probe_source(file)
                    .map_err(|source| RunError::load(run, Phase::LoadQueries, source))?;
            }
        }
        Ok(())
    }

    fn footprint(&self, index: &B::Index, retained: Option<u64>) -> Option<IndexFootprint> {
        self.backend
            .index_size(index)
            .map(|bytes| IndexFootprint {
                bytes,
                source: IndexSizeSource::SelfReported,
            })
            .or_else(|| {
                retained.map(|bytes| IndexFootprint {
                    bytes,
                    source: IndexSizeSource::HeapProfile,
                })
            })
    }
}

impl<B: IndexBackend> Experiment for ExperimentRunner<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, request: &RunRequest) -> Result<RunReport, RunError> {
        let run = self.run_name(&request.dataset);
        let mut phases = PhaseTracker::new(&run);
        info!("==== {run} ====");

        phases.enter(Phase::LoadGeometry);
        let geometry = self
            .with_progress(|progress| self.backend.load_geometry(&request.geometry, progress))
            .map_err(|source| RunError::load(&run, Phase::LoadGeometry, source))?;
        info!("{run} loaded {} geometries", geometry.len());

        phases.enter(Phase::LoadQueries);
        self.check_queries(&run, request)?;

        phases.enter(Phase::BuildIndex);
        let scope = HeapProfileScope::start(self.settings.profiler.as_ref(), &run).map_err(
            |source| RunError::Config {
                run: run.clone(),
                source,
            },
        )?;
        let started = Instant::now();
        let built = self.with_progress(|progress| self.backend.build_index(&geometry, progress));
        let build_duration = started.elapsed();
        let sample = scope.finish();
        let index = built.map_err(|source| RunError::Build {
            run: run.clone(),
            path: request.geometry.clone(),
            source,
        })?;
        let index_size = self.footprint(&index, sample.retained_bytes());
        info!("{run} built index in {build_duration:?}");

        phases.enter(Phase::ExecuteDistanceQueries);
        let mut distance = Vec::with_capacity(request.distance_queries.len());
        for file in &request.distance_queries {
            let queries = self
                .with_progress(|progress| self.backend.load_distance_queries(file, progress))
                .map_err(|source| RunError::load(&run, Phase::ExecuteDistanceQueries, source))?;
            let outcome = self.with_progress(|progress| {
                self.backend.execute_distance_queries(
                    &index,
                    &queries,
                    progress,
                    &self.settings.time_box,
                )
            });
            debug!("{run} {file}: {outcome:?}");
            distance.push(QueryThroughput {
                kind: QueryKind::Distance,
                file: file.clone(),
                outcome,
            });
        }

        phases.enter(Phase::ExecuteRangeQueries);
        let mut range = Vec::with_capacity(request.range_queries.len());
        for file in &request.range_queries {
            let queries = self
                .with_progress(|progress| self.backend.load_range_queries(file, progress))
                .map_err(|source| RunError::load(&run, Phase::ExecuteRangeQueries, source))?;
            let outcome = self.with_progress(|progress| {
                self.backend
                    .execute_range_queries(&index, &queries, progress, &self.settings.time_box)
            });
            debug!("{run} {file}: {outcome:?}");
            range.push(QueryThroughput {
                kind: QueryKind::Range,
                file: file.clone(),
                outcome,
            });
        }
        drop(index);

        phases.enter(Phase::WriteReport);
        let report = RunReport {
            run: run.clone(),
            runner: self.name.clone(),
            dataset: request.dataset.clone(),
            geometry_file: request.geometry.clone(),
            geometry_count: geometry.len(),
            index_size,
            build_duration,
            distance,
            range,
        };
        self.writer
            .write(&report)
            .map_err(|source| RunError::Report { run, source })?;
        Ok(report)
    }
}
