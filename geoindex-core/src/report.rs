//! Run reports and the append-only report writer.
//!
//! A report is flat `key = value` text. Each run appends one record to
//! `<runner>_<dataset>.report`, terminated by a blank line.

use std::fmt;
use std::io::Write;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use log::info;

use crate::{QueryKind, QueryOutcome, ReportError};

/// Key suffixes whose values depend on wall-clock time.
pub const TIMING_FIELDS: [&str; 3] = ["build_duration_ms", "elapsed_ms", "throughput_qps"];

const UNAVAILABLE: &str = "unavailable";

/// Where an index footprint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSizeSource {
    /// Reported by the backend itself.
    SelfReported,
    /// Heap retained across the build scope.
    HeapProfile,
}

impl fmt::Display for IndexSizeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SelfReported => "backend",
            Self::HeapProfile => "heap_profile",
        })
    }
}

/// Memory held by a built index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFootprint {
    /// Size in bytes.
    pub bytes: u64,
    /// How the size was measured.
    pub source: IndexSizeSource,
}

/// Throughput sample for one query file.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryThroughput {
    /// Workload kind.
    pub kind: QueryKind,
    /// Query file the sample was taken from.
    pub file: Utf8PathBuf,
    /// Execution outcome.
    pub outcome: QueryOutcome,
}

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Full run name, `<runner>_<dataset>`.
    pub run: String,
    /// Runner name.
    pub runner: String,
    /// Dataset (run) name.
    pub dataset: String,
    /// Geometry input file.
    pub geometry_file: Utf8PathBuf,
    /// Geometries loaded and indexed.
    pub geometry_count: usize,
    /// Index memory footprint, when measurable.
    pub index_size: Option<IndexFootprint>,
    /// Wall-clock time spent in the build.
    pub build_duration: Duration,
    /// One sample per distance query file, in request order.
    pub distance: Vec<QueryThroughput>,
    /// One sample per range query file, in request order.
    pub range: Vec<QueryThroughput>,
}

impl RunReport {
    /// Report fields in their fixed output order.
    #[must_use]
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("run".to_owned(), self.run.clone()),
            ("runner".to_owned(), self.runner.clone()),
            ("dataset".to_owned(), self.dataset.clone()),
            ("geometry_file".to_owned(), self.geometry_file.to_string()),
            ("geometry_count".to_owned(), self.geometry_count.to_string()),
        ];
        let (bytes, source) = self.index_size.map_or_else(
            || (UNAVAILABLE.to_owned(), UNAVAILABLE.to_owned()),
            |footprint| (footprint.bytes.to_string(), footprint.source.to_string()),
        );
        fields.push(("index_size_bytes".to_owned(), bytes));
        fields.push(("index_size_source".to_owned(), source));
        fields.push((
            "build_duration_ms".to_owned(),
            format_millis(self.build_duration),
        ));

        for samples in [&self.distance, &self.range] {
            for (position, sample) in samples.iter().enumerate() {
                push_throughput(&mut fields, position, sample);
            }
        }
        fields
    }

    /// Fields whose values do not depend on wall-clock time.
    #[must_use]
    pub fn stable_fields(&self) -> Vec<(String, String)> {
        self.fields()
            .into_iter()
            .filter(|(key, _)| !TIMING_FIELDS.iter().any(|field| key.ends_with(field)))
            .collect()
    }

    /// Render the record, terminated by a blank line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.fields() {
            out.push_str(&key);
            out.push_str(" = ");
            out.push_str(&value);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

fn push_throughput(fields: &mut Vec<(String, String)>, position: usize, sample: &QueryThroughput) {
    let prefix = format!("{}[{position}]", sample.kind.label());
    let outcome = &sample.outcome;
    let entries = [
        ("file", sample.file.to_string()),
        ("total", outcome.total.to_string()),
        ("executed", outcome.executed.to_string()),
        ("matches", outcome.matches.to_string()),
        ("elapsed_ms", format_millis(outcome.elapsed)),
        ("throughput_qps", format!("{:.3}", outcome.throughput())),
        ("time_boxed", outcome.time_boxed.to_string()),
    ];
    fields.extend(
        entries
            .into_iter()
            .map(|(key, value)| (format!("{prefix}.{key}"), value)),
    );
}

fn format_millis(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64() * 1_000.0)
}

/// Appends run reports to files in one directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: Utf8PathBuf,
}

impl ReportWriter {
    /// Write reports beneath `dir`, created on first use.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Report directory.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// File receiving records for `runner` on `dataset`.
    ///
    /// Characters outside `[A-Za-z0-9._-]` are replaced by `_`.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoindex_core::ReportWriter;
    ///
    /// let writer = ReportWriter::new("reports");
    /// assert_eq!(writer.path_for("rtree", "nyc/2024"), "reports/rtree_nyc_2024.report");
    /// ```
    #[must_use]
    pub fn path_for(&self, runner: &str, dataset: &str) -> Utf8PathBuf {
        let stem = format!("{}_{}", sanitise(runner), sanitise(dataset));
        self.dir.join(format!("{stem}.report"))
    }

    /// Append `report` as one record and return the file written.
    ///
    /// # Errors
    /// Returns [`ReportError`] when the directory cannot be created or the
    /// record cannot be written.
    pub fn write(&self, report: &RunReport) -> Result<Utf8PathBuf, ReportError> {
        geoindex_fs::ensure_dir(&self.dir).map_err(|source| ReportError::CreateDirectory {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(&report.runner, &report.dataset);
        let record = report.render();
        geoindex_fs::open_append(&path)
            .and_then(|mut file| {
                file.write_all(record.as_bytes())?;
                file.sync_all()
            })
            .map_err(|source| ReportError::Write {
                path: path.clone(),
                source,
            })?;

        info!("report for {} appended to {path}", report.run);
        Ok(path)
    }
}

fn sanitise(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
