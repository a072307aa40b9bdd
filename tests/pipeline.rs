#![cfg(all(
    feature = "backend-rtree",
    feature = "backend-quadtree",
    feature = "backend-sphere"
))]
#![expect(
    clippy::expect_used,
    reason = "tests should fail fast when setup breaks"
)]

//! End-to-end runs over files on disk with every shipped backend.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use geoindex_bench::{
    Experiment, ExperimentRunner, IndexSizeSource, LoaderOptions, Phase, PlanarLoader,
    ProgressMode, Projection, QuadtreeBackend, RTreeBackend, RunError, RunRequest,
    RunnerSettings, SphereBackend,
};
use geoindex_core::DisabledProfiler;
use rstest::{fixture, rstest};
use tempfile::TempDir;

/// Input files for a three point diagonal through the origin.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().to_path_buf()).expect("utf-8 temp dir")
    }

    fn file(&self, name: &str) -> Utf8PathBuf {
        self.root().join(name)
    }

    fn write(&self, name: &str, contents: &[u8]) -> Utf8PathBuf {
        let path = self.file(name);
        std::fs::write(&path, contents).expect("write input file");
        path
    }

    fn settings(&self) -> RunnerSettings {
        RunnerSettings::new(self.file("reports"))
            .with_progress(ProgressMode::Silent)
            .with_profiler(Arc::new(DisabledProfiler))
    }

    fn request(&self, distance: &str) -> RunRequest {
        RunRequest::new("diagonal", self.file("diagonal.bin"))
            .with_distance_queries([self.file(distance)])
            .with_range_queries([self.file("range.csv")])
    }
}

fn f64_pairs(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}

#[fixture]
fn workspace() -> Workspace {
    let workspace = Workspace {
        dir: TempDir::new().expect("create temp dir"),
    };
    workspace.write("diagonal.bin", &f64_pairs(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0]));
    workspace.write("planar.csv", b"0,0,1.5\n1,1,0.5\n");
    // (1, 1) lies about 157 km from the origin.
    workspace.write("metres.csv", b"0,0,160000\n1,1,1000\n");
    workspace.write("range.csv", b"0,0,1,1\n");
    workspace
}

fn identity_loader() -> PlanarLoader {
    PlanarLoader::new(LoaderOptions::default(), Projection::identity())
}

fn experiment(kind: &str, settings: RunnerSettings) -> Box<dyn Experiment> {
    match kind {
        "rtree" => Box::new(ExperimentRunner::new(
            "rtree",
            RTreeBackend::new(identity_loader()),
            settings,
        )),
        "quadtree" => Box::new(ExperimentRunner::new(
            "quadtree",
            QuadtreeBackend::new(identity_loader()),
            settings,
        )),
        "sphere" => Box::new(ExperimentRunner::new(
            "sphere",
            SphereBackend::default(),
            settings,
        )),
        other => panic!("unknown backend {other}"),
    }
}

#[rstest]
#[case::rtree("rtree", "planar.csv")]
#[case::quadtree("quadtree", "planar.csv")]
#[case::sphere("sphere", "metres.csv")]
fn backends_count_the_same_matches(
    workspace: Workspace,
    #[case] kind: &str,
    #[case] distance: &str,
) {
    let runner = experiment(kind, workspace.settings());
    let report = runner
        .run(&workspace.request(distance))
        .expect("run succeeds");

    assert_eq!(report.run, format!("{kind}_diagonal"));
    assert_eq!(report.geometry_count, 3);
    let distance = &report.distance.first().expect("distance workload").outcome;
    assert_eq!((distance.total, distance.executed, distance.matches), (2, 2, 3));
    let range = &report.range.first().expect("range workload").outcome;
    assert_eq!((range.executed, range.matches), (1, 2));
    assert!(
        workspace
            .file("reports")
            .join(format!("{kind}_diagonal.report"))
            .is_file()
    );
}

#[rstest]
fn repeated_runs_differ_only_in_timings(workspace: Workspace) {
    let runner = experiment("quadtree", workspace.settings());
    let request = workspace.request("planar.csv");
    let first = runner.run(&request).expect("first run");
    let second = runner.run(&request).expect("second run");

    assert_eq!(first.stable_fields(), second.stable_fields());
    let footprint = first.index_size.expect("quadtree reports its size");
    assert_eq!(footprint.source, IndexSizeSource::SelfReported);
    assert!(footprint.bytes > 0);

    let text = std::fs::read_to_string(workspace.file("reports/quadtree_diagonal.report"))
        .expect("read report");
    assert_eq!(text.matches("run = quadtree_diagonal\n").count(), 2);
}

#[rstest]
fn unmeasured_index_size_is_reported_unavailable(workspace: Workspace) {
    let runner = experiment("rtree", workspace.settings());
    let report = runner
        .run(&workspace.request("planar.csv"))
        .expect("run succeeds");

    assert_eq!(report.index_size, None);
    assert!(report.render().contains("index_size_bytes = unavailable\n"));
}

#[rstest]
#[expect(clippy::float_cmp, reason = "throughput of an empty workload is exactly zero")]
fn empty_inputs_report_zero_throughput(workspace: Workspace) {
    workspace.write("diagonal.bin", b"");
    workspace.write("planar.csv", b"");
    workspace.write("range.csv", b"\n");

    let runner = experiment("rtree", workspace.settings());
    let report = runner
        .run(&workspace.request("planar.csv"))
        .expect("run succeeds");

    assert_eq!(report.geometry_count, 0);
    for sample in report.distance.iter().chain(&report.range) {
        assert_eq!(sample.outcome.executed, 0);
        assert_eq!(sample.outcome.matches, 0);
        assert_eq!(sample.outcome.throughput(), 0.0);
    }
}

#[rstest]
fn malformed_range_file_aborts_without_a_report(workspace: Workspace) {
    workspace.write("range.csv", b"0,0,1\n");

    let runner = experiment("quadtree", workspace.settings());
    let err = runner
        .run(&workspace.request("planar.csv"))
        .expect_err("malformed range file");

    assert!(matches!(err, RunError::Load { .. }), "unexpected error: {err}");
    assert_eq!(err.phase(), Some(Phase::ExecuteRangeQueries));
    assert!(!report_exists(&workspace.root(), "quadtree"));
}

#[rstest]
fn missing_geometry_fails_in_the_first_phase(workspace: Workspace) {
    std::fs::remove_file(workspace.file("diagonal.bin")).expect("remove geometry");

    let runner = experiment("sphere", workspace.settings());
    let err = runner
        .run(&workspace.request("metres.csv"))
        .expect_err("missing geometry");

    assert_eq!(err.phase(), Some(Phase::LoadGeometry));
    assert!(!report_exists(&workspace.root(), "sphere"));
}

fn report_exists(root: &Utf8Path, runner: &str) -> bool {
    root.join("reports")
        .join(format!("{runner}_diagonal.report"))
        .exists()
}
