//! Behavioural tests for the geometry and query loaders.

use std::cell::RefCell;

use camino::Utf8PathBuf;
use geoindex_core::{Coordinate, LoadError, Progress};
use geoindex_data::{LoaderOptions, read_coordinates, read_distance_queries};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

/// Temporary directory and the input path under test.
type Input = Option<(TempDir, Utf8PathBuf)>;
type Loaded = Option<Result<usize, LoadError>>;

#[fixture]
fn input() -> RefCell<Input> {
    RefCell::new(None)
}

#[fixture]
fn geometry() -> RefCell<Option<Result<Vec<Coordinate>, LoadError>>> {
    RefCell::new(None)
}

#[fixture]
fn outcome() -> RefCell<Loaded> {
    RefCell::new(None)
}

fn write_input(input: &RefCell<Input>, name: &str, bytes: &[u8]) {
    let dir = TempDir::new().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    let path = root.join(name);
    std::fs::write(&path, bytes).expect("write input");
    *input.borrow_mut() = Some((dir, path));
}

fn input_path(input: &RefCell<Input>) -> Utf8PathBuf {
    input
        .borrow()
        .as_ref()
        .map(|(_, path)| path.clone())
        .expect("input prepared")
}

#[given("a geometry file with two double pairs and three trailing bytes")]
fn truncated_geometry(#[from(input)] input: &RefCell<Input>) {
    let mut bytes: Vec<u8> = [40.5_f64, -73.5, 51.25, -0.125]
        .iter()
        .flat_map(|value| value.to_le_bytes())
        .collect();
    bytes.extend_from_slice(&[1, 2, 3]);
    write_input(input, "points.bin", &bytes);
}

#[given("a geometry path that does not exist")]
fn missing_geometry(#[from(input)] input: &RefCell<Input>) {
    let dir = TempDir::new().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    *input.borrow_mut() = Some((dir, root.join("absent.bin")));
}

#[given("a distance query file whose second line has two fields")]
fn malformed_distance(#[from(input)] input: &RefCell<Input>) {
    write_input(input, "distance.csv", b"40.7,-74.0,100\n40.8,-73.9\n");
}

#[when("I load the geometry")]
fn load_geometry(
    #[from(input)] input: &RefCell<Input>,
    #[from(geometry)] geometry: &RefCell<Option<Result<Vec<Coordinate>, LoadError>>>,
) {
    let path = input_path(input);
    let result = read_coordinates(&path, &LoaderOptions::default(), &Progress::new());
    *geometry.borrow_mut() = Some(result);
}

#[when("I load the distance queries")]
fn load_distance(#[from(input)] input: &RefCell<Input>, #[from(outcome)] outcome: &RefCell<Loaded>) {
    let path = input_path(input);
    let result = read_distance_queries(&path, &LoaderOptions::default(), &Progress::new());
    *outcome.borrow_mut() = Some(result.map(|queries| queries.len()));
}

#[then("two coordinates are returned in file order")]
fn two_coordinates(
    #[from(geometry)] geometry: &RefCell<Option<Result<Vec<Coordinate>, LoadError>>>,
) {
    let borrowed = geometry.borrow();
    let points = borrowed
        .as_ref()
        .expect("geometry loaded")
        .as_ref()
        .expect("load succeeds");
    assert_eq!(
        points.as_slice(),
        [Coordinate::new(40.5, -73.5), Coordinate::new(51.25, -0.125)]
    );
}

#[then("the load fails naming line 2")]
fn fails_on_line_two(#[from(outcome)] outcome: &RefCell<Loaded>) {
    let borrowed = outcome.borrow();
    let err = borrowed
        .as_ref()
        .expect("queries loaded")
        .as_ref()
        .expect_err("load fails");
    assert!(
        matches!(err, LoadError::Malformed { line: 2, .. }),
        "unexpected error: {err}"
    );
    assert!(err.to_string().contains("distance.csv:2"));
}

#[then("the load fails to open the file")]
fn fails_to_open(
    #[from(geometry)] geometry: &RefCell<Option<Result<Vec<Coordinate>, LoadError>>>,
) {
    let borrowed = geometry.borrow();
    let err = borrowed
        .as_ref()
        .expect("geometry loaded")
        .as_ref()
        .expect_err("load fails");
    assert!(matches!(err, LoadError::Open { .. }), "unexpected error: {err}");
}

#[scenario(path = "tests/features/loader.feature", index = 0)]
fn scenario_truncated_geometry(
    input: RefCell<Input>,
    geometry: RefCell<Option<Result<Vec<Coordinate>, LoadError>>>,
    outcome: RefCell<Loaded>,
) {
    let _ = (input, geometry, outcome);
}

#[scenario(path = "tests/features/loader.feature", index = 1)]
fn scenario_malformed_distance(
    input: RefCell<Input>,
    geometry: RefCell<Option<Result<Vec<Coordinate>, LoadError>>>,
    outcome: RefCell<Loaded>,
) {
    let _ = (input, geometry, outcome);
}

#[scenario(path = "tests/features/loader.feature", index = 2)]
fn scenario_missing_geometry(
    input: RefCell<Input>,
    geometry: RefCell<Option<Result<Vec<Coordinate>, LoadError>>>,
    outcome: RefCell<Loaded>,
) {
    let _ = (input, geometry, outcome);
}
