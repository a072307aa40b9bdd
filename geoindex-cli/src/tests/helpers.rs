//! Test helpers writing small benchmark datasets to disk.

use std::sync::{Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use crate::run::RunArgs;

/// Three points on the diagonal `(0,0)`, `(1,1)`, `(2,2)` with one distance
/// and one range workload.
#[derive(Debug)]
pub(super) struct DatasetFiles {
    _dir: TempDir,
    root: Utf8PathBuf,
    geometry: Utf8PathBuf,
    distance: Utf8PathBuf,
    range: Utf8PathBuf,
}

impl DatasetFiles {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        let geometry = root.join("diagonal.bin");
        let distance = root.join("distance.csv");
        let range = root.join("range.csv");

        let bytes: Vec<u8> = [0.0_f64, 0.0, 1.0, 1.0, 2.0, 2.0]
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect();
        write_utf8(&geometry, &bytes);
        write_utf8(&distance, b"0,0,1.5\n1,1,0.5\n");
        write_utf8(&range, b"0,0,1,1\n");
        Self {
            _dir: dir,
            root,
            geometry,
            distance,
            range,
        }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub(super) fn geometry(&self) -> &Utf8Path {
        &self.geometry
    }

    pub(super) fn distance(&self) -> &Utf8Path {
        &self.distance
    }

    pub(super) fn range(&self) -> &Utf8Path {
        &self.range
    }

    pub(super) fn report_dir(&self) -> Utf8PathBuf {
        self.root.join("reports")
    }

    /// Arguments running every backend over this dataset in geographic
    /// coordinates without a progress display.
    pub(super) fn args(&self) -> RunArgs {
        RunArgs {
            dataset: Some("diagonal".to_owned()),
            geometry: Some(self.geometry.clone()),
            distance_queries: vec![self.distance.clone()],
            range_queries: vec![self.range.clone()],
            crs: Some("EPSG:4326".to_owned()),
            report_dir: Some(self.report_dir()),
            quiet: true,
            ..RunArgs::default()
        }
    }
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    std::fs::write(path, contents).expect("write fixture");
}

/// Heap profile scopes are process-wide, so benchmark runs inside one test
/// binary must not overlap.
static RUN_LOCK: Mutex<()> = Mutex::new(());

pub(super) fn serial_runs() -> MutexGuard<'static, ()> {
    RUN_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}
