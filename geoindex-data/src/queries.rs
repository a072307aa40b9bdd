//! Comma-separated query workloads.
//!
//! Distance queries are `lat,lon,distance` lines and range queries are
//! `lat_a,lon_a,lat_b,lon_b` lines. There is no header and blank lines are
//! skipped.

use camino::Utf8Path;
use geoindex_core::{Coordinate, DistanceQuery, LoadError, Progress, RangeQuery};

use crate::{LoaderOptions, PROGRESS_STRIDE, read_input};

/// Two opposite rectangle corners in geographic coordinates.
pub type Corners = (Coordinate, Coordinate);

/// Read a distance query file.
///
/// The translation in `options` shifts each query point; distances are
/// taken as written.
///
/// # Errors
/// Returns [`LoadError::Malformed`] naming the first bad line, or another
/// [`LoadError`] when the file cannot be read.
pub fn read_distance_queries(
    path: &Utf8Path,
    options: &LoaderOptions,
    progress: &Progress,
) -> Result<Vec<DistanceQuery<Coordinate>>, LoadError> {
    read_records(path, progress, |fields| {
        let [lat, lon, distance] = fields else {
            return Err(field_count(3, fields.len()));
        };
        if *distance < 0.0 {
            return Err(format!("distance {distance} is negative"));
        }
        Ok(DistanceQuery {
            point: Coordinate::new(*lat, *lon).translated(options.translation),
            distance: *distance,
        })
    })
}

/// Read a range query file.
///
/// # Errors
/// Returns [`LoadError::Malformed`] naming the first bad line, or another
/// [`LoadError`] when the file cannot be read.
pub fn read_range_queries(
    path: &Utf8Path,
    options: &LoaderOptions,
    progress: &Progress,
) -> Result<Vec<RangeQuery<Corners>>, LoadError> {
    read_records(path, progress, |fields| {
        let [lat_a, lon_a, lat_b, lon_b] = fields else {
            return Err(field_count(4, fields.len()));
        };
        Ok(RangeQuery {
            range: (
                Coordinate::new(*lat_a, *lon_a).translated(options.translation),
                Coordinate::new(*lat_b, *lon_b).translated(options.translation),
            ),
        })
    })
}

fn field_count(expected: usize, found: usize) -> String {
    format!("expected {expected} comma-separated fields, found {found}")
}

fn read_records<T>(
    path: &Utf8Path,
    progress: &Progress,
    mut parse: impl FnMut(&[f64]) -> Result<T, String>,
) -> Result<Vec<T>, LoadError> {
    let bytes = read_input(path)?;
    let text = String::from_utf8(bytes).map_err(|err| LoadError::Malformed {
        path: path.to_path_buf(),
        line: 0,
        reason: format!("file is not UTF-8: {err}"),
    })?;

    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    progress.set(0, total);

    let mut records = Vec::with_capacity(total);
    let mut fields = Vec::with_capacity(4);
    for (index, line) in lines.iter().enumerate() {
        if !line.trim().is_empty() {
            let malformed = |reason: String| LoadError::Malformed {
                path: path.to_path_buf(),
                line: index + 1,
                reason,
            };
            fields.clear();
            for field in line.split(',') {
                fields.push(parse_number(field).map_err(malformed)?);
            }
            records.push(parse(&fields).map_err(malformed)?);
        }
        if (index + 1) % PROGRESS_STRIDE == 0 {
            progress.set(index + 1, total);
        }
    }
    progress.set(total, total);
    Ok(records)
}

fn parse_number(field: &str) -> Result<f64, String> {
    let trimmed = field.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| format!("{trimmed:?} is not a number"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{trimmed:?} is not finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn workspace() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        (dir, root)
    }

    fn write(root: &Utf8Path, name: &str, contents: &str) -> Utf8PathBuf {
        let path = root.join(name);
        std::fs::write(&path, contents).expect("write query file");
        path
    }

    #[rstest]
    fn distance_lines_parse_and_skip_blanks(
        #[from(workspace)] (_dir, root): (TempDir, Utf8PathBuf),
    ) {
        let path = write(&root, "d.csv", "40.7,-74.0,250\n\n 41.0 , -73.5 , 0.5 \r\n");
        let progress = Progress::new();
        let queries =
            read_distance_queries(&path, &LoaderOptions::default(), &progress).expect("parse");

        assert_eq!(
            queries,
            [
                DistanceQuery {
                    point: Coordinate::new(40.7, -74.0),
                    distance: 250.0,
                },
                DistanceQuery {
                    point: Coordinate::new(41.0, -73.5),
                    distance: 0.5,
                },
            ]
        );
        assert_eq!(progress.snapshot(), (3, 3));
    }

    #[rstest]
    fn range_lines_are_translated(#[from(workspace)] (_dir, root): (TempDir, Utf8PathBuf)) {
        let path = write(&root, "r.csv", "0,0,1,1\n");
        let options = LoaderOptions::default().with_translation(Coordinate::new(10.0, 20.0));
        let queries = read_range_queries(&path, &options, &Progress::new()).expect("parse");

        assert_eq!(
            queries,
            [RangeQuery {
                range: (Coordinate::new(10.0, 20.0), Coordinate::new(11.0, 21.0)),
            }]
        );
    }

    #[rstest]
    #[case("1,2\n", 1, "expected 3")]
    #[case("1,2,3\n1,x,3\n", 2, "not a number")]
    #[case("1,2,-4\n", 1, "negative")]
    #[case("\n1,2,inf\n", 2, "not finite")]
    fn malformed_distance_lines_name_the_line(
        #[from(workspace)] (_dir, root): (TempDir, Utf8PathBuf),
        #[case] contents: &str,
        #[case] expected_line: usize,
        #[case] reason_fragment: &str,
    ) {
        let path = write(&root, "bad.csv", contents);
        let err = read_distance_queries(&path, &LoaderOptions::default(), &Progress::new())
            .expect_err("malformed input");

        let LoadError::Malformed { line, reason, .. } = err else {
            panic!("expected malformed error, got {err:?}");
        };
        assert_eq!(line, expected_line);
        assert!(reason.contains(reason_fragment), "{reason}");
    }

    #[rstest]
    fn empty_file_yields_no_queries(#[from(workspace)] (_dir, root): (TempDir, Utf8PathBuf)) {
        let path = write(&root, "empty.csv", "");
        let queries =
            read_range_queries(&path, &LoaderOptions::default(), &Progress::new()).expect("parse");
        assert!(queries.is_empty());
    }

    #[rstest]
    fn missing_file_is_an_open_error(#[from(workspace)] (_dir, root): (TempDir, Utf8PathBuf)) {
        let err = read_range_queries(
            &root.join("absent.csv"),
            &LoaderOptions::default(),
            &Progress::new(),
        )
        .expect_err("missing file");
        assert!(matches!(err, LoadError::Open { .. }));
    }
}
