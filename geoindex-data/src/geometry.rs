//! Binary coordinate files.
//!
//! A geometry file is a headerless sequence of `(lat, lon)` pairs in
//! little-endian IEEE 754, read until end of file.

use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use geoindex_core::{Coordinate, LoadError, Progress};
use log::warn;

use crate::{PROGRESS_STRIDE, read_input};

/// Width of the floating-point values in a geometry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateEncoding {
    /// 32-bit floats, 8 bytes per pair.
    F32,
    /// 64-bit floats, 16 bytes per pair.
    #[default]
    F64,
}

impl CoordinateEncoding {
    /// Bytes occupied by one `(lat, lon)` pair.
    #[must_use]
    pub const fn pair_width(self) -> usize {
        match self {
            Self::F32 => 8,
            Self::F64 => 16,
        }
    }

    fn decode_pair(self, pair: &[u8]) -> Option<Coordinate> {
        match self {
            Self::F32 => {
                let (lat, rest) = pair.split_first_chunk::<4>()?;
                let (lon, _) = rest.split_first_chunk::<4>()?;
                Some(Coordinate::new(
                    f64::from(f32::from_le_bytes(*lat)),
                    f64::from(f32::from_le_bytes(*lon)),
                ))
            }
            Self::F64 => {
                let (lat, rest) = pair.split_first_chunk::<8>()?;
                let (lon, _) = rest.split_first_chunk::<8>()?;
                Some(Coordinate::new(
                    f64::from_le_bytes(*lat),
                    f64::from_le_bytes(*lon),
                ))
            }
        }
    }
}

impl fmt::Display for CoordinateEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
        })
    }
}

impl FromStr for CoordinateEncoding {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "f32" | "float" => Ok(Self::F32),
            "f64" | "double" => Ok(Self::F64),
            other => Err(format!("unknown coordinate encoding {other:?}; expected f32 or f64")),
        }
    }
}

/// How raw inputs are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoaderOptions {
    /// Geometry file encoding.
    pub encoding: CoordinateEncoding,
    /// Offset added to every coordinate, geometry and queries alike.
    pub translation: Coordinate,
}

impl LoaderOptions {
    /// Options with the given encoding and no translation.
    #[must_use]
    pub const fn new(encoding: CoordinateEncoding) -> Self {
        Self {
            encoding,
            translation: Coordinate::new(0.0, 0.0),
        }
    }

    /// Shift every loaded coordinate by `translation`.
    #[must_use]
    pub const fn with_translation(mut self, translation: Coordinate) -> Self {
        self.translation = translation;
        self
    }
}

/// Decode `bytes` as coordinate pairs.
///
/// Returns the coordinates and the number of trailing bytes too short to
/// form a pair.
///
/// # Examples
///
/// ```
/// use geoindex_core::Coordinate;
/// use geoindex_data::{CoordinateEncoding, decode_coordinates};
///
/// let mut bytes = Vec::new();
/// bytes.extend_from_slice(&40.5_f32.to_le_bytes());
/// bytes.extend_from_slice(&(-73.25_f32).to_le_bytes());
/// bytes.push(0xff);
///
/// let (points, trailing) =
///     decode_coordinates(&bytes, CoordinateEncoding::F32, Coordinate::default());
/// assert_eq!(points, [Coordinate::new(40.5, -73.25)]);
/// assert_eq!(trailing, 1);
/// ```
#[must_use]
pub fn decode_coordinates(
    bytes: &[u8],
    encoding: CoordinateEncoding,
    translation: Coordinate,
) -> (Vec<Coordinate>, usize) {
    let pairs = bytes.chunks_exact(encoding.pair_width());
    let trailing = pairs.remainder().len();
    let points = pairs
        .filter_map(|pair| encoding.decode_pair(pair))
        .map(|point| point.translated(translation))
        .collect();
    (points, trailing)
}

/// Read every coordinate pair in the geometry file at `path`.
///
/// A trailing partial pair is ignored with a warning.
///
/// # Errors
/// Returns [`LoadError`] when the file cannot be opened or read.
pub fn read_coordinates(
    path: &Utf8Path,
    options: &LoaderOptions,
    progress: &Progress,
) -> Result<Vec<Coordinate>, LoadError> {
    let bytes = read_input(path)?;
    let width = options.encoding.pair_width();
    let total = bytes.len() / width;
    progress.set(0, total);

    let mut points = Vec::with_capacity(total);
    for (done, chunk) in bytes
        .chunks(PROGRESS_STRIDE * width)
        .enumerate()
        .map(|(i, chunk)| ((i + 1) * PROGRESS_STRIDE, chunk))
    {
        let (decoded, trailing) = decode_coordinates(chunk, options.encoding, options.translation);
        points.extend(decoded);
        if trailing > 0 {
            warn!(
                "{path}: ignoring {trailing} trailing bytes shorter than a {} pair",
                options.encoding
            );
        }
        progress.set(done.min(total), total);
    }
    Ok(points)
}
