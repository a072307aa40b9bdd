//! Input loading for the geoindex benchmarks.
//!
//! Responsibilities:
//! - Decode binary coordinate files and comma-separated query workloads.
//! - Parse coordinate reference systems and project geographic input.
//! - Offer a planar loader shared by backends working on `geo` types.
//!
//! Boundaries:
//! - No index logic; backends own geometry once it is loaded.
//!
//! Invariants:
//! - Loads are all-or-nothing; partial collections are never returned.
//! - Transforms run once per point or query, at load time only.

#![forbid(unsafe_code)]

mod crs;
mod geometry;
mod planar;
mod queries;

pub use crs::{Crs, Projection};
pub use geometry::{CoordinateEncoding, LoaderOptions, decode_coordinates, read_coordinates};
pub use planar::PlanarLoader;
pub use queries::{Corners, read_distance_queries, read_range_queries};

use camino::Utf8Path;
use geoindex_core::LoadError;
use std::io::Read;

/// Read a whole input file into memory.
fn read_input(path: &Utf8Path) -> Result<Vec<u8>, LoadError> {
    let mut file = geoindex_fs::open_input(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(bytes)
}

/// Publish progress every this many records while decoding.
const PROGRESS_STRIDE: usize = 1 << 14;
