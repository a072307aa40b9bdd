//! Loader producing projected `geo` geometry for planar backends.

use camino::Utf8Path;
use geo::{Coord, Rect};
use geoindex_core::{Coordinate, DistanceQuery, LoadError, Progress, RangeQuery};

use crate::{LoaderOptions, Projection, read_coordinates, read_distance_queries, read_range_queries};

/// Loads inputs and projects them into a working CRS.
///
/// Points become `Coord { x, y }` in target units. Range corners are
/// projected individually, so the rectangle is the projected corners'
/// bounding box.
///
/// # Examples
///
/// ```
/// use geo::Coord;
/// use geoindex_core::Coordinate;
/// use geoindex_data::{LoaderOptions, PlanarLoader, Projection};
///
/// let loader = PlanarLoader::new(LoaderOptions::default(), Projection::identity());
/// assert_eq!(
///     loader.project(Coordinate::new(40.0, -74.0)),
///     Coord { x: -74.0, y: 40.0 }
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarLoader {
    options: LoaderOptions,
    projection: Projection,
}

impl PlanarLoader {
    /// Create a loader decoding with `options` and projecting with
    /// `projection`.
    #[must_use]
    pub const fn new(options: LoaderOptions, projection: Projection) -> Self {
        Self {
            options,
            projection,
        }
    }

    /// Decoding options.
    #[must_use]
    pub const fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Working projection.
    #[must_use]
    pub const fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Project one geographic coordinate.
    #[must_use]
    pub fn project(&self, coordinate: Coordinate) -> Coord<f64> {
        let (x, y) = self.projection.transform(coordinate.lon, coordinate.lat);
        Coord { x, y }
    }

    /// Load and project the geometry file at `path`.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the file cannot be read.
    pub fn load_points(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<Coord<f64>>, LoadError> {
        let raw = read_coordinates(path, &self.options, progress)?;
        Ok(raw.into_iter().map(|point| self.project(point)).collect())
    }

    /// Load and project a distance query file.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the file is unreadable or malformed.
    pub fn load_distance_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<DistanceQuery<Coord<f64>>>, LoadError> {
        let raw = read_distance_queries(path, &self.options, progress)?;
        Ok(raw
            .into_iter()
            .map(|query| DistanceQuery {
                point: self.project(query.point),
                distance: query.distance,
            })
            .collect())
    }

    /// Load and project a range query file.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the file is unreadable or malformed.
    pub fn load_range_queries(
        &self,
        path: &Utf8Path,
        progress: &Progress,
    ) -> Result<Vec<RangeQuery<Rect<f64>>>, LoadError> {
        let raw = read_range_queries(path, &self.options, progress)?;
        Ok(raw
            .into_iter()
            .map(|query| {
                let (a, b) = query.range;
                RangeQuery {
                    range: Rect::new(self.project(a), self.project(b)),
                }
            })
            .collect())
    }
}
