//! Coordinate reference systems and the projections between them.
//!
//! Reference systems are identified by EPSG code and resolved to PROJ.4
//! definitions from the bundled EPSG table. Transforms run through
//! `proj4rs`, so any code whose projection and datum `proj4rs` implements is
//! usable as a working CRS.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use geoindex_core::ConfigError;
use log::debug;
use proj4rs::Proj;
use proj4rs::adaptors::transform_xy;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs {
    code: u16,
}

impl Crs {
    /// `EPSG:4326`, geographic WGS84 degrees.
    pub const WGS84: Self = Self { code: 4326 };

    /// EPSG code.
    #[must_use]
    pub const fn code(self) -> u16 {
        self.code
    }

    /// Whether coordinates are geographic degrees.
    #[must_use]
    pub fn is_geographic(self) -> bool {
        definition(self.code).is_some_and(|proj4| {
            proj4.contains("+proj=longlat") || proj4.contains("+proj=latlong")
        })
    }

    fn unsupported(self) -> ConfigError {
        ConfigError::UnsupportedCrs {
            crs: self.to_string(),
        }
    }

    fn build(self) -> Result<Proj, ConfigError> {
        let proj4 = definition(self.code).ok_or_else(|| self.unsupported())?;
        Proj::from_proj_string(proj4).map_err(|err| {
            debug!("{self} has no usable definition ({proj4}): {err}");
            self.unsupported()
        })
    }
}

fn definition(code: u16) -> Option<&'static str> {
    crs_definitions::from_code(code).map(|def| def.proj4)
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.code)
    }
}

impl FromStr for Crs {
    type Err = ConfigError;

    /// Parse an `EPSG:<code>` identifier, case-insensitively.
    ///
    /// The code must name a reference system `proj4rs` can build.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidCrs {
            value: value.to_owned(),
        };
        let trimmed = value.trim();
        let (authority, code) = trimmed.split_once(':').ok_or_else(invalid)?;
        if !authority.eq_ignore_ascii_case("epsg") {
            return Err(invalid());
        }
        let code: u32 = code.trim().parse().map_err(|_| invalid())?;
        let code = u16::try_from(code).map_err(|_| ConfigError::UnsupportedCrs {
            crs: format!("EPSG:{code}"),
        })?;
        let crs = Self { code };
        crs.build()?;
        Ok(crs)
    }
}

struct Transform {
    from: Proj,
    to: Proj,
}

/// Projects coordinates between two reference systems.
///
/// Geographic coordinates are taken and returned in degrees. A point outside
/// the target's domain projects to `NaN`, which backends reject when the
/// index is built.
///
/// # Examples
///
/// ```
/// use geoindex_data::{Crs, Projection};
///
/// let mercator: Crs = "EPSG:3857".parse().expect("supported");
/// let projection = Projection::new(Crs::WGS84, mercator).expect("supported");
/// let (x, y) = projection.transform(180.0, 0.0);
/// assert!((x - 20_037_508.342_789).abs() < 1e-3);
/// assert!(y.abs() < 1e-6);
/// ```
#[derive(Clone)]
pub struct Projection {
    source: Crs,
    target: Crs,
    transform: Option<Arc<Transform>>,
}

impl Projection {
    /// Create a projection from `source` to `target`.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnsupportedTransform`] when either reference
    /// system cannot be built.
    pub fn new(source: Crs, target: Crs) -> Result<Self, ConfigError> {
        if source == target {
            return Ok(Self {
                source,
                target,
                transform: None,
            });
        }
        let unsupported = |_| ConfigError::UnsupportedTransform {
            source_crs: source.to_string(),
            target_crs: target.to_string(),
        };
        let from = source.build().map_err(unsupported)?;
        let to = target.build().map_err(unsupported)?;
        Ok(Self {
            source,
            target,
            transform: Some(Arc::new(Transform { from, to })),
        })
    }

    /// Projection leaving geographic coordinates unchanged.
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            source: Crs::WGS84,
            target: Crs::WGS84,
            transform: None,
        }
    }

    /// Source reference system.
    #[must_use]
    pub const fn source(&self) -> Crs {
        self.source
    }

    /// Target reference system.
    #[must_use]
    pub const fn target(&self) -> Crs {
        self.target
    }

    /// Project `x` (longitude) and `y` (latitude) into the target CRS.
    #[must_use]
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let Some(transform) = self.transform.as_deref() else {
            return (x, y);
        };
        let (x, y) = if transform.from.is_latlong() {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };
        match transform_xy(&transform.from, &transform.to, x, y) {
            Ok((x, y)) if transform.to.is_latlong() => (x.to_degrees(), y.to_degrees()),
            Ok(projected) => projected,
            Err(err) => {
                debug!("{} -> {} failed: {err}", self.source, self.target);
                (f64::NAN, f64::NAN)
            }
        }
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Projection {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target
    }
}
