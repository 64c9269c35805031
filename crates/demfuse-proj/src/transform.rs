//! Forward transforms from geographic coordinates to target ground coordinates.

use crate::{ProjError, ReferenceSystem, Result};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use std::f64::consts::PI;
use std::fmt;

/// Web Mercator sphere radius in meters.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Web Mercator latitude limit, arctan(sinh(π)).
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A coordinate in the target reference system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPoint {
    /// Easting (or longitude for geographic targets).
    pub x: f64,
    /// Northing (or latitude for geographic targets).
    pub y: f64,
}

/// Maps (longitude, latitude) in degrees to a ground coordinate.
///
/// Implementations must be shareable across worker threads: they are built
/// once before the parallel phase and only read afterwards.
pub trait GroundTransform: Send + Sync + fmt::Debug {
    /// Project one coordinate.
    ///
    /// Returns [`ProjError::OutOfDomain`] for coordinates the projection cannot
    /// represent; any other error means the transform itself is unusable.
    fn forward(&self, lon: f64, lat: f64) -> Result<GroundPoint>;

    /// The reference system of the produced coordinates.
    fn target(&self) -> ReferenceSystem;
}

enum Strategy {
    /// Source and target are the same system.
    Identity,
    /// WGS84 to spherical Web Mercator, inline.
    WebMercator,
    /// Everything else.
    Proj4rs { source: Proj, target: Proj },
}

/// Transform from a geographic source system to any target system.
///
/// WGS84 to Web Mercator is computed inline; other pairs go through proj4rs.
pub struct ForwardTransform {
    source: ReferenceSystem,
    target: ReferenceSystem,
    strategy: Strategy,
}

impl fmt::Debug for ForwardTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match self.strategy {
            Strategy::Identity => "identity",
            Strategy::WebMercator => "web_mercator",
            Strategy::Proj4rs { .. } => "proj4rs",
        };
        f.debug_struct("ForwardTransform")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("strategy", &strategy)
            .finish()
    }
}

impl ForwardTransform {
    /// Create a transform from `source` to `target`.
    ///
    /// The source must be geographic: 3D maps carry longitude/latitude bands.
    pub fn new(source: ReferenceSystem, target: ReferenceSystem) -> Result<Self> {
        if !source.is_geographic() {
            return Err(ProjError::IncompatibleSource {
                source_ref: source.to_string(),
                reason: "3D map coordinates must be geographic longitude/latitude".to_string(),
            });
        }

        let strategy = if source == target {
            Strategy::Identity
        } else if source == ReferenceSystem::Geographic && target == ReferenceSystem::WebMercator {
            Strategy::WebMercator
        } else {
            Strategy::Proj4rs {
                source: source.proj()?,
                target: target.proj()?,
            }
        };

        Ok(Self {
            source,
            target,
            strategy,
        })
    }

    /// Create a transform from WGS84 longitude/latitude to `target`.
    pub fn from_lonlat_to(target: ReferenceSystem) -> Result<Self> {
        Self::new(ReferenceSystem::Geographic, target)
    }

    fn project(&self, lon: f64, lat: f64) -> Result<GroundPoint> {
        match &self.strategy {
            Strategy::Identity => Ok(GroundPoint { x: lon, y: lat }),
            Strategy::WebMercator => web_mercator(lon, lat),
            Strategy::Proj4rs { source, target } => {
                let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
                transform(source, target, &mut point)
                    .map_err(|_| ProjError::OutOfDomain { lon, lat })?;
                if self.target.is_geographic() {
                    Ok(GroundPoint {
                        x: point.0.to_degrees(),
                        y: point.1.to_degrees(),
                    })
                } else {
                    Ok(GroundPoint {
                        x: point.0,
                        y: point.1,
                    })
                }
            }
        }
    }
}

impl GroundTransform for ForwardTransform {
    fn forward(&self, lon: f64, lat: f64) -> Result<GroundPoint> {
        if !lon.is_finite() || !lat.is_finite() || lat.abs() > 90.0 || lon.abs() > 360.0 {
            return Err(ProjError::OutOfDomain { lon, lat });
        }

        let point = self.project(lon, lat)?;
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(ProjError::Degenerate {
                transform: format!("{} -> {}", self.source, self.target),
                lon,
                lat,
            });
        }
        Ok(point)
    }

    fn target(&self) -> ReferenceSystem {
        self.target
    }
}

/// Spherical Web Mercator forward projection.
fn web_mercator(lon: f64, lat: f64) -> Result<GroundPoint> {
    if lat.abs() > WEB_MERCATOR_MAX_LAT {
        return Err(ProjError::OutOfDomain { lon, lat });
    }
    let x = WEB_MERCATOR_RADIUS * lon.to_radians();
    let y = WEB_MERCATOR_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    Ok(GroundPoint { x, y })
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoEnvelope {
    /// Western longitude.
    pub min_lon: f64,
    /// Southern latitude.
    pub min_lat: f64,
    /// Eastern longitude.
    pub max_lon: f64,
    /// Northern latitude.
    pub max_lat: f64,
}

/// Bounding box in target ground coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundEnvelope {
    /// Minimum easting.
    pub min_x: f64,
    /// Minimum northing.
    pub min_y: f64,
    /// Maximum easting.
    pub max_x: f64,
    /// Maximum northing.
    pub max_y: f64,
}

impl GroundEnvelope {
    /// Smallest envelope covering both.
    pub fn union(&self, other: &GroundEnvelope) -> GroundEnvelope {
        GroundEnvelope {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Project a geographic envelope through a transform.
///
/// Corners and edge midpoints are projected, since the image of a lon/lat box
/// is not rectangular in most projections. Points outside the projection
/// domain are ignored; returns `None` if none of them project.
pub fn project_envelope(
    transform: &dyn GroundTransform,
    envelope: &GeoEnvelope,
) -> Result<Option<GroundEnvelope>> {
    let mid_lon = (envelope.min_lon + envelope.max_lon) / 2.0;
    let mid_lat = (envelope.min_lat + envelope.max_lat) / 2.0;
    let probes = [
        (envelope.min_lon, envelope.min_lat),
        (envelope.min_lon, envelope.max_lat),
        (envelope.max_lon, envelope.min_lat),
        (envelope.max_lon, envelope.max_lat),
        (mid_lon, envelope.min_lat),
        (mid_lon, envelope.max_lat),
        (envelope.min_lon, mid_lat),
        (envelope.max_lon, mid_lat),
    ];

    let mut result: Option<GroundEnvelope> = None;
    for (lon, lat) in probes {
        let point = match transform.forward(lon, lat) {
            Ok(point) => point,
            Err(e) if e.is_sample_level() => continue,
            Err(e) => return Err(e),
        };
        let probe = GroundEnvelope {
            min_x: point.x,
            min_y: point.y,
            max_x: point.x,
            max_y: point.y,
        };
        result = Some(match result {
            Some(acc) => acc.union(&probe),
            None => probe,
        });
    }
    Ok(result)
}
