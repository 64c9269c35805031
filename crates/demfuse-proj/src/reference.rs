//! Reference system identifiers.
//!
//! WGS84, Web Mercator and the WGS84 UTM zones are named variants so they can
//! be matched on and written without a lookup. Any other EPSG code is accepted
//! when proj4rs knows its definition.

use crate::{ProjError, Result};
use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// EPSG code for WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// EPSG code for spherical Web Mercator.
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// A resolved reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReferenceSystem {
    /// WGS84 longitude/latitude in degrees.
    Geographic,
    /// Spherical Web Mercator in meters.
    WebMercator,
    /// WGS84 Universal Transverse Mercator in meters.
    Utm {
        /// Zone number (1-60).
        zone: u8,
        /// Northern hemisphere (false adds the 10 000 km false northing).
        north: bool,
    },
    /// Any other EPSG system with a proj4rs definition.
    Epsg {
        /// EPSG code.
        code: u16,
        /// Coordinates are angular degrees.
        geographic: bool,
    },
}

impl ReferenceSystem {
    /// Build a UTM reference, validating the zone number.
    pub fn utm(zone: u8, north: bool) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(ProjError::InvalidUtmZone(zone));
        }
        Ok(ReferenceSystem::Utm { zone, north })
    }

    /// Resolve a reference system from its EPSG code.
    ///
    /// Codes without a named variant are looked up in the proj4rs definitions.
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            EPSG_WGS84 => Ok(ReferenceSystem::Geographic),
            EPSG_WEB_MERCATOR => Ok(ReferenceSystem::WebMercator),
            32601..=32660 => Self::utm((code - 32600) as u8, true),
            32701..=32760 => Self::utm((code - 32700) as u8, false),
            _ => {
                let code = u16::try_from(code)
                    .map_err(|_| ProjError::UnsupportedReference(format!("EPSG:{}", code)))?;
                let proj = definition(code)?;
                Ok(ReferenceSystem::Epsg {
                    code,
                    geographic: proj.is_latlong(),
                })
            }
        }
    }

    /// The EPSG code of this reference system.
    pub fn epsg(&self) -> u32 {
        match *self {
            ReferenceSystem::Geographic => EPSG_WGS84,
            ReferenceSystem::WebMercator => EPSG_WEB_MERCATOR,
            ReferenceSystem::Utm { zone, north: true } => 32600 + zone as u32,
            ReferenceSystem::Utm { zone, north: false } => 32700 + zone as u32,
            ReferenceSystem::Epsg { code, .. } => code as u32,
        }
    }

    /// Whether coordinates are angular (degrees) rather than projected meters.
    pub fn is_geographic(&self) -> bool {
        match *self {
            ReferenceSystem::Geographic => true,
            ReferenceSystem::Epsg { geographic, .. } => geographic,
            ReferenceSystem::WebMercator | ReferenceSystem::Utm { .. } => false,
        }
    }

    /// The proj4rs projection for this system.
    pub(crate) fn proj(&self) -> Result<Proj> {
        let code = u16::try_from(self.epsg())
            .map_err(|_| ProjError::UnsupportedReference(self.to_string()))?;
        definition(code)
    }
}

fn definition(code: u16) -> Result<Proj> {
    Proj::from_epsg_code(code)
        .map_err(|e| ProjError::UnsupportedReference(format!("EPSG:{} ({:?})", code, e)))
}

impl fmt::Display for ReferenceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for ReferenceSystem {
    type Err = ProjError;

    /// Accepts `EPSG:<code>`, a bare code, `WGS84`, `WEBMERCATOR` and `UTM:<zone><N|S>`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let unsupported = || ProjError::UnsupportedReference(trimmed.to_string());

        match upper.as_str() {
            "WGS84" | "WGS 84" | "LONLAT" => return Ok(ReferenceSystem::Geographic),
            "WEBMERCATOR" | "WEB_MERCATOR" => return Ok(ReferenceSystem::WebMercator),
            _ => {}
        }

        if let Some(rest) = upper.strip_prefix("UTM:") {
            let hemisphere = rest.chars().last().ok_or_else(unsupported)?;
            let north = match hemisphere {
                'N' => true,
                'S' => false,
                _ => return Err(unsupported()),
            };
            let zone: u8 = rest[..rest.len() - 1].parse().map_err(|_| unsupported())?;
            return Self::utm(zone, north);
        }

        let code = upper.strip_prefix("EPSG:").unwrap_or(&upper);
        let code: u32 = code.parse().map_err(|_| unsupported())?;
        Self::from_epsg(code)
    }
}

impl TryFrom<String> for ReferenceSystem {
    type Error = ProjError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ReferenceSystem> for String {
    fn from(value: ReferenceSystem) -> Self {
        value.to_string()
    }
}
