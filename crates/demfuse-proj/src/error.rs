//! Error types for the projection crate.

use thiserror::Error;

/// Errors that can occur when resolving reference systems or transforming coordinates.
#[derive(Debug, Error)]
pub enum ProjError {
    /// The reference system string could not be parsed or is not supported.
    #[error("Unsupported reference system: {0}")]
    UnsupportedReference(String),

    /// UTM zone outside 1..=60.
    #[error("Invalid UTM zone {0} (must be 1-60)")]
    InvalidUtmZone(u8),

    /// The source coordinates are not expressed in a system the transform can consume.
    #[error("Incompatible source reference {source_ref}: {reason}")]
    IncompatibleSource {
        /// Reference system of the source.
        source_ref: String,
        /// Why it cannot be used.
        reason: String,
    },

    /// Coordinate is outside the domain of the projection.
    #[error("Coordinate ({lon}, {lat}) is outside the projection domain")]
    OutOfDomain {
        /// Longitude in degrees.
        lon: f64,
        /// Latitude in degrees.
        lat: f64,
    },

    /// The transform produced a non-finite result for a valid input.
    #[error("Transform {transform} produced a non-finite result for ({lon}, {lat})")]
    Degenerate {
        /// Transform description.
        transform: String,
        /// Longitude in degrees.
        lon: f64,
        /// Latitude in degrees.
        lat: f64,
    },
}

impl ProjError {
    /// Whether this error only concerns a single coordinate.
    ///
    /// Sample-level errors are skipped by callers; everything else is fatal.
    pub fn is_sample_level(&self) -> bool {
        matches!(self, ProjError::OutOfDomain { .. })
    }
}
