//! Error types for the fusion engine.

use crate::engine::EngineState;
use demfuse_proj::ProjError;
use thiserror::Error;

/// Errors that can abort a fusion run.
///
/// Sample-level anomalies (masked pixels, out-of-grid coordinates, sentinel
/// altitudes) are never reported here; they are counted in the run report.
#[derive(Debug, Error)]
pub enum FusionError {
    /// An input array does not match the number of 3D maps.
    #[error("Expected {expected} {kind} entries (one per 3D map), got {actual}")]
    SourceCountMismatch {
        /// Which input array is wrong ("mask", "geometry").
        kind: &'static str,
        /// Number of 3D maps.
        expected: usize,
        /// Number of entries supplied.
        actual: usize,
    },

    /// No 3D map was supplied.
    #[error("At least one 3D map is required")]
    NoSources,

    /// Geometric metadata missing for a source.
    #[error("Missing geometric metadata for 3D map {index}")]
    MissingGeometry {
        /// Source index.
        index: usize,
    },

    /// Mask footprint differs from its 3D map.
    #[error("Mask of 3D map {index} is {mask_width}x{mask_height}, map is {width}x{height}")]
    MaskSizeMismatch {
        /// Source index.
        index: usize,
        /// Map width.
        width: usize,
        /// Map height.
        height: usize,
        /// Mask width.
        mask_width: usize,
        /// Mask height.
        mask_height: usize,
    },

    /// Grid step is not a positive finite number.
    #[error("Invalid DEM grid step {0} (must be finite and > 0)")]
    InvalidGridStep(f64),

    /// Another configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reference system could not be resolved or is incompatible.
    #[error("Reference system error for {context}: {source}")]
    Reference {
        /// What was being resolved ("target", "3D map 2").
        context: String,
        /// Underlying projection error.
        #[source]
        source: ProjError,
    },

    /// The output extent is empty (no sample projects into the target system).
    #[error("Output extent is empty: {0}")]
    EmptyExtent(String),

    /// A raster region request fell outside the raster.
    #[error("Region {x},{y} {width}x{height} is outside a {raster_width}x{raster_height} raster")]
    RegionOutOfBounds {
        /// Region column.
        x: usize,
        /// Region row.
        y: usize,
        /// Region width.
        width: usize,
        /// Region height.
        height: usize,
        /// Raster width.
        raster_width: usize,
        /// Raster height.
        raster_height: usize,
    },

    /// A raster provider failed to deliver data.
    #[error("Failed to read 3D map {index}: {reason}")]
    RasterRead {
        /// Source index.
        index: usize,
        /// Provider-specific reason.
        reason: String,
    },

    /// A transform failed in a way that is not specific to one sample.
    #[error("Transform of 3D map {index} failed: {source}")]
    Transform {
        /// Source index.
        index: usize,
        /// Underlying projection error.
        #[source]
        source: ProjError,
    },

    /// An accumulation worker failed; the whole run is aborted.
    #[error("Worker {worker} failed: {source}")]
    WorkerFailed {
        /// Worker index.
        worker: usize,
        /// The failure.
        #[source]
        source: Box<FusionError>,
    },

    /// The worker thread pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// An operation was called in the wrong engine state.
    #[error("Operation requires engine state {expected:?}, engine is {actual:?}")]
    InvalidState {
        /// State the operation needs.
        expected: EngineState,
        /// Current state.
        actual: EngineState,
    },
}

impl FusionError {
    /// Whether this error is a configuration error raised before any parallel work.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FusionError::SourceCountMismatch { .. }
                | FusionError::NoSources
                | FusionError::MissingGeometry { .. }
                | FusionError::MaskSizeMismatch { .. }
                | FusionError::InvalidGridStep(_)
                | FusionError::InvalidConfig(_)
                | FusionError::Reference { .. }
                | FusionError::EmptyExtent(_)
        )
    }
}
