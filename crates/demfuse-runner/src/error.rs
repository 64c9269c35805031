//! Error types for the runner.

use demfuse_core::FusionError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading inputs, fusing, or writing outputs.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// I/O error on a file.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The run file is not valid YAML or does not match the expected layout.
    #[error("Invalid run file {path}: {source}")]
    RunFile {
        /// Run file path.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A raster file is not valid JSON.
    #[error("Invalid raster file {path}: {source}")]
    RasterFile {
        /// Raster file path.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A raster file parsed but its contents are inconsistent.
    #[error("Invalid raster {path}: {source}")]
    Raster {
        /// Raster file path.
        path: PathBuf,
        /// Validation error.
        #[source]
        source: FusionError,
    },

    /// The fusion run failed.
    #[error("Fusion failed: {0}")]
    Fusion(#[from] FusionError),

    /// TIFF encoding error.
    #[error("TIFF encode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// YAML encoding error.
    #[error("YAML encode error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encoding error.
    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),

    /// The grid is too large for the TIFF writer.
    #[error("Grid of {width}x{height} cells exceeds TIFF dimensions")]
    GridTooLarge {
        /// Grid width.
        width: usize,
        /// Grid height.
        height: usize,
    },
}

impl RunnerError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> RunnerError {
        let path = path.into();
        move |source| RunnerError::Io { path, source }
    }
}
