//! Fusion run configuration.

use crate::fusion::FusionMode;
use crate::grid::checked_cell_count;
use crate::{FusionError, Result};
use serde::{Deserialize, Serialize};

/// Default no-data sentinel for untouched cells.
pub const DEFAULT_NO_DATA: f64 = -32768.0;

/// Default target reference system.
pub const DEFAULT_TARGET_REFERENCE: &str = "EPSG:4326";

/// Default maximum number of samples materialized per chunk (1 Mi samples, 24 MiB).
pub const DEFAULT_MAX_CHUNK_PIXELS: usize = 1 << 20;

/// Configuration of one fusion run.
///
/// ```
/// use demfuse_core::{FusionConfig, FusionMode};
///
/// let config: FusionConfig = serde_json::from_str(r#"{
///     "grid_step": 0.5,
///     "fusion_mode": "mean",
///     "target_reference": "EPSG:32631"
/// }"#).unwrap();
///
/// assert_eq!(config.fusion_mode, FusionMode::Mean);
/// assert_eq!(config.no_data_value, -32768.0);
/// assert!(!config.prescan.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Output cell size in target reference units.
    pub grid_step: f64,
    /// Policy for combining samples landing in the same cell.
    #[serde(default)]
    pub fusion_mode: FusionMode,
    /// Value written to cells no sample reached.
    #[serde(default = "default_no_data")]
    pub no_data_value: f64,
    /// Target reference system, e.g. `EPSG:32631`.
    #[serde(default = "default_target_reference")]
    pub target_reference: String,
    /// Explicit output extent; derived from the inputs when absent.
    #[serde(default)]
    pub extent: Option<GridExtent>,
    /// Number of accumulation workers; defaults to the rayon thread count.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Maximum number of samples read from a source at once.
    #[serde(default = "default_max_chunk_pixels")]
    pub max_chunk_pixels: usize,
    /// Optional range prescan.
    #[serde(default)]
    pub prescan: PrescanConfig,
}

fn default_no_data() -> f64 {
    DEFAULT_NO_DATA
}

fn default_target_reference() -> String {
    DEFAULT_TARGET_REFERENCE.to_string()
}

fn default_max_chunk_pixels() -> usize {
    DEFAULT_MAX_CHUNK_PIXELS
}

impl FusionConfig {
    /// Configuration with the given grid step and mode, everything else default.
    pub fn new(grid_step: f64, fusion_mode: FusionMode) -> Self {
        Self {
            grid_step,
            fusion_mode,
            no_data_value: DEFAULT_NO_DATA,
            target_reference: default_target_reference(),
            extent: None,
            workers: None,
            max_chunk_pixels: DEFAULT_MAX_CHUNK_PIXELS,
            prescan: PrescanConfig::default(),
        }
    }

    /// Set the no-data sentinel.
    pub fn with_no_data(mut self, no_data_value: f64) -> Self {
        self.no_data_value = no_data_value;
        self
    }

    /// Set the target reference system.
    pub fn with_target_reference(mut self, reference: impl Into<String>) -> Self {
        self.target_reference = reference.into();
        self
    }

    /// Fix the output extent instead of deriving it from the inputs.
    pub fn with_extent(mut self, extent: GridExtent) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Set the number of accumulation workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the streaming chunk size in samples.
    pub fn with_max_chunk_pixels(mut self, max_chunk_pixels: usize) -> Self {
        self.max_chunk_pixels = max_chunk_pixels;
        self
    }

    /// Enable the range prescan with altitude sanity bounds.
    pub fn with_prescan(mut self, min_altitude: f64, max_altitude: f64) -> Self {
        self.prescan = PrescanConfig {
            enabled: true,
            min_altitude,
            max_altitude,
        };
        self
    }

    /// Check every value that can be checked without the inputs.
    pub fn validate(&self) -> Result<()> {
        if !(self.grid_step.is_finite() && self.grid_step > 0.0) {
            return Err(FusionError::InvalidGridStep(self.grid_step));
        }
        if self.workers == Some(0) {
            return Err(FusionError::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.max_chunk_pixels == 0 {
            return Err(FusionError::InvalidConfig(
                "max_chunk_pixels must be at least 1".to_string(),
            ));
        }
        if let Some(extent) = &self.extent {
            extent.validate()?;
        }
        self.prescan.validate()
    }

    /// Worker count to use for this run.
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(rayon::current_num_threads).max(1)
    }
}

/// Explicit output grid placement.
///
/// The origin is the north-west corner of cell (0, 0); columns grow east and
/// rows grow south.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridExtent {
    /// Easting of the west edge.
    pub origin_x: f64,
    /// Northing of the north edge.
    pub origin_y: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl GridExtent {
    fn validate(&self) -> Result<()> {
        if !self.origin_x.is_finite() || !self.origin_y.is_finite() {
            return Err(FusionError::InvalidConfig(format!(
                "extent origin ({}, {}) must be finite",
                self.origin_x, self.origin_y
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FusionError::EmptyExtent(format!(
                "configured extent is {}x{}",
                self.width, self.height
            )));
        }
        if checked_cell_count(self.width, self.height).is_none() {
            return Err(FusionError::InvalidConfig(format!(
                "configured extent of {}x{} cells is too large",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Range prescan settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrescanConfig {
    /// Whether to scan sources and enforce the altitude bounds.
    pub enabled: bool,
    /// Lowest plausible altitude in meters.
    pub min_altitude: f64,
    /// Highest plausible altitude in meters.
    pub max_altitude: f64,
}

impl Default for PrescanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_altitude: -1_000.0,
            max_altitude: 10_000.0,
        }
    }
}

impl PrescanConfig {
    /// Whether an altitude is inside the sanity bounds.
    #[inline]
    pub fn accepts(&self, altitude: f64) -> bool {
        altitude >= self.min_altitude && altitude <= self.max_altitude
    }

    fn validate(&self) -> Result<()> {
        if !(self.min_altitude <= self.max_altitude) {
            return Err(FusionError::InvalidConfig(format!(
                "prescan altitude bounds [{}, {}] are empty",
                self.min_altitude, self.max_altitude
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_grid_step() {
        for step in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = FusionConfig::new(step, FusionMode::Mean).validate().unwrap_err();
            assert!(matches!(err, FusionError::InvalidGridStep(_)));
            assert!(err.is_configuration());
        }
        assert!(FusionConfig::new(0.25, FusionMode::Mean).validate().is_ok());
    }

    #[test]
    fn test_validate_workers_and_chunks() {
        let config = FusionConfig::new(1.0, FusionMode::Min).with_workers(0);
        assert!(config.validate().is_err());

        let config = FusionConfig::new(1.0, FusionMode::Min).with_max_chunk_pixels(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_extent() {
        let extent = GridExtent {
            origin_x: 0.0,
            origin_y: 2.0,
            width: 0,
            height: 2,
        };
        let config = FusionConfig::new(1.0, FusionMode::Min).with_extent(extent);
        assert!(matches!(config.validate(), Err(FusionError::EmptyExtent(_))));
    }

    #[test]
    fn test_validate_extent_too_large() {
        let extent = GridExtent {
            origin_x: 0.0,
            origin_y: 0.0,
            width: 1 << 32,
            height: 1 << 32,
        };
        let config = FusionConfig::new(1.0, FusionMode::Min).with_extent(extent);
        assert!(matches!(config.validate(), Err(FusionError::InvalidConfig(_))));

        let extent = GridExtent {
            width: usize::MAX,
            height: 1,
            ..extent
        };
        let config = FusionConfig::new(1.0, FusionMode::Min).with_extent(extent);
        assert!(matches!(config.validate(), Err(FusionError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_prescan_bounds() {
        let config = FusionConfig::new(1.0, FusionMode::Max).with_prescan(100.0, -100.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prescan_accepts() {
        let prescan = PrescanConfig::default();
        assert!(prescan.accepts(0.0));
        assert!(!prescan.accepts(-32768.0));
        assert!(!prescan.accepts(f64::NAN));
    }

    #[test]
    fn test_deserialize_requires_grid_step() {
        assert!(serde_json::from_str::<FusionConfig>(r#"{"fusion_mode": "max"}"#).is_err());
    }

    #[test]
    fn test_deserialize_full() {
        let config: FusionConfig = serde_json::from_str(
            r#"{
                "grid_step": 2.0,
                "fusion_mode": "acc",
                "no_data_value": -9999.0,
                "extent": {"origin_x": 10.0, "origin_y": 20.0, "width": 4, "height": 3},
                "workers": 8,
                "prescan": {"enabled": true, "max_altitude": 5000.0}
            }"#,
        )
        .unwrap();

        assert_eq!(config.fusion_mode, FusionMode::Accumulate);
        assert_eq!(config.effective_workers(), 8);
        assert_eq!(config.extent.unwrap().width, 4);
        assert!(config.prescan.enabled);
        assert_eq!(config.prescan.min_altitude, -1_000.0);
        assert_eq!(config.prescan.max_altitude, 5000.0);
        assert!(config.validate().is_ok());
    }
}
