//! # demfuse-core
//!
//! Fuses N 3D maps (per-pixel longitude, latitude, altitude rasters, each
//! with an optional validity mask) into one regular DEM grid.
//!
//! ## Overview
//!
//! A run goes through these stages:
//! - **Transform Manager** validates the inputs and builds one forward
//!   transform per map towards the target reference system.
//! - **Range Prescanner** optionally computes per-band min/max of every map,
//!   to derive the output extent and to flag sentinel altitudes.
//! - **Tile Planner** places the output grid and splits every map into
//!   balanced row strips, one per worker.
//! - **Accumulation** runs one task per worker on a rayon pool. Each task
//!   scatters its samples into a private buffer pair covering the whole grid.
//! - **Merge** folds the private buffers in worker order and finalizes every
//!   cell under the fusion mode (`min`, `max`, `mean` or `acc`).
//!
//! Cells no sample reached hold the configured no-data value.
//!
//! ## Example
//!
//! ```
//! use demfuse_core::{
//!     DemFusionEngine, FusionConfig, FusionInputs, FusionMode, GridExtent, MapPoint, Raster,
//!     SourceGeometry,
//! };
//!
//! let config = FusionConfig::new(1.0, FusionMode::Mean).with_extent(GridExtent {
//!     origin_x: 0.0,
//!     origin_y: 2.0,
//!     width: 2,
//!     height: 2,
//! });
//!
//! let mut inputs = FusionInputs::new();
//! let a = Raster::new(1, 1, vec![MapPoint::new(0.5, 1.5, 5.0)])?;
//! let b = Raster::new(2, 1, vec![MapPoint::new(0.5, 1.5, 7.0), MapPoint::new(1.5, 0.5, 3.0)])?;
//! inputs.add_source("a", Box::new(a), None, SourceGeometry::wgs84());
//! inputs.add_source("b", Box::new(b), None, SourceGeometry::wgs84());
//!
//! let dem = DemFusionEngine::new(config, inputs).run()?;
//! assert_eq!(dem.grid.value(0, 0), Some(6.0));
//! assert_eq!(dem.grid.count(0, 0), Some(2));
//! assert_eq!(dem.grid.value(1, 1), Some(3.0));
//! assert!(dem.grid.is_no_data(1, 0));
//! # Ok::<(), demfuse_core::FusionError>(())
//! ```

mod accumulate;
mod config;
mod engine;
mod error;
mod fusion;
mod grid;
mod merge;
mod planner;
mod pool;
mod prescan;
mod raster;
mod source;
mod transforms;

pub use accumulate::{Accumulator, PartialResult, SampleStats};
pub use config::{
    FusionConfig, GridExtent, PrescanConfig, DEFAULT_MAX_CHUNK_PIXELS, DEFAULT_NO_DATA,
    DEFAULT_TARGET_REFERENCE,
};
pub use engine::{DemFusionEngine, EngineState, FusedDem, RunReport, SourceReport};
pub use error::FusionError;
pub use fusion::FusionMode;
pub use grid::{GridGeometry, OutputGrid};
pub use merge::{MergeOutput, MergeStage};
pub use planner::{Tile, TilePlanner, WorkPlan, WorkerAssignment};
pub use pool::{BufferPool, CellBuffer};
pub use prescan::{BandRanges, RangePrescanner};
pub use raster::{MapPoint, MapSource, MaskSource, Raster, RasterSource, Region};
pub use source::{FusionInputs, SourceGeometry, SourceMap};
pub use transforms::TransformManager;

pub use demfuse_proj::{GroundPoint, GroundTransform, ProjError, ReferenceSystem};

/// Result type for fusion operations.
pub type Result<T> = std::result::Result<T, FusionError>;
