//! # demfuse-runner
//!
//! Loads a YAML run file and its JSON rasters, fuses them with
//! [`demfuse_core::DemFusionEngine`], and writes the result as GeoTIFF.

mod error;
pub mod raster_io;
mod run_file;
pub mod writer;

pub use error::RunnerError;
pub use run_file::{OutputPaths, Overrides, RunFile, SourceEntry};
pub use writer::{write_counts_tiff, write_dem_tiff, write_sidecar, Sidecar};

use demfuse_core::{DemFusionEngine, FusedDem, FusionInputs, MaskSource, SourceGeometry};
use tracing::{debug, info};

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Load every source of a run file into fusion inputs.
pub fn load_inputs(run: &RunFile) -> Result<FusionInputs> {
    let mut inputs = FusionInputs::new();
    for source in &run.sources {
        let id = source.id();
        let points = raster_io::load_map(&source.points)?;
        let mask = match &source.mask {
            Some(path) => Some(Box::new(raster_io::load_mask(path)?) as Box<MaskSource>),
            None => None,
        };
        let (width, height) = points.size();
        debug!(
            "Loaded {} from {:?}: {}x{}, mask={}",
            id,
            source.points,
            width,
            height,
            mask.is_some()
        );
        inputs.add_source(id, Box::new(points), mask, SourceGeometry::new(source.reference.as_str()));
    }
    Ok(inputs)
}

/// Fuse the sources of a run file and write every configured output.
pub fn execute(run: &RunFile) -> Result<FusedDem> {
    let inputs = load_inputs(run)?;
    let mut engine = DemFusionEngine::new(run.fusion.clone(), inputs);
    let dem = engine.run()?;

    write_dem_tiff(&run.output.dem, &dem.grid)?;
    if let Some(path) = &run.output.counts {
        write_counts_tiff(path, &dem.grid)?;
    }
    if let Some(path) = &run.output.report {
        write_sidecar(path, &dem)?;
        info!("Wrote run report to {:?}", path);
    }
    Ok(dem)
}
