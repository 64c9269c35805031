//! GeoTIFF and JSON outputs.

use crate::{Result, RunnerError};
use demfuse_core::{FusedDem, FusionMode, GridGeometry, OutputGrid, ReferenceSystem, RunReport};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::info;

/// ModelPixelScaleTag.
pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
/// ModelTiepointTag.
pub const TAG_MODEL_TIEPOINT: u16 = 33922;
/// GeoKeyDirectoryTag.
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
/// GDAL_NODATA.
pub const TAG_GDAL_NODATA: u16 = 42113;

/// GeoTIFF georeferencing of a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTags {
    /// Cell size (x, y, z).
    pub pixel_scale: [f64; 3],
    /// Raster (0, 0, 0) tied to the north-west corner.
    pub tiepoint: [f64; 6],
    /// Key directory declaring the model type and EPSG code.
    pub geo_keys: Vec<u16>,
    /// No-data value as GDAL expects it, in ASCII.
    pub no_data: String,
}

impl GeoTags {
    /// Tags of an output grid.
    pub fn for_grid(geometry: &GridGeometry, reference: ReferenceSystem, no_data: f64) -> Self {
        Self {
            pixel_scale: [geometry.step, geometry.step, 0.0],
            tiepoint: [0.0, 0.0, 0.0, geometry.origin_x, geometry.origin_y, 0.0],
            geo_keys: geo_key_directory(reference),
            no_data: no_data.to_string(),
        }
    }
}

/// GeoKeyDirectory with GTModelType, GTRasterType (pixel is area) and the EPSG code.
pub fn geo_key_directory(reference: ReferenceSystem) -> Vec<u16> {
    let (model_type, cs_key) = if reference.is_geographic() {
        (2, 2048)
    } else {
        (1, 3072)
    };
    // 32767 is "user-defined" in GeoTIFF
    let code = u16::try_from(reference.epsg()).unwrap_or(32767);
    vec![
        1, 1, 0, 3, //
        1024, 0, 1, model_type, //
        1025, 0, 1, 1, //
        cs_key, 0, 1, code,
    ]
}

fn dimensions(grid: &OutputGrid) -> Result<(u32, u32)> {
    let (width, height) = grid.size();
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(RunnerError::GridTooLarge { width, height }),
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(RunnerError::io(parent))?;
    }
    let file = File::create(path).map_err(RunnerError::io(path))?;
    Ok(BufWriter::new(file))
}

/// Write the fused values as a single-band 64-bit float GeoTIFF.
pub fn write_dem_tiff(path: impl AsRef<Path>, grid: &OutputGrid) -> Result<()> {
    let path = path.as_ref();
    let (width, height) = dimensions(grid)?;
    let tags = GeoTags::for_grid(grid.geometry(), grid.reference(), grid.no_data());

    let mut encoder = TiffEncoder::new(create(path)?)?;
    let mut image = encoder.new_image::<colortype::Gray64Float>(width, height)?;
    let dir = image.encoder();
    dir.write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &tags.pixel_scale[..])?;
    dir.write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), &tags.tiepoint[..])?;
    dir.write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), &tags.geo_keys[..])?;
    dir.write_tag(Tag::Unknown(TAG_GDAL_NODATA), tags.no_data.as_str())?;
    image.write_data(grid.values())?;

    info!("Wrote {}x{} DEM to {:?}", width, height, path);
    Ok(())
}

/// Write the per-cell sample counts as a single-band 32-bit GeoTIFF.
pub fn write_counts_tiff(path: impl AsRef<Path>, grid: &OutputGrid) -> Result<()> {
    let path = path.as_ref();
    let (width, height) = dimensions(grid)?;
    let tags = GeoTags::for_grid(grid.geometry(), grid.reference(), grid.no_data());

    let mut encoder = TiffEncoder::new(create(path)?)?;
    let mut image = encoder.new_image::<colortype::Gray32>(width, height)?;
    let dir = image.encoder();
    dir.write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &tags.pixel_scale[..])?;
    dir.write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), &tags.tiepoint[..])?;
    dir.write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), &tags.geo_keys[..])?;
    image.write_data(grid.counts())?;

    info!("Wrote {}x{} count grid to {:?}", width, height, path);
    Ok(())
}

/// JSON sidecar describing a fused DEM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    /// Reference system, as `EPSG:n`.
    pub reference: String,
    /// Fusion mode of the values.
    pub mode: FusionMode,
    /// No-data value of untouched cells.
    pub no_data: f64,
    /// Grid placement.
    pub grid: GridGeometry,
    /// Cells at least one sample reached.
    pub filled_cells: usize,
    /// Run diagnostics.
    pub report: RunReport,
}

impl Sidecar {
    /// Sidecar of a finished run.
    pub fn new(dem: &FusedDem) -> Self {
        Self {
            reference: dem.grid.reference().to_string(),
            mode: dem.grid.mode(),
            no_data: dem.grid.no_data(),
            grid: *dem.grid.geometry(),
            filled_cells: dem.grid.filled_cells(),
            report: dem.report.clone(),
        }
    }
}

/// Write the JSON sidecar.
pub fn write_sidecar(path: impl AsRef<Path>, dem: &FusedDem) -> Result<()> {
    let path = path.as_ref();
    let writer = create(path)?;
    serde_json::to_writer_pretty(writer, &Sidecar::new(dem))?;
    Ok(())
}
