//! Source maps and the parallel input arrays they are assembled from.

use crate::prescan::BandRanges;
use crate::raster::{MapSource, MaskSource};
use crate::{FusionError, Result};
use demfuse_proj::GroundTransform;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Geometric metadata of a 3D map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGeometry {
    /// Reference system of the longitude/latitude bands.
    pub reference: String,
}

impl SourceGeometry {
    /// Metadata for a map in the given reference system.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }

    /// Metadata for a map in WGS84 longitude/latitude.
    pub fn wgs84() -> Self {
        Self::new("EPSG:4326")
    }
}

/// One 3D map as supplied by the caller.
pub(crate) struct MapInput {
    pub(crate) id: String,
    pub(crate) points: Box<MapSource>,
    pub(crate) ranges: Option<BandRanges>,
    pub(crate) transform: Option<Box<dyn GroundTransform>>,
}

/// The caller-facing input arrays: N maps, and masks and metadata indexed like them.
///
/// Masks and metadata are validated against the number of maps when the
/// transforms are built, not when they are added.
#[derive(Default)]
pub struct FusionInputs {
    pub(crate) maps: Vec<MapInput>,
    pub(crate) masks: Vec<Option<Box<MaskSource>>>,
    pub(crate) geometries: Vec<Option<SourceGeometry>>,
}

impl FusionInputs {
    /// Empty inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of 3D maps (N).
    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    /// Append a 3D map together with its mask and metadata.
    pub fn add_source(
        &mut self,
        id: impl Into<String>,
        points: Box<MapSource>,
        mask: Option<Box<MaskSource>>,
        geometry: SourceGeometry,
    ) -> usize {
        self.add_map(id, points);
        self.masks.push(mask);
        self.geometries.push(Some(geometry));
        self.maps.len() - 1
    }

    /// Append a 3D map only; masks and metadata are supplied separately.
    pub fn add_map(&mut self, id: impl Into<String>, points: Box<MapSource>) -> usize {
        self.maps.push(MapInput {
            id: id.into(),
            points,
            ranges: None,
            transform: None,
        });
        self.maps.len() - 1
    }

    /// Replace the mask array. An empty array means no masks.
    pub fn set_masks(&mut self, masks: Vec<Option<Box<MaskSource>>>) {
        self.masks = masks;
    }

    /// Replace the metadata array.
    pub fn set_geometries(&mut self, geometries: Vec<Option<SourceGeometry>>) {
        self.geometries = geometries;
    }

    /// Attach precomputed band ranges to a map so the prescan skips it.
    pub fn set_ranges(&mut self, index: usize, ranges: BandRanges) -> Result<()> {
        self.map_mut(index)?.ranges = Some(ranges);
        Ok(())
    }

    /// Use a caller-supplied transform for a map instead of building one from metadata.
    pub fn set_transform(&mut self, index: usize, transform: Box<dyn GroundTransform>) -> Result<()> {
        self.map_mut(index)?.transform = Some(transform);
        Ok(())
    }

    fn map_mut(&mut self, index: usize) -> Result<&mut MapInput> {
        let count = self.maps.len();
        self.maps.get_mut(index).ok_or_else(|| {
            FusionError::InvalidConfig(format!("3D map index {} out of range (N = {})", index, count))
        })
    }
}

impl fmt::Debug for FusionInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FusionInputs")
            .field("maps", &self.maps.iter().map(|m| m.id.as_str()).collect::<Vec<_>>())
            .field("masks", &self.masks.len())
            .field("geometries", &self.geometries)
            .finish()
    }
}

/// A validated 3D map with its transform, ready for a run.
pub struct SourceMap {
    pub(crate) id: String,
    pub(crate) points: Box<MapSource>,
    pub(crate) mask: Option<Box<MaskSource>>,
    pub(crate) transform: Box<dyn GroundTransform>,
    pub(crate) ranges: Option<BandRanges>,
}

impl SourceMap {
    /// Source identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raster dimensions as (width, height).
    pub fn size(&self) -> (usize, usize) {
        self.points.size()
    }

    /// Whether a validity mask is attached.
    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    /// Band ranges, if prescanned or supplied.
    pub fn ranges(&self) -> Option<&BandRanges> {
        self.ranges.as_ref()
    }

    /// The forward transform of this map.
    pub fn transform(&self) -> &dyn GroundTransform {
        self.transform.as_ref()
    }
}

impl fmt::Debug for SourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMap")
            .field("id", &self.id)
            .field("size", &self.size())
            .field("has_mask", &self.has_mask())
            .field("transform", &self.transform)
            .field("ranges", &self.ranges)
            .finish()
    }
}
