//! Output grid geometry and the published DEM.

use crate::config::GridExtent;
use crate::fusion::FusionMode;
use demfuse_proj::{GroundEnvelope, ReferenceSystem};
use serde::{Deserialize, Serialize};

/// Largest cell count whose value buffer fits in one allocation.
const MAX_CELLS: usize = isize::MAX as usize / std::mem::size_of::<f64>();

/// Cell count of a `width` x `height` grid, or `None` if it cannot be allocated.
pub(crate) fn checked_cell_count(width: usize, height: usize) -> Option<usize> {
    width.checked_mul(height).filter(|&cells| cells <= MAX_CELLS)
}

/// Placement of a north-up grid in target coordinates.
///
/// Cell (col, row) covers `[origin_x + col * step, origin_x + (col + 1) * step)`
/// horizontally and `(origin_y - (row + 1) * step, origin_y - row * step]`
/// vertically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Easting of the west edge.
    pub origin_x: f64,
    /// Northing of the north edge.
    pub origin_y: f64,
    /// Cell size in target units.
    pub step: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl GridGeometry {
    /// Geometry of an explicit extent.
    pub fn from_extent(extent: &GridExtent, step: f64) -> Self {
        Self {
            origin_x: extent.origin_x,
            origin_y: extent.origin_y,
            step,
            width: extent.width,
            height: extent.height,
        }
    }

    /// Smallest grid anchored at the north-west corner of `envelope` that
    /// contains every point of it.
    pub fn covering(envelope: &GroundEnvelope, step: f64) -> Self {
        let cells = |span: f64| ((span / step).floor() as usize).saturating_add(1);
        Self {
            origin_x: envelope.min_x,
            origin_y: envelope.max_y,
            step,
            width: cells(envelope.max_x - envelope.min_x),
            height: cells(envelope.max_y - envelope.min_y),
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Whether the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signed pixel spacing (x, y).
    pub fn spacing(&self) -> (f64, f64) {
        (self.step, -self.step)
    }

    /// Cell containing a target coordinate; `None` outside the grid.
    #[inline]
    pub fn cell_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (sx, sy) = self.spacing();
        let col = ((x - self.origin_x) / sx).floor();
        let row = ((y - self.origin_y) / sy).floor();
        if col >= 0.0 && row >= 0.0 && col < self.width as f64 && row < self.height as f64 {
            Some((col as usize, row as usize))
        } else {
            None
        }
    }

    /// Linear offset of a target coordinate in row-major cell order.
    #[inline]
    pub fn cell_offset(&self, x: f64, y: f64) -> Option<usize> {
        self.cell_index(x, y).map(|(col, row)| row * self.width + col)
    }
}

/// The fused DEM: one finalized value and one sample count per cell.
///
/// Built once by the merge stage and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputGrid {
    geometry: GridGeometry,
    reference: ReferenceSystem,
    mode: FusionMode,
    no_data: f64,
    values: Vec<f64>,
    counts: Vec<u32>,
}

impl OutputGrid {
    pub(crate) fn new(
        geometry: GridGeometry,
        reference: ReferenceSystem,
        mode: FusionMode,
        no_data: f64,
        values: Vec<f64>,
        counts: Vec<u32>,
    ) -> Self {
        debug_assert_eq!(values.len(), geometry.len());
        debug_assert_eq!(counts.len(), geometry.len());
        Self {
            geometry,
            reference,
            mode,
            no_data,
            values,
            counts,
        }
    }

    /// Grid placement.
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Reference system of the grid coordinates.
    pub fn reference(&self) -> ReferenceSystem {
        self.reference
    }

    /// Fusion mode the values were produced with.
    pub fn mode(&self) -> FusionMode {
        self.mode
    }

    /// Sentinel of cells no sample reached.
    pub fn no_data(&self) -> f64 {
        self.no_data
    }

    /// Grid dimensions as (width, height).
    pub fn size(&self) -> (usize, usize) {
        (self.geometry.width, self.geometry.height)
    }

    /// Row-major cell values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Row-major contributing sample counts.
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Value of a cell, if inside the grid.
    pub fn value(&self, col: usize, row: usize) -> Option<f64> {
        self.offset(col, row).map(|i| self.values[i])
    }

    /// Sample count of a cell, if inside the grid.
    pub fn count(&self, col: usize, row: usize) -> Option<u32> {
        self.offset(col, row).map(|i| self.counts[i])
    }

    /// Whether no sample reached the cell. Cells outside the grid count as no-data.
    pub fn is_no_data(&self, col: usize, row: usize) -> bool {
        self.count(col, row).map_or(true, |c| c == 0)
    }

    /// Number of cells at least one sample reached.
    pub fn filled_cells(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    fn offset(&self, col: usize, row: usize) -> Option<usize> {
        (col < self.geometry.width && row < self.geometry.height)
            .then(|| row * self.geometry.width + col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_grid(width: usize, height: usize) -> GridGeometry {
        GridGeometry {
            origin_x: 0.0,
            origin_y: height as f64,
            step: 1.0,
            width,
            height,
        }
    }

    #[test]
    fn test_cell_index_north_up() {
        let grid = unit_grid(2, 2);
        assert_eq!(grid.cell_index(0.5, 1.5), Some((0, 0)));
        assert_eq!(grid.cell_index(1.5, 0.5), Some((1, 1)));
        assert_eq!(grid.cell_index(0.0, 2.0), Some((0, 0)));
    }

    #[test]
    fn test_cell_index_drops_outside() {
        let grid = unit_grid(2, 2);
        assert_eq!(grid.cell_index(-0.001, 1.0), None);
        assert_eq!(grid.cell_index(2.0, 1.0), None);
        assert_eq!(grid.cell_index(1.0, 2.001), None);
        assert_eq!(grid.cell_index(1.0, 0.0), None);
        assert_eq!(grid.cell_index(f64::NAN, 1.0), None);
    }

    #[test]
    fn test_covering_contains_envelope_edges() {
        let envelope = GroundEnvelope {
            min_x: 10.0,
            min_y: -4.0,
            max_x: 14.0,
            max_y: 0.0,
        };
        let grid = GridGeometry::covering(&envelope, 2.0);
        assert_eq!((grid.width, grid.height), (3, 3));
        assert_eq!(grid.cell_index(14.0, -4.0), Some((2, 2)));
        assert_eq!(grid.cell_index(10.0, 0.0), Some((0, 0)));
    }

    #[test]
    fn test_covering_single_point() {
        let envelope = GroundEnvelope {
            min_x: 3.0,
            min_y: 3.0,
            max_x: 3.0,
            max_y: 3.0,
        };
        let grid = GridGeometry::covering(&envelope, 0.5);
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.cell_index(3.0, 3.0), Some((0, 0)));
    }

    #[test]
    fn test_output_grid_accessors() {
        let grid = OutputGrid::new(
            unit_grid(2, 1),
            ReferenceSystem::Geographic,
            FusionMode::Max,
            -1.0,
            vec![4.0, -1.0],
            vec![1, 0],
        );
        assert_eq!(grid.value(0, 0), Some(4.0));
        assert_eq!(grid.count(1, 0), Some(0));
        assert!(grid.is_no_data(1, 0));
        assert!(!grid.is_no_data(0, 0));
        assert!(grid.is_no_data(5, 5));
        assert_eq!(grid.filled_cells(), 1);
    }
}
