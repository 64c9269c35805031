//! Tile Planner: balanced per-source strips and the output grid placement.

use crate::config::FusionConfig;
use crate::grid::{checked_cell_count, GridGeometry};
use crate::raster::Region;
use crate::source::SourceMap;
use crate::{FusionError, Result};
use demfuse_proj::{project_envelope, GroundEnvelope};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One strip of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Source index.
    pub source: usize,
    /// Pixel region of the source raster.
    pub region: Region,
    /// Rows materialized at once while streaming the region.
    pub chunk_rows: usize,
}

impl Tile {
    /// The region split into the bounded chunks a worker reads one at a time.
    pub fn chunks(&self) -> impl Iterator<Item = Region> + '_ {
        self.region.row_chunks(self.chunk_rows)
    }
}

/// Everything one worker processes: at most one tile per source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    /// Worker index, also the merge order.
    pub worker: usize,
    /// Tiles in source order.
    pub tiles: Vec<Tile>,
}

impl WorkerAssignment {
    /// Number of samples covered by the assignment.
    pub fn pixel_count(&self) -> usize {
        self.tiles.iter().map(|t| t.region.pixel_count()).sum()
    }
}

/// Output grid plus the worker assignments of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkPlan {
    /// Output grid placement.
    pub grid: GridGeometry,
    /// One entry per worker that has work.
    pub assignments: Vec<WorkerAssignment>,
}

/// Splits sources into strips and places the output grid.
#[derive(Debug, Clone, Copy)]
pub struct TilePlanner {
    workers: usize,
    max_chunk_pixels: usize,
}

impl TilePlanner {
    /// Planner for `workers` workers streaming at most `max_chunk_pixels` samples at once.
    pub fn new(workers: usize, max_chunk_pixels: usize) -> Self {
        Self {
            workers: workers.max(1),
            max_chunk_pixels: max_chunk_pixels.max(1),
        }
    }

    /// Split a `width` x `height` raster into at most `workers` horizontal
    /// strips whose row counts differ by at most one.
    pub fn split(&self, width: usize, height: usize) -> Vec<Region> {
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let strips = self.workers.min(height);
        let base = height / strips;
        let extra = height % strips;

        let mut regions = Vec::with_capacity(strips);
        let mut y = 0;
        for i in 0..strips {
            let rows = base + usize::from(i < extra);
            regions.push(Region::new(0, y, width, rows));
            y += rows;
        }
        regions
    }

    /// Rows per streamed chunk for a raster of the given width.
    pub fn chunk_rows(&self, width: usize) -> usize {
        (self.max_chunk_pixels / width.max(1)).max(1)
    }

    /// Assign strip `i` of every source to worker `i`.
    ///
    /// Sources are split independently, so a small source may contribute to
    /// fewer workers than a large one. Workers without any tile are omitted.
    pub fn assign(&self, sources: &[SourceMap]) -> Vec<WorkerAssignment> {
        let mut assignments: Vec<WorkerAssignment> = (0..self.workers)
            .map(|worker| WorkerAssignment {
                worker,
                tiles: Vec::new(),
            })
            .collect();

        for (index, source) in sources.iter().enumerate() {
            let (width, height) = source.size();
            let chunk_rows = self.chunk_rows(width);
            let strips = self.split(width, height);
            debug!(
                "3D map {} ({}): {} strips, {} rows per chunk",
                index,
                source.id(),
                strips.len(),
                chunk_rows
            );
            for (worker, region) in strips.into_iter().enumerate() {
                assignments[worker].tiles.push(Tile {
                    source: index,
                    region,
                    chunk_rows,
                });
            }
        }

        assignments.retain(|a| !a.tiles.is_empty());
        assignments
    }

    /// Place the output grid.
    ///
    /// An explicit extent is used as is. Otherwise every source must carry
    /// band ranges; their lon/lat boxes are projected and merged.
    pub fn output_grid(&self, config: &FusionConfig, sources: &[SourceMap]) -> Result<GridGeometry> {
        if let Some(extent) = &config.extent {
            return Ok(GridGeometry::from_extent(extent, config.grid_step));
        }

        let mut envelope: Option<GroundEnvelope> = None;
        for (index, source) in sources.iter().enumerate() {
            let ranges = source.ranges().ok_or_else(|| {
                FusionError::InvalidConfig(format!(
                    "3D map {} has no band ranges and no extent is configured",
                    index
                ))
            })?;
            let Some(geo) = ranges.geo_envelope() else {
                debug!("3D map {} has no valid samples, ignored for the extent", index);
                continue;
            };
            let projected = project_envelope(source.transform(), &geo)
                .map_err(|source| FusionError::Transform { index, source })?;
            if let Some(projected) = projected {
                envelope = Some(match envelope {
                    Some(acc) => acc.union(&projected),
                    None => projected,
                });
            }
        }

        let envelope = envelope.ok_or_else(|| {
            FusionError::EmptyExtent("no valid sample projects into the target system".to_string())
        })?;
        let spans_finite = [envelope.min_x, envelope.min_y, envelope.max_x, envelope.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !spans_finite {
            return Err(FusionError::EmptyExtent(format!(
                "projected envelope is not finite: {:?}",
                envelope
            )));
        }

        let grid = GridGeometry::covering(&envelope, config.grid_step);
        if checked_cell_count(grid.width, grid.height).is_none() {
            return Err(FusionError::InvalidConfig(format!(
                "grid of {}x{} cells is too large for grid step {}",
                grid.width, grid.height, config.grid_step
            )));
        }
        Ok(grid)
    }
}
