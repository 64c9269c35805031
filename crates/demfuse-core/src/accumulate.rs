//! Accumulation Engine: scatters the samples of one worker assignment into a
//! private full-extent buffer pair.

use crate::config::PrescanConfig;
use crate::fusion::FusionMode;
use crate::grid::GridGeometry;
use crate::planner::{Tile, WorkerAssignment};
use crate::pool::CellBuffer;
use crate::source::SourceMap;
use crate::{FusionError, Result};
use demfuse_metrics::{metric_defs, SourceLabels};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Per-source sample accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Samples written into a cell.
    pub accepted: u64,
    /// Samples excluded by the mask.
    pub masked: u64,
    /// Samples with a non-finite component.
    pub non_finite: u64,
    /// Samples outside the altitude sanity bounds.
    pub altitude_bounds: u64,
    /// Samples the transform could not project.
    pub out_of_domain: u64,
    /// Samples projecting outside the output grid.
    pub outside_grid: u64,
    /// Tiles processed.
    pub tiles: u64,
}

impl SampleStats {
    /// Total number of skipped samples.
    pub fn skipped(&self) -> u64 {
        self.masked + self.non_finite + self.altitude_bounds + self.out_of_domain + self.outside_grid
    }

    /// Total number of samples seen.
    pub fn seen(&self) -> u64 {
        self.accepted + self.skipped()
    }

    /// Add another set of counters.
    pub fn add(&mut self, other: &SampleStats) {
        self.accepted += other.accepted;
        self.masked += other.masked;
        self.non_finite += other.non_finite;
        self.altitude_bounds += other.altitude_bounds;
        self.out_of_domain += other.out_of_domain;
        self.outside_grid += other.outside_grid;
        self.tiles += other.tiles;
    }

    /// Skip counts keyed by reason label.
    pub fn skip_reasons(&self) -> [(&'static str, u64); 5] {
        [
            ("masked", self.masked),
            ("non_finite", self.non_finite),
            ("altitude_bounds", self.altitude_bounds),
            ("out_of_domain", self.out_of_domain),
            ("outside_grid", self.outside_grid),
        ]
    }

    fn record(&self, labels: &SourceLabels) {
        let base = labels.to_labels();
        metrics::counter!(metric_defs::SAMPLES_ACCEPTED.name, &base[..]).increment(self.accepted);
        metrics::counter!(metric_defs::TILES_PROCESSED.name, &base[..]).increment(self.tiles);
        for (reason, count) in self.skip_reasons() {
            if count > 0 {
                let labels = labels.with_reason(reason);
                metrics::counter!(metric_defs::SAMPLES_SKIPPED.name, &labels[..]).increment(count);
            }
        }
    }
}

/// The private result of one worker, consumed by the merge stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult {
    /// Worker index.
    pub worker: usize,
    /// Full-extent (value, count) buffers.
    pub buffer: CellBuffer,
    /// Sample accounting indexed by source.
    pub stats: Vec<SampleStats>,
}

/// Read-only context shared by every worker of a run.
#[derive(Debug, Clone, Copy)]
pub struct Accumulator<'a> {
    sources: &'a [SourceMap],
    grid: &'a GridGeometry,
    mode: FusionMode,
    altitude_bounds: Option<PrescanConfig>,
}

impl<'a> Accumulator<'a> {
    /// Context for a run. Altitude bounds apply only when `prescan.enabled`.
    pub fn new(
        sources: &'a [SourceMap],
        grid: &'a GridGeometry,
        mode: FusionMode,
        prescan: &PrescanConfig,
    ) -> Self {
        Self {
            sources,
            grid,
            mode,
            altitude_bounds: prescan.enabled.then_some(*prescan),
        }
    }

    /// Scatter every tile of `assignment` into `buffer`.
    ///
    /// `buffer` must be freshly reset to the grid size for this mode.
    pub fn run(&self, assignment: &WorkerAssignment, mut buffer: CellBuffer) -> Result<PartialResult> {
        debug_assert_eq!(buffer.len(), self.grid.len());
        let mut stats = vec![SampleStats::default(); self.sources.len()];

        for tile in &assignment.tiles {
            let mut tile_stats = SampleStats::default();
            self.accumulate_tile(tile, &mut buffer, &mut tile_stats)?;
            tile_stats.tiles = 1;

            let source = &self.sources[tile.source];
            tile_stats.record(&SourceLabels::new(source.id(), self.mode.as_str()));
            trace!(
                "worker {} tile {:?} of {}: {} accepted, {} skipped",
                assignment.worker,
                tile.region,
                source.id(),
                tile_stats.accepted,
                tile_stats.skipped()
            );
            stats[tile.source].add(&tile_stats);
        }

        Ok(PartialResult {
            worker: assignment.worker,
            buffer,
            stats,
        })
    }

    fn accumulate_tile(&self, tile: &Tile, buffer: &mut CellBuffer, stats: &mut SampleStats) -> Result<()> {
        let index = tile.source;
        let source = self.sources.get(index).ok_or_else(|| {
            FusionError::InvalidConfig(format!("tile refers to unknown 3D map {}", index))
        })?;
        let read_error = |e: FusionError| FusionError::RasterRead {
            index,
            reason: e.to_string(),
        };

        for chunk in tile.chunks() {
            let points = source.points.read_region(&chunk).map_err(read_error)?;
            chunk.check_read(points.size()).map_err(read_error)?;

            let mask = match &source.mask {
                Some(mask) => {
                    let mask = mask.read_region(&chunk).map_err(read_error)?;
                    chunk.check_read(mask.size()).map_err(read_error)?;
                    Some(mask)
                }
                None => None,
            };
            let mask = mask.as_ref().map(|m| m.pixels());

            for (i, point) in points.pixels().iter().enumerate() {
                if mask.is_some_and(|m| m[i] == 0) {
                    stats.masked += 1;
                    continue;
                }
                if !point.is_finite() {
                    stats.non_finite += 1;
                    continue;
                }
                if let Some(bounds) = &self.altitude_bounds {
                    if !bounds.accepts(point.alt) {
                        stats.altitude_bounds += 1;
                        continue;
                    }
                }
                let ground = match source.transform.forward(point.lon, point.lat) {
                    Ok(ground) => ground,
                    Err(e) if e.is_sample_level() => {
                        stats.out_of_domain += 1;
                        continue;
                    }
                    Err(source) => return Err(FusionError::Transform { index, source }),
                };
                let Some(cell) = self.grid.cell_offset(ground.x, ground.y) else {
                    stats.outside_grid += 1;
                    continue;
                };
                self.mode.accumulate(&mut buffer.values[cell], &mut buffer.counts[cell], point.alt);
                stats.accepted += 1;
            }
        }
        Ok(())
    }
}
