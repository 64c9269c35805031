//! Merge Stage: folds the per-worker partial results into the published grid.

use crate::accumulate::{PartialResult, SampleStats};
use crate::fusion::FusionMode;
use crate::grid::{GridGeometry, OutputGrid};
use crate::pool::BufferPool;
use demfuse_metrics::metric_defs;
use demfuse_proj::ReferenceSystem;
use std::time::Instant;
use tracing::debug;

/// Single-threaded fold of partial results.
#[derive(Debug, Clone, Copy)]
pub struct MergeStage {
    geometry: GridGeometry,
    reference: ReferenceSystem,
    mode: FusionMode,
    no_data: f64,
}

/// Merged grid plus per-source accounting summed over workers.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutput {
    /// Finalized grid.
    pub grid: OutputGrid,
    /// Sample accounting indexed by source.
    pub stats: Vec<SampleStats>,
}

impl MergeStage {
    /// Merge stage for one grid.
    pub fn new(geometry: GridGeometry, reference: ReferenceSystem, mode: FusionMode, no_data: f64) -> Self {
        Self {
            geometry,
            reference,
            mode,
            no_data,
        }
    }

    /// Fold `partials` in worker order and finalize every cell.
    ///
    /// Consumed buffers are returned to `pool`.
    pub fn merge(&self, mut partials: Vec<PartialResult>, source_count: usize, pool: &BufferPool) -> MergeOutput {
        let started = Instant::now();
        let len = self.geometry.len();
        partials.sort_by_key(|p| p.worker);

        let mut stats = vec![SampleStats::default(); source_count];
        let mut parts = partials.into_iter();
        let mut acc = match parts.next() {
            Some(first) => {
                add_stats(&mut stats, &first.stats);
                first.buffer
            }
            None => pool.acquire(len, self.mode),
        };

        for partial in parts {
            debug_assert_eq!(partial.buffer.len(), len);
            for (cell, (&value, &count)) in partial
                .buffer
                .values
                .iter()
                .zip(&partial.buffer.counts)
                .enumerate()
            {
                self.mode.combine(&mut acc.values[cell], &mut acc.counts[cell], value, count);
            }
            add_stats(&mut stats, &partial.stats);
            pool.release(partial.buffer);
        }

        for (value, &count) in acc.values.iter_mut().zip(&acc.counts) {
            *value = self.mode.finalize(*value, count, self.no_data);
        }

        let grid = OutputGrid::new(
            self.geometry,
            self.reference,
            self.mode,
            self.no_data,
            acc.values,
            acc.counts,
        );

        let filled = grid.filled_cells();
        let labels = [("mode", self.mode.as_str().to_string())];
        metrics::gauge!(metric_defs::CELLS_FILLED.name, &labels).set(filled as f64);
        metrics::gauge!(metric_defs::CELLS_EMPTY.name, &labels).set((len - filled) as f64);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!(metric_defs::MERGE_TIME.name, &labels).record(elapsed_ms);
        debug!("merged {} cells, {} filled, in {:.1} ms", len, filled, elapsed_ms);

        MergeOutput { grid, stats }
    }
}

fn add_stats(total: &mut [SampleStats], partial: &[SampleStats]) {
    for (t, p) in total.iter_mut().zip(partial) {
        t.add(p);
    }
}
