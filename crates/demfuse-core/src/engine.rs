//! The fusion engine: drives the stages of one run and owns its resources.

use crate::accumulate::{Accumulator, PartialResult, SampleStats};
use crate::config::FusionConfig;
use crate::grid::{GridGeometry, OutputGrid};
use crate::merge::{MergeOutput, MergeStage};
use crate::planner::{Tile, TilePlanner, WorkPlan, WorkerAssignment};
use crate::pool::BufferPool;
use crate::prescan::{BandRanges, RangePrescanner};
use crate::raster::Region;
use crate::source::{FusionInputs, SourceMap};
use crate::transforms::TransformManager;
use crate::{FusionError, Result};
use demfuse_metrics::metric_defs;
use demfuse_proj::ReferenceSystem;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of a run.
///
/// States only move forward; any error moves the engine to `Aborted`, from
/// which nothing is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    /// Inputs and configuration received, nothing validated yet.
    Unconfigured,
    /// Inputs validated and one transform built per source.
    TransformsBuilt,
    /// Band ranges available wherever they are needed.
    RangesComputed,
    /// Output grid placed and tiles assigned to workers.
    TilesPlanned,
    /// Workers are scattering samples.
    Accumulating,
    /// Partial results folded into the output grid.
    Merged,
    /// Grid published.
    Finalized,
    /// A stage failed.
    Aborted,
}

/// Per-source summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Source identifier.
    pub id: String,
    /// Raster dimensions as (width, height).
    pub size: (usize, usize),
    /// Band ranges, when prescanned or supplied.
    pub ranges: Option<BandRanges>,
    /// Sample accounting.
    pub stats: SampleStats,
}

/// Diagnostics of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Worker count the run was planned for.
    pub workers: usize,
    /// Workers that received at least one tile.
    pub assignments: usize,
    /// Output grid placement.
    pub grid: GridGeometry,
    /// Target reference system, as `EPSG:n`.
    pub reference: String,
    /// One entry per source, in input order.
    pub sources: Vec<SourceReport>,
    /// Prescan wall-clock time, if a prescan ran.
    pub prescan_ms: Option<f64>,
    /// Accumulation wall-clock time.
    pub accumulate_ms: f64,
    /// Merge wall-clock time.
    pub merge_ms: f64,
}

impl RunReport {
    /// Accounting summed over all sources.
    pub fn total(&self) -> SampleStats {
        let mut total = SampleStats::default();
        for source in &self.sources {
            total.add(&source.stats);
        }
        total
    }
}

/// The published result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedDem {
    /// The fused grid.
    pub grid: OutputGrid,
    /// Run diagnostics.
    pub report: RunReport,
}

/// Fuses N 3D maps into one DEM grid.
///
/// [`run`](Self::run) executes every stage. The stages are also exposed one
/// by one so a surrounding pipeline can drive them: [`compute_output_extent`]
/// places the grid, [`required_input_region`] tells which pixels a tile needs,
/// and [`produce`] computes the partial result of one worker.
///
/// [`compute_output_extent`]: Self::compute_output_extent
/// [`required_input_region`]: Self::required_input_region
/// [`produce`]: Self::produce
pub struct DemFusionEngine {
    config: FusionConfig,
    state: EngineState,
    inputs: FusionInputs,
    sources: Vec<SourceMap>,
    target: Option<ReferenceSystem>,
    threads: Option<ThreadPool>,
    plan: Option<WorkPlan>,
    merged: Option<MergeOutput>,
    pool: Arc<BufferPool>,
    prescan_ms: Option<f64>,
    accumulate_ms: f64,
    merge_ms: f64,
}

impl DemFusionEngine {
    /// An engine for one run. Nothing is validated until the first stage runs.
    pub fn new(config: FusionConfig, inputs: FusionInputs) -> Self {
        Self::with_pool(config, inputs, Arc::new(BufferPool::new()))
    }

    /// An engine drawing its cell buffers from `pool`.
    ///
    /// Buffers released by this run stay in a shared pool for the next engine;
    /// a pool held by this engine alone is emptied when the grid is published.
    pub fn with_pool(config: FusionConfig, inputs: FusionInputs, pool: Arc<BufferPool>) -> Self {
        Self {
            config,
            state: EngineState::Unconfigured,
            inputs,
            sources: Vec::new(),
            target: None,
            threads: None,
            plan: None,
            merged: None,
            pool,
            prescan_ms: None,
            accumulate_ms: 0.0,
            merge_ms: 0.0,
        }
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Run configuration.
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Validated sources, available once transforms are built.
    pub fn sources(&self) -> &[SourceMap] {
        &self.sources
    }

    /// The work plan, available once tiles are planned.
    pub fn work_plan(&self) -> Option<&WorkPlan> {
        self.plan.as_ref()
    }

    /// Buffer pool shared by the workers.
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Execute every remaining stage and publish the grid.
    pub fn run(&mut self) -> Result<FusedDem> {
        let started = Instant::now();
        self.compute_output_extent()?;
        let partials = self.accumulate()?;
        self.merge(partials)?;
        let dem = self.finalize()?;

        let total = dem.report.total();
        info!(
            "fused {} sources into {}x{} {} grid in {:.1} ms: {} samples accepted, {} skipped, {} cells filled",
            dem.report.sources.len(),
            dem.grid.geometry().width,
            dem.grid.geometry().height,
            dem.grid.mode(),
            started.elapsed().as_secs_f64() * 1000.0,
            total.accepted,
            total.skipped(),
            dem.grid.filled_cells()
        );
        Ok(dem)
    }

    /// Validate the configuration and inputs and build one transform per source.
    pub fn build_transforms(&mut self) -> Result<()> {
        self.expect_state(EngineState::Unconfigured)?;
        let result = self.try_build_transforms();
        self.abort_on_error(result)
    }

    fn try_build_transforms(&mut self) -> Result<()> {
        self.config.validate()?;
        let manager = TransformManager::new(&self.config.target_reference)?;
        let inputs = std::mem::take(&mut self.inputs);
        self.sources = manager.build(inputs)?;
        self.target = Some(manager.target());

        let workers = self.config.effective_workers();
        self.threads = Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("demfuse-worker-{}", i))
                .build()?,
        );

        info!(
            "{} sources, target {}, mode {}, {} workers",
            self.sources.len(),
            manager.target(),
            self.config.fusion_mode,
            workers
        );
        self.state = EngineState::TransformsBuilt;
        Ok(())
    }

    /// Prescan sources when the altitude bounds are enabled or the extent must be derived.
    ///
    /// Sources that already carry band ranges are not rescanned.
    pub fn compute_ranges(&mut self) -> Result<()> {
        self.expect_state(EngineState::TransformsBuilt)?;
        let result = self.try_compute_ranges();
        self.abort_on_error(result)
    }

    fn try_compute_ranges(&mut self) -> Result<()> {
        let prescan = self.config.prescan;
        if !prescan.enabled && self.config.extent.is_some() {
            debug!("prescan disabled and extent configured, skipping range computation");
            self.state = EngineState::RangesComputed;
            return Ok(());
        }
        if !prescan.enabled {
            debug!("no extent configured, prescanning to derive it");
        }

        let started = Instant::now();
        let scanner = RangePrescanner::new(self.config.max_chunk_pixels);
        let threads = self.threads.as_ref().ok_or(FusionError::InvalidState {
            expected: EngineState::TransformsBuilt,
            actual: self.state,
        })?;
        let sources = &mut self.sources;
        let scanned: Vec<(usize, BandRanges)> = threads.install(|| {
            sources
                .par_iter()
                .enumerate()
                .filter(|(_, source)| source.ranges.is_none())
                .map(|(index, source)| {
                    scanner
                        .scan(source)
                        .map(|ranges| (index, ranges))
                        .map_err(|e| FusionError::RasterRead {
                            index,
                            reason: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>>>()
        })?;
        let rescanned = scanned.len();
        for (index, ranges) in scanned {
            sources[index].ranges = Some(ranges);
        }

        for (index, source) in self.sources.iter().enumerate() {
            let Some((min_alt, max_alt)) = source.ranges().and_then(|r| r.altitude_range()) else {
                warn!("3D map {} ({}) has no valid sample", index, source.id());
                continue;
            };
            debug!(
                "3D map {} ({}): altitude range [{:.2}, {:.2}]",
                index,
                source.id(),
                min_alt,
                max_alt
            );
            if prescan.enabled && !(prescan.accepts(min_alt) && prescan.accepts(max_alt)) {
                warn!(
                    "3D map {} ({}): altitude range [{:.2}, {:.2}] exceeds sanity bounds [{:.2}, {:.2}], \
                     out-of-bounds samples will be skipped",
                    index,
                    source.id(),
                    min_alt,
                    max_alt,
                    prescan.min_altitude,
                    prescan.max_altitude
                );
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!(metric_defs::PRESCAN_TIME.name).record(elapsed_ms);
        debug!("prescanned {} sources in {:.1} ms", rescanned, elapsed_ms);
        self.prescan_ms = Some(elapsed_ms);
        self.state = EngineState::RangesComputed;
        Ok(())
    }

    /// Place the output grid and assign tiles to workers.
    pub fn plan(&mut self) -> Result<()> {
        self.expect_state(EngineState::RangesComputed)?;
        let result = self.try_plan();
        self.abort_on_error(result)
    }

    fn try_plan(&mut self) -> Result<()> {
        let workers = self.config.effective_workers();
        let planner = TilePlanner::new(workers, self.config.max_chunk_pixels);
        let grid = planner.output_grid(&self.config, &self.sources)?;
        let assignments = planner.assign(&self.sources);

        info!(
            "output grid {}x{} cells, step {}, origin ({}, {}), {} of {} workers busy",
            grid.width,
            grid.height,
            grid.step,
            grid.origin_x,
            grid.origin_y,
            assignments.len(),
            workers
        );
        self.plan = Some(WorkPlan { grid, assignments });
        self.state = EngineState::TilesPlanned;
        Ok(())
    }

    /// Run the stages up to planning and return the output grid placement.
    pub fn compute_output_extent(&mut self) -> Result<GridGeometry> {
        if self.state == EngineState::Unconfigured {
            self.build_transforms()?;
        }
        if self.state == EngineState::TransformsBuilt {
            self.compute_ranges()?;
        }
        if self.state == EngineState::RangesComputed {
            self.plan()?;
        }
        match &self.plan {
            Some(plan) => Ok(plan.grid),
            None => Err(self.state_error(EngineState::TilesPlanned)),
        }
    }

    /// Source pixels a tile reads.
    pub fn required_input_region(&self, tile: &Tile) -> Result<Region> {
        let source = self.sources.get(tile.source).ok_or_else(|| {
            FusionError::InvalidConfig(format!(
                "tile refers to 3D map {} but there are {}",
                tile.source,
                self.sources.len()
            ))
        })?;
        let (width, height) = source.size();
        tile.region.check_within(width, height)?;
        Ok(tile.region)
    }

    /// Compute the partial result of one worker assignment.
    ///
    /// Safe to call concurrently once tiles are planned.
    pub fn produce(&self, assignment: &WorkerAssignment) -> Result<PartialResult> {
        if !matches!(self.state, EngineState::TilesPlanned | EngineState::Accumulating) {
            return Err(self.state_error(EngineState::TilesPlanned));
        }
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| self.state_error(EngineState::TilesPlanned))?;
        for tile in &assignment.tiles {
            self.required_input_region(tile)?;
        }

        let buffer = self.pool.acquire(plan.grid.len(), self.config.fusion_mode);
        Accumulator::new(&self.sources, &plan.grid, self.config.fusion_mode, &self.config.prescan)
            .run(assignment, buffer)
            .map_err(|e| FusionError::WorkerFailed {
                worker: assignment.worker,
                source: Box::new(e),
            })
    }

    /// Run every worker assignment on the thread pool.
    ///
    /// Returns once all workers completed; the first failure aborts the run.
    pub fn accumulate(&mut self) -> Result<Vec<PartialResult>> {
        self.expect_state(EngineState::TilesPlanned)?;
        self.state = EngineState::Accumulating;
        let result = self.try_accumulate();
        self.abort_on_error(result)
    }

    fn try_accumulate(&mut self) -> Result<Vec<PartialResult>> {
        let started = Instant::now();
        let (Some(threads), Some(plan)) = (&self.threads, &self.plan) else {
            return Err(self.state_error(EngineState::TilesPlanned));
        };

        let partials = threads.install(|| {
            plan.assignments
                .par_iter()
                .map(|assignment| self.produce(assignment))
                .collect::<Result<Vec<_>>>()
        })?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let labels = [("mode", self.config.fusion_mode.as_str().to_string())];
        metrics::histogram!(metric_defs::ACCUMULATE_TIME.name, &labels).record(elapsed_ms);
        debug!("{} workers finished in {:.1} ms", partials.len(), elapsed_ms);
        self.accumulate_ms = elapsed_ms;
        Ok(partials)
    }

    /// Fold the partial results into the output grid.
    pub fn merge(&mut self, partials: Vec<PartialResult>) -> Result<()> {
        self.expect_state(EngineState::Accumulating)?;
        let result = self.try_merge(partials);
        self.abort_on_error(result)
    }

    fn try_merge(&mut self, partials: Vec<PartialResult>) -> Result<()> {
        let started = Instant::now();
        let (Some(plan), Some(target)) = (&self.plan, self.target) else {
            return Err(self.state_error(EngineState::Accumulating));
        };
        if let Some(partial) = partials.iter().find(|p| p.buffer.len() != plan.grid.len()) {
            return Err(FusionError::InvalidConfig(format!(
                "partial result of worker {} has {} cells, grid has {}",
                partial.worker,
                partial.buffer.len(),
                plan.grid.len()
            )));
        }

        let stage = MergeStage::new(plan.grid, target, self.config.fusion_mode, self.config.no_data_value);
        self.merged = Some(stage.merge(partials, self.sources.len(), &self.pool));
        self.merge_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.state = EngineState::Merged;
        Ok(())
    }

    /// Publish the merged grid together with the run report.
    pub fn finalize(&mut self) -> Result<FusedDem> {
        self.expect_state(EngineState::Merged)?;
        let (Some(merged), Some(plan), Some(target)) = (self.merged.take(), self.plan.take(), self.target) else {
            let err = self.state_error(EngineState::Merged);
            return self.abort_on_error(Err(err));
        };

        let sources = self
            .sources
            .iter()
            .zip(merged.stats)
            .map(|(source, stats)| SourceReport {
                id: source.id().to_string(),
                size: source.size(),
                ranges: source.ranges().copied(),
                stats,
            })
            .collect();

        let report = RunReport {
            workers: self.config.effective_workers(),
            assignments: plan.assignments.len(),
            grid: plan.grid,
            reference: target.to_string(),
            sources,
            prescan_ms: self.prescan_ms,
            accumulate_ms: self.accumulate_ms,
            merge_ms: self.merge_ms,
        };
        self.state = EngineState::Finalized;
        self.release_pool();
        Ok(FusedDem {
            grid: merged.grid,
            report,
        })
    }

    fn expect_state(&self, expected: EngineState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.state_error(expected))
        }
    }

    fn state_error(&self, expected: EngineState) -> FusionError {
        FusionError::InvalidState {
            expected,
            actual: self.state,
        }
    }

    fn abort_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!("fusion aborted in state {:?}: {}", self.state, e);
            self.state = EngineState::Aborted;
            self.plan = None;
            self.merged = None;
            self.release_pool();
        }
        result
    }

    fn release_pool(&self) {
        if Arc::strong_count(&self.pool) == 1 {
            self.pool.clear();
        }
    }
}

impl std::fmt::Debug for DemFusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemFusionEngine")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("sources", &self.sources)
            .field("plan", &self.plan)
            .finish()
    }
}
