//! Metrics infrastructure for the DEM fusion engine.
//!
//! Every metric emitted by the engine is declared here as a [`Metric`] constant
//! so that names, units and label keys live in one place. The `metrics` crate
//! is re-exported; install any recorder to collect them.
//!
//! ## Example
//!
//! ```rust
//! use demfuse_metrics::{metric_defs, SourceLabels};
//!
//! let labels = SourceLabels::new("pair_03", "mean").to_labels();
//! metrics::counter!(metric_defs::SAMPLES_ACCEPTED.name, &labels[..]).increment(42);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Counter, gauge or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Only ever incremented.
    Counter,
    /// Set to the latest value.
    Gauge,
    /// Records a distribution of observations.
    Histogram,
}

/// Static declaration of one metric.
///
/// ```rust
/// use demfuse_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const CHUNKS: Metric = Metric::counter("demfuse.chunks")
///     .with_description("Row chunks read from sources")
///     .with_unit(Unit::Count)
///     .with_labels(&["source"]);
///
/// assert_eq!(CHUNKS.kind, MetricKind::Counter);
/// assert_eq!(CHUNKS.labels, &["source"]);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Dotted metric name.
    pub name: &'static str,
    /// Counter, gauge or histogram.
    pub kind: MetricKind,
    /// One-line description shown by exporters.
    pub description: &'static str,
    /// Unit, if the values have one.
    pub unit: Option<Unit>,
    /// Label keys every emission carries.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Attach a description.
    pub const fn with_description(self, description: &'static str) -> Self {
        Self { description, ..self }
    }

    /// Attach a unit.
    pub const fn with_unit(self, unit: Unit) -> Self {
        Self {
            unit: Some(unit),
            ..self
        }
    }

    /// Declare the label keys.
    pub const fn with_labels(self, labels: &'static [&'static str]) -> Self {
        Self { labels, ..self }
    }

    /// Send the description and unit to the installed recorder.
    pub fn describe(&self) {
        let Metric {
            name,
            kind,
            description,
            unit,
            ..
        } = *self;
        match (kind, unit) {
            (MetricKind::Counter, None) => describe_counter!(name, description),
            (MetricKind::Counter, Some(unit)) => describe_counter!(name, unit, description),
            (MetricKind::Gauge, None) => describe_gauge!(name, description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(name, unit, description),
            (MetricKind::Histogram, None) => describe_histogram!(name, description),
            (MetricKind::Histogram, Some(unit)) => describe_histogram!(name, unit, description),
        }
    }
}

/// All metric definitions for the fusion engine.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on all source-scoped metrics.
    pub const SOURCE_LABELS: &[&str] = &["source", "mode"];

    // -- accumulation --

    /// Samples that landed in a grid cell.
    pub const SAMPLES_ACCEPTED: Metric = Metric::counter("demfuse.samples.accepted")
        .with_description("Samples accumulated into a grid cell")
        .with_unit(Unit::Count)
        .with_labels(SOURCE_LABELS);

    /// Samples dropped before accumulation.
    ///
    /// Labels: source, mode, reason (masked, non_finite, altitude_bounds,
    /// out_of_domain, outside_grid)
    pub const SAMPLES_SKIPPED: Metric = Metric::counter("demfuse.samples.skipped")
        .with_description("Samples dropped before accumulation, by reason")
        .with_unit(Unit::Count)
        .with_labels(&["source", "mode", "reason"]);

    /// Tiles processed by workers.
    pub const TILES_PROCESSED: Metric = Metric::counter("demfuse.tiles.processed")
        .with_description("Source tiles processed by accumulation workers")
        .with_unit(Unit::Count)
        .with_labels(SOURCE_LABELS);

    // -- output grid --

    /// Cells holding a value after finalization.
    pub const CELLS_FILLED: Metric = Metric::gauge("demfuse.grid.cells_filled")
        .with_description("Output cells with at least one contribution")
        .with_unit(Unit::Count)
        .with_labels(&["mode"]);

    /// Cells left at the no-data sentinel.
    pub const CELLS_EMPTY: Metric = Metric::gauge("demfuse.grid.cells_empty")
        .with_description("Output cells left at the no-data value")
        .with_unit(Unit::Count)
        .with_labels(&["mode"]);

    // -- timing --

    /// Wall-clock time of the range prescan.
    pub const PRESCAN_TIME: Metric = Metric::histogram("demfuse.stage.prescan_ms")
        .with_description("Wall-clock time of the range prescan in milliseconds")
        .with_unit(Unit::Milliseconds);

    /// Wall-clock time of the parallel accumulation phase.
    pub const ACCUMULATE_TIME: Metric = Metric::histogram("demfuse.stage.accumulate_ms")
        .with_description("Wall-clock time of parallel accumulation in milliseconds")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["mode"]);

    /// Wall-clock time of the merge stage.
    pub const MERGE_TIME: Metric = Metric::histogram("demfuse.stage.merge_ms")
        .with_description("Wall-clock time of the merge stage in milliseconds")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["mode"]);

    /// Every declaration above.
    pub const ALL: &[&Metric] = &[
        &SAMPLES_ACCEPTED,
        &SAMPLES_SKIPPED,
        &TILES_PROCESSED,
        &CELLS_FILLED,
        &CELLS_EMPTY,
        &PRESCAN_TIME,
        &ACCUMULATE_TIME,
        &MERGE_TIME,
    ];
}

/// Labels identifying the source map and fusion mode of a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLabels {
    /// Source map identifier.
    pub source: String,
    /// Fusion mode name.
    pub mode: String,
}

impl SourceLabels {
    /// Labels of `source` fused under `mode`.
    pub fn new(source: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mode: mode.into(),
        }
    }

    /// `source` and `mode` pairs.
    pub fn to_labels(&self) -> [(&'static str, String); 2] {
        [("source", self.source.clone()), ("mode", self.mode.clone())]
    }

    /// `source`, `mode` and `reason` pairs, for skip counters.
    pub fn with_reason(&self, reason: &str) -> [(&'static str, String); 3] {
        [
            ("source", self.source.clone()),
            ("mode", self.mode.clone()),
            ("reason", reason.to_string()),
        ]
    }
}

/// Describe every metric of the engine. Call after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
