//! YAML run files: fusion configuration, sources and output paths.

use crate::{Result, RunnerError};
use demfuse_core::{FusionConfig, FusionMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of a run file.
///
/// ```yaml
/// grid_step: 0.5
/// fusion_mode: mean
/// target_reference: EPSG:32631
/// sources:
///   - id: pair_01
///     points: pair_01.json
///     mask: pair_01_mask.json
/// output:
///   dem: out/dem.tif
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    /// Fusion configuration, inlined at the top level.
    #[serde(flatten)]
    pub fusion: FusionConfig,
    /// Input 3D maps, in fusion order.
    pub sources: Vec<SourceEntry>,
    /// Where to write results.
    pub output: OutputPaths,
}

/// One 3D map of a run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Source identifier; defaults to the points file stem.
    #[serde(default)]
    pub id: Option<String>,
    /// JSON raster of `[lon, lat, alt]` samples.
    pub points: PathBuf,
    /// Optional JSON raster of mask bytes, 0 meaning excluded.
    #[serde(default)]
    pub mask: Option<PathBuf>,
    /// Reference system of the longitude/latitude bands.
    #[serde(default = "default_source_reference")]
    pub reference: String,
}

fn default_source_reference() -> String {
    "EPSG:4326".to_string()
}

impl SourceEntry {
    /// Identifier used in logs, metrics and the report.
    pub fn id(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            self.points
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.points.display().to_string())
        })
    }
}

/// Output files of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPaths {
    /// Fused DEM as a 64-bit float GeoTIFF.
    pub dem: PathBuf,
    /// Per-cell sample counts as a 32-bit GeoTIFF.
    #[serde(default)]
    pub counts: Option<PathBuf>,
    /// JSON sidecar with grid placement and run report.
    #[serde(default)]
    pub report: Option<PathBuf>,
}

/// Command-line values that take precedence over the run file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    /// Worker count.
    pub workers: Option<usize>,
    /// Fusion mode.
    pub mode: Option<FusionMode>,
    /// Grid step.
    pub grid_step: Option<f64>,
}

impl RunFile {
    /// Load a run file. Relative paths inside it are resolved against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(RunnerError::io(path))?;
        let mut run: RunFile = serde_yaml::from_str(&text).map_err(|source| RunnerError::RunFile {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        run.resolve_paths(base);
        info!("Loaded run file {:?} with {} sources", path, run.sources.len());
        Ok(run)
    }

    /// Make every relative path absolute with respect to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for source in &mut self.sources {
            resolve(&mut source.points);
            if let Some(mask) = &mut source.mask {
                resolve(mask);
            }
        }
        resolve(&mut self.output.dem);
        if let Some(counts) = &mut self.output.counts {
            resolve(counts);
        }
        if let Some(report) = &mut self.output.report {
            resolve(report);
        }
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(workers) = overrides.workers {
            self.fusion.workers = Some(workers);
        }
        if let Some(mode) = overrides.mode {
            self.fusion.fusion_mode = mode;
        }
        if let Some(step) = overrides.grid_step {
            self.fusion.grid_step = step;
        }
    }
}
