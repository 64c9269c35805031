//! JSON raster files.
//!
//! A raster file holds its dimensions and row-major pixels:
//! `{"width": 2, "height": 1, "data": [[2.35, 48.85, 35.0], [2.36, 48.85, 37.5]]}`
//! for a 3D map, or plain bytes for a mask.

use crate::{Result, RunnerError};
use demfuse_core::{MapPoint, Raster};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::path::Path;

/// On-disk layout of a raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterFile<T> {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Row-major pixels.
    pub data: Vec<T>,
}

impl<T: Copy> RasterFile<T> {
    /// Snapshot of an in-memory raster.
    pub fn from_raster(raster: &Raster<T>) -> Self {
        let (width, height) = raster.size();
        Self {
            width,
            height,
            data: raster.pixels().to_vec(),
        }
    }
}

fn load<T: DeserializeOwned + Copy>(path: &Path) -> Result<Raster<T>> {
    let file = std::fs::File::open(path).map_err(RunnerError::io(path))?;
    let parsed: RasterFile<T> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| RunnerError::RasterFile {
            path: path.to_path_buf(),
            source,
        })?;
    Raster::new(parsed.width, parsed.height, parsed.data).map_err(|source| RunnerError::Raster {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a 3D map of `[lon, lat, alt]` samples.
pub fn load_map(path: impl AsRef<Path>) -> Result<Raster<MapPoint>> {
    load(path.as_ref())
}

/// Load a validity mask.
pub fn load_mask(path: impl AsRef<Path>) -> Result<Raster<u8>> {
    load(path.as_ref())
}

/// Write a raster in the same layout, mostly for fixtures.
pub fn save<T: Serialize + Copy>(path: impl AsRef<Path>, raster: &Raster<T>) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string(&RasterFile::from_raster(raster))?;
    std::fs::write(path, json).map_err(RunnerError::io(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_map_file() {
        let text = r#"{"width": 2, "height": 1, "data": [[2.35, 48.85, 35.0], [2.36, 48.85, 37.5]]}"#;
        let parsed: RasterFile<MapPoint> = serde_json::from_str(text).unwrap();
        let raster = Raster::new(parsed.width, parsed.height, parsed.data).unwrap();
        assert_eq!(raster.get(1, 0), Some(MapPoint::new(2.36, 48.85, 37.5)));
    }

    #[test]
    fn test_load_rejects_inconsistent_size() {
        let path = std::env::temp_dir().join(format!("demfuse-raster-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"width": 3, "height": 1, "data": [1, 0]}"#).unwrap();
        let err = load_mask(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, RunnerError::Raster { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_map("/nonexistent/demfuse/map.json").unwrap_err();
        assert!(matches!(err, RunnerError::Io { .. }));
    }
}
