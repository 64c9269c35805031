//! Runs the full load, fuse and write path through temporary files.

use approx::assert_relative_eq;
use demfuse_core::{FusionMode, MapPoint, Raster};
use demfuse_runner::writer::{TAG_GDAL_NODATA, TAG_MODEL_PIXEL_SCALE, TAG_MODEL_TIEPOINT};
use demfuse_runner::{execute, raster_io, Overrides, RunFile, RunnerError, Sidecar};
use std::fs::File;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

/// A scratch directory removed on drop.
struct Scratch(PathBuf);

impl Scratch {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("demfuse-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Scratch(dir)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.0).ok();
    }
}

/// Two sources on a 2x2 grid of unit cells with north-west corner (0, 2).
fn write_fixture(dir: &Path, mode: &str) -> PathBuf {
    let a = Raster::new(1, 1, vec![MapPoint::new(0.5, 1.5, 5.0)]).unwrap();
    let b = Raster::new(
        2,
        2,
        vec![
            MapPoint::new(0.5, 1.5, 7.0),
            MapPoint::new(1.5, 0.5, 3.0),
            MapPoint::new(1.5, 1.5, 900.0),
            MapPoint::new(9.0, 9.0, 1.0),
        ],
    )
    .unwrap();
    let b_mask = Raster::new(2, 2, vec![1u8, 1, 0, 1]).unwrap();

    raster_io::save(dir.join("a.json"), &a).unwrap();
    raster_io::save(dir.join("b.json"), &b).unwrap();
    raster_io::save(dir.join("b_mask.json"), &b_mask).unwrap();

    let run = format!(
        r#"
grid_step: 1.0
fusion_mode: {mode}
workers: 2
extent:
  origin_x: 0.0
  origin_y: 2.0
  width: 2
  height: 2
sources:
  - points: a.json
  - id: right
    points: b.json
    mask: b_mask.json
output:
  dem: out/dem.tif
  counts: out/counts.tif
  report: out/dem.json
"#
    );
    let path = dir.join("run.yaml");
    std::fs::write(&path, run).unwrap();
    path
}

#[test]
fn test_execute_writes_geotiff() {
    let scratch = Scratch::new("geotiff");
    let run = RunFile::load(write_fixture(scratch.path(), "mean")).unwrap();
    let dem = execute(&run).unwrap();
    assert_relative_eq!(dem.grid.value(0, 0).unwrap(), 6.0);

    let mut decoder = Decoder::new(File::open(scratch.path().join("out/dem.tif")).unwrap()).unwrap();
    assert_eq!(decoder.dimensions().unwrap(), (2, 2));

    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE)).unwrap();
    assert_eq!(scale[..2], [1.0, 1.0]);
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT)).unwrap();
    assert_eq!(tiepoint[3..5], [0.0, 2.0]);
    let no_data = decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA)).unwrap();
    assert_eq!(no_data.trim_end_matches('\0'), "-32768");

    match decoder.read_image().unwrap() {
        DecodingResult::F64(values) => {
            assert_relative_eq!(values[0], 6.0);
            assert_eq!(values[1], -32768.0);
            assert_eq!(values[2], -32768.0);
            assert_relative_eq!(values[3], 3.0);
        }
        _ => panic!("expected 64-bit float samples"),
    }

    let mut counts = Decoder::new(File::open(scratch.path().join("out/counts.tif")).unwrap()).unwrap();
    match counts.read_image().unwrap() {
        DecodingResult::U32(counts) => assert_eq!(counts, vec![2, 0, 0, 1]),
        _ => panic!("expected 32-bit count samples"),
    }
}

#[test]
fn test_execute_writes_sidecar() {
    let scratch = Scratch::new("sidecar");
    let run = RunFile::load(write_fixture(scratch.path(), "max")).unwrap();
    execute(&run).unwrap();

    let text = std::fs::read_to_string(scratch.path().join("out/dem.json")).unwrap();
    let sidecar: Sidecar = serde_json::from_str(&text).unwrap();
    assert_eq!(sidecar.reference, "EPSG:4326");
    assert_eq!(sidecar.mode, FusionMode::Max);
    assert_eq!(sidecar.filled_cells, 2);
    assert_eq!(sidecar.grid.width, 2);

    let sources = &sidecar.report.sources;
    assert_eq!(sources[0].id, "a");
    assert_eq!(sources[1].id, "right");
    assert_eq!(sources[1].stats.accepted, 2);
    assert_eq!(sources[1].stats.masked, 1);
    assert_eq!(sources[1].stats.outside_grid, 1);
}

#[test]
fn test_overrides_take_precedence() {
    let scratch = Scratch::new("overrides");
    let mut run = RunFile::load(write_fixture(scratch.path(), "mean")).unwrap();
    run.apply(&Overrides {
        workers: Some(1),
        mode: Some(FusionMode::Accumulate),
        grid_step: None,
    });
    let dem = execute(&run).unwrap();
    assert_eq!(dem.grid.value(0, 0), Some(2.0));
    assert_eq!(dem.report.workers, 1);
}

#[test]
fn test_missing_raster_is_reported() {
    let scratch = Scratch::new("missing");
    let path = write_fixture(scratch.path(), "mean");
    std::fs::remove_file(scratch.path().join("b_mask.json")).unwrap();

    let run = RunFile::load(path).unwrap();
    let err = execute(&run).unwrap_err();
    assert!(matches!(err, RunnerError::Io { .. }));
    assert!(!scratch.path().join("out/dem.tif").exists());
}

#[test]
fn test_configuration_error_writes_nothing() {
    let scratch = Scratch::new("badref");
    let mut run = RunFile::load(write_fixture(scratch.path(), "min")).unwrap();
    run.fusion.target_reference = "EPSG:27700".to_string();

    let err = execute(&run).unwrap_err();
    match err {
        RunnerError::Fusion(e) => assert!(e.is_configuration()),
        other => panic!("expected a fusion error, got {}", other),
    }
    assert!(!scratch.path().join("out").exists());
}
