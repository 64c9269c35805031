//! Range Prescanner: one bounded-memory pass per source computing per-band
//! minimum and maximum.

use crate::raster::{MapPoint, Region};
use crate::source::SourceMap;
use crate::Result;
use demfuse_proj::GeoEnvelope;
use serde::{Deserialize, Serialize};

/// Per-band (longitude, latitude, altitude) extrema of one source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRanges {
    /// Band minima.
    pub min: [f64; 3],
    /// Band maxima.
    pub max: [f64; 3],
    /// Number of samples that contributed.
    pub valid_samples: u64,
}

impl Default for BandRanges {
    fn default() -> Self {
        Self::empty()
    }
}

impl BandRanges {
    /// Ranges over no samples.
    pub const fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
            valid_samples: 0,
        }
    }

    /// Ranges of a list of samples, ignoring non-finite ones.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a MapPoint>) -> Self {
        let mut ranges = Self::empty();
        for point in points {
            ranges.include(point);
        }
        ranges
    }

    /// Whether no sample contributed.
    pub fn is_empty(&self) -> bool {
        self.valid_samples == 0
    }

    /// Extend with one sample. Non-finite samples are ignored.
    #[inline]
    pub fn include(&mut self, point: &MapPoint) {
        if !point.is_finite() {
            return;
        }
        for (band, value) in point.bands().into_iter().enumerate() {
            self.min[band] = self.min[band].min(value);
            self.max[band] = self.max[band].max(value);
        }
        self.valid_samples += 1;
    }

    /// Combine with the ranges of another chunk.
    pub fn merge(&mut self, other: &BandRanges) {
        for band in 0..3 {
            self.min[band] = self.min[band].min(other.min[band]);
            self.max[band] = self.max[band].max(other.max[band]);
        }
        self.valid_samples += other.valid_samples;
    }

    /// Longitude/latitude bounding box, if any sample was seen.
    pub fn geo_envelope(&self) -> Option<GeoEnvelope> {
        if self.is_empty() {
            return None;
        }
        Some(GeoEnvelope {
            min_lon: self.min[0],
            min_lat: self.min[1],
            max_lon: self.max[0],
            max_lat: self.max[1],
        })
    }

    /// Altitude (min, max), if any sample was seen.
    pub fn altitude_range(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then_some((self.min[2], self.max[2]))
    }
}

/// Streams sources in row strips of bounded size.
#[derive(Debug, Clone, Copy)]
pub struct RangePrescanner {
    max_chunk_pixels: usize,
}

impl RangePrescanner {
    /// A prescanner that reads at most `max_chunk_pixels` samples at a time.
    pub fn new(max_chunk_pixels: usize) -> Self {
        Self {
            max_chunk_pixels: max_chunk_pixels.max(1),
        }
    }

    /// Scan one source exactly once. Masked-out samples are ignored.
    pub fn scan(&self, source: &SourceMap) -> Result<BandRanges> {
        let (width, height) = source.size();
        let mut ranges = BandRanges::empty();
        if width == 0 || height == 0 {
            return Ok(ranges);
        }

        let rows_per_chunk = (self.max_chunk_pixels / width).max(1);
        for chunk in Region::full(width, height).row_chunks(rows_per_chunk) {
            let points = source.points.read_region(&chunk)?;
            chunk.check_read(points.size())?;
            match &source.mask {
                Some(mask_source) => {
                    let mask = mask_source.read_region(&chunk)?;
                    chunk.check_read(mask.size())?;
                    for (point, &valid) in points.pixels().iter().zip(mask.pixels()) {
                        if valid > 0 {
                            ranges.include(point);
                        }
                    }
                }
                None => {
                    for point in points.pixels() {
                        ranges.include(point);
                    }
                }
            }
        }
        Ok(ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{MaskSource, Raster, RasterSource};
    use crate::source::{FusionInputs, SourceGeometry};
    use crate::FusionError;
    use crate::transforms::TransformManager;

    fn source(points: Vec<MapPoint>, width: usize, mask: Option<Vec<u8>>) -> SourceMap {
        let height = points.len() / width;
        let mut inputs = FusionInputs::new();
        let mask = mask.map(|m| Box::new(Raster::new(width, height, m).unwrap()) as Box<MaskSource>);
        inputs.add_source(
            "s",
            Box::new(Raster::new(width, height, points).unwrap()),
            mask,
            SourceGeometry::wgs84(),
        );
        TransformManager::new("EPSG:4326")
            .unwrap()
            .build(inputs)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_scan_ranges() {
        let points = vec![
            MapPoint::new(1.0, 40.0, 100.0),
            MapPoint::new(2.0, 41.0, -5.0),
            MapPoint::new(f64::NAN, 42.0, 9000.0),
            MapPoint::new(1.5, 39.5, 50.0),
        ];
        let src = source(points, 2, None);

        let ranges = RangePrescanner::new(1).scan(&src).unwrap();
        assert_eq!(ranges.valid_samples, 3);
        assert_eq!(ranges.min, [1.0, 39.5, -5.0]);
        assert_eq!(ranges.max, [2.0, 41.0, 100.0]);
    }

    #[test]
    fn test_scan_chunk_size_does_not_change_result() {
        let points: Vec<MapPoint> = (0..35)
            .map(|i| MapPoint::new(i as f64 * 0.1, -(i as f64), (i * i) as f64))
            .collect();
        let src = source(points, 5, None);

        let whole = RangePrescanner::new(1 << 20).scan(&src).unwrap();
        let strips = RangePrescanner::new(6).scan(&src).unwrap();
        assert_eq!(whole, strips);
    }

    #[test]
    fn test_scan_honours_mask() {
        let points = vec![MapPoint::new(0.0, 0.0, -32768.0), MapPoint::new(1.0, 1.0, 12.0)];
        let src = source(points, 2, Some(vec![0, 1]));

        let ranges = RangePrescanner::new(16).scan(&src).unwrap();
        assert_eq!(ranges.altitude_range(), Some((12.0, 12.0)));
    }

    /// Mask that reports the right size but answers every read with one pixel.
    struct OnePixelMask;

    impl RasterSource<u8> for OnePixelMask {
        fn size(&self) -> (usize, usize) {
            (2, 1)
        }

        fn read_region(&self, _region: &Region) -> Result<Raster<u8>> {
            Ok(Raster::filled(1, 1, 1))
        }
    }

    #[test]
    fn test_scan_rejects_short_mask_reads() {
        let mut inputs = FusionInputs::new();
        let points = vec![MapPoint::new(0.0, 0.0, 1.0), MapPoint::new(1.0, 1.0, 2.0)];
        inputs.add_source(
            "s",
            Box::new(Raster::new(2, 1, points).unwrap()),
            Some(Box::new(OnePixelMask)),
            SourceGeometry::wgs84(),
        );
        let src = TransformManager::new("EPSG:4326").unwrap().build(inputs).unwrap().remove(0);

        let err = RangePrescanner::new(16).scan(&src).unwrap_err();
        assert!(matches!(err, FusionError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_ranges() {
        let ranges = BandRanges::empty();
        assert!(ranges.geo_envelope().is_none());
        assert!(ranges.altitude_range().is_none());
    }

    #[test]
    fn test_merge() {
        let mut a = BandRanges::from_points(&[MapPoint::new(0.0, 0.0, 10.0)]);
        let b = BandRanges::from_points(&[MapPoint::new(-1.0, 2.0, 5.0)]);
        a.merge(&b);
        assert_eq!(a.min, [-1.0, 0.0, 5.0]);
        assert_eq!(a.max, [0.0, 2.0, 10.0]);
        assert_eq!(a.valid_samples, 2);
    }
}
