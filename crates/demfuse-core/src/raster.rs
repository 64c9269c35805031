//! In-memory rasters, regions, and the provider seam used for streaming.

use crate::{FusionError, Result};
use serde::{Deserialize, Serialize};

/// One 3D map sample: geographic position and altitude.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MapPoint {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Altitude in meters.
    pub alt: f64,
}

impl MapPoint {
    /// Create a sample.
    pub const fn new(lon: f64, lat: f64, alt: f64) -> Self {
        Self { lon, lat, alt }
    }

    /// Whether all three components are finite.
    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite() && self.alt.is_finite()
    }

    /// Components in band order (longitude, latitude, altitude).
    pub fn bands(&self) -> [f64; 3] {
        [self.lon, self.lat, self.alt]
    }
}

/// A rectangular pixel region of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// First column.
    pub x: usize,
    /// First row.
    pub y: usize,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl Region {
    /// Create a region.
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    /// The region covering a whole raster.
    pub const fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Number of pixels.
    pub const fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Whether the region has no pixels.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check that the region lies inside a `width` x `height` raster.
    pub fn check_within(&self, width: usize, height: usize) -> Result<()> {
        let fits_x = self.x.checked_add(self.width).is_some_and(|end| end <= width);
        let fits_y = self.y.checked_add(self.height).is_some_and(|end| end <= height);
        if fits_x && fits_y {
            Ok(())
        } else {
            Err(FusionError::RegionOutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                raster_width: width,
                raster_height: height,
            })
        }
    }

    /// Split into consecutive row strips of at most `max_rows` rows each.
    pub fn row_chunks(&self, max_rows: usize) -> impl Iterator<Item = Region> + '_ {
        let step = max_rows.max(1);
        (0..self.height).step_by(step).map(move |offset| {
            Region::new(self.x, self.y + offset, self.width, step.min(self.height - offset))
        })
    }

    /// Check that a provider answered a read of this region with a raster of its size.
    pub(crate) fn check_read(&self, size: (usize, usize)) -> Result<()> {
        if size == (self.width, self.height) {
            Ok(())
        } else {
            Err(FusionError::InvalidConfig(format!(
                "provider returned {}x{} for a {}x{} region",
                size.0, size.1, self.width, self.height
            )))
        }
    }
}

/// A dense row-major raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Raster<T> {
    /// Wrap row-major pixel data.
    pub fn new(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        if width.checked_mul(height) != Some(data.len()) {
            return Err(FusionError::InvalidConfig(format!(
                "raster of {}x{} needs {} pixels, got {}",
                width,
                height,
                width.saturating_mul(height),
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// A raster filled with one value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Raster dimensions as (width, height).
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Pixel at (column, row), if inside the raster.
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x < self.width && y < self.height {
            Some(self.data[y * self.width + x])
        } else {
            None
        }
    }

    /// Overwrite the pixel at (column, row). Out-of-range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
        }
    }

    /// Row-major pixel data.
    pub fn pixels(&self) -> &[T] {
        &self.data
    }

    /// Copy a sub-region into a new raster.
    pub fn crop(&self, region: &Region) -> Result<Self> {
        region.check_within(self.width, self.height)?;
        let mut data = Vec::with_capacity(region.pixel_count());
        for row in region.y..region.y + region.height {
            let start = row * self.width + region.x;
            data.extend_from_slice(&self.data[start..start + region.width]);
        }
        Ok(Self {
            width: region.width,
            height: region.height,
            data,
        })
    }
}

/// Supplies regions of a raster on demand.
///
/// The enclosing pipeline implements this to stream inputs: the engine only
/// ever requests bounded regions, never the whole raster at once.
pub trait RasterSource<T>: Send + Sync {
    /// Full raster dimensions as (width, height).
    fn size(&self) -> (usize, usize);

    /// Materialize one region.
    fn read_region(&self, region: &Region) -> Result<Raster<T>>;
}

impl<T: Copy + Send + Sync> RasterSource<T> for Raster<T> {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn read_region(&self, region: &Region) -> Result<Raster<T>> {
        self.crop(region)
    }
}

/// A 3-band (lon, lat, alt) raster provider.
pub type MapSource = dyn RasterSource<MapPoint>;

/// A validity mask provider; pixels equal to zero are excluded.
pub type MaskSource = dyn RasterSource<u8>;

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: usize, height: usize) -> Raster<u32> {
        Raster::new(width, height, (0..(width * height) as u32).collect()).unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        assert!(Raster::new(3, 2, vec![0u8; 5]).is_err());
        assert!(Raster::new(3, 2, vec![0u8; 6]).is_ok());
    }

    #[test]
    fn test_crop() {
        let raster = numbered(4, 3);
        let cropped = raster.crop(&Region::new(1, 1, 2, 2)).unwrap();
        assert_eq!(cropped.size(), (2, 2));
        assert_eq!(cropped.pixels(), &[5, 6, 9, 10]);
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let raster = numbered(4, 3);
        let err = raster.crop(&Region::new(3, 0, 2, 1)).unwrap_err();
        assert!(matches!(err, FusionError::RegionOutOfBounds { .. }));
        assert!(raster.crop(&Region::new(0, 2, 4, 2)).is_err());
        assert!(raster.crop(&Region::new(usize::MAX, 0, 2, 1)).is_err());
    }

    #[test]
    fn test_row_chunks() {
        let region = Region::new(2, 10, 5, 7);
        let chunks: Vec<Region> = region.row_chunks(3).collect();
        assert_eq!(
            chunks,
            vec![
                Region::new(2, 10, 5, 3),
                Region::new(2, 13, 5, 3),
                Region::new(2, 16, 5, 1),
            ]
        );
        assert_eq!(chunks.iter().map(|c| c.pixel_count()).sum::<usize>(), region.pixel_count());
    }

    #[test]
    fn test_row_chunks_zero_rows_means_one() {
        let region = Region::new(0, 0, 2, 2);
        assert_eq!(region.row_chunks(0).count(), 2);
    }

    #[test]
    fn test_get_set() {
        let mut raster = Raster::filled(2, 2, 0u8);
        raster.set(1, 0, 7);
        raster.set(5, 5, 9);
        assert_eq!(raster.get(1, 0), Some(7));
        assert_eq!(raster.get(2, 0), None);
    }

    #[test]
    fn test_map_point_from_json_array() {
        let p: MapPoint = serde_json::from_str("[2.5, 48.0, 120.0]").unwrap();
        assert_eq!(p, MapPoint::new(2.5, 48.0, 120.0));
        assert!(!MapPoint::new(f64::NAN, 0.0, 0.0).is_finite());
    }
}
