//! Transform Manager: validates the input arrays and builds one forward
//! transform per 3D map, strictly before any parallel work.

use crate::source::{FusionInputs, SourceMap};
use crate::{FusionError, Result};
use demfuse_proj::{ForwardTransform, GroundTransform, ReferenceSystem};
use tracing::debug;

/// Builds per-source transforms towards one target reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformManager {
    target: ReferenceSystem,
}

impl TransformManager {
    /// Resolve the target reference system.
    pub fn new(target_reference: &str) -> Result<Self> {
        let target = target_reference
            .parse::<ReferenceSystem>()
            .map_err(|source| FusionError::Reference {
                context: "target".to_string(),
                source,
            })?;
        Ok(Self { target })
    }

    /// The resolved target reference system.
    pub fn target(&self) -> ReferenceSystem {
        self.target
    }

    /// Validate the input arrays against N and build every transform.
    ///
    /// Consumes the inputs; on error nothing has been allocated for the run.
    pub fn build(&self, inputs: FusionInputs) -> Result<Vec<SourceMap>> {
        let FusionInputs {
            maps,
            masks,
            geometries,
        } = inputs;
        let n = maps.len();

        if n == 0 {
            return Err(FusionError::NoSources);
        }
        if !masks.is_empty() && masks.len() != n {
            return Err(FusionError::SourceCountMismatch {
                kind: "mask",
                expected: n,
                actual: masks.len(),
            });
        }
        if geometries.len() != n && maps.iter().any(|m| m.transform.is_none()) {
            return Err(FusionError::SourceCountMismatch {
                kind: "geometry",
                expected: n,
                actual: geometries.len(),
            });
        }

        let mut masks = masks.into_iter();
        let mut geometries = geometries.into_iter();
        let mut sources = Vec::with_capacity(n);

        for (index, map) in maps.into_iter().enumerate() {
            let mask = masks.next().flatten();
            let geometry = geometries.next().flatten();
            let (width, height) = map.points.size();

            if let Some(mask) = &mask {
                let (mask_width, mask_height) = mask.size();
                if (mask_width, mask_height) != (width, height) {
                    return Err(FusionError::MaskSizeMismatch {
                        index,
                        width,
                        height,
                        mask_width,
                        mask_height,
                    });
                }
            }

            let transform: Box<dyn GroundTransform> = match map.transform {
                Some(custom) => {
                    if custom.target() != self.target {
                        return Err(FusionError::InvalidConfig(format!(
                            "transform of 3D map {} targets {}, grid is {}",
                            index,
                            custom.target(),
                            self.target
                        )));
                    }
                    custom
                }
                None => {
                    let geometry = geometry.ok_or(FusionError::MissingGeometry { index })?;
                    let context = || format!("3D map {}", index);
                    let source_ref = geometry
                        .reference
                        .parse::<ReferenceSystem>()
                        .map_err(|source| FusionError::Reference {
                            context: context(),
                            source,
                        })?;
                    let transform = ForwardTransform::new(source_ref, self.target).map_err(
                        |source| FusionError::Reference {
                            context: context(),
                            source,
                        },
                    )?;
                    Box::new(transform)
                }
            };

            debug!(
                "3D map {} ({}): {}x{}, mask={}, transform={:?}",
                index,
                map.id,
                width,
                height,
                mask.is_some(),
                transform
            );

            sources.push(SourceMap {
                id: map.id,
                points: map.points,
                mask,
                transform,
                ranges: map.ranges,
            });
        }

        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{MapPoint, Raster};
    use crate::source::SourceGeometry;

    fn map(width: usize, height: usize) -> Box<Raster<MapPoint>> {
        Box::new(Raster::filled(width, height, MapPoint::default()))
    }

    #[test]
    fn test_unresolvable_target() {
        let err = TransformManager::new("EPSG:999999").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_build_one_per_source() {
        let manager = TransformManager::new("EPSG:32631").unwrap();
        let mut inputs = FusionInputs::new();
        inputs.add_source("a", map(2, 2), None, SourceGeometry::wgs84());
        inputs.add_source("b", map(3, 1), Some(Box::new(Raster::filled(3, 1, 1u8))), SourceGeometry::wgs84());

        let sources = manager.build(inputs).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].id(), "b");
        assert!(sources[1].has_mask());
        assert_eq!(
            sources[0].transform().target(),
            ReferenceSystem::Utm { zone: 31, north: true }
        );
    }

    #[test]
    fn test_lambert93_target() {
        let manager = TransformManager::new("EPSG:2154").unwrap();
        assert_eq!(manager.target(), ReferenceSystem::Epsg { code: 2154, geographic: false });

        let mut inputs = FusionInputs::new();
        inputs.add_source("a", map(1, 1), None, SourceGeometry::wgs84());
        let sources = manager.build(inputs).unwrap();
        assert_eq!(sources[0].transform().target().epsg(), 2154);
    }

    #[test]
    fn test_no_sources() {
        let manager = TransformManager::new("EPSG:4326").unwrap();
        assert!(matches!(manager.build(FusionInputs::new()), Err(FusionError::NoSources)));
    }

    #[test]
    fn test_mask_count_mismatch() {
        let manager = TransformManager::new("EPSG:4326").unwrap();
        let mut inputs = FusionInputs::new();
        inputs.add_map("a", map(1, 1));
        inputs.add_map("b", map(1, 1));
        inputs.set_geometries(vec![Some(SourceGeometry::wgs84()), Some(SourceGeometry::wgs84())]);
        inputs.set_masks(vec![None]);

        let err = manager.build(inputs).unwrap_err();
        assert!(matches!(
            err,
            FusionError::SourceCountMismatch { kind: "mask", expected: 2, actual: 1 }
        ));
    }

    #[test]
    fn test_geometry_count_mismatch() {
        let manager = TransformManager::new("EPSG:4326").unwrap();
        let mut inputs = FusionInputs::new();
        inputs.add_map("a", map(1, 1));
        inputs.add_map("b", map(1, 1));
        inputs.set_geometries(vec![Some(SourceGeometry::wgs84())]);

        let err = manager.build(inputs).unwrap_err();
        assert!(matches!(err, FusionError::SourceCountMismatch { kind: "geometry", .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_geometry_entry() {
        let manager = TransformManager::new("EPSG:4326").unwrap();
        let mut inputs = FusionInputs::new();
        inputs.add_map("a", map(1, 1));
        inputs.set_geometries(vec![None]);

        assert!(matches!(
            manager.build(inputs),
            Err(FusionError::MissingGeometry { index: 0 })
        ));
    }

    #[test]
    fn test_incompatible_source_reference() {
        let manager = TransformManager::new("EPSG:4326").unwrap();
        let mut inputs = FusionInputs::new();
        inputs.add_source("a", map(1, 1), None, SourceGeometry::new("EPSG:3857"));

        let err = manager.build(inputs).unwrap_err();
        assert!(matches!(err, FusionError::Reference { .. }));
    }

    #[test]
    fn test_mask_size_mismatch() {
        let manager = TransformManager::new("EPSG:4326").unwrap();
        let mut inputs = FusionInputs::new();
        inputs.add_source("a", map(2, 2), Some(Box::new(Raster::filled(2, 1, 1u8))), SourceGeometry::wgs84());

        assert!(matches!(
            manager.build(inputs),
            Err(FusionError::MaskSizeMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn test_custom_transform_must_match_target() {
        let manager = TransformManager::new("EPSG:3857").unwrap();
        let mut inputs = FusionInputs::new();
        inputs.add_map("a", map(1, 1));
        let transform = ForwardTransform::from_lonlat_to(ReferenceSystem::Geographic).unwrap();
        inputs.set_transform(0, Box::new(transform)).unwrap();

        assert!(manager.build(inputs).is_err());
    }

    #[test]
    fn test_custom_transform_without_geometry() {
        let manager = TransformManager::new("EPSG:3857").unwrap();
        let mut inputs = FusionInputs::new();
        inputs.add_map("a", map(1, 1));
        let transform = ForwardTransform::from_lonlat_to(ReferenceSystem::WebMercator).unwrap();
        inputs.set_transform(0, Box::new(transform)).unwrap();

        assert_eq!(manager.build(inputs).unwrap().len(), 1);
    }
}
