//! # demfuse-proj
//!
//! Reference systems and forward ground transforms used to place 3D map
//! samples (longitude, latitude, altitude) onto a DEM grid.
//!
//! ## Example
//!
//! ```
//! use demfuse_proj::{ForwardTransform, GroundTransform, ReferenceSystem};
//!
//! let source: ReferenceSystem = "EPSG:4326".parse()?;
//! let target: ReferenceSystem = "EPSG:32631".parse()?;
//! let transform = ForwardTransform::new(source, target)?;
//!
//! let ground = transform.forward(3.0, 0.0)?;
//! assert!((ground.x - 500_000.0).abs() < 1e-3);
//! # Ok::<(), demfuse_proj::ProjError>(())
//! ```

mod error;
mod reference;
mod transform;

pub use error::ProjError;
pub use reference::{ReferenceSystem, EPSG_WEB_MERCATOR, EPSG_WGS84};
pub use transform::{
    project_envelope, ForwardTransform, GeoEnvelope, GroundEnvelope, GroundPoint,
    GroundTransform, WEB_MERCATOR_MAX_LAT,
};

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjError>;
