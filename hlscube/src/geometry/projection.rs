//! Coordinate transforms between EPSG coordinate systems.
//!
//! Transforms are pure Rust: PROJ strings come from the `crs-definitions`
//! database and are evaluated with `proj4rs`. `proj4rs` works in radians
//! for geographic systems, so degrees are converted on the way in and out.

use std::fmt;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use thiserror::Error;

use super::Crs;

/// Errors raised while building or applying a coordinate transform.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    /// The EPSG code is not in the bundled definitions database.
    #[error("{0} is not in the crs-definitions database")]
    UnsupportedCrs(Crs),

    /// The PROJ definition could not be parsed.
    #[error("invalid projection definition for {crs}: {reason}")]
    InvalidDefinition { crs: Crs, reason: String },

    /// A point could not be transformed.
    #[error("transform from {source_crs} to {target_crs} failed for ({x}, {y}): {reason}")]
    TransformFailed {
        source_crs: Crs,
        target_crs: Crs,
        x: f64,
        y: f64,
        reason: String,
    },
}

/// PROJ string for a coordinate system.
pub fn proj_string(crs: Crs) -> Option<&'static str> {
    crs_definitions::from_code(crs.epsg()).map(|def| def.proj4)
}

/// Whether a coordinate system uses longitude/latitude axes.
pub fn is_geographic(crs: Crs) -> bool {
    match proj_string(crs) {
        Some(def) => def.contains("+proj=longlat"),
        None => (4000..5000).contains(&crs.epsg()),
    }
}

fn load(crs: Crs) -> Result<Proj, ProjectionError> {
    let def = proj_string(crs).ok_or(ProjectionError::UnsupportedCrs(crs))?;
    Proj::from_proj_string(def).map_err(|e| ProjectionError::InvalidDefinition {
        crs,
        reason: format!("{:?}", e),
    })
}

/// Reusable transform from one coordinate system to another.
///
/// Building the PROJ objects is the expensive part, so callers that project
/// many points (ring vertices, warp grids) should build one transformer and
/// reuse it.
pub struct CrsTransformer {
    source: Crs,
    target: Crs,
    source_proj: Proj,
    target_proj: Proj,
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl fmt::Debug for CrsTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrsTransformer")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

impl CrsTransformer {
    /// Creates a transformer from `source` to `target`.
    pub fn new(source: Crs, target: Crs) -> Result<Self, ProjectionError> {
        Ok(Self {
            source,
            target,
            source_proj: load(source)?,
            target_proj: load(target)?,
            source_is_geographic: is_geographic(source),
            target_is_geographic: is_geographic(target),
        })
    }

    pub fn source(&self) -> Crs {
        self.source
    }

    pub fn target(&self) -> Crs {
        self.target
    }

    /// Transforms one point. Geographic coordinates are in degrees.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        if self.source == self.target {
            return Ok((x, y));
        }

        let mut point = if self.source_is_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(&self.source_proj, &self.target_proj, &mut point).map_err(|e| {
            ProjectionError::TransformFailed {
                source_crs: self.source,
                target_crs: self.target,
                x,
                y,
                reason: format!("{:?}", e),
            }
        })?;

        if self.target_is_geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

/// One-shot point projection.
pub fn project_point(source: Crs, target: Crs, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
    if source == target {
        return Ok((x, y));
    }
    CrsTransformer::new(source, target)?.transform(x, y)
}
