//! Local planar projection
//!
//!  Maps geodetic positions onto a flat x/y plane anchored at the session
//!  origin using the equirectangular approximation. Good enough for the
//!  few hundred kilometres a receiver can hear.

use serde::Serialize;
use thiserror::Error;

use crate::origin::GeoPoint;

/// Arithmetic mean earth radius (R1) in meters
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Error, PartialEq)]
pub enum ProjectionError {
    #[error("origin already set to {existing}, refusing to move it to {rejected}")]
    OriginAlreadySet { existing: GeoPoint, rejected: GeoPoint },
    #[error("scale factor must be finite and positive, got {0}")]
    InvalidScale(f64),
}

/// Position on the local plane. `x` grows east, `y` grows north.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

/// Project `point` relative to `origin`, multiplying the meter offsets by `scale`.
pub fn project(origin: GeoPoint, point: GeoPoint, scale: f64) -> PlanarPoint {
    let d_lat = (point.lat - origin.lat).to_radians();
    let d_lon = (point.lon - origin.lon).to_radians();

    PlanarPoint {
        x: d_lon * origin.lat.to_radians().cos() * EARTH_RADIUS_M * scale,
        y: d_lat * EARTH_RADIUS_M * scale,
    }
}

/// Holds the session origin (set once) and the presentation scale.
#[derive(Debug, Clone)]
pub struct Projector {
    origin: Option<GeoPoint>,
    scale: f64,
}

impl Projector {
    pub fn new(scale: f64) -> Result<Self, ProjectionError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ProjectionError::InvalidScale(scale));
        }
        Ok(Self { origin: None, scale })
    }

    /// Convenience for the common case where the origin is already known.
    pub fn with_origin(origin: GeoPoint, scale: f64) -> Result<Self, ProjectionError> {
        let mut projector = Self::new(scale)?;
        projector.init_origin(origin)?;
        Ok(projector)
    }

    /// Fix the origin for the rest of the session.
    ///
    /// Records projected so far would silently disagree with a moved origin,
    /// so a second call is rejected instead of reprojecting.
    pub fn init_origin(&mut self, origin: GeoPoint) -> Result<(), ProjectionError> {
        match self.origin {
            Some(existing) => Err(ProjectionError::OriginAlreadySet {
                existing,
                rejected: origin,
            }),
            None => {
                self.origin = Some(origin);
                Ok(())
            }
        }
    }

    pub fn origin(&self) -> Option<GeoPoint> {
        self.origin
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Project a point against the session origin.
    ///
    /// # Panics
    ///
    /// Panics if called before [`Projector::init_origin`].
    pub fn project(&self, point: GeoPoint) -> PlanarPoint {
        match self.origin {
            Some(origin) => project(origin, point, self.scale),
            None => panic!("projection of {point} requested before the origin was initialized"),
        }
    }
}
