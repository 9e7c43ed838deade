use crate::core::extent::Extent;
use crate::core::geo::Point;
use crate::{Result, TileError};
use serde::{Deserialize, Serialize};

/// Snapshot of the visible map: the world extent on screen and the
/// resolution (world units per screen pixel) it is drawn at.
///
/// Layers only keep the latest snapshot; previous ones are not retained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub extent: Extent,
    pub resolution: f64,
}

impl Viewport {
    /// Creates a new viewport snapshot
    pub fn new(extent: Extent, resolution: f64) -> Self {
        Self { extent, resolution }
    }

    /// Creates the snapshot of a `width` x `height` pixel screen centred on `center`
    pub fn from_center(center: Point, resolution: f64, width: f64, height: f64) -> Self {
        let extent = Extent::from_center_and_size(center, width * resolution, height * resolution);
        Self::new(extent, resolution)
    }

    /// Center of the visible extent
    pub fn center(&self) -> Point {
        self.extent.center()
    }

    /// Screen size in pixels implied by extent and resolution
    pub fn size_in_pixels(&self) -> Point {
        Point::new(
            self.extent.width() / self.resolution,
            self.extent.height() / self.resolution,
        )
    }

    /// Rejects snapshots no tile computation can work with
    pub fn validate(&self) -> Result<()> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(TileError::InvalidResolution(self.resolution));
        }
        if !self.extent.is_valid() {
            return Err(TileError::InvalidExtent(format!("{:?}", self.extent)));
        }
        Ok(())
    }
}
