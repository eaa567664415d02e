//! Frame downscaling and the inverse mapping of face boxes.

use crate::decode::PixelGrid;
use crate::types::FaceBox;
use image::imageops::{self, FilterType};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ScaleError {
    #[error("scale factor must be in (0, 1], got {0}")]
    OutOfRange(f64),
}

/// Ratio between analysis resolution and original resolution, in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    /// No downscaling.
    pub const IDENTITY: ScaleFactor = ScaleFactor(1.0);

    pub fn new(value: f64) -> Result<Self, ScaleError> {
        if value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(ScaleError::OutOfRange(value))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }

    pub fn is_identity(self) -> bool {
        self.0 == 1.0
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Dimensions of a `width` × `height` frame scaled by `s`: rounded to
/// nearest, never below 1.
pub fn scaled_dimensions(width: u32, height: u32, s: ScaleFactor) -> (u32, u32) {
    let scale = |v: u32| ((v as f64 * s.get()).round() as u32).max(1);
    (scale(width), scale(height))
}

/// Resize a frame by `s` in both axes with bilinear filtering.
/// The identity factor hands the grid back untouched.
pub fn scale_frame(grid: PixelGrid, s: ScaleFactor) -> PixelGrid {
    if s.is_identity() {
        return grid;
    }
    let (w, h) = scaled_dimensions(grid.width(), grid.height(), s);
    let resized = imageops::resize(grid.as_rgb(), w, h, FilterType::Triangle);
    tracing::debug!(
        from_w = grid.width(),
        from_h = grid.height(),
        to_w = w,
        to_h = h,
        "frame downscaled"
    );
    match PixelGrid::from_rgb(resized) {
        Ok(scaled) => scaled,
        // Unreachable: scaled_dimensions never yields zero.
        Err(_) => grid,
    }
}

/// Map a box from scaled space back to original space: each term divided by
/// `s` and truncated toward zero.
pub fn rescale_box(b: FaceBox, s: ScaleFactor) -> FaceBox {
    let inv = |v: u32| (v as f64 / s.get()) as u32;
    FaceBox {
        x: inv(b.x),
        y: inv(b.y),
        width: inv(b.width),
        height: inv(b.height),
    }
}
