//! Stage and pixel geometry.
//!
//! Stage coordinates are millimeters relative to the well center. Pixel
//! coordinates are in the level's own pixel grid, with the image center at
//! `(width / 2, height / 2)`:
//!
//! ```text
//! scale    = pixel_size_um * downsample_factor ^ level      (µm per pixel)
//! pixel_x  = round(width / 2  + x_mm * 1000 / scale)
//! pixel_y  = round(height / 2 + y_mm * 1000 / scale)
//! ```
//!
//! Stage y grows in the same direction as image rows.

use serde::Serialize;

use crate::well::LevelMetadata;

// =============================================================================
// Stage Rectangles
// =============================================================================

/// Axis-aligned rectangle in millimeters, stored as center plus size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageRect {
    center_x_mm: f64,
    center_y_mm: f64,
    width_mm: f64,
    height_mm: f64,
}

impl StageRect {
    pub fn new(center_x_mm: f64, center_y_mm: f64, width_mm: f64, height_mm: f64) -> Self {
        Self {
            center_x_mm,
            center_y_mm,
            width_mm: width_mm.max(0.0),
            height_mm: height_mm.max(0.0),
        }
    }

    /// Rectangle spanning `[min_x, max_x] × [min_y, max_y]`.
    pub fn from_edges(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(
            (min_x + max_x) / 2.0,
            (min_y + max_y) / 2.0,
            max_x - min_x,
            max_y - min_y,
        )
    }

    pub fn center_x_mm(&self) -> f64 {
        self.center_x_mm
    }

    pub fn center_y_mm(&self) -> f64 {
        self.center_y_mm
    }

    pub fn width_mm(&self) -> f64 {
        self.width_mm
    }

    pub fn height_mm(&self) -> f64 {
        self.height_mm
    }

    pub fn min_x(&self) -> f64 {
        self.center_x_mm - self.width_mm / 2.0
    }

    pub fn max_x(&self) -> f64 {
        self.center_x_mm + self.width_mm / 2.0
    }

    pub fn min_y(&self) -> f64 {
        self.center_y_mm - self.height_mm / 2.0
    }

    pub fn max_y(&self) -> f64 {
        self.center_y_mm + self.height_mm / 2.0
    }

    pub fn contains_point(&self, x_mm: f64, y_mm: f64) -> bool {
        x_mm >= self.min_x() && x_mm <= self.max_x() && y_mm >= self.min_y() && y_mm <= self.max_y()
    }

    /// Overlap with `other`, or `None` if the overlap has no area.
    pub fn intersection(&self, other: &StageRect) -> Option<StageRect> {
        let min_x = self.min_x().max(other.min_x());
        let max_x = self.max_x().min(other.max_x());
        let min_y = self.min_y().max(other.min_y());
        let max_y = self.max_y().min(other.max_y());

        if max_x > min_x && max_y > min_y {
            Some(StageRect::from_edges(min_x, min_y, max_x, max_y))
        } else {
            None
        }
    }

    /// The same rectangle shifted by `(dx, dy)`.
    pub fn translate(&self, dx_mm: f64, dy_mm: f64) -> StageRect {
        StageRect::new(
            self.center_x_mm + dx_mm,
            self.center_y_mm + dy_mm,
            self.width_mm,
            self.height_mm,
        )
    }
}

// =============================================================================
// Pixel Rectangles
// =============================================================================

/// Half-open pixel rectangle `[x0, x1) × [y0, y1)` in a level's pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PixelRect {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl PixelRect {
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u64 {
        (self.x1 - self.x0).max(0) as u64
    }

    pub fn height(&self) -> u64 {
        (self.y1 - self.y0).max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Overlap with `other`; may be empty.
    pub fn intersection(&self, other: &PixelRect) -> PixelRect {
        PixelRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &PixelRect) -> PixelRect {
        PixelRect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Pixel window for a stage rectangle: as requested, and clamped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub requested: PixelRect,
    pub clamped: PixelRect,
}

impl PixelWindow {
    /// No part of the request falls inside the image.
    pub fn is_empty(&self) -> bool {
        self.clamped.is_empty()
    }
}

// =============================================================================
// Transformer
// =============================================================================

/// Stage ↔ pixel conversion for one pyramid level of one well.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransformer {
    /// Micrometers per pixel at this level
    scale_um: f64,
    width: u64,
    height: u64,
}

impl CoordinateTransformer {
    pub fn new(pixel_size_um: f64, downsample_factor: f64, level: u32, width: u64, height: u64) -> Self {
        Self {
            scale_um: pixel_size_um * downsample_factor.powi(level as i32),
            width,
            height,
        }
    }

    pub fn for_level(meta: &LevelMetadata) -> Self {
        Self {
            scale_um: meta.effective_pixel_size_um(),
            width: meta.array.width(),
            height: meta.array.height(),
        }
    }

    /// Micrometers per pixel.
    pub fn scale_um(&self) -> f64 {
        self.scale_um
    }

    pub fn image_bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width as i64, self.height as i64)
    }

    fn center_px(&self) -> (f64, f64) {
        (self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    /// Pixel containing the stage point, rounded to the nearest pixel edge.
    pub fn stage_to_pixel(&self, x_mm: f64, y_mm: f64) -> (i64, i64) {
        let (cx, cy) = self.center_px();
        (
            (cx + x_mm * 1000.0 / self.scale_um).round() as i64,
            (cy + y_mm * 1000.0 / self.scale_um).round() as i64,
        )
    }

    /// Stage position of a (possibly fractional) pixel coordinate.
    pub fn pixel_to_stage(&self, x_px: f64, y_px: f64) -> (f64, f64) {
        let (cx, cy) = self.center_px();
        (
            (x_px - cx) * self.scale_um / 1000.0,
            (y_px - cy) * self.scale_um / 1000.0,
        )
    }

    /// Pixel window covering a stage rectangle.
    pub fn window(&self, rect: &StageRect) -> PixelWindow {
        let (x0, y0) = self.stage_to_pixel(rect.min_x(), rect.min_y());
        let (x1, y1) = self.stage_to_pixel(rect.max_x(), rect.max_y());
        let requested = PixelRect::new(x0, y0, x1, y1);

        PixelWindow {
            requested,
            clamped: requested.intersection(&self.image_bounds()),
        }
    }

    /// Stage rectangle covered by a pixel rectangle.
    pub fn pixel_rect_to_stage(&self, rect: &PixelRect) -> StageRect {
        let (min_x, min_y) = self.pixel_to_stage(rect.x0 as f64, rect.y0 as f64);
        let (max_x, max_y) = self.pixel_to_stage(rect.x1 as f64, rect.y1 as f64);
        StageRect::from_edges(min_x, min_y, max_x, max_y)
    }
}
