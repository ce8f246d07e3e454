//! Raster composition.
//!
//! Decoded chunks are drawn into an RGBA raster covering the (clamped) pixel
//! window of a region. Gray value `v` becomes `(v, v, v, 255)`; pixels no
//! chunk covered stay `(0, 0, 0, 0)`.
//!
//! Where two drawn pixels coincide (several channels in one composite) the
//! brighter value wins. Chunks of one channel never overlap, so the result
//! is independent of draw order, and one-shot and progressive composition
//! produce identical rasters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::Serialize;

use super::coords::PixelRect;
use super::decoder::DecodedChunk;
use crate::well::WellId;

/// Where a raster came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub well: WellId,
    pub level: u32,
    pub channels: Vec<String>,
    pub timepoint: u32,
    pub created_at: DateTime<Utc>,
    pub complete: bool,
}

impl Provenance {
    pub fn new(well: WellId, level: u32, channels: Vec<String>, timepoint: u32) -> Self {
        Self {
            well,
            level,
            channels,
            timepoint,
            created_at: Utc::now(),
            complete: false,
        }
    }
}

/// A decoded chunk and the level pixel coordinates of its top-left corner.
#[derive(Debug, Clone)]
pub struct PlacedChunk {
    pub chunk: Arc<DecodedChunk>,
    pub origin: (i64, i64),
}

/// Output raster of one region request.
#[derive(Debug, Clone)]
pub struct CompositeRaster {
    image: RgbaImage,

    /// Level pixel rectangle this raster covers
    window: PixelRect,

    /// Union of the rectangles actually drawn
    drawn: Option<PixelRect>,

    provenance: Provenance,
}

impl CompositeRaster {
    /// Allocate a transparent raster covering `window`.
    pub fn new(window: PixelRect, provenance: Provenance) -> Self {
        Self {
            image: RgbaImage::new(window.width() as u32, window.height() as u32),
            window,
            drawn: None,
            provenance,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn window(&self) -> &PixelRect {
        &self.window
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Level pixel rectangle covered by drawn chunks, if any.
    pub fn drawn_bounds(&self) -> Option<PixelRect> {
        self.drawn
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn is_complete(&self) -> bool {
        self.provenance.complete
    }

    /// Mark the raster final.
    pub fn freeze(mut self) -> Self {
        self.provenance.complete = true;
        self
    }

    /// Draw a chunk whose top-left corner sits at `origin` in level pixels.
    ///
    /// The chunk is clipped to the raster window. Returns the rectangle that
    /// was drawn, or `None` if the chunk lies outside the window.
    pub fn draw(&mut self, placed: &PlacedChunk) -> Option<PixelRect> {
        let chunk = &placed.chunk;
        let (ox, oy) = placed.origin;
        let footprint = PixelRect::new(
            ox,
            oy,
            ox + chunk.width() as i64,
            oy + chunk.height() as i64,
        );

        let target = footprint.intersection(&self.window);
        if target.is_empty() {
            return None;
        }

        let stride = self.window.width() as usize * 4;
        let span = target.width() as usize;
        let src_x = (target.x0 - ox) as usize;
        let dst_x = (target.x0 - self.window.x0) as usize * 4;
        let buffer: &mut [u8] = &mut self.image;

        for y in target.y0..target.y1 {
            let src = &chunk.row((y - oy) as u32)[src_x..src_x + span];
            let row_start = (y - self.window.y0) as usize * stride + dst_x;
            let dst = &mut buffer[row_start..row_start + span * 4];

            for (&value, pixel) in src.iter().zip(dst.chunks_exact_mut(4)) {
                if pixel[3] == 0 || value > pixel[0] {
                    pixel.copy_from_slice(&[value, value, value, u8::MAX]);
                }
            }
        }

        self.drawn = Some(match self.drawn {
            Some(drawn) => drawn.union(&target),
            None => target,
        });
        Some(target)
    }
}

/// Draw every chunk into a fresh raster.
pub fn compose(window: PixelRect, provenance: Provenance, chunks: &[PlacedChunk]) -> CompositeRaster {
    let mut raster = CompositeRaster::new(window, provenance);
    for placed in chunks {
        raster.draw(placed);
    }
    raster.freeze()
}

/// Progress after one more chunk was drawn.
#[derive(Debug, Clone)]
pub struct ChunkProgress {
    pub well: WellId,
    pub loaded: usize,
    pub total: usize,

    /// Independent copy of the raster so far
    pub raster: CompositeRaster,
}

/// Chunk-at-a-time composition with snapshots after every draw.
#[derive(Debug)]
pub struct ProgressiveComposer {
    raster: CompositeRaster,
    loaded: usize,
    total: usize,
}

impl ProgressiveComposer {
    pub fn new(window: PixelRect, provenance: Provenance, total: usize) -> Self {
        Self {
            raster: CompositeRaster::new(window, provenance),
            loaded: 0,
            total,
        }
    }

    /// Draw one chunk and snapshot the result.
    pub fn add(&mut self, placed: &PlacedChunk) -> ChunkProgress {
        self.raster.draw(placed);
        self.loaded += 1;
        ChunkProgress {
            well: self.raster.provenance.well,
            loaded: self.loaded,
            total: self.total,
            raster: self.raster.clone(),
        }
    }

    pub fn loaded(&self) -> usize {
        self.loaded
    }

    /// Final raster and the number of chunks drawn.
    pub fn finish(self) -> (CompositeRaster, usize) {
        (self.raster.freeze(), self.loaded)
    }
}
