//! Whole-array attributes (`.zattrs`).
//!
//! Two conventions describe the physical pixel size:
//!
//! 1. A custom canvas block written by the acquisition software:
//!    ```json
//!    { "squid_canvas": { "pixel_size_xy_um": 0.752,
//!                        "channel_mapping": { "BF LED matrix full": 0 } } }
//!    ```
//! 2. The OME-NGFF `multiscales` block, whose first dataset carries a `scale`
//!    coordinate transformation (last axis is x, in micrometers).
//!
//! The canvas block wins when both are present. Channel labels come from the
//! canvas block's mapping, then from `omero.channels[].label`, then from the
//! static table in [`super::channels`].

use std::collections::HashMap;

use serde::Deserialize;

use super::channels::static_channel_index;
use crate::error::MetadataError;

#[derive(Debug, Default, Deserialize)]
struct RawZattrs {
    #[serde(default)]
    squid_canvas: Option<CanvasBlock>,
    #[serde(default)]
    multiscales: Vec<Multiscale>,
    #[serde(default)]
    omero: Option<Omero>,
}

#[derive(Debug, Default, Deserialize)]
struct CanvasBlock {
    #[serde(default)]
    pixel_size_xy_um: Option<f64>,
    #[serde(default)]
    channel_mapping: Option<HashMap<String, u32>>,
}

#[derive(Debug, Deserialize)]
struct Multiscale {
    #[serde(default)]
    datasets: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(rename = "coordinateTransformations", default)]
    coordinate_transformations: Vec<CoordinateTransformation>,
}

#[derive(Debug, Deserialize)]
struct CoordinateTransformation {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    scale: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct Omero {
    #[serde(default)]
    channels: Vec<OmeroChannel>,
}

#[derive(Debug, Deserialize)]
struct OmeroChannel {
    #[serde(default)]
    label: Option<String>,
}

/// Where the pixel size was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelSizeSource {
    CanvasBlock,
    MultiscaleTransform,
}

/// Channel label to channel index mapping for one well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    labels: HashMap<String, u32>,
}

impl ChannelMap {
    pub fn new(labels: HashMap<String, u32>) -> Self {
        Self { labels }
    }

    /// Resolve a channel label.
    ///
    /// A well with its own mapping resolves only its own labels, exact match
    /// first, then case-insensitive. Without one, the static table is used and
    /// a purely numeric label is accepted as an index.
    pub fn index_of(&self, label: &str) -> Option<u32> {
        if let Some(&index) = self.labels.get(label) {
            return Some(index);
        }

        if self.is_dynamic() {
            return self
                .labels
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(label.trim()))
                .map(|(_, &index)| index);
        }

        static_channel_index(label).or_else(|| label.trim().parse().ok())
    }

    /// Whether the well carried its own mapping.
    pub fn is_dynamic(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn labels(&self) -> &HashMap<String, u32> {
        &self.labels
    }
}

/// Attributes shared by every pyramid level of one well.
#[derive(Debug, Clone, PartialEq)]
pub struct WellAttributes {
    /// Full-resolution pixel size in micrometers
    pub pixel_size_um: f64,

    pub pixel_size_source: PixelSizeSource,

    pub channels: ChannelMap,
}

impl WellAttributes {
    /// Parse a `.zattrs` document fetched from `url`.
    pub fn parse(body: &[u8], url: &str) -> Result<Self, MetadataError> {
        let raw: RawZattrs =
            serde_json::from_slice(body).map_err(|e| MetadataError::InvalidJson {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let canvas_size = raw
            .squid_canvas
            .as_ref()
            .and_then(|c| c.pixel_size_xy_um)
            .filter(|s| s.is_finite() && *s > 0.0);

        let (pixel_size_um, pixel_size_source) = match canvas_size {
            Some(size) => (size, PixelSizeSource::CanvasBlock),
            None => {
                let size = multiscale_pixel_size(&raw.multiscales).ok_or_else(|| {
                    MetadataError::MissingField {
                        url: url.to_string(),
                        field: "pixel_size_xy_um",
                    }
                })?;
                (size, PixelSizeSource::MultiscaleTransform)
            }
        };

        let mut labels = raw
            .squid_canvas
            .and_then(|c| c.channel_mapping)
            .unwrap_or_default();

        if labels.is_empty() {
            if let Some(omero) = raw.omero {
                labels = omero
                    .channels
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, ch)| ch.label.map(|label| (label, i as u32)))
                    .collect();
            }
        }

        Ok(Self {
            pixel_size_um,
            pixel_size_source,
            channels: ChannelMap::new(labels),
        })
    }
}

/// Pixel size from the first dataset's `scale` transformation.
fn multiscale_pixel_size(multiscales: &[Multiscale]) -> Option<f64> {
    multiscales
        .first()?
        .datasets
        .first()?
        .coordinate_transformations
        .iter()
        .find(|t| t.kind == "scale")?
        .scale
        .as_ref()?
        .last()
        .copied()
        .filter(|s| s.is_finite() && *s > 0.0)
}
