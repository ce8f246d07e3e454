//! Output encodings for composite rasters.
//!
//! - `png`: PNG bytes (an opaque blob for the caller)
//! - `base64`: PNG embedded in a `data:image/png;base64,` URL
//! - `raw`: the RGBA pixel buffer with its dimensions

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

use super::compositor::CompositeRaster;
use crate::error::RegionError;

/// Caller-selected output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Base64,
    Raw,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Png => "png",
            OutputFormat::Base64 => "base64",
            OutputFormat::Raw => "raw",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" | "blob" => Ok(OutputFormat::Png),
            "base64" | "dataurl" => Ok(OutputFormat::Base64),
            "raw" | "array" => Ok(OutputFormat::Raw),
            _ => Err(RegionError::InvalidOutputFormat(s.to_string())),
        }
    }
}

/// An encoded raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedRaster {
    Png(Bytes),
    DataUrl(String),
    Raw {
        width: u32,
        height: u32,
        pixels: Bytes,
    },
}

impl EncodedRaster {
    pub fn format(&self) -> OutputFormat {
        match self {
            EncodedRaster::Png(_) => OutputFormat::Png,
            EncodedRaster::DataUrl(_) => OutputFormat::Base64,
            EncodedRaster::Raw { .. } => OutputFormat::Raw,
        }
    }
}

/// Encode a raster in the requested format.
pub fn encode(raster: &CompositeRaster, format: OutputFormat) -> Result<EncodedRaster, RegionError> {
    match format {
        OutputFormat::Png => encode_png(raster).map(EncodedRaster::Png),
        OutputFormat::Base64 => {
            let png = encode_png(raster)?;
            Ok(EncodedRaster::DataUrl(format!(
                "data:image/png;base64,{}",
                STANDARD.encode(&png)
            )))
        }
        OutputFormat::Raw => Ok(EncodedRaster::Raw {
            width: raster.width(),
            height: raster.height(),
            pixels: Bytes::copy_from_slice(raster.pixels()),
        }),
    }
}

fn encode_png(raster: &CompositeRaster) -> Result<Bytes, RegionError> {
    let mut output = Cursor::new(Vec::new());
    raster
        .image()
        .write_to(&mut output, ImageFormat::Png)
        .map_err(|e| RegionError::Encode(e.to_string()))?;
    Ok(Bytes::from(output.into_inner()))
}
