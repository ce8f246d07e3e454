//! Plate geometry.
//!
//! Positions are in plate millimeters measured from the plate's top-left
//! corner, following the ANSI/SBS footprint. Wells are treated as squares of
//! side `well_size_mm` centered on the well center; the circular wells of the
//! coarser formats are covered by their bounding square.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::WellId;
use crate::region::StageRect;

/// Supported plate formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PlateFormat {
    #[serde(rename = "96")]
    Wells96,
    #[serde(rename = "48")]
    Wells48,
    #[serde(rename = "24")]
    Wells24,
}

impl PlateFormat {
    /// Number of wells on the plate (also the `{plate}` path component).
    pub fn well_count(&self) -> u32 {
        match self {
            PlateFormat::Wells96 => 96,
            PlateFormat::Wells48 => 48,
            PlateFormat::Wells24 => 24,
        }
    }
}

impl fmt::Display for PlateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.well_count())
    }
}

impl FromStr for PlateFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "96" => Ok(PlateFormat::Wells96),
            "48" => Ok(PlateFormat::Wells48),
            "24" => Ok(PlateFormat::Wells24),
            other => Err(format!(
                "unsupported plate format '{}' (expected 96, 48 or 24)",
                other
            )),
        }
    }
}

/// Well grid of one plate format.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateLayout {
    format: PlateFormat,
    rows: u8,
    cols: u8,

    /// Center-to-center distance between neighboring wells
    spacing_mm: f64,

    /// Side of the square covering one well
    well_size_mm: f64,

    /// Center of well A1
    a1_x_mm: f64,
    a1_y_mm: f64,
}

impl PlateLayout {
    pub fn new(format: PlateFormat) -> Self {
        match format {
            PlateFormat::Wells96 => Self {
                format,
                rows: 8,
                cols: 12,
                spacing_mm: 9.0,
                well_size_mm: 6.21,
                a1_x_mm: 14.38,
                a1_y_mm: 11.24,
            },
            PlateFormat::Wells48 => Self {
                format,
                rows: 6,
                cols: 8,
                spacing_mm: 13.08,
                well_size_mm: 11.0,
                a1_x_mm: 18.16,
                a1_y_mm: 10.08,
            },
            PlateFormat::Wells24 => Self {
                format,
                rows: 4,
                cols: 6,
                spacing_mm: 19.3,
                well_size_mm: 15.54,
                a1_x_mm: 17.05,
                a1_y_mm: 13.67,
            },
        }
    }

    pub fn format(&self) -> PlateFormat {
        self.format
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn cols(&self) -> u8 {
        self.cols
    }

    pub fn well_size_mm(&self) -> f64 {
        self.well_size_mm
    }

    /// Whether `well` exists on this plate.
    pub fn contains(&self, well: &WellId) -> bool {
        well.row() < self.rows && well.col() <= self.cols
    }

    /// Center of `well` in plate coordinates.
    pub fn well_center(&self, well: &WellId) -> Option<(f64, f64)> {
        if !self.contains(well) {
            return None;
        }
        Some((
            self.a1_x_mm + (well.col() - 1) as f64 * self.spacing_mm,
            self.a1_y_mm + well.row() as f64 * self.spacing_mm,
        ))
    }

    /// Square covering `well` in plate coordinates.
    pub fn well_bounds(&self, well: &WellId) -> Option<StageRect> {
        let (x, y) = self.well_center(well)?;
        Some(StageRect::new(x, y, self.well_size_mm, self.well_size_mm))
    }

    /// All wells in row-major order.
    pub fn wells(&self) -> impl Iterator<Item = WellId> + '_ {
        (0..self.rows).flat_map(move |row| (1..=self.cols).filter_map(move |col| WellId::new(row, col)))
    }
}
