//! Splitting a plate-wide query into per-well sub-regions.

use serde::Serialize;

use super::{PlateLayout, WellId};
use crate::region::StageRect;

/// Minimum overlap, as a fraction of the well size along each axis, for a
/// well whose center lies outside the query to be included.
pub const MIN_OVERLAP_FRACTION: f64 = 0.05;

/// Part of a plate query that falls on one well.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WellRegion {
    pub well: WellId,

    /// Intersection of query and well bounds, in plate coordinates
    pub plate_bounds: StageRect,

    /// The same intersection relative to the well center
    pub well_bounds: StageRect,
}

/// Maps plate-coordinate queries onto wells.
#[derive(Debug, Clone)]
pub struct WellRegionResolver {
    layout: PlateLayout,
    min_overlap_mm: f64,
}

impl WellRegionResolver {
    pub fn new(layout: PlateLayout) -> Self {
        let min_overlap_mm = layout.well_size_mm() * MIN_OVERLAP_FRACTION;
        Self {
            layout,
            min_overlap_mm,
        }
    }

    pub fn layout(&self) -> &PlateLayout {
        &self.layout
    }

    /// Wells touched by `query`, in row-major order.
    ///
    /// A well is kept when its center lies inside the query, or when the
    /// overlap is at least [`MIN_OVERLAP_FRACTION`] of the well size on both
    /// axes. Slivers and corner touches are dropped.
    pub fn resolve(&self, query: &StageRect) -> Vec<WellRegion> {
        self.layout
            .wells()
            .filter_map(|well| self.well_region(&well, query))
            .collect()
    }

    /// Sub-region of `query` on a single well, if it qualifies.
    pub fn well_region(&self, well: &WellId, query: &StageRect) -> Option<WellRegion> {
        let bounds = self.layout.well_bounds(well)?;
        let overlap = bounds.intersection(query)?;

        let center_inside = query.contains_point(bounds.center_x_mm(), bounds.center_y_mm());
        let substantial =
            overlap.width_mm() >= self.min_overlap_mm && overlap.height_mm() >= self.min_overlap_mm;
        if !center_inside && !substantial {
            return None;
        }

        Some(WellRegion {
            well: *well,
            plate_bounds: overlap,
            well_bounds: overlap.translate(-bounds.center_x_mm(), -bounds.center_y_mm()),
        })
    }
}
