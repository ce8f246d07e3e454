//! URL scheme for per-well OME-Zarr archives.
//!
//! Every well is stored as its own zip archive; the object store exposes the
//! archive members below a `~/` separator:
//!
//! ```text
//! {base}/{dataset}/zip-files/well_{well}_{plate}.zip/~/data.zarr/.zattrs
//! {base}/{dataset}/zip-files/well_{well}_{plate}.zip/~/data.zarr/{level}/.zarray
//! {base}/{dataset}/zip-files/well_{well}_{plate}.zip/~/data.zarr/{level}/
//! {base}/{dataset}/zip-files/well_{well}_{plate}.zip/~/data.zarr/{level}/{t}.{c}.{z}.{row}.{col}
//! ```

use crate::format::ChunkKey;
use crate::well::WellId;

/// Builds object-store URLs for one dataset on one plate type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    base_url: String,
    dataset: String,
    plate_size: u32,
}

impl StorePaths {
    /// Create a path builder.
    ///
    /// Trailing slashes on `base_url` are ignored; `dataset` is
    /// percent-encoded as a single path segment.
    pub fn new(base_url: impl AsRef<str>, dataset: impl AsRef<str>, plate_size: u32) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            dataset: urlencoding::encode(dataset.as_ref()).into_owned(),
            plate_size,
        }
    }

    pub fn plate_size(&self) -> u32 {
        self.plate_size
    }

    /// Root of the Zarr hierarchy inside a well's archive.
    pub fn zarr_root(&self, well: &WellId) -> String {
        format!(
            "{}/{}/zip-files/well_{}_{}.zip/~/data.zarr",
            self.base_url, self.dataset, well, self.plate_size
        )
    }

    /// Whole-array attributes (`.zattrs`).
    pub fn zattrs_url(&self, well: &WellId) -> String {
        format!("{}/.zattrs", self.zarr_root(well))
    }

    /// Per-level array metadata (`.zarray`).
    pub fn zarray_url(&self, well: &WellId, level: u32) -> String {
        format!("{}/{}/.zarray", self.zarr_root(well), level)
    }

    /// Directory listing of a level's chunk files.
    pub fn listing_url(&self, well: &WellId, level: u32) -> String {
        format!("{}/{}/", self.zarr_root(well), level)
    }

    /// One chunk object.
    pub fn chunk_url(&self, well: &WellId, level: u32, key: &ChunkKey) -> String {
        format!("{}/{}/{}", self.zarr_root(well), level, key)
    }
}
