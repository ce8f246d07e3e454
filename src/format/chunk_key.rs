use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Address of one chunk within one pyramid level of one well.
///
/// Serialized with the Zarr v2 dot separator: `{t}.{c}.{z}.{row}.{col}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub t: u32,
    pub c: u32,
    pub z: u32,
    pub row: u32,
    pub col: u32,
}

impl ChunkKey {
    pub fn new(t: u32, c: u32, z: u32, row: u32, col: u32) -> Self {
        Self { t, c, z, row, col }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.t, self.c, self.z, self.row, self.col
        )
    }
}

impl FromStr for ChunkKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 5 {
            return Err(format!("expected 5 dot-separated indices, got '{}'", s));
        }

        let mut values = [0u32; 5];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| format!("invalid chunk index '{}' in '{}'", part, s))?;
        }

        Ok(Self::new(values[0], values[1], values[2], values[3], values[4]))
    }
}

// =============================================================================
// Directory Listing
// =============================================================================

/// Kind of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    #[serde(other)]
    Other,
}

/// One entry of a level's directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Parse a directory listing body into the chunk keys it contains.
///
/// Only `file` entries whose name is a valid chunk key are kept; metadata
/// files (`.zarray`) and subdirectories are ignored.
pub fn parse_listing(body: &[u8]) -> Result<Vec<ChunkKey>, serde_json::Error> {
    let entries: Vec<DirectoryEntry> = serde_json::from_slice(body)?;

    Ok(entries
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .filter_map(|e| e.name.parse().ok())
        .collect())
}
