use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Trait for fetching whole objects from a remote store.
///
/// This abstraction lets the metadata resolver, chunk locator and compositor
/// work against any backend that can GET an object by URL. Implementations
/// must be thread-safe. Cancellation is cooperative: callers drop the
/// returned future when a request is aborted.
#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Fetch the full body of the object at `url`.
    ///
    /// A missing object must be reported as [`IoError::NotFound`] so callers
    /// can treat it as an absent chunk rather than a transport failure.
    async fn get(&self, url: &str) -> Result<Bytes, IoError>;

    /// Get a unique identifier for this store (for logging).
    fn identifier(&self) -> &str;
}

// =============================================================================
// Endian Helper Functions
// =============================================================================
//
// Zarr dtypes carry an explicit byte order (`<u2` or `>u2`). These helpers are
// used by the chunk decoder to read 16-bit samples.

/// Read a little-endian u16 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 2 bytes.
#[inline]
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Read a big-endian u16 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 2 bytes.
#[inline]
pub fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}
