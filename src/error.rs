use thiserror::Error;

/// I/O errors that can occur when reading from the remote object store
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Non-success HTTP status other than 404
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    /// Object not found (404)
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request was cancelled before it resolved
    #[error("Request cancelled: {0}")]
    Cancelled(String),
}

impl IoError {
    /// Whether this error represents an explicit cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IoError::Cancelled(_))
    }
}

/// Errors raised while resolving array or well metadata
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// I/O error while fetching the metadata document
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The document is not valid JSON or does not match the expected schema
    #[error("Invalid metadata at {url}: {message}")]
    InvalidJson { url: String, message: String },

    /// A required attribute is absent
    #[error("Missing metadata field '{field}' at {url}")]
    MissingField { url: String, field: &'static str },

    /// Shape and chunk shape do not describe a 5D (t, c, z, y, x) array
    #[error("Invalid array shape: shape has {shape} dims, chunks has {chunks} dims (expected 5)")]
    InvalidShape { shape: usize, chunks: usize },

    /// Element type is not an 8- or 16-bit unsigned integer
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Chunk compressor is not one we can decode
    #[error("Unsupported compressor: {0}")]
    UnsupportedCompressor(String),
}

/// Errors raised while decoding a single chunk
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Decoded payload does not match the chunk shape
    #[error("Chunk size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Decompression failed
    #[error("Decompression failed: {0}")]
    Decompress(String),
}

/// Contract errors surfaced to callers of the region loader.
///
/// Absent chunks, missing wells and cancellation are not errors; they are
/// reported through [`crate::region::RegionStatus`].
#[derive(Debug, Clone, Error)]
pub enum RegionError {
    /// Unknown output encoding selector
    #[error("Invalid output format: {0} (expected png, base64 or raw)")]
    InvalidOutputFormat(String),

    /// Element type outside the supported set
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Request parameters are out of their valid domain
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Output encoding failed
    #[error("Failed to encode raster: {0}")]
    Encode(String),
}
