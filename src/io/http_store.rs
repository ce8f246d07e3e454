use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};

use super::StoreReader;
use crate::error::IoError;

/// Default request timeout for object GETs.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP-backed implementation of StoreReader.
///
/// Issues plain GET requests against the object store's HTTP front end. The
/// store serves zipped well archives with a `~/` path separator for members,
/// so every chunk, metadata document and directory listing is a single GET.
#[derive(Clone)]
pub struct HttpStore {
    client: Client,
    identifier: String,
}

impl HttpStore {
    /// Create a new HttpStore using the given client.
    ///
    /// `identifier` is only used for logging (typically the base URL).
    pub fn new(client: Client, identifier: impl Into<String>) -> Self {
        Self {
            client,
            identifier: identifier.into(),
        }
    }

    /// Get the underlying reqwest client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl StoreReader for HttpStore {
    async fn get(&self, url: &str) -> Result<Bytes, IoError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(IoError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(IoError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        resp.bytes()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Create a reqwest client suitable for object-store access.
///
/// ```ignore
/// let client = create_http_client(Duration::from_secs(10))?;
/// let store = HttpStore::new(client, "https://store.example.org");
/// ```
pub fn create_http_client(timeout: Duration) -> Result<Client, IoError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| IoError::Connection(e.to_string()))
}
