//! Metadata resolution for wells and pyramid levels.
//!
//! A level is described by two documents: the well's `.zattrs` (pixel size
//! and channel labels, shared by every level) and the level's `.zarray`
//! (shape, chunking, dtype). Both are fetched through the
//! [`RequestManager`], so concurrent lookups of the same well share one
//! request, and successful results are memoized for the lifetime of the
//! resolver. Failures are never cached: a level that is missing now may be
//! written later.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::WellId;
use crate::error::{IoError, MetadataError};
use crate::format::{ArrayMetadata, WellAttributes};
use crate::io::{FetchOutcome, RequestManager, RequestScope, StorePaths, StoreReader};

/// Linear downsampling between consecutive pyramid levels.
pub const DEFAULT_DOWNSAMPLE_FACTOR: f64 = 4.0;

/// Everything needed to address and decode the chunks of one level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelMetadata {
    pub well: WellId,
    pub level: u32,
    pub array: ArrayMetadata,
    pub attributes: Arc<WellAttributes>,
    pub downsample_factor: f64,
}

impl LevelMetadata {
    /// Physical size of one pixel at this level, in micrometers.
    pub fn effective_pixel_size_um(&self) -> f64 {
        self.attributes.pixel_size_um * self.downsample_factor.powi(self.level as i32)
    }

    /// Resolve a channel label to an index valid for this array.
    pub fn channel_index(&self, label: &str) -> Option<u32> {
        self.attributes
            .channels
            .index_of(label)
            .filter(|&index| (index as u64) < self.array.channel_count())
    }
}

/// Result of a soft level lookup.
#[derive(Debug, Clone)]
pub enum LevelLookup {
    Available(Arc<LevelMetadata>),
    Unavailable { reason: String },
}

impl LevelLookup {
    pub fn metadata(&self) -> Option<&Arc<LevelMetadata>> {
        match self {
            LevelLookup::Available(meta) => Some(meta),
            LevelLookup::Unavailable { .. } => None,
        }
    }
}

/// Memoizing resolver for well attributes and level metadata.
pub struct MetadataResolver<S> {
    requests: Arc<RequestManager<S>>,
    paths: StorePaths,
    downsample_factor: f64,
    attributes: RwLock<HashMap<WellId, Arc<WellAttributes>>>,
    levels: RwLock<HashMap<(WellId, u32), Arc<LevelMetadata>>>,
}

impl<S: StoreReader> MetadataResolver<S> {
    pub fn new(requests: Arc<RequestManager<S>>, paths: StorePaths, downsample_factor: f64) -> Self {
        Self {
            requests,
            paths,
            downsample_factor,
            attributes: RwLock::new(HashMap::new()),
            levels: RwLock::new(HashMap::new()),
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Well-wide attributes from `.zattrs`.
    pub async fn well_attributes(
        &self,
        well: &WellId,
        scope: &RequestScope,
    ) -> Result<Arc<WellAttributes>, MetadataError> {
        if let Some(attrs) = self.attributes.read().await.get(well) {
            return Ok(attrs.clone());
        }

        let url = self.paths.zattrs_url(well);
        let body = self
            .fetch_document(scope, &format!("{}/meta/.zattrs", well), &url)
            .await?;
        let attrs = Arc::new(WellAttributes::parse(&body, &url)?);

        debug!(
            well = %well,
            pixel_size_um = attrs.pixel_size_um,
            source = ?attrs.pixel_size_source,
            "Resolved well attributes"
        );

        self.attributes.write().await.insert(*well, attrs.clone());
        Ok(attrs)
    }

    /// Metadata for one level of one well.
    pub async fn resolve(
        &self,
        well: &WellId,
        level: u32,
        scope: &RequestScope,
    ) -> Result<Arc<LevelMetadata>, MetadataError> {
        if let Some(meta) = self.levels.read().await.get(&(*well, level)) {
            return Ok(meta.clone());
        }

        let url = self.paths.zarray_url(well, level);
        let request_id = format!("{}/meta/{}/.zarray", well, level);
        let (attributes, body) = tokio::join!(
            self.well_attributes(well, scope),
            self.fetch_document(scope, &request_id, &url)
        );
        let attributes = attributes?;
        let array = ArrayMetadata::parse(&body?, &url)?;

        let meta = Arc::new(LevelMetadata {
            well: *well,
            level,
            array,
            attributes,
            downsample_factor: self.downsample_factor,
        });

        self.levels
            .write()
            .await
            .insert((*well, level), meta.clone());
        Ok(meta)
    }

    /// Like [`resolve`](Self::resolve), but reports any failure as a reason.
    pub async fn lookup(&self, well: &WellId, level: u32, scope: &RequestScope) -> LevelLookup {
        match self.resolve(well, level, scope).await {
            Ok(meta) => LevelLookup::Available(meta),
            Err(e) => LevelLookup::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    /// Number of memoized levels.
    pub async fn cached_levels(&self) -> usize {
        self.levels.read().await.len()
    }

    /// Forget all memoized metadata.
    pub async fn clear(&self) {
        self.attributes.write().await.clear();
        self.levels.write().await.clear();
    }

    async fn fetch_document(
        &self,
        scope: &RequestScope,
        suffix: &str,
        url: &str,
    ) -> Result<bytes::Bytes, MetadataError> {
        match self
            .requests
            .fetch(scope, &scope.request_id(suffix), url)
            .await
        {
            FetchOutcome::Resolved(body) => Ok(body),
            FetchOutcome::FailedSoft(e) => Err(MetadataError::Io(e)),
            FetchOutcome::Aborted => Err(MetadataError::Io(IoError::Cancelled(url.to_string()))),
        }
    }
}
