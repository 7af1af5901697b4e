//! Object storage client module
//!
//! Defines the outbound contract the upload engine drives ([`ObjectStore`])
//! and an AWS SDK backed implementation ([`S3Client`]).
//!
//! # Contract
//!
//! | Operation | Input | Output |
//! |-----------|-------|--------|
//! | `upload` | [`PutRequest`] (destination, headers, body stream, progress) | [`PutOutput`] (location, etag, version id) |
//! | `delete_object` | bucket, key | acknowledgement |
//!
//! Implementations report cumulative byte totals to the request's
//! [`ProgressTracker`] while the body is transferred. The engine keeps only
//! the latest reported total.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

mod client;

pub use client::{S3Client, S3ClientConfig, MIN_PART_SIZE};

/// Body of an uploaded file as a stream of byte chunks.
pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

/// User-defined object metadata (`x-amz-meta-*`).
pub type Metadata = HashMap<String, String>;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Response error: {0}")]
    ResponseError(String),

    #[error("Body read error: {0}")]
    BodyError(#[from] std::io::Error),
}

/// Cumulative progress of a single object transfer.
///
/// Clones share the same counter. Each report replaces the previous value,
/// so the latest cumulative total always wins.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    loaded: Arc<watch::Sender<u64>>,
}

impl ProgressTracker {
    /// Create a tracker starting at zero bytes.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            loaded: Arc::new(tx),
        }
    }

    /// Report the cumulative number of bytes transferred so far.
    pub fn record(&self, loaded: u64) {
        self.loaded.send_replace(loaded);
    }

    /// Latest reported cumulative total.
    pub fn latest(&self) -> u64 {
        *self.loaded.borrow()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A single object upload handed to an [`ObjectStore`].
pub struct PutRequest {
    pub bucket: String,
    pub key: String,
    pub acl: String,
    pub body: BodyStream,
    pub content_type: String,
    pub metadata: Metadata,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub storage_class: String,
    pub server_side_encryption: Option<String>,
    pub sse_kms_key_id: Option<String>,
    pub progress: ProgressTracker,
}

impl fmt::Debug for PutRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("acl", &self.acl)
            .field("content_type", &self.content_type)
            .field("storage_class", &self.storage_class)
            .finish_non_exhaustive()
    }
}

/// Backend response for a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutput {
    pub location: String,
    pub etag: String,
    pub version_id: Option<String>,
}

/// Object storage backend used by the upload engine.
///
/// A single handle is shared by every concurrent upload, so implementations
/// must not keep per-request mutable state.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `request.body` into `request.bucket`/`request.key`.
    async fn upload(&self, request: PutRequest) -> Result<PutOutput, S3ClientError>;

    /// Delete a single object.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), S3ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_latest_total_wins() {
        let progress = ProgressTracker::new();
        progress.record(1024);
        progress.record(4096);
        progress.record(2048);
        assert_eq!(progress.latest(), 2048);
    }

    #[test]
    fn test_progress_clones_share_counter() {
        let progress = ProgressTracker::new();
        let reporter = progress.clone();
        reporter.record(512);
        assert_eq!(progress.latest(), 512);
    }
}
