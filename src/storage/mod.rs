//! Storage engine
//!
//! The host-facing side of the adapter. A multipart parser hands each file
//! to [`StorageEngine::handle_file`] and gets back exactly one result: an
//! [`UploadOutcome`] or an [`UploadError`].
//!
//! # Flow
//!
//! ```text
//! handle_file
//!   └── collect      resolve options + content type, concurrently
//!         ├── direct     one object           -> UploadOutcome::Stored
//!         └── transform  one object per stage -> UploadOutcome::Transformed
//! ```

use crate::metrics;
use crate::options::{RequestParts, StorageConfig};
use crate::s3::{BodyStream, Metadata, ObjectStore, S3ClientError};
use crate::upload::{self, UploadError};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

pub mod params;

pub use params::{collect, ObjectParams, ResolvedParams};

/// Read-only description of an uploaded file, as parsed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub field_name: String,
    pub original_name: Option<String>,
    /// MIME type declared by the client.
    pub mime_type: String,
    pub encoding: Option<String>,
}

impl FileInfo {
    pub fn new(
        field_name: impl Into<String>,
        original_name: Option<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            original_name,
            mime_type: mime_type.into(),
            encoding: None,
        }
    }
}

/// A file handed over by the host: its description and its body.
pub struct IncomingFile {
    pub info: FileInfo,
    pub stream: BodyStream,
}

impl IncomingFile {
    pub fn new(info: FileInfo, stream: BodyStream) -> Self {
        Self { info, stream }
    }

    /// Wrap an async reader as the file body.
    pub fn from_reader<R>(info: FileInfo, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::new(info, ReaderStream::new(reader).boxed())
    }
}

impl fmt::Debug for IncomingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingFile")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// One object written to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    /// Transform id, for objects produced by a transform stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Bytes transferred, as last reported by the client.
    pub size: u64,
    pub bucket: String,
    pub key: String,
    pub acl: String,
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub storage_class: String,
    pub server_side_encryption: Option<String>,
    pub metadata: Metadata,
    pub location: String,
    pub etag: String,
    pub version_id: Option<String>,
}

/// Result of storing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadOutcome {
    /// Stored as-is under a single key.
    Stored(StoredObject),
    /// One object per transform, in declaration order.
    Transformed { transforms: Vec<StoredObject> },
}

impl UploadOutcome {
    /// Every object written for the file.
    pub fn objects(&self) -> &[StoredObject] {
        match self {
            Self::Stored(object) => std::slice::from_ref(object),
            Self::Transformed { transforms } => transforms,
        }
    }

    pub fn transforms(&self) -> Option<&[StoredObject]> {
        match self {
            Self::Stored(_) => None,
            Self::Transformed { transforms } => Some(transforms),
        }
    }
}

/// Reference to a previously stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl From<&StoredObject> for ObjectRef {
    fn from(object: &StoredObject) -> Self {
        Self {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
        }
    }
}

/// Storage backend contract used by upload-handling hosts.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Store one uploaded file.
    async fn handle_file(
        &self,
        req: &RequestParts,
        file: IncomingFile,
    ) -> Result<UploadOutcome, UploadError>;

    /// Remove a file stored earlier.
    async fn remove_file(&self, req: &RequestParts, file: &ObjectRef) -> Result<(), S3ClientError>;
}

/// S3-backed storage engine.
#[derive(Clone)]
pub struct S3Storage {
    config: Arc<StorageConfig>,
    client: Arc<dyn ObjectStore>,
}

impl S3Storage {
    pub fn new(config: StorageConfig, client: Arc<dyn ObjectStore>) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

impl fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Storage")
            .field("transforms", &self.config.transforms.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StorageEngine for S3Storage {
    #[tracing::instrument(
        name = "storage.handle_file",
        skip_all,
        fields(
            file.field = %file.info.field_name,
            s3.bucket = tracing::field::Empty,
            s3.key = tracing::field::Empty,
            upload.mode = tracing::field::Empty
        ),
        err
    )]
    async fn handle_file(
        &self,
        req: &RequestParts,
        file: IncomingFile,
    ) -> Result<UploadOutcome, UploadError> {
        let start_time = Instant::now();
        let IncomingFile { info, stream } = file;

        let params = match collect(&self.config, req, &info, stream).await {
            Ok(params) => params,
            Err(e) => {
                metrics::record_error("resolution");
                return Err(e.into());
            }
        };

        let bucket = params.object.bucket.clone();
        let mode = if params.should_transform {
            "transform"
        } else {
            "direct"
        };

        let span = tracing::Span::current();
        span.record("s3.bucket", bucket.as_str());
        span.record("s3.key", params.object.key.as_str());
        span.record("upload.mode", mode);

        let result = if params.should_transform {
            upload::upload_transforms(
                self.client.as_ref(),
                req,
                &info,
                &self.config.transforms,
                params,
            )
            .await
        } else {
            upload::upload_direct(self.client.as_ref(), params).await
        };

        let duration = start_time.elapsed();
        metrics::record_upload_duration(&bucket, mode, duration.as_secs_f64());

        match &result {
            Ok(outcome) => {
                let bytes: u64 = outcome.objects().iter().map(|o| o.size).sum();
                metrics::record_upload_success(&bucket, bytes);
                tracing::info!(
                    objects = outcome.objects().len(),
                    bytes,
                    duration_ms = duration.as_millis(),
                    "File stored"
                );
            }
            Err(e) => {
                metrics::record_upload_failure(&bucket);
                metrics::record_error(e.kind());
                tracing::error!(
                    error = %e,
                    duration_ms = duration.as_millis(),
                    "File upload failed"
                );
            }
        }

        result
    }

    #[tracing::instrument(
        name = "storage.remove_file",
        skip(self, _req),
        fields(s3.bucket = %file.bucket, s3.key = %file.key),
        err
    )]
    async fn remove_file(&self, _req: &RequestParts, file: &ObjectRef) -> Result<(), S3ClientError> {
        let result = self.client.delete_object(&file.bucket, &file.key).await;
        metrics::record_delete(result.is_ok());
        result
    }
}
