//! Per-file parameter collection
//!
//! All option resolvers for one file run concurrently. The first failure
//! wins and the remaining results are discarded, so a partially resolved
//! parameter set is never observable.

use crate::options::{RequestParts, ResolveError, StorageConfig};
use crate::s3::{BodyStream, Metadata, ProgressTracker, PutOutput, PutRequest};
use crate::storage::{FileInfo, StoredObject};
use std::fmt;

/// Destination settings shared by every object written for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectParams {
    pub bucket: String,
    pub key: String,
    pub acl: String,
    pub content_type: String,
    pub metadata: Metadata,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub storage_class: String,
    pub server_side_encryption: Option<String>,
    pub sse_kms_key_id: Option<String>,
}

impl ObjectParams {
    /// Upload request for `key` carrying these settings.
    pub fn put_request(&self, key: &str, body: BodyStream, progress: ProgressTracker) -> PutRequest {
        PutRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            acl: self.acl.clone(),
            body,
            content_type: self.content_type.clone(),
            metadata: self.metadata.clone(),
            cache_control: self.cache_control.clone(),
            content_disposition: self.content_disposition.clone(),
            content_encoding: self.content_encoding.clone(),
            storage_class: self.storage_class.clone(),
            server_side_encryption: self.server_side_encryption.clone(),
            sse_kms_key_id: self.sse_kms_key_id.clone(),
            progress,
        }
    }

    /// Result record for an object stored under `key`.
    pub fn stored_object(
        &self,
        id: Option<String>,
        key: String,
        size: u64,
        output: PutOutput,
    ) -> StoredObject {
        StoredObject {
            id,
            size,
            bucket: self.bucket.clone(),
            key,
            acl: self.acl.clone(),
            content_type: self.content_type.clone(),
            content_disposition: self.content_disposition.clone(),
            content_encoding: self.content_encoding.clone(),
            storage_class: self.storage_class.clone(),
            server_side_encryption: self.server_side_encryption.clone(),
            metadata: self.metadata.clone(),
            location: output.location,
            etag: output.etag,
            version_id: output.version_id,
        }
    }
}

/// Everything needed to upload one file, resolved once.
pub struct ResolvedParams {
    pub object: ObjectParams,
    pub should_transform: bool,
    /// Body to upload: the original stream, or its replay after sniffing.
    pub body: BodyStream,
    pub sniffed: bool,
}

impl fmt::Debug for ResolvedParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedParams")
            .field("object", &self.object)
            .field("should_transform", &self.should_transform)
            .field("sniffed", &self.sniffed)
            .finish_non_exhaustive()
    }
}

/// Resolve every option for one file.
pub async fn collect(
    config: &StorageConfig,
    req: &RequestParts,
    file: &FileInfo,
    stream: BodyStream,
) -> Result<ResolvedParams, ResolveError> {
    let (
        bucket,
        key,
        acl,
        metadata,
        should_transform,
        cache_control,
        content_disposition,
        storage_class,
        server_side_encryption,
        sse_kms_key_id,
        content_encoding,
        content,
    ) = futures::try_join!(
        config.bucket.resolve(req, file),
        config.key.resolve(req, file),
        config.acl.resolve(req, file),
        config.metadata.resolve(req, file),
        config.should_transform.resolve(req, file),
        config.cache_control.resolve(req, file),
        config.content_disposition.resolve(req, file),
        config.storage_class.resolve(req, file),
        config.server_side_encryption.resolve(req, file),
        config.sse_kms_key_id.resolve(req, file),
        config.content_encoding.resolve(req, file),
        config.content_type.resolve(req, file, stream),
    )?;

    Ok(ResolvedParams {
        object: ObjectParams {
            bucket,
            key,
            acl,
            content_type: content.content_type,
            metadata,
            cache_control,
            content_disposition,
            content_encoding,
            storage_class,
            server_side_encryption,
            sse_kms_key_id,
        },
        should_transform,
        body: content.stream,
        sniffed: content.sniffed,
    })
}
