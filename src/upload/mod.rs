//! Upload engine
//!
//! Drives the object store once parameters for a file are resolved.
//!
//! - **Direct**: the body goes to a single object.
//! - **Transforming**: the body is teed into one branch per transform; each
//!   branch is piped through its stage and uploaded under its own key. All
//!   uploads run concurrently and the first failure ends the file.

use crate::metrics;
use crate::options::{RequestParts, ResolveError, ResolvedTransform};
use crate::s3::{BodyStream, ObjectStore, ProgressTracker, S3ClientError};
use crate::storage::{FileInfo, ObjectParams, ResolvedParams, StoredObject, UploadOutcome};
use futures::future::try_join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

pub mod fanout;

/// Chunks buffered per transform branch before the source is paused.
pub const FANOUT_BUFFER: usize = 4;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolveError),

    #[error("Transport error: {0}")]
    Transport(S3ClientError),

    #[error("Source stream error: {0}")]
    Source(std::io::Error),

    #[error("Transform {index} failed ({completed} completed): {source}")]
    Fanout {
        index: usize,
        /// Sibling uploads already stored when the failure was observed.
        completed: usize,
        #[source]
        source: Box<UploadError>,
    },
}

impl UploadError {
    /// Label used for the `type` dimension of the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resolution(ResolveError::Detection(_)) => "detection",
            Self::Resolution(_) => "resolution",
            Self::Transport(_) => "transport",
            Self::Source(_) => "source",
            Self::Fanout { .. } => "fanout",
        }
    }
}

impl From<S3ClientError> for UploadError {
    fn from(err: S3ClientError) -> Self {
        match err {
            S3ClientError::BodyError(e) => Self::Source(e),
            other => Self::Transport(other),
        }
    }
}

/// Upload `body` under `key` and describe the stored object.
///
/// The reported size is the last cumulative total the store reported.
#[tracing::instrument(
    name = "upload.object",
    skip(client, params, body),
    fields(s3.bucket = %params.bucket, s3.key = %key, upload.bytes = tracing::field::Empty),
    err
)]
pub async fn upload_object(
    client: &dyn ObjectStore,
    params: &ObjectParams,
    key: &str,
    id: Option<String>,
    body: BodyStream,
) -> Result<StoredObject, UploadError> {
    let progress = ProgressTracker::new();
    let output = client
        .upload(params.put_request(key, body, progress.clone()))
        .await?;

    let size = progress.latest();
    tracing::Span::current().record("upload.bytes", size);

    Ok(params.stored_object(id, key.to_string(), size, output))
}

/// Store the body as a single object.
pub async fn upload_direct(
    client: &dyn ObjectStore,
    params: ResolvedParams,
) -> Result<UploadOutcome, UploadError> {
    let ResolvedParams { object, body, .. } = params;
    let stored = upload_object(client, &object, &object.key, None, body).await?;
    Ok(UploadOutcome::Stored(stored))
}

/// Fan the body out through every transform.
///
/// Keys and stages are resolved concurrently before any byte is uploaded.
/// Results are returned in declaration order.
#[tracing::instrument(
    name = "upload.transforms",
    skip_all,
    fields(s3.bucket = %params.object.bucket, transforms = transforms.len()),
    err
)]
pub async fn upload_transforms(
    client: &dyn ObjectStore,
    req: &RequestParts,
    file: &FileInfo,
    transforms: &[ResolvedTransform],
    params: ResolvedParams,
) -> Result<UploadOutcome, UploadError> {
    let ResolvedParams { object, body, .. } = params;

    if transforms.is_empty() {
        tracing::debug!("No transforms configured, nothing to upload");
        return Ok(UploadOutcome::Transformed { transforms: vec![] });
    }

    let (keys, stages) = futures::try_join!(
        try_join_all(transforms.iter().map(|t| t.key.resolve(req, file))),
        try_join_all(transforms.iter().map(|t| t.transform.build(req, file))),
    )?;

    let (branches, driver) = fanout::tee(body, transforms.len(), FANOUT_BUFFER);
    let completed = AtomicUsize::new(0);
    let object = &object;
    let completed_ref = &completed;

    let uploads = transforms
        .iter()
        .zip(keys)
        .zip(stages)
        .zip(branches)
        .enumerate()
        .map(|(index, (((transform, key), stage), branch))| async move {
            let body = stage.apply(branch);
            match upload_object(client, object, &key, transform.id.clone(), body).await {
                Ok(stored) => {
                    completed_ref.fetch_add(1, Ordering::SeqCst);
                    metrics::record_transform_upload(true);
                    Ok(stored)
                }
                Err(e) => {
                    metrics::record_transform_upload(false);
                    Err(UploadError::Fanout {
                        index,
                        completed: completed_ref.load(Ordering::SeqCst),
                        source: Box::new(e),
                    })
                }
            }
        });

    // The driver is polled first so a source failure wins over truncated branches.
    let (read, stored) = futures::try_join!(driver, try_join_all(uploads))?;
    tracing::debug!(
        bytes_read = read,
        stored = completed.load(Ordering::SeqCst),
        "Fan-out complete"
    );

    Ok(UploadOutcome::Transformed { transforms: stored })
}
