//! AWS SDK backed object store
//!
//! Streams request bodies to S3 without buffering whole files: the body is
//! cut into `part_size` chunks, a body that fits in one chunk goes out as a
//! single PutObject, anything larger becomes a multipart upload.
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | Upload | `s3.upload` | bucket, key, bytes, parts, etag |
//! | DeleteObject | `s3.delete_object` | bucket, key |

use super::{BodyStream, ObjectStore, ProgressTracker, PutOutput, PutRequest, S3ClientError};
use crate::metrics;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, ObjectCannedAcl, ServerSideEncryption, StorageClass,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Minimum part size (5MB) - S3 requirement
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum number of parts in one multipart upload - S3 requirement
///
/// The largest object a client can store is `part_size * MAX_PARTS`.
pub const MAX_PARTS: i32 = 10_000;

/// Characters left as-is in object locations.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// S3 Client configuration
#[derive(Debug, Clone)]
pub struct S3ClientConfig {
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub force_path_style: bool,
    /// Multipart chunk size; objects are capped at `part_size * MAX_PARTS` bytes.
    pub part_size: usize,
}

impl Default for S3ClientConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
            part_size: MIN_PART_SIZE,
        }
    }
}

/// S3 Client
pub struct S3Client {
    config: S3ClientConfig,
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    /// Create a new S3 client
    ///
    /// Static credentials are used when both keys are configured, otherwise
    /// the default AWS provider chain applies.
    pub async fn new(config: S3ClientConfig) -> Result<Self, S3ClientError> {
        if config.part_size < MIN_PART_SIZE {
            return Err(S3ClientError::ConfigError(format!(
                "part_size {} is below the S3 minimum of {} bytes",
                config.part_size, MIN_PART_SIZE
            )));
        }

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                loader = loader.credentials_provider(Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "s3-multer-static",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(S3ClientError::ConfigError(
                    "access_key and secret_key must be configured together".into(),
                ))
            }
        }

        let shared = loader.load().await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(builder.build()),
            config,
        })
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.config.region
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> String {
        self.config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.config.region))
    }

    /// Get the multipart part size
    pub fn part_size(&self) -> usize {
        self.config.part_size
    }

    /// Public URL of an object, in the addressing style this client uses.
    pub fn object_location(&self, bucket: &str, key: &str) -> String {
        let key = utf8_percent_encode(key, KEY_ENCODE_SET);
        if self.config.endpoint.is_some() || self.config.force_path_style {
            format!("{}/{}/{}", self.endpoint().trim_end_matches('/'), bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                bucket, self.config.region, key
            )
        }
    }

    async fn put_single(
        &self,
        request: &ObjectHeader,
        body: Bytes,
    ) -> Result<PutOutput, S3ClientError> {
        let bytes = body.len() as u64;
        let output = self
            .inner
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .acl(ObjectCannedAcl::from(request.acl.as_str()))
            .content_type(&request.content_type)
            .set_metadata(metadata_of(request))
            .set_cache_control(request.cache_control.clone())
            .set_content_disposition(request.content_disposition.clone())
            .set_content_encoding(request.content_encoding.clone())
            .storage_class(StorageClass::from(request.storage_class.as_str()))
            .set_server_side_encryption(sse_of(request))
            .set_ssekms_key_id(request.sse_kms_key_id.clone())
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(sdk_error)?;

        request.progress.record(bytes);

        Ok(PutOutput {
            location: self.object_location(&request.bucket, &request.key),
            etag: output.e_tag().unwrap_or_default().to_string(),
            version_id: output.version_id().map(str::to_owned),
        })
    }

    async fn put_multipart(
        &self,
        request: &ObjectHeader,
        first: Bytes,
        reader: &mut PartReader,
    ) -> Result<PutOutput, S3ClientError> {
        let created = self
            .inner
            .create_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .acl(ObjectCannedAcl::from(request.acl.as_str()))
            .content_type(&request.content_type)
            .set_metadata(metadata_of(request))
            .set_cache_control(request.cache_control.clone())
            .set_content_disposition(request.content_disposition.clone())
            .set_content_encoding(request.content_encoding.clone())
            .storage_class(StorageClass::from(request.storage_class.as_str()))
            .set_server_side_encryption(sse_of(request))
            .set_ssekms_key_id(request.sse_kms_key_id.clone())
            .send()
            .await
            .map_err(sdk_error)?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| S3ClientError::ResponseError("Missing upload ID".into()))?
            .to_string();

        match self
            .upload_parts(request, &upload_id, first, reader)
            .await
        {
            Ok(output) => Ok(output),
            Err(e) => {
                metrics::record_multipart_upload_failure(&request.bucket);
                if let Err(abort_err) = self
                    .inner
                    .abort_multipart_upload()
                    .bucket(&request.bucket)
                    .key(&request.key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        upload_id = %upload_id,
                        error = %DisplayErrorContext(abort_err),
                        "AbortMultipartUpload failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        request: &ObjectHeader,
        upload_id: &str,
        first: Bytes,
        reader: &mut PartReader,
    ) -> Result<PutOutput, S3ClientError> {
        let mut parts = Vec::new();
        let mut loaded = 0u64;
        let mut next = Some(first);
        let mut part_number = 1i32;

        while let Some(body) = next {
            check_part_number(part_number, self.config.part_size)?;
            let size = body.len() as u64;
            let response = self
                .inner
                .upload_part()
                .bucket(&request.bucket)
                .key(&request.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(sdk_error)?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag().map(str::to_owned))
                    .part_number(part_number)
                    .build(),
            );

            loaded += size;
            request.progress.record(loaded);
            tracing::debug!(part_number, bytes = size, loaded, "UploadPart completed");

            part_number += 1;
            next = reader.next_part().await?;
        }

        let completed = self
            .inner
            .complete_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(sdk_error)?;

        tracing::Span::current().record("upload.parts", part_number - 1);
        metrics::record_multipart_upload_success(&request.bucket, (part_number - 1) as usize);

        Ok(PutOutput {
            location: completed
                .location()
                .map(str::to_owned)
                .unwrap_or_else(|| self.object_location(&request.bucket, &request.key)),
            etag: completed.e_tag().unwrap_or_default().to_string(),
            version_id: completed.version_id().map(str::to_owned),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    #[tracing::instrument(
        name = "s3.upload",
        skip_all,
        fields(
            s3.bucket = %request.bucket,
            s3.key = %request.key,
            upload.parts = tracing::field::Empty,
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn upload(&self, request: PutRequest) -> Result<PutOutput, S3ClientError> {
        let (request, body) = ObjectHeader::split(request);
        let mut reader = PartReader::new(body, self.config.part_size);

        let first = reader.next_part().await?.unwrap_or_default();
        let output = if reader.is_exhausted() {
            self.put_single(&request, first).await?
        } else {
            self.put_multipart(&request, first, &mut reader).await?
        };

        tracing::Span::current().record("s3.etag", output.etag.as_str());
        tracing::info!(
            etag = %output.etag,
            bytes = request.progress.latest(),
            "Upload completed"
        );

        Ok(output)
    }

    #[tracing::instrument(
        name = "s3.delete_object",
        skip(self),
        fields(s3.bucket = %bucket, s3.key = %key),
        err
    )]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), S3ClientError> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(sdk_error)?;

        tracing::info!("DeleteObject completed");
        Ok(())
    }
}

/// Everything in a [`PutRequest`] except the body.
///
/// The body stream is `Send` but not `Sync`, so it is split off before the
/// request is borrowed across awaits.
struct ObjectHeader {
    bucket: String,
    key: String,
    acl: String,
    content_type: String,
    metadata: super::Metadata,
    cache_control: Option<String>,
    content_disposition: Option<String>,
    content_encoding: Option<String>,
    storage_class: String,
    server_side_encryption: Option<String>,
    sse_kms_key_id: Option<String>,
    progress: ProgressTracker,
}

impl ObjectHeader {
    fn split(request: PutRequest) -> (Self, BodyStream) {
        let PutRequest {
            bucket,
            key,
            acl,
            body,
            content_type,
            metadata,
            cache_control,
            content_disposition,
            content_encoding,
            storage_class,
            server_side_encryption,
            sse_kms_key_id,
            progress,
        } = request;

        let header = Self {
            bucket,
            key,
            acl,
            content_type,
            metadata,
            cache_control,
            content_disposition,
            content_encoding,
            storage_class,
            server_side_encryption,
            sse_kms_key_id,
            progress,
        };
        (header, body)
    }
}

fn check_part_number(part_number: i32, part_size: usize) -> Result<(), S3ClientError> {
    if part_number > MAX_PARTS {
        return Err(S3ClientError::RequestError(format!(
            "Object exceeds {} parts of {} bytes",
            MAX_PARTS, part_size
        )));
    }
    Ok(())
}

/// Cuts a body stream into parts of at most `part_size` bytes.
struct PartReader {
    body: BodyStream,
    buffer: BytesMut,
    part_size: usize,
    done: bool,
}

impl PartReader {
    fn new(body: BodyStream, part_size: usize) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            part_size,
            done: false,
        }
    }

    async fn next_part(&mut self) -> Result<Option<Bytes>, S3ClientError> {
        while !self.done && self.buffer.len() < self.part_size {
            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(S3ClientError::BodyError(e)),
                None => self.done = true,
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }

        let take = self.buffer.len().min(self.part_size);
        Ok(Some(self.buffer.split_to(take).freeze()))
    }

    /// True once the body has ended and every buffered byte was handed out.
    fn is_exhausted(&self) -> bool {
        self.done && self.buffer.is_empty()
    }
}

fn metadata_of(request: &ObjectHeader) -> Option<super::Metadata> {
    if request.metadata.is_empty() {
        None
    } else {
        Some(request.metadata.clone())
    }
}

fn sse_of(request: &ObjectHeader) -> Option<ServerSideEncryption> {
    request
        .server_side_encryption
        .as_deref()
        .map(ServerSideEncryption::from)
}

fn sdk_error<E>(err: E) -> S3ClientError
where
    E: std::error::Error + 'static,
{
    S3ClientError::RequestError(DisplayErrorContext(err).to_string())
}
