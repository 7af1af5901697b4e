//! Common Test Infrastructure
//!
//! Provides shared utilities for integration tests:
//! - In-memory `ObjectStore` that records every call
//! - Request, file and body builders

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use s3_multer::options::RequestParts;
use s3_multer::s3::{BodyStream, Metadata, ObjectStore, PutOutput, PutRequest, S3ClientError};
use s3_multer::storage::{FileInfo, IncomingFile};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Test bucket name
pub const TEST_BUCKET: &str = "test-bucket";

/// One successful upload as seen by the store.
#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub bucket: String,
    pub key: String,
    pub acl: String,
    pub content_type: String,
    pub metadata: Metadata,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub storage_class: String,
    pub server_side_encryption: Option<String>,
    pub body: Vec<u8>,
}

/// In-memory object store.
///
/// Bodies are drained chunk by chunk and the cumulative total is reported
/// after each chunk. Keys can be set up to fail or to stall first.
#[derive(Default)]
pub struct FakeStore {
    upload_calls: AtomicUsize,
    puts: Mutex<Vec<RecordedPut>>,
    deletes: Mutex<Vec<(String, String)>>,
    failing_keys: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    final_progress: Mutex<Option<u64>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject uploads to `key` once their body is drained.
    pub fn fail_key(self, key: &str) -> Self {
        self.failing_keys.lock().unwrap().insert(key.to_string());
        self
    }

    /// Wait before reading the body of `key`.
    pub fn delay_key(self, key: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
        self
    }

    /// Report `total` as the last progress event of every upload.
    pub fn final_progress(self, total: u64) -> Self {
        *self.final_progress.lock().unwrap() = Some(total);
        self
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().unwrap().clone()
    }

    pub fn put(&self, key: &str) -> Option<RecordedPut> {
        self.puts().into_iter().find(|p| p.key == key)
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn upload(&self, mut request: PutRequest) -> Result<PutOutput, S3ClientError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(&request.key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut body = Vec::new();
        while let Some(chunk) = request.body.next().await {
            body.extend_from_slice(&chunk?);
            request.progress.record(body.len() as u64);
        }

        if let Some(total) = *self.final_progress.lock().unwrap() {
            request.progress.record(total);
        }

        if self.failing_keys.lock().unwrap().contains(&request.key) {
            return Err(S3ClientError::RequestError(format!(
                "InternalError: upload of {} rejected",
                request.key
            )));
        }

        let output = PutOutput {
            location: format!("https://{}.s3.test/{}", request.bucket, request.key),
            etag: format!("\"etag-{}\"", request.key),
            version_id: Some("v1".to_string()),
        };

        self.puts.lock().unwrap().push(RecordedPut {
            bucket: request.bucket,
            key: request.key,
            acl: request.acl,
            content_type: request.content_type,
            metadata: request.metadata,
            cache_control: request.cache_control,
            content_disposition: request.content_disposition,
            storage_class: request.storage_class,
            server_side_encryption: request.server_side_encryption,
            body,
        });

        Ok(output)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), S3ClientError> {
        self.deletes
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string()));
        Ok(())
    }
}

/// Request parts for a POST to `uri`.
pub fn request(uri: &str) -> RequestParts {
    http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-user-id", "42")
        .body(())
        .unwrap()
        .into_parts()
        .0
}

/// Body stream yielding `chunks` in order.
pub fn body(chunks: &[&[u8]]) -> BodyStream {
    let chunks: Vec<_> = chunks
        .iter()
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks).boxed()
}

/// Body that fails with `ConnectionReset` after yielding `chunks`.
pub fn failing_body(chunks: &[&[u8]]) -> BodyStream {
    let mut items: Vec<std::io::Result<Bytes>> = chunks
        .iter()
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    items.push(Err(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "client disconnected",
    )));
    stream::iter(items).boxed()
}

pub fn file(field: &str, name: &str, mime: &str, chunks: &[&[u8]]) -> IncomingFile {
    IncomingFile::new(FileInfo::new(field, Some(name.to_string()), mime), body(chunks))
}

/// Minimal PNG header.
pub const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
