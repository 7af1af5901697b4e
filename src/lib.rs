//! s3-multer Library
//!
//! Streaming S3 storage engine for multipart file uploads.
//!
//! # Features
//!
//! - **Literal or computed options**: every storage parameter (bucket, key,
//!   ACL, metadata, ...) is a fixed value or a per-file resolver
//! - **Concurrent resolution**: all resolvers for a file run at once, first
//!   error wins
//! - **Content sniffing**: MIME type from the first chunk, SVG included,
//!   without losing a byte
//! - **Transform fan-out**: one upload streamed through N transforms to N
//!   objects
//!
//! # Example
//!
//! ```no_run
//! use s3_multer::options::{StorageConfig, StorageOptions};
//! use s3_multer::s3::{S3Client, S3ClientConfig};
//! use s3_multer::storage::{FileInfo, IncomingFile, S3Storage, StorageEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = S3Client::new(S3ClientConfig::default()).await?;
//!     let options = StorageOptions::new()
//!         .bucket("uploads")
//!         .acl("public-read")
//!         .content_type(s3_multer::detect::auto_content_type());
//!     let storage = S3Storage::new(StorageConfig::new(options)?, Arc::new(client));
//!
//!     let req = http::Request::builder().body(())?.into_parts().0;
//!     let file = tokio::fs::File::open("photo.jpg").await?;
//!     let info = FileInfo::new("photo", Some("photo.jpg".into()), "image/jpeg");
//!     let outcome = storage
//!         .handle_file(&req, IncomingFile::from_reader(info, file))
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&outcome)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod detect;
pub mod metrics;
pub mod options;
pub mod s3;
pub mod storage;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use options::{StorageConfig, StorageOptions};
pub use storage::{S3Storage, StorageEngine, UploadOutcome};
pub use upload::UploadError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
