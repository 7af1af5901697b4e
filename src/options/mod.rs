//! Storage options
//!
//! Every per-file storage parameter can be given as a literal or computed
//! from the request and the file being uploaded. Options are collected in a
//! [`StorageOptions`] builder and normalized once, at construction, into a
//! [`StorageConfig`] whose fields are all [`Resolver`]s of one uniform shape.
//!
//! # Example
//!
//! ```
//! use s3_multer::options::{Resolver, StorageConfig, StorageOptions};
//!
//! let config = StorageConfig::new(
//!     StorageOptions::new()
//!         .bucket("uploads")
//!         .acl("public-read")
//!         .key(Resolver::from_fn(|_req, file| {
//!             Ok(format!("avatars/{}", file.field_name))
//!         })),
//! )
//! .unwrap();
//! # let _ = config;
//! ```

use crate::config::ConfigError;
use crate::detect::ContentTypeResolver;
use crate::s3::Metadata;
use crate::storage::FileInfo;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

mod settings;
mod transform;

pub use settings::FromSetting;
pub use transform::{StreamTransform, TransformFactory, TransformSpec};

/// Request metadata handed to every resolver.
pub type RequestParts = http::request::Parts;

/// Future returned by a [`Resolver`].
pub type ResolveFuture<T> = BoxFuture<'static, Result<T, ResolveError>>;

/// Default canned ACL.
pub const DEFAULT_ACL: &str = "private";

/// Generic binary content type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Default storage class.
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// Per-file resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Resolver failed: {0}")]
    Failed(String),

    #[error("Content detection failed: {0}")]
    Detection(#[from] std::io::Error),

    #[error("Transform failed: {0}")]
    Transform(String),
}

impl ResolveError {
    /// Build a [`ResolveError::Failed`] from any displayable error.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Normalized option: `(request, file) -> value`.
pub struct Resolver<T> {
    f: Arc<dyn Fn(&RequestParts, &FileInfo) -> ResolveFuture<T> + Send + Sync>,
}

impl<T: Send + 'static> Resolver<T> {
    /// Resolver backed by an async callback.
    ///
    /// The returned future must own what it needs from the request and file.
    pub fn computed<F, Fut>(f: F) -> Self
    where
        F: Fn(&RequestParts, &FileInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |req, file| f(req, file).boxed()),
        }
    }

    /// Resolver backed by a synchronous callback.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RequestParts, &FileInfo) -> Result<T, ResolveError> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |req, file| futures::future::ready(f(req, file)).boxed()),
        }
    }

    /// Resolver that always yields `value`.
    pub fn static_value(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self {
            f: Arc::new(move |_, _| futures::future::ok(value.clone()).boxed()),
        }
    }

    /// Resolve the value for one file.
    pub fn resolve(&self, req: &RequestParts, file: &FileInfo) -> ResolveFuture<T> {
        (self.f)(req, file)
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resolver(..)")
    }
}

/// A user-supplied option before normalization.
#[derive(Debug, Clone)]
pub enum OptionValue<T> {
    Unset,
    Literal(T),
    Computed(Resolver<T>),
}

impl<T> Default for OptionValue<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> OptionValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Whether the option was left unset.
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Normalize a required option, failing when unset.
    pub fn into_required(self, name: &'static str) -> Result<Resolver<T>, ConfigError> {
        match self {
            Self::Unset => Err(ConfigError::MissingOption(name)),
            Self::Literal(value) => Ok(Resolver::static_value(value)),
            Self::Computed(resolver) => Ok(resolver),
        }
    }

    /// Normalize into a resolver, using `default` when unset.
    pub fn into_resolver(self, default: impl FnOnce() -> Resolver<T>) -> Resolver<T> {
        match self {
            Self::Unset => default(),
            Self::Literal(value) => Resolver::static_value(value),
            Self::Computed(resolver) => resolver,
        }
    }
}

impl<T> From<Resolver<T>> for OptionValue<T> {
    fn from(resolver: Resolver<T>) -> Self {
        Self::Computed(resolver)
    }
}

impl From<&str> for OptionValue<String> {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl From<String> for OptionValue<String> {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for OptionValue<Option<String>> {
    fn from(value: &str) -> Self {
        Self::Literal(Some(value.to_string()))
    }
}

impl From<String> for OptionValue<Option<String>> {
    fn from(value: String) -> Self {
        Self::Literal(Some(value))
    }
}

impl From<bool> for OptionValue<bool> {
    fn from(value: bool) -> Self {
        Self::Literal(value)
    }
}

impl From<Metadata> for OptionValue<Metadata> {
    fn from(value: Metadata) -> Self {
        Self::Literal(value)
    }
}

/// Generate a default object key: 16 random bytes, hex encoded.
pub fn random_key() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Resolver producing [`random_key`] for every file.
pub fn random_key_resolver() -> Resolver<String> {
    Resolver::from_fn(|_, _| Ok(random_key()))
}

/// Storage options as supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    pub bucket: OptionValue<String>,
    pub key: OptionValue<String>,
    pub acl: OptionValue<String>,
    pub content_type: Option<ContentTypeResolver>,
    pub metadata: OptionValue<Metadata>,
    pub cache_control: OptionValue<Option<String>>,
    pub should_transform: OptionValue<bool>,
    pub transforms: Vec<TransformSpec>,
    pub content_disposition: OptionValue<Option<String>>,
    pub content_encoding: OptionValue<Option<String>>,
    pub storage_class: OptionValue<String>,
    pub server_side_encryption: OptionValue<Option<String>>,
    pub sse_kms_key_id: OptionValue<Option<String>>,
}

impl StorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destination bucket (required).
    pub fn bucket(mut self, value: impl Into<OptionValue<String>>) -> Self {
        self.bucket = value.into();
        self
    }

    /// Object key. Defaults to a random 32-character hex string.
    pub fn key(mut self, value: impl Into<OptionValue<String>>) -> Self {
        self.key = value.into();
        self
    }

    /// Canned ACL. Defaults to `private`.
    pub fn acl(mut self, value: impl Into<OptionValue<String>>) -> Self {
        self.acl = value.into();
        self
    }

    /// Content type. Defaults to `application/octet-stream`; use
    /// [`ContentTypeResolver::auto`] to sniff it from the stream.
    pub fn content_type(mut self, value: impl Into<ContentTypeResolver>) -> Self {
        self.content_type = Some(value.into());
        self
    }

    pub fn metadata(mut self, value: impl Into<OptionValue<Metadata>>) -> Self {
        self.metadata = value.into();
        self
    }

    pub fn cache_control(mut self, value: impl Into<OptionValue<Option<String>>>) -> Self {
        self.cache_control = value.into();
        self
    }

    /// Whether to route the file through [`StorageOptions::transform`] stages.
    pub fn should_transform(mut self, value: impl Into<OptionValue<bool>>) -> Self {
        self.should_transform = value.into();
        self
    }

    /// Append one transform stage.
    pub fn transform(mut self, spec: TransformSpec) -> Self {
        self.transforms.push(spec);
        self
    }

    pub fn content_disposition(mut self, value: impl Into<OptionValue<Option<String>>>) -> Self {
        self.content_disposition = value.into();
        self
    }

    pub fn content_encoding(mut self, value: impl Into<OptionValue<Option<String>>>) -> Self {
        self.content_encoding = value.into();
        self
    }

    /// Storage class. Defaults to `STANDARD`.
    pub fn storage_class(mut self, value: impl Into<OptionValue<String>>) -> Self {
        self.storage_class = value.into();
        self
    }

    pub fn server_side_encryption(mut self, value: impl Into<OptionValue<Option<String>>>) -> Self {
        self.server_side_encryption = value.into();
        self
    }

    pub fn sse_kms_key_id(mut self, value: impl Into<OptionValue<Option<String>>>) -> Self {
        self.sse_kms_key_id = value.into();
        self
    }
}

/// One normalized transform stage.
#[derive(Debug, Clone)]
pub struct ResolvedTransform {
    pub id: Option<String>,
    pub key: Resolver<String>,
    pub transform: TransformFactory,
}

/// Normalized, immutable adapter configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: Resolver<String>,
    pub key: Resolver<String>,
    pub acl: Resolver<String>,
    pub content_type: ContentTypeResolver,
    pub metadata: Resolver<Metadata>,
    pub cache_control: Resolver<Option<String>>,
    pub should_transform: Resolver<bool>,
    pub transforms: Vec<ResolvedTransform>,
    pub content_disposition: Resolver<Option<String>>,
    pub content_encoding: Resolver<Option<String>>,
    pub storage_class: Resolver<String>,
    pub server_side_encryption: Resolver<Option<String>>,
    pub sse_kms_key_id: Resolver<Option<String>>,
}

impl StorageConfig {
    /// Validate and normalize caller options.
    pub fn new(options: StorageOptions) -> Result<Self, ConfigError> {
        let none = || Resolver::static_value(None);

        Ok(Self {
            bucket: options.bucket.into_required("bucket")?,
            key: options.key.into_resolver(random_key_resolver),
            acl: options
                .acl
                .into_resolver(|| Resolver::static_value(DEFAULT_ACL.to_string())),
            content_type: options
                .content_type
                .unwrap_or_else(ContentTypeResolver::octet_stream),
            metadata: options
                .metadata
                .into_resolver(|| Resolver::static_value(Metadata::new())),
            cache_control: options.cache_control.into_resolver(none),
            should_transform: options
                .should_transform
                .into_resolver(|| Resolver::static_value(false)),
            transforms: options
                .transforms
                .into_iter()
                .map(|spec| ResolvedTransform {
                    id: spec.id,
                    key: spec.key.into_resolver(random_key_resolver),
                    transform: spec.transform,
                })
                .collect(),
            content_disposition: options.content_disposition.into_resolver(none),
            content_encoding: options.content_encoding.into_resolver(none),
            storage_class: options
                .storage_class
                .into_resolver(|| Resolver::static_value(DEFAULT_STORAGE_CLASS.to_string())),
            server_side_encryption: options.server_side_encryption.into_resolver(none),
            sse_kms_key_id: options.sse_kms_key_id.into_resolver(none),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestParts {
        http::Request::builder()
            .uri("/upload")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn file() -> FileInfo {
        FileInfo::new("avatar", Some("me.png".into()), "image/png")
    }

    #[tokio::test]
    async fn test_static_value_ignores_request_and_file() {
        let resolver = Resolver::static_value("fixed".to_string());
        assert_eq!(resolver.resolve(&request(), &file()).await.unwrap(), "fixed");
    }

    #[tokio::test]
    async fn test_from_fn_sees_file() {
        let resolver = Resolver::from_fn(|_, file| {
            Ok(format!("{}/{}", file.field_name, file.original_name.clone().unwrap_or_default()))
        });
        assert_eq!(
            resolver.resolve(&request(), &file()).await.unwrap(),
            "avatar/me.png"
        );
    }

    #[tokio::test]
    async fn test_computed_sees_request() {
        let resolver = Resolver::computed(|req, _| {
            let path = req.uri.path().to_string();
            async move { Ok(path) }
        });
        assert_eq!(resolver.resolve(&request(), &file()).await.unwrap(), "/upload");
    }

    #[tokio::test]
    async fn test_missing_bucket_rejected() {
        let result = StorageConfig::new(StorageOptions::new().acl("public-read"));
        assert!(matches!(result, Err(ConfigError::MissingOption("bucket"))));
    }

    #[tokio::test]
    async fn test_defaults() {
        let config = StorageConfig::new(StorageOptions::new().bucket("b")).unwrap();
        let (req, file) = (request(), file());

        assert_eq!(config.acl.resolve(&req, &file).await.unwrap(), "private");
        assert_eq!(
            config.storage_class.resolve(&req, &file).await.unwrap(),
            "STANDARD"
        );
        assert!(!config.should_transform.resolve(&req, &file).await.unwrap());
        assert!(config.cache_control.resolve(&req, &file).await.unwrap().is_none());
        assert!(config
            .content_disposition
            .resolve(&req, &file)
            .await
            .unwrap()
            .is_none());
        assert!(config.metadata.resolve(&req, &file).await.unwrap().is_empty());
        assert!(config.transforms.is_empty());
    }

    #[tokio::test]
    async fn test_literal_optional_values() {
        let config = StorageConfig::new(
            StorageOptions::new()
                .bucket("b")
                .cache_control("max-age=60")
                .server_side_encryption("aws:kms")
                .sse_kms_key_id("key-1"),
        )
        .unwrap();
        let (req, file) = (request(), file());

        assert_eq!(
            config.cache_control.resolve(&req, &file).await.unwrap().as_deref(),
            Some("max-age=60")
        );
        assert_eq!(
            config
                .server_side_encryption
                .resolve(&req, &file)
                .await
                .unwrap()
                .as_deref(),
            Some("aws:kms")
        );
        assert_eq!(
            config.sse_kms_key_id.resolve(&req, &file).await.unwrap().as_deref(),
            Some("key-1")
        );
    }

    #[test]
    fn test_random_key_is_32_lowercase_hex() {
        let key = random_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_random_keys_do_not_repeat() {
        let keys: std::collections::HashSet<_> = (0..1000).map(|_| random_key()).collect();
        assert_eq!(keys.len(), 1000);
    }
}
