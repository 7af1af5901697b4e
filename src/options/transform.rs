//! Transform stages
//!
//! A transform turns the uploaded body into a derived body (a thumbnail, a
//! compressed copy, ...) that is stored under its own key.

use super::{OptionValue, RequestParts, ResolveError, ResolveFuture};
use crate::s3::BodyStream;
use crate::storage::FileInfo;
use futures::future::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A single-use stream stage: consumes the source body, yields the derived one.
pub struct StreamTransform {
    f: Box<dyn FnOnce(BodyStream) -> BodyStream + Send>,
}

impl StreamTransform {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(BodyStream) -> BodyStream + Send + 'static,
    {
        Self { f: Box::new(f) }
    }

    /// Stage that passes the body through untouched.
    pub fn identity() -> Self {
        Self::new(|body| body)
    }

    pub fn apply(self, body: BodyStream) -> BodyStream {
        (self.f)(body)
    }
}

impl fmt::Debug for StreamTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamTransform(..)")
    }
}

/// Builds a fresh [`StreamTransform`] for each file.
#[derive(Clone)]
pub struct TransformFactory {
    f: Arc<dyn Fn(&RequestParts, &FileInfo) -> ResolveFuture<StreamTransform> + Send + Sync>,
}

impl TransformFactory {
    /// Factory backed by a synchronous callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RequestParts, &FileInfo) -> Result<StreamTransform, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            f: Arc::new(move |req, file| futures::future::ready(f(req, file)).boxed()),
        }
    }

    /// Factory backed by an async callback.
    pub fn computed<F, Fut>(f: F) -> Self
    where
        F: Fn(&RequestParts, &FileInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StreamTransform, ResolveError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |req, file| f(req, file).boxed()),
        }
    }

    /// Factory applying the same body mapping to every file.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(BodyStream) -> BodyStream + Clone + Send + Sync + 'static,
    {
        Self::new(move |_, _| Ok(StreamTransform::new(f.clone())))
    }

    pub fn build(&self, req: &RequestParts, file: &FileInfo) -> ResolveFuture<StreamTransform> {
        (self.f)(req, file)
    }
}

impl fmt::Debug for TransformFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransformFactory(..)")
    }
}

/// One entry of the transform list.
#[derive(Debug, Clone)]
pub struct TransformSpec {
    pub id: Option<String>,
    pub key: OptionValue<String>,
    pub transform: TransformFactory,
}

impl TransformSpec {
    /// Transform stored under a random key unless [`TransformSpec::key`] is set.
    pub fn new(transform: TransformFactory) -> Self {
        Self {
            id: None,
            key: OptionValue::Unset,
            transform,
        }
    }

    /// Label reported back on this transform's result.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn key(mut self, key: impl Into<OptionValue<String>>) -> Self {
        self.key = key.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{stream, StreamExt, TryStreamExt};

    fn request() -> RequestParts {
        http::Request::builder().body(()).unwrap().into_parts().0
    }

    async fn collect(body: BodyStream) -> Vec<u8> {
        body.map_ok(|c| c.to_vec()).try_concat().await.unwrap()
    }

    #[tokio::test]
    async fn test_map_factory_applies_mapping() {
        let factory = TransformFactory::map(|body: BodyStream| {
            body.map_ok(|chunk| Bytes::from(chunk.to_ascii_uppercase()))
                .boxed()
        });
        let file = FileInfo::new("doc", None, "text/plain");

        let stage = factory.build(&request(), &file).await.unwrap();
        let body = stream::iter(vec![Ok(Bytes::from_static(b"abc"))]).boxed();
        assert_eq!(collect(stage.apply(body)).await, b"ABC");
    }

    #[tokio::test]
    async fn test_factory_error_surfaces() {
        let factory =
            TransformFactory::new(|_, _| Err(ResolveError::Transform("no encoder".into())));
        let file = FileInfo::new("doc", None, "text/plain");
        let result = factory.build(&request(), &file).await;
        assert!(matches!(result, Err(ResolveError::Transform(_))));
    }

    #[tokio::test]
    async fn test_identity_passes_through() {
        let body = stream::iter(vec![Ok(Bytes::from_static(b"same"))]).boxed();
        assert_eq!(collect(StreamTransform::identity().apply(body)).await, b"same");
    }
}
