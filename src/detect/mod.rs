//! Content type detection
//!
//! Sniffs the MIME type of an upload from its first chunk. The chunk is
//! consumed to inspect it, so detection hands back a replacement stream that
//! replays it ahead of the remaining data; consumers see every byte exactly
//! once.
//!
//! Classification is a heuristic over a bounded prefix: markers that only
//! appear past the first chunk are not seen.

use crate::metrics;
use crate::options::{RequestParts, ResolveError, Resolver, DEFAULT_CONTENT_TYPE};
use crate::s3::BodyStream;
use crate::storage::FileInfo;
use futures::future::{BoxFuture, FutureExt};
use futures::StreamExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

mod replay;
mod svg;

pub use replay::ReplayStream;
pub use svg::is_svg;

/// MIME type reported for SVG documents.
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

/// Result of sniffing a stream.
pub struct Detection {
    pub mime_type: String,
    pub stream: BodyStream,
}

impl fmt::Debug for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detection")
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

/// Classify a byte prefix.
///
/// Signature detection runs first; when it finds nothing, or only a text
/// kind (XML, or HTML from a leading comment), the prefix is tested as SVG.
pub fn classify(prefix: &[u8]) -> String {
    let kind = infer::get(prefix);
    let textual = kind.map_or(true, |k| k.matcher_type() == infer::MatcherType::Text);
    let matched = kind.map(|k| k.mime_type());

    if textual && is_svg(&String::from_utf8_lossy(prefix)) {
        return SVG_CONTENT_TYPE.to_string();
    }

    matched.unwrap_or(DEFAULT_CONTENT_TYPE).to_string()
}

/// Sniff the content type of `stream` from its first chunk.
///
/// An empty stream is classified as `application/octet-stream`.
pub async fn detect(mut stream: BodyStream) -> Result<Detection, ResolveError> {
    match stream.next().await {
        Some(Ok(first)) => Ok(Detection {
            mime_type: classify(&first),
            stream: ReplayStream::new(first, stream).boxed(),
        }),
        Some(Err(e)) => Err(ResolveError::Detection(e)),
        None => Ok(Detection {
            mime_type: DEFAULT_CONTENT_TYPE.to_string(),
            stream: futures::stream::empty().boxed(),
        }),
    }
}

/// Content type chosen for one file, and the body to upload.
pub struct ContentTypeOutcome {
    pub content_type: String,
    /// The original stream, or a replay of it when the resolver read ahead.
    pub stream: BodyStream,
    /// Whether `stream` replaces the original.
    pub sniffed: bool,
}

impl fmt::Debug for ContentTypeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTypeOutcome")
            .field("content_type", &self.content_type)
            .field("sniffed", &self.sniffed)
            .finish_non_exhaustive()
    }
}

type ContentTypeFuture = BoxFuture<'static, Result<ContentTypeOutcome, ResolveError>>;

/// Resolves the content type of a file.
///
/// Unlike other options it receives the body, since it may need to read it.
#[derive(Clone)]
pub struct ContentTypeResolver {
    f: Arc<dyn Fn(&RequestParts, &FileInfo, BodyStream) -> ContentTypeFuture + Send + Sync>,
}

impl ContentTypeResolver {
    /// Resolver with full access to the body.
    pub fn custom<F, Fut>(f: F) -> Self
    where
        F: Fn(&RequestParts, &FileInfo, BodyStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ContentTypeOutcome, ResolveError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |req, file, body| f(req, file, body).boxed()),
        }
    }

    /// Content type from a plain resolver; the body passes through untouched.
    pub fn fixed(resolver: Resolver<String>) -> Self {
        Self::custom(move |req, file, stream| {
            let content_type = resolver.resolve(req, file);
            async move {
                Ok(ContentTypeOutcome {
                    content_type: content_type.await?,
                    stream,
                    sniffed: false,
                })
            }
        })
    }

    /// Sniff the content type from the first chunk of the body.
    pub fn auto() -> Self {
        Self::custom(|_, _, stream| async move {
            let detection = detect(stream).await?;
            metrics::record_content_type_detection(&detection.mime_type);
            Ok(ContentTypeOutcome {
                content_type: detection.mime_type,
                stream: detection.stream,
                sniffed: true,
            })
        })
    }

    /// Always `application/octet-stream`.
    pub fn octet_stream() -> Self {
        Self::from(DEFAULT_CONTENT_TYPE)
    }

    pub fn resolve(
        &self,
        req: &RequestParts,
        file: &FileInfo,
        stream: BodyStream,
    ) -> ContentTypeFuture {
        (self.f)(req, file, stream)
    }
}

impl fmt::Debug for ContentTypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentTypeResolver(..)")
    }
}

impl From<&str> for ContentTypeResolver {
    fn from(value: &str) -> Self {
        Self::fixed(Resolver::static_value(value.to_string()))
    }
}

impl From<String> for ContentTypeResolver {
    fn from(value: String) -> Self {
        Self::fixed(Resolver::static_value(value))
    }
}

impl From<Resolver<String>> for ContentTypeResolver {
    fn from(resolver: Resolver<String>) -> Self {
        Self::fixed(resolver)
    }
}

/// Preset: sniff the content type from the stream.
pub fn auto_content_type() -> ContentTypeResolver {
    ContentTypeResolver::auto()
}

/// Preset: generic binary content type.
pub fn default_content_type() -> ContentTypeResolver {
    ContentTypeResolver::octet_stream()
}
