//! Stream tee
//!
//! Splits one body into several branches that each see every chunk. Each
//! branch is a bounded channel, so the source is read only as fast as the
//! slowest open branch consumes it and the file is never fully buffered.

use super::UploadError;
use crate::s3::BodyStream;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::{join_all, BoxFuture};
use futures::{FutureExt, SinkExt, StreamExt};
use std::io;

type Branch = mpsc::Sender<io::Result<Bytes>>;

/// Split `source` into `branches` streams.
///
/// Nothing moves until the returned driver is polled. The driver resolves
/// with the number of bytes read once the source ends or every branch has
/// been dropped, or fails with [`UploadError::Source`] when the source does.
pub fn tee(
    source: BodyStream,
    branches: usize,
    buffer: usize,
) -> (Vec<BodyStream>, BoxFuture<'static, Result<u64, UploadError>>) {
    let (senders, receivers): (Vec<Branch>, Vec<_>) =
        (0..branches).map(|_| mpsc::channel(buffer)).unzip();

    let streams = receivers.into_iter().map(|rx| rx.boxed()).collect();
    (streams, drive(source, senders).boxed())
}

async fn drive(mut source: BodyStream, mut senders: Vec<Branch>) -> Result<u64, UploadError> {
    let mut read = 0u64;

    while !senders.is_empty() {
        let chunk = match source.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(UploadError::Source(e)),
            None => break,
        };
        read += chunk.len() as u64;

        let sent = join_all(senders.iter_mut().map(|tx| tx.send(Ok(chunk.clone())))).await;
        let before = senders.len();
        senders = senders
            .into_iter()
            .zip(sent)
            .filter_map(|(tx, result)| result.ok().map(|()| tx))
            .collect();

        if senders.len() < before {
            tracing::debug!(open = senders.len(), "Fan-out branch closed");
        }
    }

    Ok(read)
}
