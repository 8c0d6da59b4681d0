//! Chunked ingestion of large byte streams
//!
//! Build logs can be far larger than anything the healer wants to hold in
//! memory at once. [`process_in_chunks`] (blocking `Read`) and
//! [`process_in_chunks_async`] (Tokio `AsyncRead`) feed a stream to a
//! consumer in pieces of at most `chunk_size` bytes, holding only the
//! current chunk.
//!
//! Chunks are filled up to `chunk_size` before they are handed over, so
//! every chunk except the last has exactly `chunk_size` bytes. Empty chunks
//! are never passed to the consumer. The first consumer error stops reading.
//!
//! [`process_with_limits`] and [`process_with_limits_async`] take both the
//! chunk size and the total byte cap from [`LimitSettings`].

use std::io::{self, Read};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::config::LimitSettings;
use crate::error::ErrorKind;

/// Result type for chunked processing; `Ok` carries the bytes consumed
pub type StreamResult<E> = Result<u64, StreamError<E>>;

/// Errors from chunked stream processing
#[derive(Debug, Error)]
pub enum StreamError<E> {
    #[error("chunk size must be greater than 0")]
    InvalidChunkSize,

    #[error("failed to read stream: {0}")]
    Io(#[from] io::Error),

    /// The stream ran past the configured `max_log_size`
    #[error("stream exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },

    /// The consumer rejected the chunk starting at `offset`
    #[error("chunk consumer failed at byte {offset}: {source}")]
    Consumer {
        offset: u64,
        #[source]
        source: E,
    },
}

impl<E> StreamError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidChunkSize => ErrorKind::Config,
            Self::TooLarge { .. } => ErrorKind::InputTooLarge,
            Self::Io(_) | Self::Consumer { .. } => ErrorKind::Operation,
        }
    }

    /// The consumer's own error, if the consumer is what failed
    pub fn into_consumer_error(self) -> Option<E> {
        match self {
            Self::Consumer { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Read `reader` to the end, passing each chunk of up to `chunk_size` bytes
/// to `consumer`.
///
/// Interrupted reads are retried.
///
/// # Errors
/// - `StreamError::InvalidChunkSize` when `chunk_size` is 0
/// - `StreamError::Io` when the reader fails
/// - `StreamError::Consumer` with the consumer's first error; nothing is
///   read after it
///
/// # Example
/// ```
/// use healer_common::stream::process_in_chunks;
///
/// let log = b"step 1 ok\nstep 2 failed\n".as_slice();
/// let mut lines = 0;
/// let bytes = process_in_chunks(log, 8, |chunk| {
///     lines += chunk.iter().filter(|b| **b == b'\n').count();
///     Ok::<_, std::convert::Infallible>(())
/// })
/// .unwrap();
/// assert_eq!((bytes, lines), (24, 2));
/// ```
pub fn process_in_chunks<R, F, E>(
    mut reader: R,
    chunk_size: usize,
    mut consumer: F,
) -> StreamResult<E>
where
    R: Read,
    F: FnMut(&[u8]) -> Result<(), E>,
{
    if chunk_size == 0 {
        return Err(StreamError::InvalidChunkSize);
    }

    let mut buffer = vec![0u8; chunk_size];
    let mut offset = 0u64;
    loop {
        let filled = fill(&mut buffer, |buf| reader.read(buf))?;
        if filled == 0 {
            break;
        }
        consumer(&buffer[..filled]).map_err(|source| StreamError::Consumer { offset, source })?;
        offset += filled as u64;
        if filled < chunk_size {
            break;
        }
    }

    debug!(bytes = offset, chunk_size, "stream processed");
    Ok(offset)
}

/// Async form of [`process_in_chunks`] for Tokio readers
pub async fn process_in_chunks_async<R, F, E>(
    mut reader: R,
    chunk_size: usize,
    mut consumer: F,
) -> StreamResult<E>
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]) -> Result<(), E>,
{
    if chunk_size == 0 {
        return Err(StreamError::InvalidChunkSize);
    }

    let mut buffer = vec![0u8; chunk_size];
    let mut offset = 0u64;
    loop {
        let mut filled = 0;
        while filled < chunk_size {
            match reader.read(&mut buffer[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::Io(e)),
            }
        }
        if filled == 0 {
            break;
        }
        consumer(&buffer[..filled]).map_err(|source| StreamError::Consumer { offset, source })?;
        offset += filled as u64;
        if filled < chunk_size {
            break;
        }
    }

    debug!(bytes = offset, chunk_size, "stream processed");
    Ok(offset)
}

/// Consumer outcome when a byte cap sits in front of the real consumer
enum Limited<E> {
    Exceeded,
    Consumer(E),
}

fn capped<E>(
    limit: u64,
    mut consumer: impl FnMut(&[u8]) -> Result<(), E>,
) -> impl FnMut(&[u8]) -> Result<(), Limited<E>> {
    let mut seen = 0u64;
    move |chunk| {
        seen += chunk.len() as u64;
        if seen > limit {
            return Err(Limited::Exceeded);
        }
        consumer(chunk).map_err(Limited::Consumer)
    }
}

fn uncap<E>(err: StreamError<Limited<E>>, limit: u64) -> StreamError<E> {
    match err {
        StreamError::InvalidChunkSize => StreamError::InvalidChunkSize,
        StreamError::Io(e) => StreamError::Io(e),
        StreamError::TooLarge { limit } => StreamError::TooLarge { limit },
        StreamError::Consumer { source: Limited::Exceeded, .. } => {
            StreamError::TooLarge { limit }
        }
        StreamError::Consumer { offset, source: Limited::Consumer(source) } => {
            StreamError::Consumer { offset, source }
        }
    }
}

/// [`process_in_chunks`] using `limits.chunk_size`, failing once more than
/// `limits.max_log_size` bytes have been read.
///
/// No chunk that crosses the cap reaches the consumer.
///
/// # Errors
/// Everything [`process_in_chunks`] returns, plus `StreamError::TooLarge`.
pub fn process_with_limits<R, F, E>(
    reader: R,
    limits: &LimitSettings,
    consumer: F,
) -> StreamResult<E>
where
    R: Read,
    F: FnMut(&[u8]) -> Result<(), E>,
{
    let limit = limits.max_log_size as u64;
    process_in_chunks(reader, limits.chunk_size, capped(limit, consumer))
        .map_err(|e| uncap(e, limit))
}

/// Async form of [`process_with_limits`]
pub async fn process_with_limits_async<R, F, E>(
    reader: R,
    limits: &LimitSettings,
    consumer: F,
) -> StreamResult<E>
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]) -> Result<(), E>,
{
    let limit = limits.max_log_size as u64;
    process_in_chunks_async(reader, limits.chunk_size, capped(limit, consumer))
        .await
        .map_err(|e| uncap(e, limit))
}

/// Fill `buffer` from `read` until it is full or the source is exhausted
fn fill<F>(buffer: &mut [u8], mut read: F) -> io::Result<usize>
where
    F: FnMut(&mut [u8]) -> io::Result<usize>,
{
    let mut filled = 0;
    while filled < buffer.len() {
        match read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
