//! Length-prefixed framing over a byte stream.
//!
//! TCP delivers bytes, not messages: one `read` may return half a packet
//! or a packet and a half. Every frame on a Parley connection is
//!
//! ```text
//! ┌──────────────────────┬───────────────────────────┐
//! │ len: u32 big-endian  │ len bytes of encoded data │
//! └──────────────────────┴───────────────────────────┘
//! ```
//!
//! [`FrameReader`] reads the stream in small fixed-size chunks, appends
//! them to an accumulator, and hands out a frame as soon as the
//! accumulator holds a complete one. Each physical read carries a
//! deadline; expiry surfaces as [`TransportError::Timeout`] and loses no
//! buffered bytes, so the caller can simply read again.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Size of the length header in front of every frame.
pub const HEADER_LEN: usize = 4;

/// Default scratch buffer size for a single physical read.
pub const DEFAULT_CHUNK_SIZE: usize = 255;

/// Default upper bound on a single frame's payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Settings shared by [`FrameReader`] and [`FrameWriter`].
#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// Bytes requested from the stream per physical read.
    pub chunk_size: usize,
    /// Largest payload accepted or produced. Anything bigger is a
    /// protocol violation, not a reason to allocate.
    pub max_frame_len: usize,
    /// Deadline for each physical read.
    pub read_timeout: Duration,
    /// Deadline for writing one whole frame. A peer that stops reading
    /// cannot hold a writer past it.
    pub write_timeout: Duration,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            read_timeout: Duration::from_secs(20),
            write_timeout: Duration::from_secs(20),
        }
    }
}

impl FramerConfig {
    /// Same defaults with a different read deadline.
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            ..Self::default()
        }
    }
}

/// Prepends the length header to `payload`.
///
/// # Errors
/// [`TransportError::FrameTooLarge`] if the payload exceeds `max_len`.
pub fn encode_frame(payload: &[u8], max_len: usize) -> Result<Vec<u8>, TransportError> {
    if payload.len() > max_len || payload.len() > u32::MAX as usize {
        return Err(TransportError::FrameTooLarge {
            len: payload.len(),
            max: max_len,
        });
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// Reassembles frames from the read half of a stream.
///
/// There must be exactly one reader per stream.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    max_frame_len: usize,
    read_timeout: Duration,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, config: &FramerConfig) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            scratch: vec![0; config.chunk_size.max(1)],
            max_frame_len: config.max_frame_len,
            read_timeout: config.read_timeout,
        }
    }

    /// Returns the next complete frame's payload.
    ///
    /// - `Ok(Some(payload))`: one frame.
    /// - `Ok(None)`: the peer closed the stream between frames.
    /// - `Err(Timeout)`: a read deadline passed; partial data is kept.
    /// - any other `Err`: the stream is unusable.
    ///
    /// Cancel-safe: dropping the future (e.g. in `tokio::select!`) never
    /// loses bytes that were already read.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Some(frame));
            }

            let read = tokio::time::timeout(
                self.read_timeout,
                self.inner.read(&mut self.scratch),
            )
            .await;

            let n = match read {
                Err(_) => return Err(TransportError::Timeout),
                Ok(Err(e)) => return Err(TransportError::ReceiveFailed(e)),
                Ok(Ok(n)) => n,
            };

            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::UnexpectedEof {
                    buffered: self.buf.len(),
                });
            }

            self.buf.extend_from_slice(&self.scratch[..n]);
            tracing::trace!(read = n, buffered = self.buf.len(), "chunk read");
        }
    }

    /// Number of bytes read but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pops one complete frame off the accumulator, if there is one.
    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
            as usize;
        if len > self.max_frame_len {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        let end = HEADER_LEN + len;
        if self.buf.len() < end {
            return Ok(None);
        }
        let frame = self.buf[HEADER_LEN..end].to_vec();
        self.buf.drain(..end);
        Ok(Some(frame))
    }
}

// ---------------------------------------------------------------------------
// FrameWriter
// ---------------------------------------------------------------------------

/// Writes length-prefixed frames to the write half of a stream.
///
/// Frames are written whole, so as long as one task owns the writer the
/// peer sees them in the order they were written.
pub struct FrameWriter<W> {
    inner: W,
    max_frame_len: usize,
    write_timeout: Duration,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, config: &FramerConfig) -> Self {
        Self {
            inner,
            max_frame_len: config.max_frame_len,
            write_timeout: config.write_timeout,
        }
    }

    /// Writes one frame and flushes it.
    ///
    /// On [`TransportError::WriteTimeout`] part of the frame may already be
    /// on the wire, so the stream is no longer in sync and the writer
    /// should be dropped.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let frame = encode_frame(payload, self.max_frame_len)?;
        let write = async {
            self.inner
                .write_all(&frame)
                .await
                .map_err(TransportError::SendFailed)?;
            self.inner.flush().await.map_err(TransportError::SendFailed)
        };
        tokio::time::timeout(self.write_timeout, write)
            .await
            .map_err(|_| TransportError::WriteTimeout)?
    }

    /// Shuts down the write direction; the peer's reader sees EOF.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }
}
