//! Response body framing.
//!
//! A [`BodyReader`] owns the connection after the head has been parsed and
//! yields the body as a sequence of [`Bytes`] chunks, whatever framing the
//! server picked: `Transfer-Encoding: chunked`, `Content-Length`, or a body
//! delimited by the connection closing.

use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::Headers;

/// Read size used when the buffer runs dry.
const READ_CHUNK: usize = 8 * 1024;

/// Errors produced while reading a response body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size line")]
    InvalidChunkSize,

    #[error("chunk data not followed by CRLF")]
    MissingChunkTerminator,

    #[error("connection closed after {received} of {expected} body bytes")]
    Truncated { received: u64, expected: u64 },

    #[error("connection closed in the middle of a chunked body")]
    UnexpectedEof,
}

/// How the end of the body is signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// `Content-Length: n`.
    Length(u64),
    /// Neither header: the body runs until the server closes the connection.
    UntilClose,
}

impl Framing {
    /// Picks the framing from response headers. `chunked` wins over a length.
    pub fn from_headers(headers: &Headers) -> Self {
        if headers.is_chunked() {
            Self::Chunked
        } else if let Some(len) = headers.content_length() {
            Self::Length(len)
        } else {
            Self::UntilClose
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    /// Expecting a chunk-size line.
    ChunkSize,
    /// Inside chunk data with this many bytes left.
    ChunkData(u64),
    /// Expecting the CRLF that closes a chunk.
    ChunkEnd,
    /// `Content-Length` body with `remaining` of `expected` bytes left.
    Length { remaining: u64, expected: u64 },
    UntilClose,
    Done,
}

/// Streaming body decoder over any async byte source.
///
/// # Examples
///
/// ```
/// use twinchat::http::{BodyReader, Framing};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let wire: &[u8] = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
/// let mut body = BodyReader::new(wire, bytes::BytesMut::new(), Framing::Chunked);
/// let text = body.read_to_end().await.unwrap();
/// assert_eq!(&text[..], b"hello world");
/// # }
/// ```
#[derive(Debug)]
pub struct BodyReader<S> {
    io: S,
    buf: BytesMut,
    state: State,
}

impl<S: AsyncRead + Unpin> BodyReader<S> {
    /// Wraps `io`. `buf` holds any body bytes that were read along with the head.
    pub fn new(io: S, buf: BytesMut, framing: Framing) -> Self {
        let state = match framing {
            Framing::Chunked => State::ChunkSize,
            Framing::Length(0) => State::Done,
            Framing::Length(n) => State::Length {
                remaining: n,
                expected: n,
            },
            Framing::UntilClose => State::UntilClose,
        };
        Self { io, buf, state }
    }

    /// Returns `true` once the final chunk (or last byte) has been yielded.
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Reads more bytes from the connection. Returns `false` at EOF.
    async fn fill(&mut self) -> Result<bool, BodyError> {
        self.buf.reserve(READ_CHUNK);
        let n = self.io.read_buf(&mut self.buf).await?;
        Ok(n > 0)
    }

    /// Returns the next piece of body data, or `None` at the end of the body.
    ///
    /// Chunk boundaries on the wire do not map to returned pieces; callers
    /// must not rely on them.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, BodyError> {
        loop {
            match self.state {
                State::Done => return Ok(None),

                State::ChunkSize => match httparse::parse_chunk_size(&self.buf) {
                    Ok(httparse::Status::Complete((consumed, 0))) => {
                        // Trailers are not surfaced; drop the rest.
                        self.buf.advance(consumed);
                        self.state = State::Done;
                        return Ok(None);
                    }
                    Ok(httparse::Status::Complete((consumed, size))) => {
                        self.buf.advance(consumed);
                        self.state = State::ChunkData(size);
                    }
                    Ok(httparse::Status::Partial) => {
                        if !self.fill().await? {
                            return Err(BodyError::UnexpectedEof);
                        }
                    }
                    Err(_) => return Err(BodyError::InvalidChunkSize),
                },

                State::ChunkData(remaining) => {
                    if self.buf.is_empty() && !self.fill().await? {
                        return Err(BodyError::UnexpectedEof);
                    }
                    let take = remaining.min(self.buf.len() as u64) as usize;
                    let left = remaining - take as u64;
                    self.state = if left == 0 {
                        State::ChunkEnd
                    } else {
                        State::ChunkData(left)
                    };
                    return Ok(Some(self.buf.split_to(take).freeze()));
                }

                State::ChunkEnd => {
                    if self.buf.len() < 2 {
                        if !self.fill().await? {
                            return Err(BodyError::UnexpectedEof);
                        }
                        continue;
                    }
                    if &self.buf[..2] != b"\r\n" {
                        return Err(BodyError::MissingChunkTerminator);
                    }
                    self.buf.advance(2);
                    self.state = State::ChunkSize;
                }

                State::Length {
                    remaining,
                    expected,
                } => {
                    if self.buf.is_empty() && !self.fill().await? {
                        return Err(BodyError::Truncated {
                            received: expected - remaining,
                            expected,
                        });
                    }
                    let take = remaining.min(self.buf.len() as u64) as usize;
                    let left = remaining - take as u64;
                    self.state = if left == 0 {
                        State::Done
                    } else {
                        State::Length {
                            remaining: left,
                            expected,
                        }
                    };
                    return Ok(Some(self.buf.split_to(take).freeze()));
                }

                State::UntilClose => {
                    if self.buf.is_empty() && !self.fill().await? {
                        self.state = State::Done;
                        return Ok(None);
                    }
                    return Ok(Some(self.buf.split().freeze()));
                }
            }
        }
    }

    /// Collects the whole body.
    pub async fn read_to_end(&mut self) -> Result<Bytes, BodyError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }
}

impl<S: AsyncRead + Unpin + Send + 'static> BodyReader<S> {
    /// Turns the reader into a [`Stream`] of body pieces.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, BodyError>> + Send + Unpin {
        Box::pin(futures::stream::unfold(Some(self), |reader| async move {
            let mut reader = reader?;
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        }))
    }
}
