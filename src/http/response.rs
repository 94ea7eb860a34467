//! HTTP/1.1 response head parsing using the [`httparse`] crate.

use thiserror::Error;

use super::{Headers, StatusCode};

/// Errors that can occur while parsing an HTTP/1.1 response head.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response head is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// The status line and headers of a response.
///
/// Created by [`ResponseHead::parse`] from the bytes read so far. The body
/// is not part of the head; whatever follows `body_offset` in the buffer
/// belongs to the [`BodyReader`](super::BodyReader).
///
/// # Examples
///
/// ```
/// use twinchat::http::{ResponseHead, StatusCode};
///
/// let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\ndata: hi\n\n";
/// let (head, offset) = ResponseHead::parse(raw).unwrap();
///
/// assert_eq!(head.status(), StatusCode::Ok);
/// assert_eq!(head.headers().get("content-type"), Some("text/event-stream"));
/// assert_eq!(&raw[offset..], b"data: hi\n\n");
/// ```
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    reason: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
}

impl ResponseHead {
    /// Maximum number of headers we accept per response.
    const MAX_HEADERS: usize = 64;

    /// Parse a response head from a byte slice.
    ///
    /// Returns the parsed head and the byte offset at which the body begins
    /// in `buf` (immediately after the `\r\n\r\n` terminator).
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`]: more data is needed to complete the head.
    /// - [`ResponseError::Parse`]: the data is malformed.
    /// - [`ResponseError::MissingField`]: status or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let code = raw
            .code
            .ok_or(ResponseError::MissingField { field: "status" })?;
        let version = raw
            .version
            .ok_or(ResponseError::MissingField { field: "version" })?;

        Ok((
            Self {
                status: StatusCode::from_u16(code),
                reason: raw.reason.unwrap_or_default().to_owned(),
                version,
                headers: Headers::from_raw(raw.headers),
            },
            body_offset,
        ))
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase sent by the server.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns `true` if the gateway answered with an event stream.
    pub fn is_event_stream(&self) -> bool {
        self.headers
            .get("content-type")
            .is_some_and(|ct| ct.starts_with("text/event-stream"))
    }
}
