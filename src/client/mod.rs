//! Async HTTP/1.1 client using Tokio.
//!
//! Opens one TCP connection per request, writes the serialized
//! [`Request`], reads the response head and hands the rest of the
//! connection to a [`BodyReader`]. There is no pooling and no TLS: the
//! client only ever talks to the local chat gateway.

use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::http::{
    BodyError, BodyReader, Framing, Headers, ResponseError, ResponseHead, StatusCode,
    request::Request,
};

/// Errors produced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {addr}")]
    ConnectTimeout { addr: String },

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    #[error("malformed response: {0}")]
    Response(#[from] ResponseError),

    #[error("response head exceeds {max_bytes} bytes")]
    HeadTooLarge { max_bytes: usize },

    #[error("connection closed before the response head was complete")]
    ClosedBeforeHead,

    #[error("response body: {0}")]
    Body(#[from] BodyError),

    #[error("HTTP error! status: {0}")]
    Status(u16),
}

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on a response head (64 KiB).
pub const DEFAULT_MAX_HEAD_BYTES: usize = 64 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// A parsed `http://host[:port][/prefix]` base URL.
///
/// # Examples
///
/// ```
/// use twinchat::client::BaseUrl;
///
/// let url: BaseUrl = "http://localhost:8080/api/".parse().unwrap();
/// assert_eq!(url.host(), "localhost");
/// assert_eq!(url.port(), 8080);
/// assert_eq!(url.join("/ollama/chat"), "/api/ollama/chat");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl {
    host: String,
    port: u16,
    prefix: String,
}

impl BaseUrl {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, as used for the socket address and the `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Prefixes an absolute path with the base path.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

impl std::str::FromStr for BaseUrl {
    type Err = ClientError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ClientError::InvalidUrl {
            url: url.to_owned(),
            reason,
        };

        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| invalid("only http:// URLs are supported"))?;
        let (authority, path) = match rest.find('/') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| invalid("port is not a number"))?;
                (host, port)
            }
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
            prefix: path.trim_end_matches('/').to_owned(),
        })
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.prefix)
    }
}

/// A response whose body has not been read yet.
#[derive(Debug)]
pub struct Response {
    head: ResponseHead,
    body: BodyReader<TcpStream>,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    pub fn headers(&self) -> &Headers {
        self.head.headers()
    }

    /// Returns `true` if the body is declared as `text/event-stream`.
    pub fn is_event_stream(&self) -> bool {
        self.head.is_event_stream()
    }

    /// Fails with [`ClientError::Status`] unless the status is 2xx.
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(ClientError::Status(self.status().as_u16()))
        }
    }

    /// Gives up the head and returns the body reader.
    pub fn into_body(self) -> BodyReader<TcpStream> {
        self.body
    }

    /// Reads the whole body and decodes it as UTF-8, replacing invalid sequences.
    pub async fn text(mut self) -> Result<String, ClientError> {
        let bytes: Bytes = self.body.read_to_end().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// The twinchat HTTP client.
///
/// Cheap to clone; holds only its base URL and limits.
#[derive(Debug, Clone)]
pub struct Client {
    base: BaseUrl,
    connect_timeout: Duration,
    max_head_bytes: usize,
}

impl Client {
    pub fn new(base: BaseUrl) -> Self {
        Self {
            base,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
        }
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_head_bytes(mut self, max: usize) -> Self {
        self.max_head_bytes = max;
        self
    }

    pub fn base_url(&self) -> &BaseUrl {
        &self.base
    }

    /// Sends `request` and returns once the response head has arrived.
    ///
    /// The request path is resolved against the base URL's prefix.
    ///
    /// # Errors
    ///
    /// Connection failures, a malformed or oversized head, or the peer
    /// closing before the head was complete. Non-2xx statuses are *not*
    /// errors here; see [`Response::error_for_status`].
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let addr = self.base.authority();
        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout { addr: addr.clone() })?
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let path = self.base.join(request.path());
        let request = request.with_path(path);
        debug!(addr = %addr, method = %request.method(), target = %request.target(), "sending request");

        stream.write_all(&request.into_bytes(&addr)).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        loop {
            match ResponseHead::parse(&buf) {
                Ok((head, body_offset)) => {
                    let leftover = buf.split_off(body_offset);
                    let framing = Framing::from_headers(head.headers());
                    debug!(status = %head.status(), ?framing, "response head received");
                    let body = BodyReader::new(stream, leftover, framing);
                    return Ok(Response { head, body });
                }
                Err(ResponseError::Incomplete) => {}
                Err(e) => {
                    warn!(addr = %addr, error = %e, "malformed response head");
                    return Err(e.into());
                }
            }

            if buf.len() > self.max_head_bytes {
                return Err(ClientError::HeadTooLarge {
                    max_bytes: self.max_head_bytes,
                });
            }
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(ClientError::ClosedBeforeHead);
            }
        }
    }
}
