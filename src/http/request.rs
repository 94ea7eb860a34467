//! HTTP/1.1 request builder.
//!
//! Provides a fluent builder API for constructing outgoing requests and
//! serializing them to a byte buffer for transmission over TCP.

use bytes::{BufMut, Bytes, BytesMut};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::{Headers, Method};

/// Characters `encodeURIComponent` leaves untouched, inverted.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encodes a query component the way browsers' `encodeURIComponent` does.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// An outgoing HTTP/1.1 request, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use twinchat::http::Request;
///
/// let request = Request::get("/ollama/chat").query("message", "hi there");
/// assert_eq!(request.target(), "/ollama/chat?message=hi%20there");
///
/// let bytes = request.into_bytes("localhost:8080");
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("GET /ollama/chat?message=hi%20there HTTP/1.1\r\n"));
/// assert!(text.contains("Host: localhost:8080\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Creates a request with the given method and origin-form path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for `Request::new(Method::Get, path)`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Shorthand for `Request::new(Method::Post, path)`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Replaces the path, keeping query, headers and body.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Appends a query parameter. Encoding happens in [`target`](Self::target).
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns the path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request headers set so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body.
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Returns the request target: path plus the percent-encoded query string.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }

    /// Serializes the request into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Host: <host>` unless already set.
    /// - `Connection: close`; the client opens one connection per request.
    /// - `Content-Length: <n>` when the body is non-empty.
    pub fn into_bytes(mut self, host: &str) -> BytesMut {
        if !self.headers.contains("host") {
            self.headers.insert("Host", host);
        }
        self.headers.set("Connection", "close");
        if !self.body.is_empty() {
            self.headers
                .set("Content-Length", self.body.len().to_string());
        }

        let target = self.target();
        let estimated_size = 64 + target.len() + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Request line
        buf.put(format!("{} {} HTTP/1.1\r\n", self.method, target).as_bytes());

        // Headers
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body);
        }

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(encode_component("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(encode_component("it's (fine)!*~"), "it's%20(fine)!*~");
        assert_eq!(encode_component("héllo"), "h%C3%A9llo");
        assert_eq!(encode_component("1+1/2?"), "1%2B1%2F2%3F");
    }

    #[test]
    fn get_without_body_has_no_content_length() {
        let s = to_string(Request::get("/gemini/chat").into_bytes("localhost"));
        assert!(s.starts_with("GET /gemini/chat HTTP/1.1\r\n"));
        assert!(s.contains("Connection: close\r\n"));
        assert!(!s.contains("Content-Length"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn post_with_body() {
        let r = Request::post("/upload")
            .header("Content-Type", "text/plain")
            .body("hello");
        let s = to_string(r.into_bytes("localhost:8080"));
        assert!(s.starts_with("POST /upload HTTP/1.1\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn explicit_host_is_kept() {
        let r = Request::get("/").header("Host", "gateway.internal");
        let s = to_string(r.into_bytes("localhost"));
        assert!(s.contains("Host: gateway.internal\r\n"));
        assert!(!s.contains("Host: localhost\r\n"));
    }

    #[test]
    fn multiple_query_params() {
        let r = Request::get("/search").query("q", "rust lang").query("page", "2");
        assert_eq!(r.target(), "/search?q=rust%20lang&page=2");
    }
}
