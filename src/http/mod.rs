//! HTTP/1.1 client-side protocol types.
//!
//! This module provides the primitives the [`Client`](crate::client::Client)
//! speaks on the wire: [`Method`], [`StatusCode`], [`Headers`], [`Request`],
//! [`ResponseHead`], [`BodyReader`] and [`Multipart`].

use std::fmt;

pub mod body;
pub mod headers;
pub mod multipart;
pub mod request;
pub mod response;

pub use body::{BodyError, BodyReader, Framing};
pub use headers::Headers;
pub use multipart::Multipart;
pub use request::Request;
pub use response::{ResponseError, ResponseHead};

/// An HTTP response status code as returned by the gateway.
///
/// Codes the client reacts to are named; anything else is carried verbatim
/// in [`StatusCode::Other`].
///
/// # Examples
///
/// ```
/// use twinchat::http::StatusCode;
///
/// let status = StatusCode::from_u16(200);
/// assert_eq!(status, StatusCode::Ok);
/// assert_eq!(status.canonical_reason(), "OK");
/// assert!(status.is_success());
/// assert_eq!(StatusCode::from_u16(418).as_u16(), 418);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    // 2xx Success
    Ok,
    Created,
    Accepted,
    NoContent,

    // 4xx Client Error
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    UnsupportedMediaType,
    TooManyRequests,

    // 5xx Server Error
    InternalServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,

    /// Any code without a named variant.
    Other(u16),
}

impl StatusCode {
    /// Maps a numeric code onto a variant.
    pub fn from_u16(code: u16) -> Self {
        match code {
            200 => Self::Ok,
            201 => Self::Created,
            202 => Self::Accepted,
            204 => Self::NoContent,
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            413 => Self::PayloadTooLarge,
            415 => Self::UnsupportedMediaType,
            429 => Self::TooManyRequests,
            500 => Self::InternalServerError,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            other => Self::Other(other),
        }
    }

    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::Accepted => 202,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::PayloadTooLarge => 413,
            Self::UnsupportedMediaType => 415,
            Self::TooManyRequests => 429,
            Self::InternalServerError => 500,
            Self::BadGateway => 502,
            Self::ServiceUnavailable => 503,
            Self::GatewayTimeout => 504,
            Self::Other(code) => code,
        }
    }

    /// Returns the canonical reason phrase, or `""` for unnamed codes.
    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::Accepted => "Accepted",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::UnsupportedMediaType => "Unsupported Media Type",
            Self::TooManyRequests => "Too Many Requests",
            Self::InternalServerError => "Internal Server Error",
            Self::BadGateway => "Bad Gateway",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::GatewayTimeout => "Gateway Timeout",
            Self::Other(_) => "",
        }
    }

    /// Returns `true` for any 2xx code.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_reason() {
            "" => write!(f, "{}", self.as_u16()),
            reason => write!(f, "{} {}", self.as_u16(), reason),
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// The gateway only ever sees `GET` (chat, stream) and `POST` (image upload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET: retrieve a representation of the target resource.
    Get,
    /// POST: perform resource-specific processing on the request payload.
    Post,
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_codes_round_trip_through_u16() {
        for code in [200u16, 204, 404, 500, 503] {
            assert_eq!(StatusCode::from_u16(code).as_u16(), code);
        }
    }

    #[test]
    fn unknown_code_is_carried() {
        let status = StatusCode::from_u16(418);
        assert_eq!(status, StatusCode::Other(418));
        assert!(!status.is_success());
        assert_eq!(status.to_string(), "418");
    }

    #[test]
    fn success_range() {
        assert!(StatusCode::from_u16(299).is_success());
        assert!(!StatusCode::from_u16(302).is_success());
        assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
    }
}
