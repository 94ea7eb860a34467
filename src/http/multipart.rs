//! `multipart/form-data` encoding (RFC 7578) for the image upload endpoint.

use bytes::{BufMut, Bytes, BytesMut};

/// A single form field.
#[derive(Debug, Clone)]
struct Part {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

/// A `multipart/form-data` body under construction.
///
/// # Examples
///
/// ```
/// use twinchat::http::Multipart;
///
/// let form = Multipart::new()
///     .text("message", "what is this?")
///     .file("image", "cat.png", "image/png", &b"\x89PNG"[..]);
///
/// let content_type = form.content_type();
/// assert!(content_type.starts_with("multipart/form-data; boundary="));
/// let body = form.into_bytes();
/// assert!(body.ends_with(b"--\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Multipart {
    boundary: String,
    parts: Vec<Part>,
}

impl Multipart {
    /// Creates an empty form with a fresh random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("----twinchat-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Creates an empty form with a caller-chosen boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// Adds a plain text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            file_name: None,
            content_type: None,
            data: Bytes::from(value.into()),
        });
        self
    }

    /// Adds a file field.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
            data: data.into(),
        });
        self
    }

    /// Returns the boundary string.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Returns the value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Serializes every part followed by the closing delimiter.
    pub fn into_bytes(self) -> Bytes {
        let payload: usize = self.parts.iter().map(|p| p.data.len() + 128).sum();
        let mut buf = BytesMut::with_capacity(payload + self.boundary.len() + 8);

        for part in self.parts {
            buf.put(format!("--{}\r\n", self.boundary).as_bytes());
            let disposition = match &part.file_name {
                Some(file) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    quote(&part.name),
                    quote(file)
                ),
                None => format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n",
                    quote(&part.name)
                ),
            };
            buf.put(disposition.as_bytes());
            if let Some(ct) = &part.content_type {
                buf.put(format!("Content-Type: {ct}\r\n").as_bytes());
            }
            buf.put(&b"\r\n"[..]);
            buf.put(part.data);
            buf.put(&b"\r\n"[..]);
        }
        buf.put(format!("--{}--\r\n", self.boundary).as_bytes());

        buf.freeze()
    }
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

/// Escapes a quoted-string parameter the way browsers do for form names.
fn quote(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_layout() {
        let body = Multipart::with_boundary("XYZ")
            .text("message", "hi")
            .file("image", "a.jpg", "image/jpeg", &b"JPG"[..])
            .into_bytes();
        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"message\"\r\n\
            \r\n\
            hi\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"image\"; filename=\"a.jpg\"\r\n\
            Content-Type: image/jpeg\r\n\
            \r\n\
            JPG\r\n\
            --XYZ--\r\n";
        assert_eq!(std::str::from_utf8(&body).unwrap(), expected);
    }

    #[test]
    fn boundaries_are_unique() {
        assert_ne!(Multipart::new().boundary(), Multipart::new().boundary());
    }

    #[test]
    fn quotes_are_escaped_in_file_names() {
        let body = Multipart::with_boundary("b")
            .file("image", "we\"ird.png", "image/png", Bytes::new())
            .into_bytes();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("filename=\"we%22ird.png\""));
    }
}
