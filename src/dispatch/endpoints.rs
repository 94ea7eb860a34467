//! Gateway routes.

use crate::http::{Multipart, Request};

use super::{Backend, ImageAttachment};

/// Builds the requests the gateway understands.
///
/// | Route                              | Response           |
/// |------------------------------------|--------------------|
/// | `GET /{backend}/chat?message=`     | full text          |
/// | `GET /{backend}/stream/chat?message=` | event stream    |
/// | `POST /{image_backend}/chat/image` | full text          |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    image_backend: Backend,
}

impl Endpoints {
    pub fn new(image_backend: Backend) -> Self {
        Self { image_backend }
    }

    /// The backend that serves image prompts.
    pub fn image_backend(&self) -> Backend {
        self.image_backend
    }

    pub fn chat(&self, backend: Backend, message: &str) -> Request {
        Request::get(format!("/{backend}/chat")).query("message", message)
    }

    pub fn stream_chat(&self, backend: Backend, message: &str) -> Request {
        Request::get(format!("/{backend}/stream/chat"))
            .query("message", message)
            .header("Accept", "text/event-stream")
    }

    /// Multipart form with `message` and `image` fields.
    pub fn image_chat(&self, message: &str, image: &ImageAttachment) -> Request {
        let form = Multipart::new().text("message", message).file(
            "image",
            image.file_name.clone(),
            image.content_type.clone(),
            image.data.clone(),
        );
        Request::post(format!("/{}/chat/image", self.image_backend))
            .header("Content-Type", form.content_type())
            .body(form.into_bytes())
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(Backend::Gemini)
    }
}
