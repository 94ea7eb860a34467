//! Request dispatch: one submission in, one or two backend requests out.
//!
//! | Submission              | Requests                                          |
//! |-------------------------|---------------------------------------------------|
//! | image attached          | one multipart `POST` to the image backend         |
//! | streaming (default)     | two concurrent event-stream `GET`s, one per backend |
//! | single-shot             | two concurrent plain `GET`s                       |
//!
//! Each backend renders into its own [`ResponseBuffer`]. A failure is written
//! into the failing backend's buffer as `Error: <message>`; a stop replaces
//! the buffer with [`STOPPED_MESSAGE`]. Neither touches the other backend.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::buffer::ResponseBuffer;
use crate::client::{Client, ClientError};
use crate::sse::{self, PumpOutcome};

mod endpoints;
mod submission;

pub use endpoints::Endpoints;
pub use submission::{Backend, ImageAttachment, Mode, Submission};

/// What a stopped backend shows.
pub const STOPPED_MESSAGE: &str = "Stopped.";

/// One buffer per backend.
#[derive(Debug, Clone, Default)]
pub struct Buffers {
    pub ollama: ResponseBuffer,
    pub gemini: ResponseBuffer,
}

impl Buffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, backend: Backend) -> &ResponseBuffer {
        match backend {
            Backend::Ollama => &self.ollama,
            Backend::Gemini => &self.gemini,
        }
    }

    pub fn clear(&self) {
        self.ollama.clear();
        self.gemini.clear();
    }
}

/// How one backend's part of a submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Stopped,
    /// The message shown inline, without the `Error: ` prefix.
    Failed(String),
    /// No request was issued to this backend.
    Skipped,
}

/// Per-backend outcomes of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub ollama: Outcome,
    pub gemini: Outcome,
}

impl DispatchReport {
    pub fn get(&self, backend: Backend) -> &Outcome {
        match backend {
            Backend::Ollama => &self.ollama,
            Backend::Gemini => &self.gemini,
        }
    }

    /// Returns `true` if any backend ended in [`Outcome::Stopped`].
    pub fn was_stopped(&self) -> bool {
        self.ollama == Outcome::Stopped || self.gemini == Outcome::Stopped
    }
}

/// Issues the requests for a [`Submission`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    endpoints: Endpoints,
}

impl Dispatcher {
    pub fn new(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    /// Runs `submission` to completion, rendering into `buffers`.
    ///
    /// Cancelling `cancel` stops every backend request of this submission.
    /// Buffers are not reset here; callers clear them before dispatching.
    pub async fn dispatch(
        &self,
        submission: &Submission,
        buffers: &Buffers,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let prompt = submission.prompt.as_str();

        if let Some(image) = &submission.image {
            let backend = self.endpoints.image_backend();
            info!(%backend, bytes = image.data.len(), "dispatching image prompt");
            let request = self.endpoints.image_chat(prompt, image);
            let buffer = buffers.get(backend);
            let outcome = self
                .guarded(backend, buffer, cancel.child_token(), async move {
                    let text = self.client.send(request).await?.error_for_status()?.text().await?;
                    buffer.replace(text);
                    Ok::<_, ClientError>(PumpOutcome::Completed)
                })
                .await;
            let mut report = DispatchReport {
                ollama: Outcome::Skipped,
                gemini: Outcome::Skipped,
            };
            match backend {
                Backend::Ollama => report.ollama = outcome,
                Backend::Gemini => report.gemini = outcome,
            }
            return report;
        }

        info!(mode = ?submission.mode, "dispatching prompt to both backends");
        let (ollama, gemini) = match submission.mode {
            Mode::Streaming => tokio::join!(
                self.stream(Backend::Ollama, prompt, buffers, cancel.child_token()),
                self.stream(Backend::Gemini, prompt, buffers, cancel.child_token()),
            ),
            Mode::SingleShot => tokio::join!(
                self.single_shot(Backend::Ollama, prompt, buffers, cancel.child_token()),
                self.single_shot(Backend::Gemini, prompt, buffers, cancel.child_token()),
            ),
        };
        DispatchReport { ollama, gemini }
    }

    async fn stream(
        &self,
        backend: Backend,
        prompt: &str,
        buffers: &Buffers,
        cancel: CancellationToken,
    ) -> Outcome {
        let buffer = buffers.get(backend);
        let request = self.endpoints.stream_chat(backend, prompt);
        self.guarded(backend, buffer, cancel.clone(), async move {
            let response = self.client.send(request).await?.error_for_status()?;
            if !response.is_event_stream() {
                warn!(
                    %backend,
                    content_type = response.headers().get("content-type").unwrap_or(""),
                    "stream answered without text/event-stream; decoding anyway"
                );
            }
            let body = response.into_body().into_stream();
            sse::pump(body, buffer, &cancel).await
        })
        .await
    }

    async fn single_shot(
        &self,
        backend: Backend,
        prompt: &str,
        buffers: &Buffers,
        cancel: CancellationToken,
    ) -> Outcome {
        let buffer = buffers.get(backend);
        let request = self.endpoints.chat(backend, prompt);
        self.guarded(backend, buffer, cancel, async move {
            let text = self.client.send(request).await?.error_for_status()?.text().await?;
            buffer.replace(text);
            Ok::<_, ClientError>(PumpOutcome::Completed)
        })
        .await
    }

    /// Races `work` against `cancel` and renders the result into `buffer`.
    async fn guarded<F>(
        &self,
        backend: Backend,
        buffer: &ResponseBuffer,
        cancel: CancellationToken,
        work: F,
    ) -> Outcome
    where
        F: Future<Output = Result<PumpOutcome, ClientError>>,
    {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(PumpOutcome::Stopped),
            result = work => result,
        };

        match result {
            Ok(PumpOutcome::Completed) => {
                info!(%backend, "backend completed");
                Outcome::Completed
            }
            Ok(PumpOutcome::Stopped) => {
                info!(%backend, "backend stopped");
                buffer.replace(STOPPED_MESSAGE);
                Outcome::Stopped
            }
            Err(_) if cancel.is_cancelled() => {
                info!(%backend, "backend stopped while failing");
                buffer.replace(STOPPED_MESSAGE);
                Outcome::Stopped
            }
            Err(e) => {
                warn!(%backend, error = %e, "backend failed");
                buffer.replace(format!("Error: {e}"));
                Outcome::Failed(e.to_string())
            }
        }
    }
}
