//! Composer state for one chat window: the prompt being typed, an optional
//! image, the response buffers, and whether a request is in flight.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::buffer::ResponseBuffer;
use crate::dispatch::{
    Backend, Buffers, DispatchReport, Dispatcher, ImageAttachment, Mode, Submission,
};

/// Request lifecycle as shown by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Loading,
    /// The last submission was stopped by the user.
    Stopped,
}

/// Aborts the submission that is currently in flight.
///
/// Cloneable and usable from any task, e.g. a Ctrl-C handler, while the
/// session itself is busy in [`Session::submit`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    current: Arc<watch::Sender<CancellationToken>>,
}

impl StopHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(CancellationToken::new());
        Self {
            current: Arc::new(tx),
        }
    }

    /// Installs a fresh token for a new submission and returns it.
    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        self.current.send_replace(token.clone());
        token
    }

    /// Stops every backend request of the current submission. A no-op when
    /// nothing is in flight.
    pub fn stop(&self) {
        self.current.borrow().cancel();
    }
}

/// A chat window's state.
///
/// # Examples
///
/// ```no_run
/// use twinchat::client::Client;
/// use twinchat::dispatch::{Backend, Dispatcher, Endpoints};
/// use twinchat::session::Session;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new("http://localhost:8080".parse()?);
/// let mut session = Session::new(Dispatcher::new(client, Endpoints::default()));
///
/// session.set_prompt("Why is the sky blue?");
/// session.submit().await;
/// println!("{}", session.buffer(Backend::Ollama).text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session {
    dispatcher: Dispatcher,
    buffers: Buffers,
    prompt: String,
    image: Option<ImageAttachment>,
    mode: Mode,
    lifecycle: watch::Sender<Lifecycle>,
    stop: StopHandle,
}

impl Session {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Idle);
        Self {
            dispatcher,
            buffers: Buffers::new(),
            prompt: String::new(),
            image: None,
            mode: Mode::default(),
            lifecycle,
            stop: StopHandle::new(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    pub fn attach_image(&mut self, image: ImageAttachment) {
        self.image = Some(image);
    }

    pub fn clear_image(&mut self) {
        self.image = None;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    pub fn subscribe_lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    pub fn buffer(&self, backend: Backend) -> &ResponseBuffer {
        self.buffers.get(backend)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Sends the current prompt.
    ///
    /// The prompt is cleared immediately and both buffers are reset; the
    /// image is cleared once the submission has finished. `&mut self` keeps
    /// a second submission from starting while one is loading.
    pub async fn submit(&mut self) -> DispatchReport {
        let submission = Submission {
            prompt: std::mem::take(&mut self.prompt),
            mode: self.mode,
            image: self.image.clone(),
        };

        self.buffers.clear();
        let token = self.stop.arm();
        self.lifecycle.send_replace(Lifecycle::Loading);
        debug!(
            mode = ?submission.mode,
            image = submission.image.is_some(),
            "submission started"
        );

        let report = self
            .dispatcher
            .dispatch(&submission, &self.buffers, &token)
            .await;

        self.image = None;
        let end = if token.is_cancelled() {
            Lifecycle::Stopped
        } else {
            Lifecycle::Idle
        };
        self.lifecycle.send_replace(end);
        debug!(?end, "submission finished");
        report
    }
}
