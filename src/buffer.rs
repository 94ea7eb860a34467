//! Observable per-backend response buffers.

use std::sync::Arc;

use tokio::sync::watch;

/// A growing text buffer that renderers can watch.
///
/// Clones share the same underlying text. Only the dispatch path of one
/// backend writes to a given buffer; any number of readers may
/// [`subscribe`](Self::subscribe) and redraw on change.
///
/// # Examples
///
/// ```
/// use twinchat::buffer::ResponseBuffer;
///
/// let buffer = ResponseBuffer::new();
/// let watcher = buffer.subscribe();
/// buffer.append_line("hello");
/// assert_eq!(&*watcher.borrow(), "hello\n");
/// ```
#[derive(Debug, Clone)]
pub struct ResponseBuffer {
    tx: Arc<watch::Sender<String>>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(String::new());
        Self { tx: Arc::new(tx) }
    }

    /// Appends `fragment` followed by a newline.
    pub fn append_line(&self, fragment: &str) {
        self.tx.send_modify(|text| {
            text.push_str(fragment);
            text.push('\n');
        });
    }

    /// Replaces the whole content, e.g. with a single-shot response or an
    /// inline status message.
    pub fn replace(&self, text: impl Into<String>) {
        self.tx.send_replace(text.into());
    }

    /// Empties the buffer.
    pub fn clear(&self) {
        self.tx.send_replace(String::new());
    }

    /// Returns a copy of the current content.
    pub fn text(&self) -> String {
        self.tx.borrow().clone()
    }

    /// Returns a receiver that is notified after every change.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}
