//! Server-sent-event stream decoding.
//!
//! The gateway streams model output as `data: <text>` lines grouped into
//! events separated by a blank line, and ends the stream with a
//! `data: [DONE]` sentinel:
//!
//! ```text
//! data: Hello
//!
//! data: **world**
//!
//! data: [DONE]
//!
//! ```
//!
//! [`EventStreamDecoder`] is the pure, incremental part: feed it bytes as
//! they arrive, in arbitrary pieces, and it returns the [`Frame`]s that
//! became complete. [`pump`] drives a decoder from a body stream into a
//! [`ResponseBuffer`] and honours cancellation.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::buffer::ResponseBuffer;
use crate::client::ClientError;

mod markup;

pub use markup::normalize_markup;

/// Field prefix of payload lines.
pub const DATA_PREFIX: &str = "data:";

/// Payload marking the end of the stream.
pub const SENTINEL: &str = "[DONE]";

/// Event separator.
const EVENT_SEPARATOR: &str = "\n\n";

/// A decoded unit of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A payload, markup already normalized.
    Data(String),
    /// The sentinel was received.
    Done,
}

/// Incremental event-stream decoder.
///
/// # Examples
///
/// ```
/// use twinchat::sse::{EventStreamDecoder, Frame};
///
/// let mut decoder = EventStreamDecoder::new();
/// assert!(decoder.feed(b"data: hel").is_empty());
/// assert_eq!(decoder.feed(b"lo\n\n"), vec![Frame::Data("hello".into())]);
/// assert_eq!(decoder.feed(b"data: [DONE]\n\n"), vec![Frame::Done]);
/// ```
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    /// Bytes of a UTF-8 sequence split across reads.
    pending: Vec<u8>,
    /// Decoded text not yet terminated by an event separator.
    text: String,
    done: bool,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the next piece of the byte stream and returns every frame
    /// completed by it.
    ///
    /// Once [`Frame::Done`] has been returned, further input is ignored.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        self.decode_utf8(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.text.find(EVENT_SEPARATOR) {
            let event: String = self.text.drain(..pos + EVENT_SEPARATOR.len()).collect();
            if self.parse_event(&event[..pos], &mut frames) {
                self.text.clear();
                break;
            }
        }
        frames
    }

    /// Flushes whatever is left when the stream ends without a trailing
    /// blank line.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.text.push_str(&String::from_utf8_lossy(&rest));
        }
        let event = std::mem::take(&mut self.text);
        let mut frames = Vec::new();
        if !event.is_empty() {
            self.parse_event(&event, &mut frames);
        }
        frames
    }

    /// Appends `bytes` to the text buffer, keeping an incomplete trailing
    /// UTF-8 sequence back for the next call. Invalid sequences become U+FFFD.
    fn decode_utf8(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut input = std::mem::take(&mut self.pending);
        let mut start = 0;

        loop {
            let (valid_up_to, error_len) = match std::str::from_utf8(&input[start..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    return;
                }
                Err(e) => (e.valid_up_to(), e.error_len()),
            };
            let valid_end = start + valid_up_to;
            self.text
                .push_str(std::str::from_utf8(&input[start..valid_end]).unwrap_or_default());
            match error_len {
                Some(len) => {
                    self.text.push(char::REPLACEMENT_CHARACTER);
                    start = valid_end + len;
                }
                None => {
                    input.drain(..valid_end);
                    self.pending = input;
                    return;
                }
            }
        }
    }

    /// Extracts `data:` payloads from one event. Returns `true` if the
    /// sentinel was seen.
    fn parse_event(&mut self, event: &str, frames: &mut Vec<Frame>) -> bool {
        for line in event.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some(value) = line.strip_prefix(DATA_PREFIX) else {
                if !line.is_empty() {
                    trace!(line, "ignoring non-data line");
                }
                continue;
            };
            let payload = value.strip_prefix(' ').unwrap_or(value);
            if payload == SENTINEL {
                self.done = true;
                frames.push(Frame::Done);
                return true;
            }
            frames.push(Frame::Data(normalize_markup(payload)));
        }
        false
    }
}

/// How a [`pump`] run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The sentinel arrived or the body ended.
    Completed,
    /// The cancel token fired; nothing was appended after that.
    Stopped,
}

/// Reads `body` to the end, appending every payload plus a newline to `buffer`.
///
/// The cancel token is checked before each read and raced against it, so a
/// stop takes effect at the next read boundary even if the server is silent.
///
/// # Errors
///
/// Propagates body errors. Fragments appended before the error stay in the
/// buffer; the caller decides what to show.
pub async fn pump<S, E>(
    mut body: S,
    buffer: &ResponseBuffer,
    cancel: &CancellationToken,
) -> Result<PumpOutcome, ClientError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<ClientError>,
{
    let mut decoder = EventStreamDecoder::new();
    let mut fragments = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Ok(PumpOutcome::Stopped);
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(fragments, "stream stopped");
                return Ok(PumpOutcome::Stopped);
            }
            next = body.next() => next,
        };

        let (frames, eof) = match next {
            Some(chunk) => (decoder.feed(&chunk.map_err(Into::into)?), false),
            None => (decoder.finish(), true),
        };

        for frame in frames {
            match frame {
                Frame::Data(text) => {
                    fragments += 1;
                    buffer.append_line(&text);
                }
                Frame::Done => {
                    debug!(fragments, "sentinel received");
                    return Ok(PumpOutcome::Completed);
                }
            }
        }

        if eof {
            debug!(fragments, "stream ended without sentinel");
            return Ok(PumpOutcome::Completed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::BodyError;

    fn decode_all(pieces: &[&[u8]]) -> Vec<Frame> {
        let mut decoder = EventStreamDecoder::new();
        let mut frames = Vec::new();
        for piece in pieces {
            frames.extend(decoder.feed(piece));
        }
        frames.extend(decoder.finish());
        frames
    }

    fn data(s: &str) -> Frame {
        Frame::Data(s.to_owned())
    }

    #[test]
    fn split_points_do_not_matter() {
        let wire = b"data: hello\n\ndata: world\n\n";
        let expected = vec![data("hello"), data("world")];
        for a in 0..=wire.len() {
            for b in a..=wire.len() {
                let frames = decode_all(&[&wire[..a], &wire[a..b], &wire[b..]]);
                assert_eq!(frames, expected, "split at {a}/{b}");
            }
        }
    }

    #[test]
    fn multibyte_characters_split_across_reads() {
        let wire = "data: héllo 👋\n\n".as_bytes();
        for cut in 0..=wire.len() {
            let frames = decode_all(&[&wire[..cut], &wire[cut..]]);
            assert_eq!(frames, vec![data("héllo 👋")], "cut at {cut}");
        }
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let frames = decode_all(&[b"data: a\xffb\n\n"]);
        assert_eq!(frames, vec![data("a\u{FFFD}b")]);
    }

    #[test]
    fn sentinel_stops_decoding() {
        let frames = decode_all(&[b"data: one\n\ndata: [DONE]\n\ndata: late\n\n"]);
        assert_eq!(frames, vec![data("one"), Frame::Done]);
    }

    #[test]
    fn prefix_without_space_and_other_fields() {
        let frames = decode_all(&[b": keep-alive\nevent: message\nid: 7\ndata:tight\n\n"]);
        assert_eq!(frames, vec![data("tight")]);
    }

    #[test]
    fn only_one_leading_space_is_stripped() {
        let frames = decode_all(&[b"data:   indented\n\n"]);
        assert_eq!(frames, vec![data("  indented")]);
    }

    #[test]
    fn crlf_lines() {
        let frames = decode_all(&[b"data: one\r\n\ndata: two\r\n\n"]);
        assert_eq!(frames, vec![data("one"), data("two")]);
    }

    #[test]
    fn multiple_data_lines_in_one_event() {
        let frames = decode_all(&[b"data: a\ndata: b\n\n"]);
        assert_eq!(frames, vec![data("a"), data("b")]);
    }

    #[test]
    fn incomplete_event_is_held_back() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b"data: partial\n").is_empty());
        assert_eq!(decoder.feed(b"\n"), vec![data("partial")]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec![data("tail")]);
    }

    #[test]
    fn payloads_are_normalized() {
        let frames = decode_all(&[b"data: this is ** important **\n\n"]);
        assert_eq!(frames, vec![data("this is **important**")]);
    }

    fn body(pieces: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, BodyError>> + Unpin {
        futures::stream::iter(
            pieces
                .iter()
                .map(|&p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn pump_fills_buffer() {
        let buffer = ResponseBuffer::new();
        let cancel = CancellationToken::new();
        let outcome = pump(
            body(&[b"data: hel", b"lo\n\ndata: wor", b"ld\n\n", b"data: [DONE]\n\n"]),
            &buffer,
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(outcome, PumpOutcome::Completed);
        assert_eq!(buffer.text(), "hello\nworld\n");
    }

    #[tokio::test]
    async fn pump_never_appends_sentinel() {
        let buffer = ResponseBuffer::new();
        let cancel = CancellationToken::new();
        pump(body(&[b"data: [DONE]\n\n"]), &buffer, &cancel)
            .await
            .unwrap();
        assert_eq!(buffer.text(), "");
    }

    #[tokio::test]
    async fn pump_respects_prior_cancellation() {
        let buffer = ResponseBuffer::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = pump(body(&[b"data: nope\n\n"]), &buffer, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, PumpOutcome::Stopped);
        assert_eq!(buffer.text(), "");
    }

    #[tokio::test]
    async fn pump_stops_on_silent_stream() {
        let buffer = ResponseBuffer::new();
        let cancel = CancellationToken::new();
        let stalled = body(&[b"data: first\n\n"]).chain(futures::stream::pending());

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            stopper.cancel();
        });

        let outcome = pump(stalled, &buffer, &cancel).await.unwrap();
        assert_eq!(outcome, PumpOutcome::Stopped);
        assert_eq!(buffer.text(), "first\n");
    }

    #[tokio::test]
    async fn pump_propagates_body_errors() {
        let buffer = ResponseBuffer::new();
        let cancel = CancellationToken::new();
        let failing = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: partial\n\n")),
            Err(BodyError::UnexpectedEof),
        ]);
        let err = pump(failing, &buffer, &cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Body(BodyError::UnexpectedEof)));
        assert_eq!(buffer.text(), "partial\n");
    }
}
