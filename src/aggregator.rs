use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{Stream, StreamExt, stream};
use serde::Deserialize;

use crate::error::ChatError;

/// Raw newline-delimited frames as read off the wire, in arrival order.
pub type FrameSource = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub content_delta: String,
    pub done: bool,
}

#[derive(Debug, Deserialize)]
struct WireFrame {
    message: Option<WireFrameMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireFrameMessage {
    content: String,
}

impl ResponseFrame {
    pub fn parse(line: &str) -> Result<Self, ChatError> {
        let wire: WireFrame =
            serde_json::from_str(line).map_err(|e| ChatError::MalformedFrame(e.to_string()))?;
        if let Some(err) = wire.error {
            return Err(ChatError::MalformedFrame(format!("server reported: {err}")));
        }
        match (wire.message, wire.done) {
            (Some(m), done) => Ok(Self { content_delta: m.content, done }),
            (None, true) => Ok(Self { content_delta: String::new(), done: true }),
            (None, false) => Err(ChatError::MalformedFrame("frame has no message.content".into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Done,
    Exhausted,
    MalformedFrame,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// The whole response so far.
    Snapshot(String),
    /// A frame could not be parsed; the stream stops after this.
    MalformedFrame(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResponse {
    pub content: String,
    pub end: StreamEnd,
    pub frames: usize,
}

/// Folds frame deltas into one growing string.
///
/// Driven by repeated calls to [`Aggregator::next_update`] until it returns
/// `None`; [`Aggregator::finish`] then hands over whatever was accumulated.
/// A transport error from the source is returned as `Err` and also ends the
/// sequence.
pub struct Aggregator {
    source: FrameSource,
    content: String,
    frames: usize,
    end: Option<StreamEnd>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Aggregator {
    pub fn consume(source: FrameSource) -> Self {
        Self {
            source,
            content: String::new(),
            frames: 0,
            end: None,
            cancel: None,
        }
    }

    /// Checked before every frame read; raising it ends the stream as if the
    /// source were exhausted.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub async fn next_update(&mut self) -> Option<Result<StreamUpdate, ChatError>> {
        if self.end.is_some() {
            return None;
        }
        if self.cancel.as_ref().is_some_and(|c| c.load(Ordering::Acquire)) {
            tracing::info!(frames = self.frames, "stream cancelled");
            self.end = Some(StreamEnd::Cancelled);
            return None;
        }
        let line = match self.source.next().await {
            None => {
                self.end = Some(StreamEnd::Exhausted);
                return None;
            }
            Some(Err(ChatError::MalformedFrame(reason))) => return Some(Ok(self.malformed(reason))),
            Some(Err(e)) => {
                self.end = Some(StreamEnd::Exhausted);
                return Some(Err(e));
            }
            Some(Ok(line)) => line,
        };
        self.frames += 1;
        let frame = match ResponseFrame::parse(&line) {
            Ok(f) => f,
            Err(ChatError::MalformedFrame(reason)) => return Some(Ok(self.malformed(reason))),
            Err(e) => return Some(Ok(self.malformed(e.to_string()))),
        };
        if frame.done {
            self.end = Some(StreamEnd::Done);
            if frame.content_delta.is_empty() {
                return None;
            }
        }
        self.content.push_str(&frame.content_delta);
        Some(Ok(StreamUpdate::Snapshot(self.content.clone())))
    }

    fn malformed(&mut self, reason: String) -> StreamUpdate {
        tracing::warn!(frames = self.frames, %reason, "malformed frame, ending stream");
        self.end = Some(StreamEnd::MalformedFrame);
        StreamUpdate::MalformedFrame(reason)
    }

    pub fn finish(self) -> AggregateResponse {
        AggregateResponse {
            content: self.content,
            end: self.end.unwrap_or(StreamEnd::Exhausted),
            frames: self.frames,
        }
    }
}

/// Splits a chunked byte stream into newline-delimited frames.
///
/// Chunks may cut a line (or a UTF-8 sequence) anywhere; bytes are held
/// until the next `\n`. Blank lines are skipped and a final unterminated
/// line is still yielded.
pub fn ndjson_lines<S, B>(chunks: S) -> impl Stream<Item = Result<String, ChatError>> + Send
where
    S: Stream<Item = Result<B, ChatError>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    stream::unfold(
        (Box::pin(chunks), Vec::<u8>::new(), false),
        |(mut chunks, mut buffer, mut eof)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let rest = buffer.split_off(pos + 1);
                    let line = std::mem::replace(&mut buffer, rest);
                    match decode_line(&line[..pos]) {
                        Some(item) => return Some((item, (chunks, buffer, eof))),
                        None => continue,
                    }
                }
                if eof {
                    if buffer.is_empty() {
                        return None;
                    }
                    let line = std::mem::take(&mut buffer);
                    match decode_line(&line) {
                        Some(item) => return Some((item, (chunks, buffer, eof))),
                        None => return None,
                    }
                }
                match chunks.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => return Some((Err(e), (chunks, buffer, true))),
                    None => eof = true,
                }
            }
        },
    )
}

fn decode_line(raw: &[u8]) -> Option<Result<String, ChatError>> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(
        String::from_utf8(raw.to_vec())
            .map_err(|e| ChatError::MalformedFrame(format!("invalid UTF-8: {e}"))),
    )
}
