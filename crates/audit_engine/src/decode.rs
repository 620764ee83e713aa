use std::collections::VecDeque;

use engine_logging::{engine_debug, engine_warn};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use crate::backend::ByteStream;
use crate::BackendError;

/// One event from a line-delimited response body.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    Data { key: String, data: Value },
    Error { message: String },
    /// Free-text progress note from the backend.
    Status { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent {
    Data { payload: WirePayload },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    Status {
        #[serde(default)]
        message: String,
    },
    /// Terminal marker; anything it carries is ignored.
    Complete {},
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    key: String,
    #[serde(default)]
    data: Value,
}

impl WireEvent {
    fn into_decoded(self) -> Option<DecodedEvent> {
        match self {
            WireEvent::Data { payload } => Some(DecodedEvent::Data {
                key: payload.key,
                data: payload.data,
            }),
            WireEvent::Error { message } => Some(DecodedEvent::Error {
                message: message.unwrap_or_else(|| "unspecified stream error".to_string()),
            }),
            WireEvent::Status { message } => Some(DecodedEvent::Status { message }),
            WireEvent::Complete {} => None,
        }
    }
}

/// Incremental splitter for newline-delimited JSON events.
///
/// Bytes are buffered until a `\n` arrives, so lines (and multi-byte
/// characters) may straddle chunk boundaries. Lines that are not valid
/// events are logged and skipped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    malformed: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        let mut events = Vec::new();
        let mut scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);
        while let Some(offset) = self.buffer[scan_from..].iter().position(|b| *b == b'\n') {
            let end = scan_from + offset;
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            self.decode_line(&line[..end], &mut events);
            scan_from = 0;
        }
        events
    }

    /// Decode whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Vec<DecodedEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        self.decode_line(&rest, &mut events);
        events
    }

    /// Number of lines skipped so far because they could not be decoded.
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    fn decode_line(&mut self, raw: &[u8], out: &mut Vec<DecodedEvent>) {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(err) => {
                self.malformed += 1;
                engine_warn!("Skipping stream line with invalid UTF-8: {}", err);
                return;
            }
        };
        let line = text.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<WireEvent>(line) {
            Ok(event) => match event.into_decoded() {
                Some(decoded) => out.push(decoded),
                None => engine_debug!("Stream signalled completion"),
            },
            Err(err) => {
                self.malformed += 1;
                engine_warn!(
                    "Skipping malformed stream line ({} bytes): {}",
                    line.len(),
                    err
                );
            }
        }
    }
}

/// Pulls decoded events out of a streaming response body.
pub struct EventReader {
    stream: ByteStream,
    decoder: LineDecoder,
    pending: VecDeque<DecodedEvent>,
    finished: bool,
}

impl EventReader {
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next event, a transport error, or `None` once the body has ended.
    ///
    /// A body that ends without any terminal event is a normal close.
    pub async fn next_event(&mut self) -> Option<Result<DecodedEvent, BackendError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => {
                    engine_debug!("Stream chunk of {} bytes", chunk.len());
                    let events = self.decoder.push(&chunk);
                    self.pending.extend(events);
                }
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    let events = self.decoder.finish();
                    self.pending.extend(events);
                }
            }
        }
    }

    pub fn malformed_lines(&self) -> usize {
        self.decoder.malformed_lines()
    }
}
