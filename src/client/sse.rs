//! # SSE Decoder
//!
//! Incremental parser for `text/event-stream` bodies. Chunks from the HTTP
//! body are pushed in as they arrive; complete events come out. Handles
//! `event:` and `data:` fields, multi-line data, comment lines used as
//! keep-alives and CRLF line endings.

use bytes::{Buf, BytesMut};

/// Event type used when no `event:` field was sent
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Line-oriented event stream decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(newline);
            self.buffer.advance(1);

            let mut line = String::from_utf8_lossy(&line).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry are not used by the sync protocol
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
        })
    }
}
