//! Server-sent event framing.
//!
//! Only the `data` field is meaningful to the checkers protocol. `event`, `id`
//! and `retry` fields are accepted and ignored, and comment lines (`:`) are
//! dropped.

/// Encode a payload as one SSE frame: `data: <payload>\n\n`.
///
/// Multi-line payloads are split across several `data:` lines.
pub fn encode_frame(data: &str) -> String {
    let mut frame = String::with_capacity(data.len() + 8);
    for line in data.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// Incremental SSE decoder.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; complete events are
/// returned as soon as their terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the data of every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_ref(), ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }
        events
    }

    /// Drop any partially received event, e.g. after the stream was reset.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.data.clear();
    }
}
