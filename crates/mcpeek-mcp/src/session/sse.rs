//! Incremental `text/event-stream` parser.

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `id:` field.
    pub id: Option<String>,
    /// `event:` field.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Feeds raw bytes in, yields complete events.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    // bytes of `buf` already known to hold no newline
    scanned: usize,
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Consume a chunk and return every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }
        self.scanned = self.buf.len();
        events
    }

    /// Flush a trailing unterminated line and any pending event.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buf.is_empty() {
            self.scanned = 0;
            let raw = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            if let Some(event) = self.line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            id,
            event,
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Parse a complete event-stream body.
pub fn parse_sse(body: &str) -> Vec<SseEvent> {
    let mut parser = SseParser::default();
    let mut events = parser.push(body.as_bytes());
    events.extend(parser.finish());
    events
}
