//! Incremental Server-Sent Events parser
//!
//! Decodes an SSE byte stream into discrete frames per the WHATWG framing
//! rules: `field: value` lines accumulate into the current frame, a blank
//! line dispatches it. Input arrives in arbitrary network-sized chunks, so
//! partial lines are buffered across calls.

/// One dispatched SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, when the frame carried one
    pub event: Option<String>,

    /// Concatenated `data:` payload; multi-line data is joined with `\n`
    pub data: String,
}

/// Incremental frame parser
///
/// Feed chunks with [`push`](Self::push) as they arrive; call
/// [`finish`](Self::finish) once at end-of-stream to flush a trailing frame
/// that the server never terminated with a blank line.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Partial line carried over from the previous chunk
    line_buffer: String,

    /// `event:` value of the frame being assembled
    pending_event: Option<String>,

    /// `data:` lines of the frame being assembled
    pending_data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of stream text, returning every frame it completed
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        self.line_buffer.push_str(chunk);
        while let Some(newline) = self.line_buffer.find('\n') {
            let line = self.line_buffer[..newline]
                .trim_end_matches('\r')
                .to_string();
            self.line_buffer.drain(..=newline);

            if let Some(frame) = self.take_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Flush the frame left in the buffer at end-of-stream, if any
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            let line = line.trim_end_matches('\r').to_string();
            if let Some(frame) = self.take_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn take_line(&mut self, line: &str) -> Option<SseFrame> {
        // Blank line terminates the current frame
        if line.is_empty() {
            return self.dispatch();
        }

        // Comment line
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            // Field name with no colon carries an empty value
            None => (line, ""),
        };

        match field {
            "event" => self.pending_event = Some(value.to_string()),
            "data" => self.pending_data.push(value.to_string()),
            // id, retry and unknown fields play no role in this engine
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.pending_data.is_empty() {
            self.pending_event = None;
            return None;
        }

        Some(SseFrame {
            event: self.pending_event.take(),
            data: std::mem::take(&mut self.pending_data).join("\n"),
        })
    }
}
