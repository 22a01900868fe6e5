//! Server-sent-event framing helpers shared by the upstream response
//! adapters and the outbound client stream.
//!
//! Strips the `data:` prefix and skips blank/`[DONE]` payloads. reqwest's
//! `bytes_stream()` hands us arbitrary chunk boundaries - the same problem
//! `StreamFilter` solves for `<think>` tags - so incomplete lines are
//! buffered across `feed` calls rather than assumed to land on neat
//! boundaries.

/// Accumulates raw upstream bytes and yields complete lines, buffering any
/// trailing partial line until the next chunk arrives or `finish` is called.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of decoded text, returning every complete line it
    /// completes (not including the trailing `\n`).
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line = self.buf[..pos].trim_end_matches('\r').to_string();
            self.buf.drain(..=pos);
            lines.push(line);
        }
        lines
    }

    /// Flush any trailing partial line at EOF.
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf)
        }
    }
}

/// Extract the payload of an SSE `data:` line. Returns `None` for blank
/// lines, comment lines (`:` keep-alives), and other SSE fields (`event:`,
/// `id:`). `[DONE]` is returned as a payload like any other - the
/// `ResponseAdapter` recognizes it in `parse_stream_event` and emits a
/// `done` event rather than treating it as ordinary content.
pub fn data_payload(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Render one canonical value as a `data: ...\n\n` SSE frame.
pub fn encode_data(value: &serde_json::Value) -> String {
    format!("data: {value}\n\n")
}

/// The terminal `data: [DONE]\n\n` frame.
pub fn encode_done() -> &'static str {
    "data: [DONE]\n\n"
}

/// A `: comment\n\n` keep-alive line, sent on an idle timer while a stream
/// has no new data to forward.
pub fn encode_keepalive() -> &'static str {
    ": keep-alive\n\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_splitter_buffers_partial_line_across_feeds() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.feed("data: {\"a\":1}").is_empty());
        let lines = splitter.feed("\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), "data: [DONE]".to_string()]);
    }

    #[test]
    fn finish_yields_trailing_partial_line() {
        let mut splitter = LineSplitter::new();
        splitter.feed("data: {\"a\":1}\n");
        splitter.feed("data: tail-no-newline");
        assert_eq!(splitter.finish(), Some("data: tail-no-newline".to_string()));
    }

    #[test]
    fn data_payload_strips_prefix_and_skips_blank() {
        assert_eq!(data_payload("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(data_payload("data:"), None);
        assert_eq!(data_payload("event: message_start"), None);
        assert_eq!(data_payload(": ping"), None);
    }
}
