//! Byte-level state machine that strips `<think>...</think>` spans out of a
//! textual stream delivered in arbitrary-sized chunks, splitting the input
//! into a "clean" output and a "thinking" output.
//!
//! Reimplemented as an explicit state machine over a char iterator (rather
//! than the generator-style filter a dynamic-language original would use)
//! so that chunk-boundary independence is a property of the type, not of
//! how callers happen to split the input.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    MaybeOpen,
    Inside,
    MaybeClose,
}

/// Splits one textual stream into `clean` and `thinking` outputs,
/// preserving all bytes outside matched `<think>...</think>` spans.
///
/// One instance is owned by the Handler for the lifetime of a single
/// request; it is never shared across requests or reused after EOF.
#[derive(Debug)]
pub struct StreamFilter {
    state: State,
    /// Bytes tentatively matching the open or close tag, not yet committed
    /// to either output stream.
    pending: String,
}

/// Output of feeding one chunk (or flushing at EOF) through the filter.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterOutput {
    pub clean: String,
    pub thinking: String,
}

impl FilterOutput {
    fn is_empty(&self) -> bool {
        self.clean.is_empty() && self.thinking.is_empty()
    }
}

impl Default for StreamFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFilter {
    pub fn new() -> Self {
        Self {
            state: State::Outside,
            pending: String::new(),
        }
    }

    /// Feed the next chunk of input. May be any size, including a single
    /// character or a partial UTF-8-safe fragment of a tag. Output is
    /// identical regardless of how the total input is chunked.
    pub fn feed(&mut self, chunk: &str) -> FilterOutput {
        let mut out = FilterOutput::default();
        for ch in chunk.chars() {
            self.feed_char(ch, &mut out);
        }
        out
    }

    /// Flush at end-of-input. A partial
    /// open-tag buffer is unmatched and belongs to `clean`; a partial
    /// close-tag buffer belongs to `thinking`; being mid-`Inside` emits no
    /// synthetic close (the dangling content stays classified as thinking,
    /// already emitted char-by-char as it arrived).
    pub fn finish(mut self) -> FilterOutput {
        let mut out = FilterOutput::default();
        match self.state {
            State::Outside | State::Inside => {}
            State::MaybeOpen => {
                out.clean.push_str(&self.pending);
                self.pending.clear();
            }
            State::MaybeClose => {
                out.thinking.push_str(&self.pending);
                self.pending.clear();
            }
        }
        out
    }

    fn feed_char(&mut self, ch: char, out: &mut FilterOutput) {
        match self.state {
            State::Outside => {
                if ch == '<' {
                    self.pending.push(ch);
                    self.state = State::MaybeOpen;
                } else {
                    out.clean.push(ch);
                }
            }
            State::MaybeOpen => {
                self.pending.push(ch);
                if self.pending == OPEN_TAG {
                    self.pending.clear();
                    self.state = State::Inside;
                } else if OPEN_TAG.starts_with(&self.pending) {
                    // Still a valid prefix, keep buffering.
                } else {
                    // Mismatch: flush the buffer verbatim and reprocess the
                    // offending char from Outside. The offending char is
                    // always the last one we just pushed.
                    let offending = self.pending.pop();
                    out.clean.push_str(&self.pending);
                    self.pending.clear();
                    self.state = State::Outside;
                    if let Some(c) = offending {
                        self.feed_char(c, out);
                    }
                }
            }
            State::Inside => {
                if ch == '<' {
                    self.pending.push(ch);
                    self.state = State::MaybeClose;
                } else {
                    out.thinking.push(ch);
                }
            }
            State::MaybeClose => {
                self.pending.push(ch);
                if self.pending == CLOSE_TAG {
                    self.pending.clear();
                    self.state = State::Outside;
                } else if CLOSE_TAG.starts_with(&self.pending) {
                    // Still a valid prefix, keep buffering.
                } else {
                    let offending = self.pending.pop();
                    out.thinking.push_str(&self.pending);
                    self.pending.clear();
                    self.state = State::Inside;
                    if let Some(c) = offending {
                        self.feed_char(c, out);
                    }
                }
            }
        }
    }
}

/// Convenience wrapper for one-shot (non-streaming) filtering of an entire
/// string, used by the non-streaming response path.
pub fn filter_once(input: &str) -> FilterOutput {
    let mut filter = StreamFilter::new();
    let mut out = filter.feed(input);
    let tail = filter.finish();
    out.clean.push_str(&tail.clean);
    out.thinking.push_str(&tail.thinking);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_whole(input: &str) -> FilterOutput {
        filter_once(input)
    }

    fn run_chunked(chunks: &[&str]) -> FilterOutput {
        let mut filter = StreamFilter::new();
        let mut out = FilterOutput::default();
        for chunk in chunks {
            let piece = filter.feed(chunk);
            out.clean.push_str(&piece.clean);
            out.thinking.push_str(&piece.thinking);
        }
        let tail = filter.finish();
        out.clean.push_str(&tail.clean);
        out.thinking.push_str(&tail.thinking);
        out
    }

    #[test]
    fn scenario_a_split_across_chunk_boundaries() {
        let out = run_chunked(&["A<thi", "nk>B</thi", "nk>C"]);
        assert_eq!(out.clean, "AC");
        assert_eq!(out.thinking, "B");
    }

    #[test]
    fn scenario_b_non_think_tag_passes_through() {
        let out = run_whole("<notthink>hi");
        assert_eq!(out.clean, "<notthink>hi");
        assert_eq!(out.thinking, "");
    }

    #[test]
    fn scenario_c_eof_mid_block_is_thinking() {
        let out = run_whole("x<think>y");
        assert_eq!(out.clean, "x");
        assert_eq!(out.thinking, "y");
    }

    #[test]
    fn unterminated_open_tag_prefix_flushes_to_clean() {
        let out = run_whole("a<thi");
        assert_eq!(out.clean, "a<thi");
        assert_eq!(out.thinking, "");
    }

    #[test]
    fn unterminated_close_tag_prefix_flushes_to_thinking() {
        let out = run_whole("<think>abc</thi");
        assert_eq!(out.clean, "");
        assert_eq!(out.thinking, "abc</thi");
    }

    #[test]
    fn multiple_think_blocks_in_one_stream() {
        let out = run_whole("before<think>one</think>middle<think>two</think>after");
        assert_eq!(out.clean, "beforemiddleafter");
        assert_eq!(out.thinking, "onetwo");
    }

    #[test]
    fn whitespace_variant_is_not_matched() {
        // Matching is strict: no whitespace tolerance inside the tag.
        let out = run_whole("<think >x</think>");
        assert_eq!(out.clean, "<think >x</think>");
        assert_eq!(out.thinking, "");
    }

    #[test]
    fn chunk_boundary_independence_property() {
        let input = "prefix<think>hidden reasoning</think>suffix<think>more</think>tail";
        let whole = run_whole(input);
        // Rechunk at every byte boundary and in a few odd splits.
        let char_chunks: Vec<String> = input.chars().map(|c| c.to_string()).collect();
        let refs: Vec<&str> = char_chunks.iter().map(|s| s.as_str()).collect();
        let per_char = run_chunked(&refs);
        assert_eq!(whole, per_char);

        let odd = run_chunked(&["prefix<th", "ink>hidd", "en reasoning</thi", "nk>suffix<think>mo", "re</think>tail"]);
        assert_eq!(whole, odd);
    }

    #[test]
    fn empty_input_produces_empty_output() {
        assert!(run_whole("").is_empty());
    }
}
