//! Server-Sent Events (SSE) frame decoding.
//!
//! Turns an arbitrarily chunked byte stream into ordered text deltas.
//!
//! SSE format:
//! ```text
//! : keep-alive
//!
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Decoding is fully incremental: UTF-8 sequences and lines may be split at any
//! byte, and the result does not depend on where the chunk boundaries fall.

use tracing::{debug, warn};

use crate::model::extract_delta;

/// Prefix of a payload line.
pub const DATA_PREFIX: &str = "data: ";

/// Classification of one reassembled line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFrame<'a> {
    /// Blank or whitespace-only line.
    Empty,
    /// Line starting with `:`, typically a heartbeat.
    Comment,
    /// `data: ` line. Holds the trimmed payload.
    Data(&'a str),
    /// Any other field (`event:`, `id:`, ...). Ignored.
    Other,
}

/// Classify a single line (without its terminator).
pub fn classify_line(line: &str) -> EventFrame<'_> {
    if line.trim().is_empty() {
        EventFrame::Empty
    } else if line.starts_with(':') {
        EventFrame::Comment
    } else if let Some(data) = parse_sse_line(line) {
        EventFrame::Data(data)
    } else {
        EventFrame::Other
    }
}

/// Parse an SSE line to extract the data portion.
///
/// SSE lines are in the format: `data: <content>`
///
/// # Example
/// ```
/// use neuroviz::sse::parse_sse_line;
///
/// let line = "data: {\"key\": \"value\"}";
/// assert_eq!(parse_sse_line(line), Some("{\"key\": \"value\"}"));
///
/// let line = "invalid";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX).map(|s| s.trim())
}

/// Check if an SSE data line indicates the stream is done.
///
/// # Example
/// ```
/// use neuroviz::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker(""));
/// assert!(!is_done_marker("{\"data\": \"value\"}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}

/// Stateful UTF-8 decoder.
///
/// An incomplete trailing sequence is held back until the next chunk completes it.
/// Invalid sequences are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk` and append the text to `out`.
    pub fn decode(&mut self, chunk: &[u8], out: &mut String) {
        self.pending.extend_from_slice(chunk);

        let mut consumed = 0;
        loop {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(s) = std::str::from_utf8(&rest[..valid]) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + len;
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
    }

    /// Bytes of an unfinished multi-byte sequence.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Carry-over text between chunk reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    text: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    /// Remove and return the next complete line, without `\n` or a trailing `\r`.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.text.find('\n')?;
        let mut line: String = self.text.drain(..=pos).collect();
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Put a line back at the front, restoring its terminator.
    pub fn push_front_line(&mut self, line: &str) {
        self.text.insert(0, '\n');
        self.text.insert_str(0, line);
    }

    /// Text not yet resolved into complete lines.
    pub fn remainder(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// Incremental decoder from raw body bytes to text deltas.
///
/// A `data:` line whose JSON fails to parse is pushed back onto the buffer and
/// draining pauses until the next chunk. Each later chunk retries it once, alone
/// and merged with the following line. After `max_frame_retries` failed retries
/// the line is dropped.
#[derive(Debug)]
pub struct FrameDecoder {
    utf8: Utf8Decoder,
    lines: LineBuffer,
    max_frame_retries: usize,
    /// Failed parses of the requeued line at the front of `lines`.
    stalled: Option<usize>,
    finished: bool,
    dropped_frames: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(3)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_retries: usize) -> Self {
        Self {
            utf8: Utf8Decoder::new(),
            lines: LineBuffer::new(),
            max_frame_retries,
            stalled: None,
            finished: false,
            dropped_frames: 0,
        }
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of malformed `data:` frames dropped so far.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    /// Consume one chunk and return the deltas it completed, in order.
    ///
    /// After the sentinel every further chunk is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.finished {
            return deltas;
        }

        let mut text = String::with_capacity(chunk.len());
        self.utf8.decode(chunk, &mut text);
        self.lines.push_str(&text);
        self.drain(false, &mut deltas);
        deltas
    }

    /// Handle end of the byte stream.
    ///
    /// Complete lines still buffered are processed with no further waiting.
    /// Unparsable ones are dropped. An unterminated last line is discarded.
    pub fn finish(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.finished {
            return deltas;
        }

        self.drain(true, &mut deltas);
        if !self.lines.is_empty() {
            debug!(
                bytes = self.lines.remainder().len(),
                "discarding unterminated line at end of stream"
            );
        }
        if self.utf8.pending() > 0 {
            debug!(bytes = self.utf8.pending(), "discarding incomplete UTF-8 sequence");
        }
        self.close();
        deltas
    }

    fn close(&mut self) {
        self.finished = true;
        self.stalled = None;
        self.lines.clear();
        self.utf8.reset();
    }

    fn drain(&mut self, flush: bool, out: &mut Vec<String>) {
        let mut retrying = self.stalled.is_some();

        while let Some(line) = self.lines.next_line() {
            // Only the first line of a pass can be the requeued one.
            let retry = std::mem::replace(&mut retrying, false);

            let payload = match classify_line(&line) {
                EventFrame::Data(payload) => payload,
                EventFrame::Empty | EventFrame::Comment | EventFrame::Other => continue,
            };

            if is_done_marker(payload) {
                debug!("received [DONE] sentinel");
                self.close();
                return;
            }

            match extract_delta(payload) {
                Ok(delta) => out.extend(delta),
                Err(err) => {
                    if retry || flush {
                        if let Some(delta) = self.try_merge(&line) {
                            self.stalled = None;
                            out.extend(delta);
                            continue;
                        }
                    }

                    let failures = if retry {
                        self.stalled.unwrap_or(0) + 1
                    } else {
                        1
                    };

                    if flush || failures > self.max_frame_retries {
                        warn!(error = %err, failures, "dropping malformed data frame");
                        self.stalled = None;
                        self.dropped_frames += 1;
                        continue;
                    }

                    debug!(error = %err, failures, "incomplete data frame, waiting for more data");
                    self.stalled = Some(failures);
                    self.lines.push_front_line(&line);
                    return;
                }
            }
        }

        if retrying {
            // Nothing was extracted, so the requeued line is gone. Should not happen.
            self.stalled = None;
        }
    }

    /// Try `line` joined with the next complete line.
    ///
    /// `Some` means the merged frame parsed and both lines are consumed.
    fn try_merge(&mut self, line: &str) -> Option<Option<String>> {
        let next = self.lines.next_line()?;
        let merged = format!("{line}\n{next}");

        if let EventFrame::Data(payload) = classify_line(&merged) {
            if let Ok(delta) = extract_delta(payload) {
                debug!("recovered data frame split by a newline");
                return Some(delta);
            }
        }

        self.lines.push_front_line(&next);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const E2E_BODY: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n",
        "data: [DONE]\n",
    );

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = FrameDecoder::default();
        let mut deltas = Vec::new();
        for chunk in chunks {
            deltas.extend(decoder.feed(chunk));
        }
        deltas.extend(decoder.finish());
        deltas
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: hello"), Some("hello"));
        assert_eq!(
            parse_sse_line("data: {\"key\": \"value\"}"),
            Some("{\"key\": \"value\"}")
        );
        assert_eq!(parse_sse_line("data:   spaces  "), Some("spaces"));
        assert_eq!(parse_sse_line("data:nospace"), None);
        assert_eq!(parse_sse_line("invalid"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn test_is_done_marker() {
        assert!(is_done_marker("[DONE]"));
        assert!(!is_done_marker(""));
        assert!(!is_done_marker("data"));
        assert!(!is_done_marker("{\"key\": \"value\"}"));
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line(""), EventFrame::Empty);
        assert_eq!(classify_line("   \t"), EventFrame::Empty);
        assert_eq!(classify_line(": ping"), EventFrame::Comment);
        assert_eq!(classify_line("event: message"), EventFrame::Other);
        assert_eq!(classify_line("data: [DONE]"), EventFrame::Data("[DONE]"));
    }

    #[test]
    fn test_line_buffer_strips_crlf_and_keeps_partial() {
        let mut buffer = LineBuffer::new();
        buffer.push_str("one\r\ntwo\npar");

        assert_eq!(buffer.next_line().as_deref(), Some("one"));
        assert_eq!(buffer.next_line().as_deref(), Some("two"));
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.remainder(), "par");

        buffer.push_front_line("back");
        assert_eq!(buffer.next_line().as_deref(), Some("back"));
        assert_eq!(buffer.remainder(), "par");
    }

    #[test]
    fn test_utf8_decoder_holds_split_sequence() {
        let bytes = "é✓".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();

        decoder.decode(&bytes[..1], &mut out);
        assert_eq!(out, "");
        assert_eq!(decoder.pending(), 1);

        decoder.decode(&bytes[1..3], &mut out);
        assert_eq!(out, "é");

        decoder.decode(&bytes[3..], &mut out);
        assert_eq!(out, "é✓");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode(b"a\xffb", &mut out);
        assert_eq!(out, "a\u{FFFD}b");
    }

    #[test]
    fn test_e2e_deltas_in_order() {
        assert_eq!(decode_chunks(&[E2E_BODY.as_bytes()]), vec![" world", "!"]);
    }

    #[test]
    fn test_ignores_comments_blank_and_unknown_fields() {
        let body = format!(
            ": heartbeat\r\n\r\nevent: delta\nid: 7\n{}data: [DONE]\n",
            frame("ok")
        );
        assert_eq!(decode_chunks(&[body.as_bytes()]), vec!["ok"]);
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_deltas() {
        let body = format!(
            ": open\n{}{}{}data: [DONE]\n",
            frame("Καλη"),
            frame(" 日本語"),
            frame(" 🦀!")
        );
        let bytes = body.as_bytes();
        let expected = decode_chunks(&[bytes]);
        assert_eq!(expected, vec!["Καλη", " 日本語", " 🦀!"]);

        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_chunks(&[a, b]), expected, "split at {split}");
        }

        let single_bytes: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_chunks(&single_bytes), expected);
    }

    #[test]
    fn test_json_split_across_chunks_yields_one_delta() {
        let body = frame("split");
        let mid = body.find("delta").unwrap();
        let mut decoder = FrameDecoder::default();

        assert!(decoder.feed(body[..mid].as_bytes()).is_empty());
        assert_eq!(decoder.feed(body[mid..].as_bytes()), vec!["split"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_bytes_after_done_are_ignored() {
        let mut decoder = FrameDecoder::default();
        let first = format!("{}data: [DONE]\n{}", frame("kept"), frame("lost"));

        assert_eq!(decoder.feed(first.as_bytes()), vec!["kept"]);
        assert!(decoder.is_finished());
        assert!(decoder.feed(frame("also lost").as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let body = frame("€");
        let bytes = body.as_bytes();
        let euro = body.find('€').unwrap();

        let deltas = decode_chunks(&[&bytes[..euro + 1], &bytes[euro + 1..]]);
        assert_eq!(deltas, vec!["€"]);
    }

    #[test]
    fn test_close_without_sentinel_keeps_deltas_and_drops_partial_line() {
        let body = format!("{}{}data: {{\"choices\":[{{\"del", frame("a"), frame("b"));
        assert_eq!(decode_chunks(&[body.as_bytes()]), vec!["a", "b"]);
    }

    #[test]
    fn test_json_split_by_newline_is_merged() {
        let mut decoder = FrameDecoder::default();
        let broken = "data: {\"choices\":[{\"delta\":\n{\"content\":\"hi\"}}]}\n\n";

        assert!(decoder.feed(broken.as_bytes()).is_empty());
        assert_eq!(decoder.feed(frame("next").as_bytes()), vec!["hi", "next"]);
        assert_eq!(decoder.dropped_frames(), 0);
    }

    #[test]
    fn test_malformed_frame_is_dropped_after_bounded_retries() {
        let mut decoder = FrameDecoder::new(2);

        assert!(decoder.feed(b"data: {not json}\n").is_empty());
        assert!(decoder.feed(b"").is_empty());
        assert_eq!(decoder.dropped_frames(), 0);
        assert!(decoder.feed(b"").is_empty());
        assert_eq!(decoder.dropped_frames(), 1);

        assert_eq!(decoder.feed(frame("after").as_bytes()), vec!["after"]);
    }

    #[test]
    fn test_malformed_frame_blocks_until_dropped_then_order_is_kept() {
        let mut decoder = FrameDecoder::new(1);
        let body = format!("data: {{oops\n{}", frame("x"));

        assert!(decoder.feed(body.as_bytes()).is_empty());
        assert_eq!(decoder.feed(frame("y").as_bytes()), vec!["x", "y"]);
        assert_eq!(decoder.dropped_frames(), 1);
    }

    #[test]
    fn test_finish_flushes_frames_queued_behind_malformed_line() {
        let body = format!("data: {{oops\n{}", frame("tail"));
        let mut decoder = FrameDecoder::default();

        assert!(decoder.feed(body.as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
        assert_eq!(decoder.dropped_frames(), 1);
    }

    #[test]
    fn test_zero_retries_drops_immediately() {
        let mut decoder = FrameDecoder::new(0);
        let body = format!("data: {{oops\n{}", frame("z"));
        assert_eq!(decoder.feed(body.as_bytes()), vec!["z"]);
    }
}
