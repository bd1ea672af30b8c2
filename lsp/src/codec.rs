//! JSON-RPC framing codec for LSP communication.
//!
//! LSP uses `Content-Length: N\r\n\r\n{json}` framing over stdin/stdout.
//! [`encode_frame`] produces a complete frame for a message; [`FrameDecoder`]
//! accepts bytes as they arrive and yields every message that has become
//! complete, keeping partial data buffered for the next read.

use serde_json::{Map, Value};

/// Header keyword that starts every frame. Matched case-insensitively.
const CONTENT_LENGTH: &[u8] = b"Content-Length:";

const HEADER_LINE_END: &[u8] = b"\r\n";

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Buffer ceiling while scanning for a header (1 MiB).
pub const MAX_HEADER_SCAN_BYTES: usize = 1 << 20;

/// Ceiling for a declared `Content-Length` (512 MiB).
pub const MAX_CONTENT_LENGTH: usize = 1 << 29;

/// A decoded JSON-RPC message. Only objects survive decoding.
pub type JsonObject = Map<String, Value>;

/// Serialize `msg` and prepend the `Content-Length` header.
///
/// The length counts UTF-8 bytes, not characters.
pub fn encode_frame(msg: &Value) -> serde_json::Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());

    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Incremental frame decoder.
///
/// Bytes are appended with [`FrameDecoder::push`]; complete frames are
/// drained from the front of the buffer. Malformed input is dropped and the
/// decoder resynchronizes on the next header instead of failing.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

enum Step {
    /// A frame was consumed; the payload may or may not have been valid.
    Frame(Option<JsonObject>),
    /// Input was discarded; keep scanning.
    Skipped,
    /// Nothing more can be extracted until more bytes arrive.
    NeedMore,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently held waiting for a complete frame.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append `bytes` and return every message completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<JsonObject> {
        self.buffer.extend_from_slice(bytes);

        let mut messages = Vec::new();
        loop {
            match self.next_frame() {
                Step::Frame(Some(msg)) => messages.push(msg),
                Step::Frame(None) | Step::Skipped => {}
                Step::NeedMore => break,
            }
        }
        messages
    }

    fn next_frame(&mut self) -> Step {
        tracing::trace!("LSP receive buffer holds {} bytes", self.buffer.len());

        let Some(keyword_at) = find_keyword(&self.buffer) else {
            if self.buffer.len() > MAX_HEADER_SCAN_BYTES {
                tracing::warn!(
                    "Discarding {} bytes of unframed LSP output",
                    self.buffer.len()
                );
                self.buffer.clear();
            }
            return Step::NeedMore;
        };

        let value_start = keyword_at + CONTENT_LENGTH.len();
        let line_end = find(&self.buffer, HEADER_LINE_END, value_start);
        let header_end = find(&self.buffer, HEADER_END, value_start);
        let (Some(line_end), Some(header_end)) = (line_end, header_end) else {
            if self.buffer.len() - keyword_at > MAX_HEADER_SCAN_BYTES {
                tracing::warn!("Discarding unterminated LSP header");
                self.buffer.clear();
            }
            return Step::NeedMore;
        };
        let payload_start = header_end + HEADER_END.len();

        let Some(length) = parse_length(&self.buffer[value_start..line_end]) else {
            tracing::warn!("Invalid Content-Length in LSP header, resynchronizing");
            self.buffer.drain(..payload_start);
            return Step::Skipped;
        };

        if length > MAX_CONTENT_LENGTH {
            tracing::warn!(
                "Content-Length {length} exceeds maximum {MAX_CONTENT_LENGTH}, discarding buffer"
            );
            self.buffer.clear();
            return Step::Skipped;
        }

        let payload_end = payload_start + length;
        if payload_end > self.buffer.len() {
            return Step::NeedMore;
        }

        let parsed = serde_json::from_slice::<Value>(&self.buffer[payload_start..payload_end]);
        self.buffer.drain(..payload_end);
        tracing::trace!("Got LSP message payload of {length} bytes");

        match parsed {
            Ok(Value::Object(msg)) => Step::Frame(Some(msg)),
            Ok(other) => {
                tracing::warn!("Ignoring non-object LSP payload: {other}");
                Step::Frame(None)
            }
            Err(e) => {
                tracing::warn!("Ignoring invalid LSP payload: {e}");
                Step::Frame(None)
            }
        }
    }
}

fn find_keyword(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(CONTENT_LENGTH.len())
        .position(|window| window.eq_ignore_ascii_case(CONTENT_LENGTH))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| from + pos)
}

fn parse_length(raw: &[u8]) -> Option<usize> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(msg: &Value) -> Vec<u8> {
        encode_frame(msg).unwrap()
    }

    fn raw_frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
    }

    #[test]
    fn test_roundtrip() {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": { "uri": "file:///test.rs" }
        });

        let mut decoder = FrameDecoder::new();
        let decoded = decoder.push(&frame(&msg));
        assert_eq!(decoded.len(), 1);
        assert_eq!(Value::Object(decoded[0].clone()), msg);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut bytes = Vec::new();
        for id in 1..=3 {
            bytes.extend(frame(&serde_json::json!({"jsonrpc": "2.0", "id": id})));
        }

        let decoded = FrameDecoder::new().push(&bytes);
        let ids: Vec<_> = decoded.iter().map(|m| m["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_byte_by_byte_matches_single_chunk() {
        let mut bytes = Vec::new();
        bytes.extend(frame(&serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": null})));
        bytes.extend(frame(&serde_json::json!({"jsonrpc": "2.0", "method": "x", "params": {"k": "é"}})));
        bytes.extend(frame(&serde_json::json!({"jsonrpc": "2.0", "id": 2, "result": [1, 2]})));

        let whole = FrameDecoder::new().push(&bytes);

        let mut decoder = FrameDecoder::new();
        let mut incremental = Vec::new();
        for byte in &bytes {
            incremental.extend(decoder.push(std::slice::from_ref(byte)));
        }

        assert_eq!(whole.len(), 3);
        assert_eq!(whole, incremental);
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let bytes = frame(&serde_json::json!({"jsonrpc": "2.0", "id": 7}));
        let (head, tail) = bytes.split_at(bytes.len() - 3);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.buffered_len(), head.len());

        let decoded = decoder.push(tail);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["id"], 7);
    }

    #[test]
    fn test_case_insensitive_content_length() {
        let body = r#"{"jsonrpc":"2.0","id":1}"#;
        let bytes = format!("content-length: {}\r\n\r\n{body}", body.len());

        let decoded = FrameDecoder::new().push(bytes.as_bytes());
        assert_eq!(decoded[0]["id"], 1);
    }

    #[test]
    fn test_ignores_extra_headers() {
        let body = r#"{"jsonrpc":"2.0","id":1}"#;
        let bytes = format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{body}",
            body.len(),
        );

        let decoded = FrameDecoder::new().push(bytes.as_bytes());
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["id"], 1);
    }

    #[test]
    fn test_invalid_content_length_resynchronizes() {
        let mut bytes = b"Content-Length: not_a_number\r\n\r\n".to_vec();
        bytes.extend(raw_frame(r#"{"jsonrpc":"2.0","id":4}"#));

        let decoded = FrameDecoder::new().push(&bytes);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["id"], 4);
    }

    #[test]
    fn test_oversized_length_clears_buffer_then_recovers() {
        let mut decoder = FrameDecoder::new();
        let header = format!("Content-Length: {}\r\n\r\n{{\"partial\":", MAX_CONTENT_LENGTH + 1);
        assert!(decoder.push(header.as_bytes()).is_empty());
        assert_eq!(decoder.buffered_len(), 0);

        let decoded = decoder.push(&raw_frame(r#"{"jsonrpc":"2.0","id":9}"#));
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["id"], 9);
    }

    #[test]
    fn test_junk_without_header_is_discarded_past_ceiling() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&vec![b'x'; MAX_HEADER_SCAN_BYTES]).is_empty());
        assert_eq!(decoder.buffered_len(), MAX_HEADER_SCAN_BYTES);

        assert!(decoder.push(b"x").is_empty());
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_unterminated_header_discarded_past_ceiling() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"Content-Length: 12").is_empty());
        let held = decoder.buffered_len();

        let filler = vec![b' '; MAX_HEADER_SCAN_BYTES - held];
        assert!(decoder.push(&filler).is_empty());
        assert_eq!(decoder.buffered_len(), MAX_HEADER_SCAN_BYTES);

        assert!(decoder.push(b" ").is_empty());
        assert_eq!(decoder.buffered_len(), 0);

        let decoded = decoder.push(&raw_frame(r#"{"jsonrpc":"2.0","id":5}"#));
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["id"], 5);
    }

    #[test]
    fn test_leading_junk_before_header_is_skipped() {
        let mut bytes = b"some stray log line\n".to_vec();
        bytes.extend(raw_frame(r#"{"jsonrpc":"2.0","id":3}"#));

        let mut decoder = FrameDecoder::new();
        let decoded = decoder.push(&bytes);
        assert_eq!(decoded[0]["id"], 3);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_invalid_json_body_dropped() {
        let mut bytes = raw_frame("not valid json!!!");
        bytes.extend(raw_frame(r#"{"jsonrpc":"2.0","id":5}"#));

        let decoded = FrameDecoder::new().push(&bytes);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["id"], 5);
    }

    #[test]
    fn test_non_object_body_dropped() {
        let mut bytes = raw_frame("[1,2,3]");
        bytes.extend(raw_frame(r#"{"jsonrpc":"2.0","id":6}"#));

        let decoded = FrameDecoder::new().push(&bytes);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["id"], 6);
    }

    #[test]
    fn test_multibyte_utf8_content_length_counts_bytes() {
        // "é" is 2 bytes in UTF-8, so {"k":"é"} is 10 bytes.
        let body = r#"{"k":"é"}"#;
        assert_eq!(body.len(), 10);

        let decoded = FrameDecoder::new().push(&raw_frame(body));
        assert_eq!(decoded[0]["k"], "é");
    }

    #[test]
    fn test_encode_content_length_is_byte_count() {
        let msg = serde_json::json!({"k": "é"});
        let output = String::from_utf8(frame(&msg)).unwrap();
        let body = serde_json::to_string(&msg).unwrap();
        assert!(output.starts_with(&format!("Content-Length: {}\r\n\r\n", body.len())));
        assert!(output.ends_with(&body));
    }
}
