//! Stream framing for the hub protocol.
//!
//! The hub sends newline-delimited JSON with no length prefix. Bytes are fed
//! into a [`FrameDecoder`] as they arrive and complete messages are pulled
//! out with [`FrameDecoder::next_message`].
//!
//! Some hub programs omit the trailing newline on single messages, so a
//! buffered remainder that already parses as one complete JSON document is
//! emitted as well.

use bytes::{Buf, BytesMut};
use serde::de::IgnoredAny;
use tracing::trace;

use crate::codec::ProtocolError;

/// Message delimiter.
pub const DELIMITER: u8 = b'\n';

/// Default receive buffer limit (1 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Splits an inbound byte stream into discrete message strings.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_buffer_size: Option<usize>,
}

impl FrameDecoder {
    /// Create a decoder with the default buffer limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Create a decoder that holds at most `max_buffer_size` undelimited bytes.
    #[must_use]
    pub fn with_limit(max_buffer_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_buffer_size: Some(max_buffer_size),
        }
    }

    /// Create a decoder whose buffer may grow without bound.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_buffer_size: None,
        }
    }

    /// Append newly arrived bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pull the next complete message out of the buffer.
    ///
    /// Returns `Ok(Some(message))` for each delimited, non-blank line (trimmed)
    /// in arrival order. Once no delimiter remains, a non-blank remainder that
    /// parses as a complete JSON document is returned and the buffer cleared.
    /// Otherwise the remainder is kept for the next [`feed`](Self::feed) and
    /// `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BufferOverflow`] if the undelimited remainder
    /// exceeds the configured limit. The buffer is cleared in that case.
    pub fn next_message(&mut self) -> Result<Option<String>, ProtocolError> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == DELIMITER) {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }

        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        if serde_json::from_slice::<IgnoredAny>(&self.buffer).is_ok() {
            let document = self.buffer.split();
            return Ok(Some(String::from_utf8_lossy(&document).trim().to_string()));
        }

        trace!(buffered = self.buffer.len(), "Incomplete document, buffering");
        self.check_limit()?;
        Ok(None)
    }

    /// Drain every complete message currently available.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BufferOverflow`] after the messages that were
    /// complete before the overflow have been pushed into `out`.
    pub fn drain_into(&mut self, out: &mut Vec<String>) -> Result<(), ProtocolError> {
        while let Some(message) = self.next_message()? {
            out.push(message);
        }
        Ok(())
    }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard any buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// The configured limit, if any.
    #[must_use]
    pub fn max_buffer_size(&self) -> Option<usize> {
        self.max_buffer_size
    }

    fn check_limit(&mut self) -> Result<(), ProtocolError> {
        match self.max_buffer_size {
            Some(limit) if self.buffer.len() > limit => {
                let size = self.buffer.len();
                self.buffer.clear();
                Err(ProtocolError::BufferOverflow { size, limit })
            }
            _ => Ok(()),
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWITCH_ON: &str = r#"{"deviceType":"Switch","id":1,"command":"power","value":true}"#;

    fn feed_all(decoder: &mut FrameDecoder, data: &[u8]) -> Vec<String> {
        decoder.feed(data);
        let mut out = Vec::new();
        decoder.drain_into(&mut out).unwrap();
        out
    }

    fn sample_stream() -> (Vec<String>, Vec<u8>) {
        let messages: Vec<String> = (0..5)
            .map(|i| {
                format!(r#"{{"deviceType":"Lightbulb","id":{i},"command":"brightness","value":{}}}"#, i * 10)
            })
            .collect();
        let mut bytes = Vec::new();
        for message in &messages {
            bytes.extend_from_slice(message.as_bytes());
            bytes.push(DELIMITER);
        }
        (messages, bytes)
    }

    #[test]
    fn test_single_chunk() {
        let (messages, bytes) = sample_stream();
        let mut decoder = FrameDecoder::new();
        assert_eq!(feed_all(&mut decoder, &bytes), messages);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_arbitrary_chunk_splits() {
        let (messages, bytes) = sample_stream();

        for chunk_size in [1, 2, 3, 7, 16, 61, 200] {
            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                decoded.extend(feed_all(&mut decoder, chunk));
            }
            assert_eq!(decoded, messages, "chunk size {chunk_size}");
            assert!(decoder.is_empty());
        }
    }

    #[test]
    fn test_partial_frame_buffering() {
        let mut decoder = FrameDecoder::new();

        let first = feed_all(&mut decoder, br#"{"deviceType":"Switch","id":1,"com"#);
        assert!(first.is_empty());
        assert!(!decoder.is_empty());

        let second = feed_all(&mut decoder, b"mand\":\"power\",\"value\":true}\n");
        assert_eq!(second, vec![SWITCH_ON.to_string()]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_unterminated_single_document() {
        let mut decoder = FrameDecoder::new();
        let out = feed_all(&mut decoder, SWITCH_ON.as_bytes());
        assert_eq!(out, vec![SWITCH_ON.to_string()]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_blank_lines_discarded() {
        let mut decoder = FrameDecoder::new();
        let input = format!("\n\n  \r\n{SWITCH_ON}\n\n{SWITCH_ON}\r\n");
        let out = feed_all(&mut decoder, input.as_bytes());
        assert_eq!(out, vec![SWITCH_ON.to_string(), SWITCH_ON.to_string()]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_lines_before_unterminated_document() {
        let mut decoder = FrameDecoder::new();
        let input = format!("{SWITCH_ON}\n{SWITCH_ON}");
        let out = feed_all(&mut decoder, input.as_bytes());
        assert_eq!(out.len(), 2);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_invalid_line_is_still_framed() {
        // Framing does not validate delimited lines; the codec rejects them later.
        let mut decoder = FrameDecoder::new();
        let out = feed_all(&mut decoder, b"{garbage\n");
        assert_eq!(out, vec!["{garbage".to_string()]);
    }

    #[test]
    fn test_buffer_overflow_clears() {
        let mut decoder = FrameDecoder::with_limit(16);
        decoder.feed(b"{\"deviceType\":\"Switch\",\"id\":");

        match decoder.next_message() {
            Err(ProtocolError::BufferOverflow { size, limit }) => {
                assert_eq!(limit, 16);
                assert!(size > 16);
            }
            other => panic!("Expected BufferOverflow, got {:?}", other),
        }
        assert!(decoder.is_empty());

        // The decoder keeps working after an overflow.
        let out = feed_all(&mut decoder, b"{\"a\":1}\n");
        assert_eq!(out, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn test_messages_before_overflow_are_kept() {
        let mut decoder = FrameDecoder::with_limit(8);
        decoder.feed(b"{\"a\":1}\n{\"partial\":");

        let mut out = Vec::new();
        let result = decoder.drain_into(&mut out);
        assert_eq!(out, vec!["{\"a\":1}".to_string()]);
        assert!(matches!(result, Err(ProtocolError::BufferOverflow { .. })));
    }

    #[test]
    fn test_unbounded_keeps_growing() {
        let mut decoder = FrameDecoder::unbounded();
        let junk = vec![b'{'; 4 * DEFAULT_MAX_BUFFER_SIZE];
        assert!(feed_all(&mut decoder, &junk).is_empty());
        assert_eq!(decoder.buffered_len(), junk.len());
        assert_eq!(decoder.max_buffer_size(), None);
    }
}
