//! crates/chatrelay_core/src/wire.rs
//!
//! The line-oriented relay protocol shared by the server (encoder) and the
//! client pipeline (decoder).
//!
//! Every frame is `data: <payload>\n\n`. The payload is either a text
//! fragment, an in-band error (`Error: <message>`, used once streaming has
//! started and the HTTP status can no longer change), or the terminal
//! sentinel `[DONE]`. The sentinel is sent exactly once per cycle, success
//! or failure, so the consuming read loop always has a defined termination.

use bytes::Bytes;

use crate::ports::PortError;

/// Line prefix carried by every well-formed frame.
pub const DATA_PREFIX: &str = "data: ";
/// Terminal sentinel payload marking end of stream.
pub const DONE_SENTINEL: &str = "[DONE]";
/// Payload prefix marking an in-band mid-stream failure.
pub const ERROR_PREFIX: &str = "Error: ";

const FRAME_END: &str = "\n\n";

//=========================================================================================
// Encoder
//=========================================================================================

/// Frames one text fragment for the relay response body.
pub fn encode_fragment(text: &str) -> Bytes {
    Bytes::from(format!("{DATA_PREFIX}{text}{FRAME_END}"))
}

/// Frames a mid-stream failure. Must be followed by [`encode_done`].
pub fn encode_error(message: &str) -> Bytes {
    Bytes::from(format!("{DATA_PREFIX}{ERROR_PREFIX}{message}{FRAME_END}"))
}

/// Frames the terminal sentinel.
pub fn encode_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

//=========================================================================================
// Decoder
//=========================================================================================

/// One decoded protocol token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// Text content to append to the in-flight accumulator.
    Fragment(String),
    /// The stream failed after headers were sent; carries the error detail.
    Error(String),
    /// End of stream. No further events follow.
    Done,
}

/// A decode failure. The caller keeps any text already emitted.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("stream is not valid UTF-8 (at byte offset {0} of the pending chunk)")]
    InvalidUtf8(usize),
}

impl From<DecodeError> for PortError {
    fn from(err: DecodeError) -> Self {
        PortError::Unexpected(err.to_string())
    }
}

/// Incremental decoder for the relay protocol.
///
/// Fed one raw byte chunk at a time. A chunk boundary may split a multi-byte
/// character, so undecoded trailing bytes are carried over to the next call.
/// Framing is handled per chunk, the way the upstream emits it: a leading
/// `data: ` is stripped when present, unprefixed chunks pass through
/// unchanged (upstream framing is not guaranteed chunk-aligned).
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
    finished: bool,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the terminal sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decodes the next raw chunk into zero or more protocol events.
    ///
    /// A single chunk can yield both a trailing fragment and the sentinel
    /// when frames coalesce in transit. Chunks arriving after the sentinel
    /// are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<WireEvent>, DecodeError> {
        if self.finished {
            return Ok(Vec::new());
        }

        let decoded = self.take_decoded(chunk)?;
        let mut text = decoded.as_str();

        let framed = text.starts_with(DATA_PREFIX);
        if framed {
            text = &text[DATA_PREFIX.len()..];
        }

        let mut events = Vec::new();
        match text.find(DONE_SENTINEL) {
            Some(pos) => {
                // Content sharing the chunk with the terminal frame is still
                // delivered; only the sentinel and its framing are dropped.
                let mut head = &text[..pos];
                head = head.strip_suffix(DATA_PREFIX).unwrap_or(head);
                head = head.strip_suffix(FRAME_END).unwrap_or(head);
                Self::classify(head, &mut events);
                events.push(WireEvent::Done);
                self.finished = true;
            }
            None => {
                let body = if framed {
                    text.strip_suffix(FRAME_END).unwrap_or(text)
                } else {
                    text
                };
                Self::classify(body, &mut events);
            }
        }
        Ok(events)
    }

    fn classify(payload: &str, events: &mut Vec<WireEvent>) {
        if let Some(detail) = payload.strip_prefix(ERROR_PREFIX) {
            events.push(WireEvent::Error(detail.trim_end().to_string()));
        } else if !payload.is_empty() {
            events.push(WireEvent::Fragment(payload.to_string()));
        }
    }

    /// Appends `chunk` to any carried-over bytes and returns the longest
    /// decodable prefix, keeping an incomplete trailing character for the
    /// next call.
    fn take_decoded(&mut self, chunk: &[u8]) -> Result<String, DecodeError> {
        self.pending.extend_from_slice(chunk);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let out = text.to_string();
                self.pending.clear();
                Ok(out)
            }
            Err(err) if err.error_len().is_none() => {
                let valid = err.valid_up_to();
                // valid_up_to guarantees this prefix is well-formed.
                let out = std::str::from_utf8(&self.pending[..valid])
                    .unwrap()
                    .to_string();
                self.pending.drain(..valid);
                Ok(out)
            }
            Err(err) => Err(DecodeError::InvalidUtf8(err.valid_up_to())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_data_prefix_and_frame_end() {
        let mut dec = ChunkDecoder::new();
        let events = dec.feed(b"data: Hello\n\n").unwrap();
        assert_eq!(events, vec![WireEvent::Fragment("Hello".to_string())]);
    }

    #[test]
    fn unprefixed_chunk_passes_through_unchanged() {
        let mut dec = ChunkDecoder::new();
        let events = dec.feed(b"raw text").unwrap();
        assert_eq!(events, vec![WireEvent::Fragment("raw text".to_string())]);
    }

    #[test]
    fn done_sentinel_terminates_without_emitting_content() {
        let mut dec = ChunkDecoder::new();
        let events = dec.feed(b"data: [DONE]\n\n").unwrap();
        assert_eq!(events, vec![WireEvent::Done]);
        assert!(dec.is_finished());
        assert!(dec.feed(b"data: late\n\n").unwrap().is_empty());
    }

    #[test]
    fn fragment_and_sentinel_in_one_chunk() {
        let mut dec = ChunkDecoder::new();
        let events = dec.feed(b"data: tail\n\ndata: [DONE]\n\n").unwrap();
        assert_eq!(
            events,
            vec![WireEvent::Fragment("tail".to_string()), WireEvent::Done]
        );
    }

    #[test]
    fn error_frame_is_classified() {
        let mut dec = ChunkDecoder::new();
        let events = dec.feed(b"data: Error: network drop\n\n").unwrap();
        assert_eq!(events, vec![WireEvent::Error("network drop".to_string())]);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        // "héllo" with the two-byte 'é' split between chunks.
        let bytes = "data: h\u{e9}llo\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let mut dec = ChunkDecoder::new();
        let first = dec.feed(&bytes[..split]).unwrap();
        assert_eq!(first, vec![WireEvent::Fragment("h".to_string())]);
        // The continuation chunk carries no prefix, so it passes through
        // unchanged, frame terminator included.
        let second = dec.feed(&bytes[split..]).unwrap();
        assert_eq!(
            second,
            vec![WireEvent::Fragment("\u{e9}llo\n\n".to_string())]
        );
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let mut dec = ChunkDecoder::new();
        let err = dec.feed(&[b'h', 0xff, b'i']).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidUtf8(_)));
    }

    #[test]
    fn encoder_and_decoder_agree() {
        let mut dec = ChunkDecoder::new();
        let events = dec.feed(&encode_fragment("print(1)")).unwrap();
        assert_eq!(events, vec![WireEvent::Fragment("print(1)".to_string())]);
        let events = dec.feed(&encode_error("boom")).unwrap();
        assert_eq!(events, vec![WireEvent::Error("boom".to_string())]);
        let events = dec.feed(&encode_done()).unwrap();
        assert_eq!(events, vec![WireEvent::Done]);
    }

    #[test]
    fn empty_fragment_frames_emit_nothing() {
        let mut dec = ChunkDecoder::new();
        assert!(dec.feed(b"data: \n\n").unwrap().is_empty());
        assert!(dec.feed(b"").unwrap().is_empty());
    }
}
