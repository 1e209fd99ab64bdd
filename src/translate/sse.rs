//! SSE plumbing for the `data: <payload>\n\n` framing used by chat-completion
//! streams: line reassembly across arbitrary chunk boundaries, payload
//! extraction, and re-framing.

use bytes::{Bytes, BytesMut};

use super::openai_types::ChatCompletionChunk;

pub const DONE_SENTINEL: &str = "[DONE]";
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Accumulates raw bytes and hands back complete lines.
///
/// Holds at most one unterminated line between calls. Lines are decoded only
/// once complete, so a UTF-8 sequence split across chunks comes out intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, without the `\n`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        // the pending fragment has no '\n' in it, so only the new bytes need scanning
        let mut scan_from = self.buf.len();
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.buf[scan_from..].iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(scan_from + offset + 1);
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
            scan_from = 0;
        }
        lines
    }

    /// Take whatever is left at end of stream as a final, unterminated line.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Bytes currently held for the pending line.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// A protocol event extracted from one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The `[DONE]` termination sentinel.
    Done,
    Chunk(ChatCompletionChunk),
}

/// Extract the event carried by `line`.
///
/// Returns `Ok(None)` for lines that carry no event (blank separators,
/// comments, other SSE fields) and `Err` only when the payload is not valid
/// JSON. The payload's shape is not checked.
pub fn parse_line(line: &str) -> Result<Option<Frame>, serde_json::Error> {
    let line = line.trim();
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();

    if payload == DONE_SENTINEL {
        return Ok(Some(Frame::Done));
    }

    serde_json::from_str(payload).map(|chunk| Some(Frame::Chunk(chunk)))
}

/// Serialize an event as `data: <compact json>\n\n`.
pub fn encode_chunk(chunk: &ChatCompletionChunk) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(chunk)?;
    let mut frame = BytesMut::with_capacity(json.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(&json);
    frame.extend_from_slice(b"\n\n");
    Ok(frame.freeze())
}

#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME)
}
