//! Incremental decoder for the progress stream
//!
//! The server emits one `data: <json>\n\n` frame per [`ProgressEvent`]. Bytes
//! arrive in arbitrary network-sized pieces, so the decoder buffers until a
//! blank line closes a frame. Comment lines (keep-alives) and frames without a
//! `data` field are skipped.

use crate::error::{BulkrecError, Result};
use crate::types::ProgressEvent;

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence cut by a chunk boundary
    partial: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every event completed by them, in order
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<ProgressEvent>> {
        self.partial.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.partial) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(BulkrecError::Frame(format!("stream is not UTF-8: {}", e))),
        };
        let tail = self.partial.split_off(valid);
        let text = String::from_utf8(std::mem::replace(&mut self.partial, tail))
            .map_err(|e| BulkrecError::Frame(e.to_string()))?;
        self.buffer.push_str(&text);
        // A CRLF pair may straddle two pushes, so normalize the whole buffer
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..end + 2).collect();
            if let Some(event) = decode_frame(&frame)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// True when a partial frame is still buffered
    pub fn has_pending(&self) -> bool {
        !self.buffer.trim().is_empty() || !self.partial.is_empty()
    }
}

fn decode_frame(frame: &str) -> Result<Option<ProgressEvent>> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if data.is_empty() {
        return Ok(None);
    }

    let event = serde_json::from_str(&data.join("\n"))?;
    Ok(Some(event))
}
