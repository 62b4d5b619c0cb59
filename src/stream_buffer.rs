//! Line reconstruction over a byte stream.
//!
//! Log payloads arrive in arbitrary chunks. A line may span several chunks
//! and a multi-byte character may be cut at a chunk edge. Lines are split on
//! the raw `\n` byte first and decoded afterwards, so a character is never
//! decoded half-received. Invalid UTF-8 is replaced with U+FFFD instead of
//! failing the stream.

/// Buffer that turns payload chunks into complete text lines.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    buffer: Vec<u8>,
}

impl StreamBuffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Push raw bytes into the buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Drain all complete lines from the buffer.
    ///
    /// Returned lines carry no line terminator; a trailing `\r` is removed.
    /// Bytes after the last `\n` stay buffered.
    pub fn drain_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Take whatever is left as a final line.
    ///
    /// Used at end of stream so a last line without `\n` still gets
    /// classified. Returns `None` when nothing is buffered.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }

    /// Get current buffer size in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
