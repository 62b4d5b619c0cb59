//! Multiplexed log stream decoding.
//!
//! A container without a TTY sends its log stream in frames. Every frame
//! starts with an 8-byte header:
//!
//! ```text
//! [stream_type, 0, 0, 0, len3, len2, len1, len0]
//! ```
//!
//! `stream_type` is 0 (stdin), 1 (stdout) or 2 (stderr) and the last four
//! bytes are the big-endian payload length. Payloads are arbitrary slices of
//! the log output: one frame may hold several lines or part of one.
//!
//! [`LineFramer`] strips the headers, reassembles payloads into lines through
//! [`StreamBuffer`], and never indexes past the bytes it has received.

use tracing::warn;

use crate::stream_buffer::StreamBuffer;

/// Size of a multiplexed frame header.
pub const HEADER_LEN: usize = 8;

/// Whether a byte stream carries frame headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Frames with an 8-byte header each.
    Multiplexed,
    /// Plain log bytes (TTY containers, or already demultiplexed).
    Raw,
}

/// Header of one multiplexed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub stream_type: u8,
    pub len: usize,
}

impl FrameHeader {
    /// Decode a header, or `None` if the bytes cannot be one.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Option<Self> {
        if bytes[0] > 2 || bytes[1..4] != [0, 0, 0] {
            return None;
        }
        let len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Some(FrameHeader {
            stream_type: bytes[0],
            len: len as usize,
        })
    }
}

#[derive(Debug)]
enum DecodeState {
    Header,
    Payload { remaining: usize },
    Passthrough,
}

/// Incremental frame decoder.
///
/// Accepts chunks cut at any byte boundary and returns the payloads of the
/// frames they complete. Payload bytes are held until their frame is whole.
/// A malformed header switches the decoder to passthrough for the rest of
/// the stream.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    header: Vec<u8>,
    payload: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        let state = match framing {
            Framing::Multiplexed => DecodeState::Header,
            Framing::Raw => DecodeState::Passthrough,
        };
        Self {
            state,
            header: Vec::with_capacity(HEADER_LEN),
            payload: Vec::new(),
        }
    }

    /// Current framing, after any fallback.
    pub fn framing(&self) -> Framing {
        match self.state {
            DecodeState::Passthrough => Framing::Raw,
            _ => Framing::Multiplexed,
        }
    }

    /// Feed one chunk and return the payload bytes of every frame it
    /// completed.
    pub fn decode(&mut self, mut chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len());

        while !chunk.is_empty() {
            match self.state {
                DecodeState::Passthrough => {
                    out.extend_from_slice(chunk);
                    break;
                }
                DecodeState::Header => {
                    let take = (HEADER_LEN - self.header.len()).min(chunk.len());
                    self.header.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];

                    let Ok(bytes) = <[u8; HEADER_LEN]>::try_from(self.header.as_slice()) else {
                        continue;
                    };
                    match FrameHeader::parse(&bytes) {
                        Some(header) => {
                            self.header.clear();
                            if header.len > 0 {
                                self.state = DecodeState::Payload {
                                    remaining: header.len,
                                };
                            }
                        }
                        None => {
                            warn!(
                                header = ?bytes,
                                "Malformed frame header, treating the rest of the stream as raw"
                            );
                            out.append(&mut self.header);
                            self.state = DecodeState::Passthrough;
                        }
                    }
                }
                DecodeState::Payload { remaining } => {
                    let take = remaining.min(chunk.len());
                    self.payload.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];
                    self.state = if take == remaining {
                        out.append(&mut self.payload);
                        DecodeState::Header
                    } else {
                        DecodeState::Payload {
                            remaining: remaining - take,
                        }
                    };
                }
            }
        }

        out
    }

    /// Report an unfinished frame at end of stream.
    ///
    /// Returns the number of bytes the stream still owed.
    pub fn finish(&mut self) -> usize {
        let missing = match self.state {
            DecodeState::Header if !self.header.is_empty() => HEADER_LEN - self.header.len(),
            DecodeState::Payload { remaining } => remaining,
            _ => 0,
        };
        if missing > 0 {
            warn!(
                missing_bytes = missing,
                "Log stream ended inside a frame, discarding the truncated part"
            );
        }
        self.header.clear();
        self.payload.clear();
        missing
    }
}

/// Turns a framed or raw byte stream into text lines.
#[derive(Debug)]
pub struct LineFramer {
    decoder: FrameDecoder,
    buffer: StreamBuffer,
}

impl LineFramer {
    pub fn new(framing: Framing) -> Self {
        Self {
            decoder: FrameDecoder::new(framing),
            buffer: StreamBuffer::new(),
        }
    }

    /// Feed one chunk and return the lines it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let payload = self.decoder.decode(chunk);
        self.buffer.push(&payload);
        self.buffer.drain_complete_lines()
    }

    /// End of stream: returns the trailing line without `\n`, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.decoder.finish();
        self.buffer.finish()
    }

    /// Current framing, after any fallback.
    pub fn framing(&self) -> Framing {
        self.decoder.framing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![stream_type, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn header_parse_accepts_known_stream_types() {
        for stream_type in 0..=2u8 {
            let bytes = [stream_type, 0, 0, 0, 0, 0, 1, 0];
            assert_eq!(
                FrameHeader::parse(&bytes),
                Some(FrameHeader {
                    stream_type,
                    len: 256
                })
            );
        }
    }

    #[test]
    fn header_parse_rejects_garbage() {
        assert_eq!(FrameHeader::parse(b"2024-01-"), None);
        assert_eq!(FrameHeader::parse(&[3, 0, 0, 0, 0, 0, 0, 1]), None);
        assert_eq!(FrameHeader::parse(&[1, 0, 7, 0, 0, 0, 0, 1]), None);
    }

    #[test]
    fn strips_header_of_single_frame() {
        let mut framer = LineFramer::new(Framing::Multiplexed);
        let lines = framer.push(&frame(1, b"connection error: timeout\n"));
        assert_eq!(lines, vec!["connection error: timeout"]);
        assert!(framer.finish().is_none());
    }

    #[test]
    fn frame_with_several_lines() {
        let mut framer = LineFramer::new(Framing::Multiplexed);
        let lines = framer.push(&frame(2, b"one\ntwo\nthree\n"));
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn line_spanning_frames_is_reassembled() {
        let mut framer = LineFramer::new(Framing::Multiplexed);
        let mut bytes = frame(1, b"partial ");
        bytes.extend(frame(1, b"line\nnext"));
        bytes.extend(frame(1, b" one\n"));

        assert_eq!(framer.push(&bytes), vec!["partial line", "next one"]);
    }

    #[test]
    fn frames_split_at_every_byte_boundary() {
        let mut stream = frame(1, b"starting up\n");
        stream.extend(frame(2, b"connection error: timeout\nre"));
        stream.extend(frame(1, b"ady\n"));

        for cut in 0..=stream.len() {
            let mut framer = LineFramer::new(Framing::Multiplexed);
            let mut lines = framer.push(&stream[..cut]);
            lines.extend(framer.push(&stream[cut..]));
            assert_eq!(
                lines,
                vec!["starting up", "connection error: timeout", "ready"],
                "cut at {}",
                cut
            );
            assert_eq!(framer.framing(), Framing::Multiplexed);
        }
    }

    #[test]
    fn byte_by_byte_delivery() {
        let stream = frame(1, "héllo wörld\n".as_bytes());
        let mut framer = LineFramer::new(Framing::Multiplexed);
        let mut lines = Vec::new();
        for byte in &stream {
            lines.extend(framer.push(std::slice::from_ref(byte)));
        }
        assert_eq!(lines, vec!["héllo wörld"]);
    }

    #[test]
    fn newline_byte_inside_length_does_not_split() {
        // Length 10 puts 0x0A in the header.
        let payload = b"err: boom\n";
        assert_eq!(payload.len(), 10);
        let mut framer = LineFramer::new(Framing::Multiplexed);

        assert_eq!(framer.push(&frame(1, payload)), vec!["err: boom"]);
    }

    #[test]
    fn zero_length_frame_is_skipped() {
        let mut stream = frame(1, b"");
        stream.extend(frame(1, b"after empty\n"));
        let mut framer = LineFramer::new(Framing::Multiplexed);

        assert_eq!(framer.push(&stream), vec!["after empty"]);
    }

    #[test]
    fn malformed_header_falls_back_to_raw() {
        let mut framer = LineFramer::new(Framing::Multiplexed);
        let lines = framer.push(b"plain tty output\nsecond line\n");

        assert_eq!(lines, vec!["plain tty output", "second line"]);
        assert_eq!(framer.framing(), Framing::Raw);
    }

    #[test]
    fn malformed_header_after_valid_frames() {
        let mut stream = frame(1, b"framed\n");
        stream.extend_from_slice(b"garbage!tail\n");
        let mut framer = LineFramer::new(Framing::Multiplexed);

        assert_eq!(framer.push(&stream), vec!["framed", "garbage!tail"]);
        assert_eq!(framer.framing(), Framing::Raw);
    }

    #[test]
    fn short_input_never_panics() {
        for len in 0..HEADER_LEN {
            let mut framer = LineFramer::new(Framing::Multiplexed);
            let input = vec![1u8; len];
            assert!(framer.push(&input).is_empty());
            assert!(framer.finish().is_none());
        }
    }

    #[test]
    fn truncated_payload_is_discarded_at_end() {
        let mut stream = frame(1, b"kept\n");
        let mut cut = frame(1, b"never finished\n");
        cut.truncate(HEADER_LEN + 5);
        stream.extend(cut);

        let mut decoder = FrameDecoder::new(Framing::Multiplexed);
        let payload = decoder.decode(&stream);
        assert_eq!(payload, b"kept\n");
        assert_eq!(decoder.finish(), 10);
    }

    #[test]
    fn truncated_frame_never_becomes_a_line() {
        let mut cut = frame(2, b"never finished");
        cut.truncate(HEADER_LEN + 5);
        let mut framer = LineFramer::new(Framing::Multiplexed);

        assert!(framer.push(&cut).is_empty());
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn truncated_frame_after_complete_line() {
        let mut stream = frame(1, b"error: kept\n");
        let mut cut = frame(1, b"error: cut off\n");
        cut.truncate(HEADER_LEN + 3);
        stream.extend(cut);
        let mut framer = LineFramer::new(Framing::Multiplexed);

        assert_eq!(framer.push(&stream), vec!["error: kept"]);
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn truncated_header_is_discarded_at_end() {
        let mut decoder = FrameDecoder::new(Framing::Multiplexed);
        assert!(decoder.decode(&[1, 0, 0]).is_empty());
        assert_eq!(decoder.finish(), 5);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let mut framer = LineFramer::new(Framing::Multiplexed);
        assert!(framer.push(&frame(1, b"panic: fatal error")).is_empty());
        assert_eq!(framer.finish().as_deref(), Some("panic: fatal error"));
    }

    #[test]
    fn raw_framing_passes_bytes_through() {
        let mut framer = LineFramer::new(Framing::Raw);
        let mut lines = framer.push(b"\x01\x00\x00\x00 looks framed\n");
        lines.extend(framer.push(b"still raw\r\n"));

        assert_eq!(lines, vec!["\u{1}\u{0}\u{0}\u{0} looks framed", "still raw"]);
        assert_eq!(framer.framing(), Framing::Raw);
    }
}
