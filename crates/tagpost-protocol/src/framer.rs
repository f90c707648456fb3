//! Incremental line framer for the reader byte stream.
//!
//! The reader process writes one record per line, but a single `read()` on the
//! pipe may return half a line, several lines, or a line split across reads.
//! [`LineFramer`] accumulates bytes, emits every complete line as a frame and
//! keeps the unterminated tail as carry-over for the next [`feed`].
//!
//! # Usage
//!
//! ```
//! use tagpost_protocol::LineFramer;
//!
//! let mut framer = LineFramer::new();
//!
//! framer.feed(b"{\"cardid\": 1");
//! assert_eq!(framer.frames_available(), 0);
//! assert_eq!(framer.pending_len(), 12);
//!
//! framer.feed(b"23}\nE read");
//! let frames: Vec<String> = framer.drain_frames().collect();
//! assert_eq!(frames, vec!["{\"cardid\": 123}".to_string()]);
//! assert_eq!(framer.pending_len(), 6);
//! ```
//!
//! [`feed`]: LineFramer::feed

use bytes::BytesMut;
use std::collections::VecDeque;
use tagpost_core::constants::LINE_TERMINATOR;

/// Maximum carry-over kept without seeing a line terminator.
///
/// A reader line is a few hundred bytes at most. Anything longer means the
/// child is writing garbage, so the carry-over is dropped and counted.
pub const MAX_LINE_LEN: usize = 64 * 1024; // 64 KB

/// Initial buffer capacity, one pipe read.
const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024; // 8 KB

/// Splits a byte stream into lines, keeping partial lines between reads.
#[derive(Debug)]
pub struct LineFramer {
    /// Bytes received after the last complete line.
    buffer: BytesMut,

    /// Complete lines not yet taken by the caller.
    frames: VecDeque<String>,

    /// Bytes thrown away because a line grew past [`MAX_LINE_LEN`].
    discarded: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            frames: VecDeque::new(),
            discarded: 0,
        }
    }

    /// Append `bytes` and split off every complete line.
    ///
    /// Lines are decoded as UTF-8 (invalid sequences are replaced, so the
    /// record parser rejects them with the raw text intact for logging) and a
    /// trailing `\r` is removed.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == LINE_TERMINATOR) {
            let line = self.buffer.split_to(pos);
            let _ = self.buffer.split_to(1); // terminator
            self.frames.push_back(decode_line(&line));
        }

        if self.buffer.len() > MAX_LINE_LEN {
            self.discarded += self.buffer.len();
            self.buffer.clear();
        }
    }

    /// Next complete line, if any.
    pub fn next_frame(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    pub fn frames_available(&self) -> usize {
        self.frames.len()
    }

    /// Length of the unterminated carry-over.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped because of over-long lines.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Take the carry-over as a final frame, e.g. once the stream hit EOF.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let tail = self.buffer.split();
        Some(decode_line(&tail))
    }

    /// Iterator over the currently queued lines.
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { framer: self }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(text.as_ref()).to_string()
}

/// Iterator returned by [`LineFramer::drain_frames`].
pub struct DrainFrames<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for DrainFrames<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.framer.frames_available();
        (len, Some(len))
    }
}

impl ExactSizeIterator for DrainFrames<'_> {}
