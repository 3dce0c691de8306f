//! Pattern buffer with incremental, line-aligned scanning.
//!
//! Raw device output passes through a stateful VT parser so escape
//! sequences split across reads are removed cleanly. Carriage returns
//! are dropped; everything downstream sees `\n`-terminated lines.
//!
//! After a scan that found nothing, only the last `search_depth` bytes
//! of already-scanned output (rounded back to a line start) are
//! rescanned together with newly arrived data. Large dumps therefore
//! cost linear time while a prompt split across two reads is still found.

use bytes::{BufMut, BytesMut};
use memchr::memmem;

use super::patterns::PatternSet;

/// Collects printable output and the control characters we keep.
struct Sanitizer<'a> {
    out: &'a mut BytesMut,
}

impl vte::Perform for Sanitizer<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | b'\t' => self.out.put_u8(byte),
            // backspace erases the previous character on the terminal
            0x08 => {
                let len = self.out.len();
                if len > 0 && self.out[len - 1] != b'\n' {
                    self.out.truncate(len - 1);
                }
            }
            _ => {}
        }
    }
}

/// A match found in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMatch {
    /// Index of the matching alternative in its pattern set.
    pub index: usize,
    /// Absolute start offset in the unconsumed buffer.
    pub start: usize,
    /// Absolute end offset in the unconsumed buffer.
    pub end: usize,
}

/// Buffer for accumulating cleaned output and searching it for patterns.
pub struct PatternBuffer {
    buffer: BytesMut,
    parser: vte::Parser,
    /// Prefix length already scanned without a match.
    scanned: usize,
    /// How far back before `scanned` a match may start.
    search_depth: usize,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            parser: vte::Parser::new(),
            scanned: 0,
            search_depth,
        }
    }

    /// Extend the buffer with raw device output.
    pub fn extend(&mut self, data: &[u8]) {
        let mut sanitizer = Sanitizer {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut sanitizer, data);
    }

    /// Offset where the next scan starts.
    fn window_start(&self) -> usize {
        let back = self.scanned.saturating_sub(self.search_depth);
        if back == 0 {
            return 0;
        }
        match memchr::memrchr(b'\n', &self.buffer[..back]) {
            Some(pos) => pos + 1,
            None => 0,
        }
    }

    /// Find the earliest match of any alternative in `set`.
    ///
    /// Alternatives matching at the same offset are ranked by their
    /// position in the set. On a miss the current contents are marked
    /// as scanned.
    pub fn find(&mut self, set: &PatternSet) -> Option<BufferMatch> {
        let base = self.window_start();
        let found = set.find_earliest(&self.buffer[base..]).map(|(index, start, end)| {
            BufferMatch {
                index,
                start: base + start,
                end: base + end,
            }
        });
        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }

    /// Find the first occurrence of a literal.
    pub fn find_literal(&mut self, needle: &[u8]) -> Option<(usize, usize)> {
        let base = self.window_start().min(self.scanned.saturating_sub(needle.len()));
        let found = memmem::find(&self.buffer[base..], needle).map(|pos| {
            let start = base + pos;
            (start, start + needle.len())
        });
        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }

    /// Remove everything up to `end`, returning `(before, matched)` where
    /// `matched` is the text in `start..end`.
    pub fn consume(&mut self, start: usize, end: usize) -> (String, String) {
        let taken = self.buffer.split_to(end);
        self.scanned = 0;
        let before = String::from_utf8_lossy(&taken[..start]).into_owned();
        let matched = String::from_utf8_lossy(&taken[start..]).into_owned();
        (before, matched)
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// The last `max` bytes of pending output, for diagnostics.
    pub fn tail_lossy(&self, max: usize) -> String {
        let start = self.buffer.len().saturating_sub(max);
        String::from_utf8_lossy(&self.buffer[start..]).into_owned()
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all pending output.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
