// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Scatter/gather receive reader.
//!
//! Presents an arbitrary sequence of provider-delivered buffers as a single
//! logical byte stream to the MQTT packet parser, with partial-consume
//! accounting. A [`ReceiveReader`] is only ever valid for the duration of
//! one `RECEIVE` turn — see [`crate::stream`] for how turns are chained
//! across calls when the parser does not consume everything delivered.

use bytes::Bytes;

/// Cursor over a vector of scatter/gather buffers.
///
/// Invariants maintained by this type (checked by the test suite, not at
/// runtime, since violating them would be a bug in this module rather than
/// in caller input):
/// - `consumed_length <= total_length`
/// - `current_buffer <= buffers.len()`
/// - `buffer_pos <= buffers[current_buffer].len()` whenever `current_buffer < buffers.len()`
/// - the sum of the lengths of `buffers[..current_buffer]` plus `buffer_pos` equals `consumed_length`
pub struct ReceiveReader {
    buffers: Vec<Bytes>,
    current_buffer: usize,
    buffer_pos: usize,
    total_length: u64,
    consumed_length: u64,
}

impl ReceiveReader {
    /// Build a reader over the buffers delivered for one `RECEIVE` turn.
    #[must_use]
    pub fn new(buffers: Vec<Bytes>) -> Self {
        let total_length = buffers.iter().map(|b| b.len() as u64).sum();
        Self {
            buffers,
            current_buffer: 0,
            buffer_pos: 0,
            total_length,
            consumed_length: 0,
        }
    }

    /// Total number of bytes delivered for this turn.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Number of bytes consumed so far via [`ReceiveReader::read`].
    #[must_use]
    pub fn consumed_length(&self) -> u64 {
        self.consumed_length
    }

    /// Number of bytes still available to read.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.total_length - self.consumed_length
    }

    /// `true` once every delivered byte has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Copy up to `dst.len()` bytes into `dst`, advancing the cursor.
    ///
    /// Returns the number of bytes actually copied, which is `dst.len()`
    /// unless fewer than that remain in the buffer vector.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        if dst.is_empty() || self.is_exhausted() {
            return 0;
        }

        let want = (dst.len() as u64).min(self.remaining()) as usize;
        let mut copied = 0;

        while copied < want && self.current_buffer < self.buffers.len() {
            let buf = &self.buffers[self.current_buffer];
            if self.buffer_pos >= buf.len() {
                // Empty (or exhausted) buffer in the vector; skip it.
                self.current_buffer += 1;
                self.buffer_pos = 0;
                continue;
            }

            let available = buf.len() - self.buffer_pos;
            let step = (want - copied).min(available);
            dst[copied..copied + step]
                .copy_from_slice(&buf[self.buffer_pos..self.buffer_pos + step]);

            copied += step;
            self.buffer_pos += step;
            self.consumed_length += step as u64;

            if self.buffer_pos == buf.len() {
                self.current_buffer += 1;
                self.buffer_pos = 0;
            }
        }

        copied
    }

    /// Consume and discard up to `want` bytes without copying them anywhere.
    ///
    /// Used by callers that only need to skip a known-length section (e.g.
    /// after reading a header whose payload they don't care about).
    pub fn skip(&mut self, want: u64) -> u64 {
        let mut remaining_to_skip = want.min(self.remaining());
        let mut skipped = 0u64;

        while remaining_to_skip > 0 && self.current_buffer < self.buffers.len() {
            let buf = &self.buffers[self.current_buffer];
            if self.buffer_pos >= buf.len() {
                self.current_buffer += 1;
                self.buffer_pos = 0;
                continue;
            }
            let available = (buf.len() - self.buffer_pos) as u64;
            let step = remaining_to_skip.min(available);
            self.buffer_pos += step as usize;
            self.consumed_length += step;
            remaining_to_skip -= step;
            skipped += step;

            if self.buffer_pos == buf.len() {
                self.current_buffer += 1;
                self.buffer_pos = 0;
            }
        }

        skipped
    }

    /// Drain whatever the parser left unconsumed into a single contiguous
    /// [`Bytes`], to be prepended to the next turn's buffer vector.
    ///
    /// Returns `None` if the reader was fully consumed, matching spec's
    /// "if consumed all, leave receive armed" branch (no re-arm bookkeeping
    /// needed in that case).
    #[must_use]
    pub fn into_unconsumed(mut self) -> Option<Bytes> {
        if self.is_exhausted() {
            return None;
        }

        let remaining = self.remaining() as usize;
        let mut out = Vec::with_capacity(remaining);
        let mut scratch = vec![0u8; remaining];
        let n = self.read(&mut scratch);
        debug_assert_eq!(n, remaining);
        out.extend_from_slice(&scratch[..n]);
        Some(Bytes::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_of(chunks: &[&[u8]]) -> ReceiveReader {
        ReceiveReader::new(chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect())
    }

    #[test]
    fn single_read_drains_a_single_buffer() {
        let mut r = reader_of(&[b"HELLO"]);
        let mut out = [0u8; 5];
        assert_eq!(r.read(&mut out), 5);
        assert_eq!(&out, b"HELLO");
        assert_eq!(r.consumed_length(), 5);
        assert!(r.is_exhausted());
    }

    #[test]
    fn sequential_reads_reproduce_the_original_sequence_in_order() {
        // Invariant 1: sequential reads totalling |S| reproduce S exactly.
        let source: Vec<u8> = (0u8..=250).collect();
        let mut r = ReceiveReader::new(vec![
            Bytes::copy_from_slice(&source[0..10]),
            Bytes::copy_from_slice(&source[10..200]),
            Bytes::copy_from_slice(&source[200..251]),
        ]);

        let mut reproduced = Vec::new();
        loop {
            let mut chunk = [0u8; 7];
            let n = r.read(&mut chunk);
            if n == 0 {
                break;
            }
            reproduced.extend_from_slice(&chunk[..n]);
        }

        assert_eq!(reproduced, source);
        assert_eq!(r.consumed_length(), source.len() as u64);
    }

    #[test]
    fn scatter_across_three_buffers_in_one_read() {
        // Scenario S4.
        let mut r = reader_of(&[&[0x30, 0x05], &[b'H', b'E', b'L'], &[b'L', b'O']]);
        let mut out = [0u8; 7];
        assert_eq!(r.read(&mut out), 7);
        assert_eq!(&out, b"\x30\x05HELLO");
    }

    #[test]
    fn partial_consume_leaves_the_remainder_positioned_correctly() {
        // Invariant 2.
        let mut r = reader_of(&[b"ABCDEFGHIJ"]);
        let mut out = [0u8; 4];
        assert_eq!(r.read(&mut out), 4);
        assert_eq!(&out, b"ABCD");
        assert_eq!(r.consumed_length(), 4);

        let rest = r.into_unconsumed().expect("6 bytes remain");
        assert_eq!(&rest[..], b"EFGHIJ");
    }

    #[test]
    fn fully_consumed_reader_has_no_unconsumed_tail() {
        let mut r = reader_of(&[b"AB"]);
        let mut out = [0u8; 2];
        r.read(&mut out);
        assert!(r.into_unconsumed().is_none());
    }

    #[test]
    fn never_reports_consumed_greater_than_total() {
        // Invariant 6.
        let mut r = reader_of(&[b"AB"]);
        let mut out = [0u8; 100];
        let n = r.read(&mut out);
        assert_eq!(n, 2);
        assert!(r.consumed_length() <= r.total_length());
    }

    #[test]
    fn zero_length_read_is_a_no_op() {
        let mut r = reader_of(&[b"AB"]);
        let mut out: [u8; 0] = [];
        assert_eq!(r.read(&mut out), 0);
        assert_eq!(r.consumed_length(), 0);
    }

    #[test]
    fn empty_buffers_in_the_vector_are_skipped() {
        let mut r = ReceiveReader::new(vec![
            Bytes::new(),
            Bytes::copy_from_slice(b"X"),
            Bytes::new(),
            Bytes::copy_from_slice(b"Y"),
        ]);
        let mut out = [0u8; 2];
        assert_eq!(r.read(&mut out), 2);
        assert_eq!(&out, b"XY");
    }

    #[test]
    fn skip_advances_without_copying() {
        let mut r = reader_of(&[b"0x30", b"HELLO"]);
        assert_eq!(r.skip(4), 4);
        let mut out = [0u8; 5];
        assert_eq!(r.read(&mut out), 5);
        assert_eq!(&out, b"HELLO");
    }
}
