//! Fixed-capacity line reassembly.
//!
//! Turns arbitrary read fragments into complete lines without ever growing
//! the buffer. A line longer than the buffer is reported once, truncated to
//! `capacity - 1` bytes, and the rest of it up to the next newline is
//! dropped.

use std::io::{self, Read};

/// What to do with the next newline-terminated span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipState {
    /// Dispatch it.
    Normal,
    /// Drop it: it is the tail of a line already reported truncated.
    SkippingRemainder,
}

/// Bounded reassembly buffer for one tailed source.
///
/// Invariant: `buffered < capacity` between calls.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Box<[u8]>,
    buffered: usize,
    skip: SkipState,
}

impl LineBuffer {
    /// Default capacity, large enough for any sane qmail log line.
    pub const DEFAULT_CAPACITY: usize = 8192;

    /// Smallest usable capacity: one byte of line plus room to truncate.
    pub const MIN_CAPACITY: usize = 2;

    /// Allocates the buffer once; `capacity` is raised to `MIN_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(Self::MIN_CAPACITY)].into_boxed_slice(),
            buffered: 0,
            skip: SkipState::Normal,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes of an incomplete line carried over to the next read.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn skip_state(&self) -> SkipState {
        self.skip
    }

    /// Forgets any partial line and skip state.
    pub fn clear(&mut self) {
        self.buffered = 0;
        self.skip = SkipState::Normal;
    }

    /// Reads everything currently available from `source` and dispatches
    /// each complete line to `on_line`.
    ///
    /// Stops on end of data or `WouldBlock`. Any other I/O error is returned
    /// after the lines already read have been dispatched; the partial line
    /// stays buffered for the next call.
    ///
    /// Returns the number of lines dispatched.
    pub fn consume<R, F>(&mut self, source: &mut R, mut on_line: F) -> io::Result<usize>
    where
        R: Read + ?Sized,
        F: FnMut(&str),
    {
        let mut dispatched = 0;

        loop {
            let n = match source.read(&mut self.buf[self.buffered..]) {
                Ok(0) => return Ok(dispatched),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(dispatched),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            dispatched += self.split_lines(n, &mut on_line);
        }
    }

    /// Splits the valid span after a read of `n` new bytes.
    fn split_lines<F>(&mut self, n: usize, on_line: &mut F) -> usize
    where
        F: FnMut(&str),
    {
        let total = self.buffered + n;
        let capacity = self.buf.len();
        let mut start = 0;
        let mut dispatched = 0;

        self.buffered = 0;

        loop {
            let remaining = &self.buf[start..total];

            match remaining.iter().position(|&b| b == b'\n') {
                Some(offset) => {
                    let end = start + offset;
                    match self.skip {
                        SkipState::Normal => {
                            dispatch(&self.buf[start..end], on_line);
                            dispatched += 1;
                        }
                        SkipState::SkippingRemainder => {
                            self.skip = SkipState::Normal;
                        }
                    }
                    start = end + 1;
                }
                None if remaining.len() == capacity => {
                    // Full buffer without a newline: report what fits.
                    if self.skip == SkipState::Normal {
                        tracing::debug!(capacity, "truncating overlong log line");
                        dispatch(&self.buf[..capacity - 1], on_line);
                        dispatched += 1;
                    }
                    self.skip = SkipState::SkippingRemainder;
                    return dispatched;
                }
                None => {
                    let len = remaining.len();
                    if len > 0 {
                        self.buf.copy_within(start..total, 0);
                        self.buffered = len;
                    }
                    return dispatched;
                }
            }
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

fn dispatch<F>(bytes: &[u8], on_line: &mut F)
where
    F: FnMut(&str),
{
    let line = String::from_utf8_lossy(bytes);
    on_line(line.as_ref());
}
