//! Non-consuming lookahead over a byte stream.
//!
//! [`Lookahead`] is a buffered reader whose [`peek`](Lookahead::peek) exposes
//! upcoming bytes without advancing the read position, so format detection
//! can inspect the start of a stream and then hand the same stream, intact,
//! to the real decoder.

use std::io::{self, BufRead, Read};

/// Default buffer capacity.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Buffered reader with a non-consuming `peek`.
pub struct Lookahead<R> {
    inner: R,
    buf: Vec<u8>,
    /// Start of unread data in `buf`
    pos: usize,
    /// End of valid data in `buf`
    filled: usize,
    /// The inner reader has reported end of stream
    eof: bool,
}

impl<R: Read> Lookahead<R> {
    /// Wrap `inner` with the default capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, inner)
    }

    /// Wrap `inner` with at least `capacity` bytes of buffer.
    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        Self {
            inner,
            buf: vec![0; capacity.max(1)],
            pos: 0,
            filled: 0,
            eof: false,
        }
    }

    fn buffered(&self) -> &[u8] {
        &self.buf[self.pos..self.filled]
    }

    /// Return up to `n` upcoming bytes without consuming them.
    ///
    /// If fewer than `n` bytes are buffered, at most one read is issued on
    /// the inner reader. A result shorter than `n` therefore does not by
    /// itself mean end of stream; an empty result does.
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        if self.filled - self.pos < n && !self.eof {
            // Move unread bytes to the front so the fill lands after them.
            if self.pos > 0 {
                self.buf.copy_within(self.pos..self.filled, 0);
                self.filled -= self.pos;
                self.pos = 0;
            }
            if self.buf.len() < n {
                self.buf.resize(n, 0);
            }
            loop {
                match self.inner.read(&mut self.buf[self.filled..]) {
                    Ok(0) => {
                        self.eof = true;
                        break;
                    }
                    Ok(read) => {
                        self.filled += read;
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            }
        }
        let available = (self.filled - self.pos).min(n);
        Ok(&self.buf[self.pos..self.pos + available])
    }

    /// Peek, retrying until `n` bytes are buffered or the stream ends.
    pub fn peek_full(&mut self, n: usize) -> io::Result<&[u8]> {
        while self.filled - self.pos < n && !self.eof {
            self.peek(n)?;
        }
        self.peek(n)
    }

    /// Get a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the lookahead, returning the inner reader.
    ///
    /// Buffered bytes are lost; only call this when nothing is buffered.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Lookahead<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.filled && out.len() >= self.buf.len() {
            // Large read with nothing buffered: bypass the buffer.
            return self.inner.read(out);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for Lookahead<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos == self.filled {
            self.pos = 0;
            self.filled = 0;
            if !self.eof {
                self.filled = self.inner.read(&mut self.buf)?;
            }
        }
        Ok(self.buffered())
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}
