//! BAM record writer.
//!
//! Encodes the header and records into an uncompressed byte stream; the
//! compression layer underneath decides whether that stream is BGZF.

use super::header::{write_header, Header};
use super::record::{encode_record, Record};
use std::io::{self, Write};

/// Writer producing the binary alignment encoding.
pub struct BamWriter<W> {
    writer: W,
    /// Encode buffer reused across records
    buffer: Vec<u8>,
}

impl<W: Write> BamWriter<W> {
    /// Create a writer over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: Vec::with_capacity(512),
        }
    }

    /// Write the magic, header text, and reference list.
    pub fn write_header(&mut self, header: &Header) -> io::Result<()> {
        write_header(&mut self.writer, header)
    }

    /// Encode and write one record.
    ///
    /// The record is encoded in full before any byte reaches the stream, so
    /// an unrepresentable record leaves the output untouched.
    pub fn write_record(&mut self, record: &Record) -> io::Result<()> {
        self.buffer.clear();
        encode_record(record, &mut self.buffer)?;
        self.writer.write_all(&self.buffer)
    }

    /// Get a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Consume the writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
