//! BAM streaming reader.
//!
//! Reads the header once, then decodes one record at a time into a
//! caller-owned [`Record`], reusing an internal byte buffer.
//!
//! # Usage
//!
//! ```no_run
//! use bamsift::io::bam::{BamReader, Record};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! # fn main() -> Result<(), bamsift::io::bam::BamDecodeError> {
//! let mut bam = BamReader::new(BufReader::new(File::open("alignments.bam")?));
//! let header = bam.read_header()?;
//! let mut record = Record::new();
//! while bam.read_record(&header, &mut record)? > 0 {
//!     println!("{} at {}", record.name, record.position.unwrap_or(-1));
//! }
//! # Ok(())
//! # }
//! ```

use super::error::BamDecodeError;
use super::header::{read_header, Header};
use super::record::{decode_record, Record};
use crate::io::read_up_to;
use std::io::{self, BufRead, Read};

fn truncated(context: &str, expected: usize, actual: usize) -> BamDecodeError {
    BamDecodeError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("{}: expected {} bytes, got {}", context, expected, actual),
    ))
}

/// BAM record reader over a decompressed byte stream.
pub struct BamReader<R> {
    reader: R,
    /// Record body buffer, grown to the largest record seen
    buffer: Vec<u8>,
}

impl<R: BufRead> BamReader<R> {
    /// Wrap a decompressed stream positioned at the BAM magic.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(512),
        }
    }

    /// Read the magic, header text, and reference list.
    pub fn read_header(&mut self) -> io::Result<Header> {
        read_header(&mut self.reader)
    }

    /// Read the next record into `record`.
    ///
    /// Returns the record's encoded size, or 0 at a clean end of stream.
    ///
    /// # Errors
    ///
    /// - [`BamDecodeError::Io`] with kind `UnexpectedEof` when the stream
    ///   ends part way through a record
    /// - any other [`BamDecodeError`] when the record is structurally invalid,
    ///   including reference ids outside `header`
    pub fn read_record(&mut self, header: &Header, record: &mut Record) -> Result<usize, BamDecodeError> {
        let mut size_buf = [0u8; 4];
        match read_up_to(&mut self.reader, &mut size_buf)? {
            0 => return Ok(0),
            4 => {}
            n => return Err(truncated("record length", 4, n)),
        }

        let block_size = i32::from_le_bytes(size_buf);
        if block_size < 0 {
            return Err(BamDecodeError::InvalidField {
                field: "block_size",
                value: block_size.to_string(),
            });
        }
        let block_size = block_size as usize;

        // The length is untrusted until the body has actually been read.
        self.buffer.clear();
        let n = (&mut self.reader).take(block_size as u64).read_to_end(&mut self.buffer)?;
        if n < block_size {
            return Err(truncated("record body", block_size, n));
        }

        decode_record(&self.buffer, record)?;
        record.validate_references(header)?;
        Ok(block_size + 4)
    }

    /// Consume the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::header::{write_header, Reference};
    use crate::io::bam::record::encode_record;
    use std::io::Cursor;

    fn header() -> Header {
        Header::new(
            String::new(),
            vec![
                Reference::new("chr1".to_string(), 1000),
                Reference::new("chr2".to_string(), 2000),
            ],
        )
    }

    fn record(name: &str, tid: Option<usize>) -> Record {
        let mut record = Record::new();
        record.name = name.to_string();
        record.reference_id = tid;
        record.position = tid.map(|_| 10);
        record.sequence = b"ACGT".to_vec();
        record
    }

    fn stream(records: &[Record]) -> Vec<u8> {
        let mut data = Vec::new();
        write_header(&mut data, &header()).unwrap();
        for r in records {
            encode_record(r, &mut data).unwrap();
        }
        data
    }

    #[test]
    fn test_reads_records_then_eof() {
        let data = stream(&[record("a", Some(0)), record("b", None)]);
        let mut bam = BamReader::new(Cursor::new(data));
        let header = bam.read_header().unwrap();
        assert_eq!(header.reference_count(), 2);

        let mut rec = Record::new();
        assert!(bam.read_record(&header, &mut rec).unwrap() > 0);
        assert_eq!(rec.name, "a");
        assert!(bam.read_record(&header, &mut rec).unwrap() > 0);
        assert_eq!(rec.name, "b");
        assert_eq!(bam.read_record(&header, &mut rec).unwrap(), 0);
    }

    #[test]
    fn test_truncated_body_is_unexpected_eof() {
        let mut data = stream(&[record("a", Some(0))]);
        data.truncate(data.len() - 3);
        let mut bam = BamReader::new(Cursor::new(data));
        let header = bam.read_header().unwrap();
        let err = bam.read_record(&header, &mut Record::new()).unwrap_err();
        assert!(matches!(err, BamDecodeError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_corrupt_block_size_does_not_preallocate() {
        let mut data = stream(&[]);
        data.extend_from_slice(&i32::MAX.to_le_bytes());
        data.extend_from_slice(&[0u8; 40]);
        let mut bam = BamReader::new(Cursor::new(data));
        let header = bam.read_header().unwrap();
        let err = bam.read_record(&header, &mut Record::new()).unwrap_err();
        assert!(matches!(err, BamDecodeError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert!(bam.buffer.capacity() < 1 << 20, "buffer grew to {}", bam.buffer.capacity());
    }

    #[test]
    fn test_truncated_length_prefix() {
        let mut data = stream(&[]);
        data.extend_from_slice(&[0x20, 0x00]);
        let mut bam = BamReader::new(Cursor::new(data));
        let header = bam.read_header().unwrap();
        let err = bam.read_record(&header, &mut Record::new()).unwrap_err();
        assert!(matches!(err, BamDecodeError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_reference_outside_header_is_rejected() {
        let data = stream(&[record("a", Some(5))]);
        let mut bam = BamReader::new(Cursor::new(data));
        let header = bam.read_header().unwrap();
        let err = bam.read_record(&header, &mut Record::new()).unwrap_err();
        assert!(matches!(err, BamDecodeError::ReferenceOutOfRange { field: "read", value: 5, .. }));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bam = BamReader::new(Cursor::new(b"INVALID".to_vec()));
        assert!(bam.read_header().is_err());
    }
}
