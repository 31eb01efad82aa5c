//! Stream handles: an opened alignment input or output.
//!
//! A handle owns exactly one transport, the [`FormatDescriptor`] it was
//! built for, and a display name for diagnostics. Handles are released by
//! `close(self)`, which consumes them, so a closed handle cannot be used.
//!
//! ```text
//! DataSource ─▶ Lookahead ─▶ detect ─▶ (gzip | BGZF | none) ─▶ BAM | SAM
//! ```

use crate::error::{Error, Result};
use crate::io::bam::{BamDecodeError, BamReader, BamWriter, Header, Record};
use crate::io::compression::{bgzf_reader, CompressedWriter, DataSource};
use crate::io::format::{detect, CompressionKind, Encoding, FormatDescriptor, PEEK_LEN};
use crate::io::lookahead::Lookahead;
use crate::io::sam::{SamReader, SamWriter};
use crate::io::sink::DataSink;
use flate2::read::MultiGzDecoder;
use std::io::{self, BufRead, BufReader, Read, Write};

/// Default output compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Whether the running process is big-endian.
pub fn host_is_big_endian() -> bool {
    cfg!(target_endian = "big")
}

type Input = Box<dyn BufRead + Send>;
type Output = CompressedWriter<Box<dyn Write + Send>>;

enum Decoder {
    Bam(BamReader<Input>),
    Sam(SamReader<Input>),
}

/// An opened alignment input.
pub struct AlignmentReader {
    name: String,
    format: FormatDescriptor,
    big_endian_host: bool,
    decoder: Decoder,
    records_read: u64,
}

impl AlignmentReader {
    /// Open `source` and detect its format.
    ///
    /// # Errors
    ///
    /// [`Error::Open`] if the transport cannot be opened or peeked,
    /// [`Error::UnrecognizedFormat`] if the leading bytes match no supported
    /// format. The transport is released before either is returned.
    pub fn open(source: &DataSource) -> Result<Self> {
        let name = source.display_name();
        let transport = source.open().map_err(|e| Error::Open {
            name: name.clone(),
            source: e,
        })?;
        Self::from_reader(name, transport)
    }

    /// Detect the format of an already-open transport and wrap it.
    pub fn from_reader<R: Read + Send + 'static>(name: impl Into<String>, reader: R) -> Result<Self> {
        let name = name.into();
        let mut lookahead = Lookahead::new(reader);
        let peeked = lookahead.peek_full(PEEK_LEN).map_err(|e| Error::Open {
            name: name.clone(),
            source: e,
        })?;
        let format = detect(peeked).ok_or_else(|| Error::UnrecognizedFormat { name: name.clone() })?;
        log::debug!("{}: detected {}", name, format);

        let input: Input = match format.compression {
            CompressionKind::None => Box::new(lookahead),
            CompressionKind::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(lookahead))),
            CompressionKind::Bgzf => Box::new(bgzf_reader(lookahead)),
        };
        let decoder = match format.encoding {
            Encoding::Bam => Decoder::Bam(BamReader::new(input)),
            Encoding::Sam => Decoder::Sam(SamReader::new(input)),
        };

        Ok(Self {
            name,
            format,
            big_endian_host: host_is_big_endian(),
            decoder,
            records_read: 0,
        })
    }

    /// Display name of the input.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Detected format.
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Whether the host is big-endian (record fields are little-endian on disk).
    pub fn is_big_endian_host(&self) -> bool {
        self.big_endian_host
    }

    /// Number of records returned so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Read the header. Call once, before any record.
    pub fn read_header(&mut self) -> Result<Header> {
        let result = match &mut self.decoder {
            Decoder::Bam(reader) => reader.read_header(),
            Decoder::Sam(reader) => reader.read_header(),
        };
        result.map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::Truncated {
                name: self.name.clone(),
                context: "header".to_string(),
            },
            io::ErrorKind::InvalidData => Error::InvalidHeader {
                name: self.name.clone(),
                message: e.to_string(),
            },
            _ => Error::Io(e),
        })
    }

    /// Read the next record into `record`.
    ///
    /// Returns `Ok(true)` for a record, `Ok(false)` at a clean end of
    /// stream. A stream ending part way through a record is
    /// [`Error::Truncated`]; an invalid record, including one whose
    /// reference ids fall outside `header`, is [`Error::MalformedRecord`].
    /// Corrupt compressed data is [`Error::Compression`].
    pub fn read_record(&mut self, header: &Header, record: &mut Record) -> Result<bool> {
        let result = match &mut self.decoder {
            Decoder::Bam(reader) => reader.read_record(header, record),
            Decoder::Sam(reader) => reader.read_record(header, record),
        };
        let index = self.records_read;
        match result {
            Ok(0) => Ok(false),
            Ok(_) => {
                self.records_read += 1;
                Ok(true)
            }
            Err(BamDecodeError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::Truncated {
                name: self.name.clone(),
                context: format!("record {}", index),
            }),
            Err(BamDecodeError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Err(Error::Compression(format!("{}: {}", self.name, e)))
            }
            Err(BamDecodeError::Io(e)) => Err(Error::Io(e)),
            Err(source) => Err(Error::MalformedRecord {
                name: self.name.clone(),
                index,
                source,
            }),
        }
    }

    /// Release the input.
    pub fn close(self) -> Result<()> {
        log::debug!("{}: closed after {} records", self.name, self.records_read);
        Ok(())
    }
}

enum Encoder {
    Bam(BamWriter<Output>),
    Sam(SamWriter<Output>),
}

impl Encoder {
    fn output(&mut self) -> &mut Output {
        match self {
            Encoder::Bam(writer) => writer.get_mut(),
            Encoder::Sam(writer) => writer.get_mut(),
        }
    }
}

/// An opened alignment output.
pub struct AlignmentWriter {
    name: String,
    format: FormatDescriptor,
    encoder: Encoder,
}

impl AlignmentWriter {
    /// Create `sink` and prepare to write `format`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSettings`] for a compression level above 9 (checked
    /// before the sink is created), [`Error::Open`] if the sink cannot be
    /// created.
    pub fn create(sink: &DataSink, format: FormatDescriptor) -> Result<Self> {
        check_level(&format)?;
        let name = sink.display_name();
        let transport = sink.create().map_err(|e| Error::Open {
            name: name.clone(),
            source: e,
        })?;
        Self::from_writer(name, transport, format)
    }

    /// Wrap an already-open transport.
    pub fn from_writer(name: impl Into<String>, writer: Box<dyn Write + Send>, format: FormatDescriptor) -> Result<Self> {
        check_level(&format)?;
        let name = name.into();
        let level = format.compression_level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        let output = match format.compression {
            CompressionKind::None => CompressedWriter::new_plain(writer),
            CompressionKind::Gzip => CompressedWriter::new_gzip(writer, level),
            CompressionKind::Bgzf => CompressedWriter::new_bgzf(writer, level),
        };
        let encoder = match format.encoding {
            Encoding::Bam => Encoder::Bam(BamWriter::new(output)),
            Encoding::Sam => Encoder::Sam(SamWriter::new(output)),
        };
        log::debug!("{}: writing {}", name, format);
        Ok(Self { name, format, encoder })
    }

    /// Display name of the output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output format.
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Write the header.
    pub fn write_header(&mut self, header: &Header) -> io::Result<()> {
        match &mut self.encoder {
            Encoder::Bam(writer) => writer.write_header(header),
            Encoder::Sam(writer) => writer.write_header(header),
        }
    }

    /// Write one record.
    pub fn write_record(&mut self, header: &Header, record: &Record) -> io::Result<()> {
        match &mut self.encoder {
            Encoder::Bam(writer) => writer.write_record(record),
            Encoder::Sam(writer) => writer.write_record(header, record),
        }
    }

    /// Finish the compressed stream, flush, and release the output.
    pub fn close(mut self) -> Result<()> {
        let result = self.encoder.output().finish();
        log::debug!("{}: closed", self.name);
        result.map_err(|source| Error::Close { name: self.name, source })
    }
}

fn check_level(format: &FormatDescriptor) -> Result<()> {
    match format.compression_level {
        Some(level) if level > 9 => Err(Error::InvalidSettings(format!(
            "compression level {} out of range 0-9",
            level
        ))),
        _ => Ok(()),
    }
}
