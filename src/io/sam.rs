//! SAM text encoding: header lines plus one tab-delimited record per line.
//!
//! # Record Layout
//!
//! ```text
//! QNAME FLAG RNAME POS MAPQ CIGAR RNEXT PNEXT TLEN SEQ QUAL [TAG:TYPE:VALUE ...]
//! ```
//!
//! POS/PNEXT are 1-based on the wire (0 = unavailable) and 0-based in
//! [`Record`]. QUAL is Phred+33 on the wire, raw Phred in [`Record`].

use crate::io::bam::cigar::{format_cigar, parse_cigar_text};
use crate::io::bam::error::BamDecodeError;
use crate::io::bam::header::Header;
use crate::io::bam::record::Record;
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

const MANDATORY_FIELDS: usize = 11;

fn field_error(field: &'static str, value: &str) -> BamDecodeError {
    BamDecodeError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, BamDecodeError> {
    value.parse().map_err(|_| field_error(field, value))
}

/// 1-based text coordinate to 0-based, 0 meaning unavailable.
fn parse_position(field: &'static str, value: &str) -> Result<Option<i32>, BamDecodeError> {
    let pos: i64 = parse_number(field, value)?;
    match pos {
        0 => Ok(None),
        p if p > 0 && p <= i32::MAX as i64 => Ok(Some((p - 1) as i32)),
        _ => Err(field_error(field, value)),
    }
}

fn resolve_reference(
    header: &Header,
    field: &'static str,
    name: &str,
) -> Result<Option<usize>, BamDecodeError> {
    if name == "*" {
        return Ok(None);
    }
    header
        .reference_id(name)
        .map(Some)
        .ok_or_else(|| BamDecodeError::UnknownReferenceName {
            field,
            name: name.to_string(),
        })
}

/// Parse one SAM record line (without its line terminator) into `record`.
pub fn parse_record(line: &str, header: &Header, record: &mut Record) -> Result<(), BamDecodeError> {
    let mut fields = line.split('\t');
    let mut next = |name: &'static str| {
        fields.next().ok_or_else(|| BamDecodeError::InvalidData {
            message: format!(
                "expected {} mandatory fields, missing {}",
                MANDATORY_FIELDS, name
            ),
        })
    };

    let qname = next("QNAME")?;
    let flag = next("FLAG")?;
    let rname = next("RNAME")?;
    let pos = next("POS")?;
    let mapq = next("MAPQ")?;
    let cigar = next("CIGAR")?;
    let rnext = next("RNEXT")?;
    let pnext = next("PNEXT")?;
    let tlen = next("TLEN")?;
    let seq = next("SEQ")?;
    let qual = next("QUAL")?;

    record.name.clear();
    if qname != "*" {
        record.name.push_str(qname);
    }
    record.flags = parse_number("FLAG", flag)?;
    record.reference_id = resolve_reference(header, "read", rname)?;
    record.position = parse_position("POS", pos)?;
    let mapq: u8 = parse_number("MAPQ", mapq)?;
    record.mapq = (mapq != 255).then_some(mapq);
    parse_cigar_text(cigar, &mut record.cigar)?;
    record.mate_reference_id = if rnext == "=" {
        record.reference_id
    } else {
        resolve_reference(header, "mate", rnext)?
    };
    record.mate_position = parse_position("PNEXT", pnext)?;
    record.template_length = parse_number("TLEN", tlen)?;

    record.sequence.clear();
    if seq != "*" {
        record.sequence.extend_from_slice(seq.as_bytes());
    }

    record.quality.clear();
    if qual != "*" {
        if qual.len() != record.sequence.len() {
            return Err(field_error("QUAL", qual));
        }
        for &b in qual.as_bytes() {
            record.quality.push(b.checked_sub(33).ok_or_else(|| field_error("QUAL", qual))?);
        }
    }

    record.tags.clear();
    for field in fields {
        record.tags.push_sam_field(field)?;
    }
    Ok(())
}

fn reference_name<'h>(
    header: &'h Header,
    id: Option<usize>,
    field: &'static str,
) -> Result<&'h str, BamDecodeError> {
    match id {
        None => Ok("*"),
        Some(id) => header
            .reference_name(id)
            .ok_or(BamDecodeError::ReferenceOutOfRange {
                field,
                value: id as i64,
                reference_count: header.reference_count(),
            }),
    }
}

/// Render `record` as one SAM line (without the trailing newline) into `out`.
pub fn format_record(record: &Record, header: &Header, out: &mut String) -> Result<(), BamDecodeError> {
    let rname = reference_name(header, record.reference_id, "read")?;
    let rnext = if record.mate_reference_id.is_some() && record.mate_reference_id == record.reference_id {
        "="
    } else {
        reference_name(header, record.mate_reference_id, "mate")?
    };
    let qname = if record.name.is_empty() { "*" } else { &record.name };

    // Writing to a String cannot fail.
    let _ = write!(
        out,
        "{}\t{}\t{}\t{}\t{}\t",
        qname,
        record.flags,
        rname,
        record.position.map_or(0, |p| p as i64 + 1),
        record.mapq.unwrap_or(255)
    );
    format_cigar(&record.cigar, out);
    let _ = write!(
        out,
        "\t{}\t{}\t{}\t",
        rnext,
        record.mate_position.map_or(0, |p| p as i64 + 1),
        record.template_length
    );

    if record.sequence.is_empty() {
        out.push('*');
    } else {
        out.extend(record.sequence.iter().map(|&b| b as char));
    }
    out.push('\t');
    if record.quality.is_empty() {
        out.push('*');
    } else {
        out.extend(record.quality.iter().map(|&q| (q.saturating_add(33)) as char));
    }

    record.tags.write_sam(out)
}

/// SAM reader over a decompressed text stream.
///
/// Holds a single line buffer reused for every record.
pub struct SamReader<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: BufRead> SamReader<R> {
    /// Wrap a decompressed stream positioned at the first header line.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
        }
    }

    /// Read every leading `@` line and build the header from them.
    pub fn read_header(&mut self) -> io::Result<Header> {
        let mut text = Vec::new();
        while self.reader.fill_buf()?.first() == Some(&b'@') {
            let start = text.len();
            self.reader.read_until(b'\n', &mut text)?;
            if text[start..].last() != Some(&b'\n') {
                text.push(b'\n');
            }
        }
        let text = String::from_utf8(text)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8 in SAM header: {}", e)))?;
        Header::from_sam_text(text).map_err(|message| io::Error::new(io::ErrorKind::InvalidData, message))
    }

    /// Read the next record line into `record`.
    ///
    /// Returns the number of bytes consumed, or 0 at end of stream.
    /// Blank lines are skipped.
    pub fn read_record(&mut self, header: &Header, record: &mut Record) -> Result<usize, BamDecodeError> {
        let mut consumed = 0;
        loop {
            self.line.clear();
            let n = self.reader.read_until(b'\n', &mut self.line)?;
            if n == 0 {
                return Ok(0);
            }
            consumed += n;

            let mut end = self.line.len();
            while end > 0 && matches!(self.line[end - 1], b'\n' | b'\r') {
                end -= 1;
            }
            if end == 0 {
                continue;
            }
            let line = std::str::from_utf8(&self.line[..end]).map_err(|source| BamDecodeError::InvalidUtf8 {
                field: "record line",
                source,
            })?;
            parse_record(line, header, record)?;
            return Ok(consumed);
        }
    }
}

/// SAM writer.
pub struct SamWriter<W> {
    writer: W,
    line: String,
}

impl<W: Write> SamWriter<W> {
    /// Create a writer over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            line: String::new(),
        }
    }

    /// Write the header text, synthesizing `@SQ` lines when the text has none.
    pub fn write_header(&mut self, header: &Header) -> io::Result<()> {
        let text = header.sam_text();
        self.writer.write_all(text.as_bytes())?;
        if !text.is_empty() && !text.ends_with('\n') {
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Format and write one record line.
    pub fn write_record(&mut self, header: &Header, record: &Record) -> io::Result<()> {
        self.line.clear();
        format_record(record, header, &mut self.line)?;
        self.line.push('\n');
        self.writer.write_all(self.line.as_bytes())
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
