//! Alignment header.
//!
//! # Binary Format
//!
//! ```text
//! - 4 bytes: Magic ("BAM\1")
//! - 4 bytes: SAM header text length (l_text, int32)
//! - l_text bytes: SAM header text
//! - 4 bytes: Number of reference sequences (n_ref, int32)
//! - For each reference:
//!   - 4 bytes: Reference name length (l_name, int32, includes null terminator)
//!   - l_name bytes: Reference name (null-terminated)
//!   - 4 bytes: Reference length (int32)
//! ```
//!
//! The text form is the `@`-prefixed header section of a SAM file; the
//! reference dictionary is taken from its `@SQ` lines.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, Read, Write};

/// BAM magic bytes.
pub const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// Reference sequence information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference sequence name (e.g., "chr1", "chrM")
    pub name: String,
    /// Reference sequence length in bases
    pub length: u32,
}

impl Reference {
    /// Create a new reference.
    pub fn new(name: String, length: u32) -> Self {
        Self { name, length }
    }
}

/// Read group metadata from an `@RG` header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadGroup {
    /// `ID` field
    pub id: String,
    /// `LB` field
    pub library: Option<String>,
    /// `SM` field
    pub sample: Option<String>,
}

/// Alignment file header.
///
/// Read once per stream and then shared by reference with every record
/// operation. There are no mutating methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    text: String,
    references: Vec<Reference>,
    reference_index: HashMap<String, usize>,
    read_groups: HashMap<String, ReadGroup>,
}

/// Iterate the `TAG:VALUE` fields of a header line with the given record type.
fn header_lines<'a>(text: &'a str, kind: &'a str) -> impl Iterator<Item = HashMap<&'a str, &'a str>> + 'a {
    text.lines().filter_map(move |line| {
        let mut fields = line.split('\t');
        if fields.next() != Some(kind) {
            return None;
        }
        Some(
            fields
                .filter_map(|field| field.split_once(':'))
                .collect::<HashMap<_, _>>(),
        )
    })
}

impl Header {
    /// Create a header from SAM text and a reference dictionary.
    pub fn new(text: String, references: Vec<Reference>) -> Self {
        let reference_index = references
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();

        let read_groups = header_lines(&text, "@RG")
            .filter_map(|fields| {
                let id = fields.get("ID")?.to_string();
                Some((
                    id.clone(),
                    ReadGroup {
                        id,
                        library: fields.get("LB").map(|s| s.to_string()),
                        sample: fields.get("SM").map(|s| s.to_string()),
                    },
                ))
            })
            .collect();

        Self {
            text,
            references,
            reference_index,
            read_groups,
        }
    }

    /// Build a header from SAM header text, taking references from `@SQ` lines.
    ///
    /// # Errors
    ///
    /// Returns a description of the first `@SQ` line missing `SN` or with an
    /// unparseable `LN`.
    pub fn from_sam_text(text: String) -> Result<Self, String> {
        let mut references = Vec::new();
        for fields in header_lines(&text, "@SQ") {
            let name = fields
                .get("SN")
                .ok_or_else(|| "@SQ line without SN".to_string())?;
            let length = fields
                .get("LN")
                .ok_or_else(|| format!("@SQ line for {} without LN", name))?;
            let length = length
                .parse::<u32>()
                .map_err(|_| format!("invalid LN for {}: {}", name, length))?;
            references.push(Reference::new(name.to_string(), length));
        }
        Ok(Self::new(text, references))
    }

    /// SAM header text as stored.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Reference sequences in id order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Get reference by ID.
    pub fn reference(&self, id: usize) -> Option<&Reference> {
        self.references.get(id)
    }

    /// Get reference name by ID.
    pub fn reference_name(&self, id: usize) -> Option<&str> {
        self.reference(id).map(|r| r.name.as_str())
    }

    /// Look up a reference ID by name.
    pub fn reference_id(&self, name: &str) -> Option<usize> {
        self.reference_index.get(name).copied()
    }

    /// Get number of reference sequences.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Read group by ID.
    pub fn read_group(&self, id: &str) -> Option<&ReadGroup> {
        self.read_groups.get(id)
    }

    /// Library (`LB`) of the given read group.
    pub fn library(&self, read_group: &str) -> Option<&str> {
        self.read_group(read_group)?.library.as_deref()
    }

    /// Header text for SAM output.
    ///
    /// When the stored text declares no `@SQ` lines but the dictionary is not
    /// empty, `@SQ` lines are synthesized after any existing text.
    pub fn sam_text(&self) -> Cow<'_, str> {
        let has_sq = header_lines(&self.text, "@SQ").next().is_some();
        if has_sq || self.references.is_empty() {
            return Cow::Borrowed(&self.text);
        }

        let mut text = self.text.clone();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        for reference in &self.references {
            let _ = writeln!(text, "@SQ\tSN:{}\tLN:{}", reference.name, reference.length);
        }
        Cow::Owned(text)
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}

/// Read and validate BAM magic bytes.
pub fn read_magic<R: Read>(reader: &mut R) -> io::Result<()> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;

    if &magic != BAM_MAGIC {
        return Err(invalid_data(format!(
            "Invalid BAM magic: expected {:?}, got {:?}",
            BAM_MAGIC, magic
        )));
    }

    Ok(())
}

/// Read SAM header text.
///
/// Trailing NUL padding is dropped.
pub fn read_header_text<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = read_i32(reader)?;
    if len < 0 {
        return Err(invalid_data(format!("Invalid SAM header length: {}", len)));
    }

    let mut text_bytes = vec![0u8; len as usize];
    reader.read_exact(&mut text_bytes)?;
    while text_bytes.last() == Some(&0) {
        text_bytes.pop();
    }

    String::from_utf8(text_bytes)
        .map_err(|e| invalid_data(format!("Invalid UTF-8 in SAM header: {}", e)))
}

/// Read a single reference sequence.
pub fn read_reference<R: Read>(reader: &mut R) -> io::Result<Reference> {
    let name_len = read_i32(reader)?;
    if name_len <= 0 {
        return Err(invalid_data(format!(
            "Invalid reference name length: {}",
            name_len
        )));
    }

    let mut name_bytes = vec![0u8; name_len as usize];
    reader.read_exact(&mut name_bytes)?;

    if name_bytes.last() != Some(&0) {
        return Err(invalid_data("Reference name not null-terminated".to_string()));
    }
    name_bytes.pop();

    let name = String::from_utf8(name_bytes)
        .map_err(|e| invalid_data(format!("Invalid UTF-8 in reference name: {}", e)))?;

    let length = read_i32(reader)?;
    if length < 0 {
        return Err(invalid_data(format!("Invalid reference length: {}", length)));
    }

    Ok(Reference::new(name, length as u32))
}

/// Read all reference sequences.
pub fn read_references<R: Read>(reader: &mut R) -> io::Result<Vec<Reference>> {
    let count = read_i32(reader)?;
    if count < 0 {
        return Err(invalid_data(format!("Invalid reference count: {}", count)));
    }

    let count = count as usize;
    // Cap the preallocation; the count is untrusted until the entries are read.
    let mut references = Vec::with_capacity(count.min(1 << 16));

    for i in 0..count {
        let reference = read_reference(reader).map_err(|e| {
            io::Error::new(e.kind(), format!("Error reading reference {}: {}", i, e))
        })?;
        references.push(reference);
    }

    Ok(references)
}

/// Read a complete binary header (magic, text, references).
///
/// # Errors
///
/// `UnexpectedEof` if the stream ends inside the header, `InvalidData` for
/// anything structurally wrong.
pub fn read_header<R: Read>(reader: &mut R) -> io::Result<Header> {
    read_magic(reader)?;
    let text = read_header_text(reader)?;
    let references = read_references(reader)?;
    Ok(Header::new(text, references))
}

/// Write a complete binary header.
pub fn write_header<W: Write>(writer: &mut W, header: &Header) -> io::Result<()> {
    let text = header.text().as_bytes();
    let l_text = i32::try_from(text.len())
        .map_err(|_| invalid_data("SAM header text too long".to_string()))?;
    let n_ref = i32::try_from(header.reference_count())
        .map_err(|_| invalid_data("Too many references".to_string()))?;

    writer.write_all(BAM_MAGIC)?;
    writer.write_all(&l_text.to_le_bytes())?;
    writer.write_all(text)?;
    writer.write_all(&n_ref.to_le_bytes())?;

    for reference in header.references() {
        let l_name = (reference.name.len() + 1) as i32;
        writer.write_all(&l_name.to_le_bytes())?;
        writer.write_all(reference.name.as_bytes())?;
        writer.write_all(&[0])?;
        writer.write_all(&(reference.length as i32).to_le_bytes())?;
    }

    Ok(())
}
