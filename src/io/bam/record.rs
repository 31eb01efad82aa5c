//! Alignment record structure and binary codec.
//!
//! # Binary Format
//!
//! ```text
//! Record (binary, little-endian):
//! - block_size (int32): Total record size in bytes (excluding this field)
//! - refID (int32): Reference sequence ID (-1 for unmapped)
//! - pos (int32): 0-based leftmost position (-1 for unmapped)
//! - l_read_name (uint8): Length of read name (includes null terminator)
//! - mapq (uint8): Mapping quality (255 = unavailable)
//! - bin (uint16): BAI index bin
//! - n_cigar_op (uint16): Number of CIGAR operations
//! - flag (uint16): Bitwise FLAGS
//! - l_seq (int32): Sequence length
//! - next_refID (int32): Reference ID of mate/next read
//! - next_pos (int32): Position of mate/next read
//! - tlen (int32): Template length
//! - read_name (char[l_read_name]): Null-terminated read name
//! - cigar (uint32[n_cigar_op]): CIGAR operations
//! - seq (uint8[(l_seq+1)/2]): 4-bit encoded sequence
//! - qual (char[l_seq]): Phred quality scores
//! - tags: Optional tags (variable length)
//! ```
//!
//! [`decode_record`] takes the bytes after `block_size`; [`encode_record`]
//! produces the full record including it.

use super::cigar::{decode_cigar, encode_cigar, CigarOp};
use super::error::BamDecodeError;
use super::header::Header;
use super::sequence::{decode_sequence, encode_sequence};
use super::tags::{ArrayValue, Tag, TagValue, Tags};
use std::io;

/// Size of the fixed-length part of a record (after `block_size`).
pub const FIXED_FIELDS_LEN: usize = 32;

/// Segment unmapped.
pub const FLAG_UNMAPPED: u16 = 0x4;

const CIGAR_TAG: [u8; 2] = *b"CG";

/// Alignment record.
///
/// Meant to be allocated once and overwritten by each read call; decoding
/// reuses the name, sequence, quality, CIGAR, and tag buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Read name/query name
    pub name: String,

    /// Reference sequence ID (index into the header's references).
    /// None if unmapped (refID = -1)
    pub reference_id: Option<usize>,

    /// 0-based leftmost mapping position.
    /// None if unmapped (pos = -1)
    pub position: Option<i32>,

    /// Mapping quality, None if unavailable (mapq = 255)
    pub mapq: Option<u8>,

    /// Bitwise FLAGS
    pub flags: u16,

    /// Mate/next segment reference ID
    pub mate_reference_id: Option<usize>,

    /// Mate/next segment position
    pub mate_position: Option<i32>,

    /// Template length (TLEN)
    pub template_length: i32,

    /// Sequence bases (ASCII)
    pub sequence: Vec<u8>,

    /// Phred quality scores without offset; empty when absent
    pub quality: Vec<u8>,

    /// CIGAR operations
    pub cigar: Vec<CigarOp>,

    /// Optional tags
    pub tags: Tags,
}

impl Record {
    /// Create a new empty record.
    pub fn new() -> Self {
        Self {
            name: String::new(),
            reference_id: None,
            position: None,
            mapq: None,
            flags: 0,
            mate_reference_id: None,
            mate_position: None,
            template_length: 0,
            sequence: Vec::new(),
            quality: Vec::new(),
            cigar: Vec::new(),
            tags: Tags::new(),
        }
    }

    /// Check if the read is unmapped.
    pub fn is_unmapped(&self) -> bool {
        self.flags & FLAG_UNMAPPED != 0
    }

    /// Get sequence length.
    pub fn sequence_length(&self) -> usize {
        self.sequence.len()
    }

    /// Number of read bases described by the CIGAR, counting hard clips.
    ///
    /// Operations M, I, S, =, X and H contribute their lengths. A record
    /// without CIGAR operations has length zero.
    pub fn query_length_after_clipping(&self) -> u64 {
        self.cigar
            .iter()
            .filter(|op| op.consumes_query() || matches!(op, CigarOp::HardClip(_)))
            .map(|op| op.length() as u64)
            .sum()
    }

    /// Number of reference bases covered by the alignment.
    pub fn reference_length(&self) -> u64 {
        self.cigar
            .iter()
            .filter(|op| op.consumes_reference())
            .map(|op| op.length() as u64)
            .sum()
    }

    /// 0-based exclusive end of the alignment on the reference.
    ///
    /// Unmapped records and records with no reference-consuming operations
    /// cover one base. Returns None when there is no position.
    pub fn reference_end(&self) -> Option<i64> {
        let start = self.position? as i64;
        let span = if self.is_unmapped() {
            0
        } else {
            self.reference_length() as i64
        };
        Some(start + span.max(1))
    }

    /// Check both reference IDs index into `header`'s reference list.
    pub fn validate_references(&self, header: &Header) -> Result<(), BamDecodeError> {
        let count = header.reference_count();
        for (field, id) in [("read", self.reference_id), ("mate", self.mate_reference_id)] {
            if let Some(id) = id {
                if id >= count {
                    return Err(BamDecodeError::ReferenceOutOfRange {
                        field,
                        value: id as i64,
                        reference_count: count,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

fn read_i32_le(data: &[u8], cursor: &mut usize) -> i32 {
    let value = i32::from_le_bytes([
        data[*cursor],
        data[*cursor + 1],
        data[*cursor + 2],
        data[*cursor + 3],
    ]);
    *cursor += 4;
    value
}

fn read_u16_le(data: &[u8], cursor: &mut usize) -> u16 {
    let value = u16::from_le_bytes([data[*cursor], data[*cursor + 1]]);
    *cursor += 2;
    value
}

fn take<'a>(
    data: &'a [u8],
    cursor: &mut usize,
    len: usize,
    context: &'static str,
) -> Result<&'a [u8], BamDecodeError> {
    let available = data.len() - *cursor;
    if len > available {
        return Err(BamDecodeError::UnexpectedEof {
            context,
            expected: len,
            actual: available,
        });
    }
    let slice = &data[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

/// Only -1 (unmapped) and non-negative IDs are representable.
fn parse_reference_id(ref_id: i32, field: &'static str) -> Result<Option<usize>, BamDecodeError> {
    match ref_id {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(n as usize)),
        invalid => Err(BamDecodeError::InvalidReferenceId {
            value: invalid,
            field,
        }),
    }
}

/// Replace a `kS mN` placeholder CIGAR with the real one stored in `CG:B,I`.
///
/// The binary format caps `n_cigar_op` at 65,535; longer CIGARs (long reads)
/// are stored in the tag instead. The tag is removed once applied.
fn restore_long_cigar(record: &mut Record) -> Result<(), BamDecodeError> {
    let placeholder = matches!(
        record.cigar.as_slice(),
        [CigarOp::SoftClip(len), CigarOp::RefSkip(_)] if *len as usize == record.sequence.len()
    );
    if !placeholder {
        return Ok(());
    }

    let packed: Vec<u32> = match record.tags.get(&CIGAR_TAG)? {
        Some(Tag {
            value: TagValue::Array(ArrayValue::UInt32(values)),
            ..
        }) => values,
        Some(Tag {
            value: TagValue::Array(ArrayValue::Int32(values)),
            ..
        }) => values.into_iter().map(|v| v as u32).collect(),
        _ => return Ok(()),
    };

    record.cigar.clear();
    for value in packed {
        record.cigar.push(CigarOp::from_packed(value)?);
    }
    record.tags.remove(&[CIGAR_TAG])?;
    Ok(())
}

/// Decode a record body (the bytes following `block_size`) into `record`.
///
/// Every field of `record` is overwritten. Reference IDs are checked for
/// representability here; checking them against a header is
/// [`Record::validate_references`].
pub fn decode_record(data: &[u8], record: &mut Record) -> Result<(), BamDecodeError> {
    if data.len() < FIXED_FIELDS_LEN {
        return Err(BamDecodeError::UnexpectedEof {
            context: "fixed fields",
            expected: FIXED_FIELDS_LEN,
            actual: data.len(),
        });
    }

    let mut cursor = 0;
    let ref_id = read_i32_le(data, &mut cursor);
    let pos = read_i32_le(data, &mut cursor);
    let l_read_name = data[cursor] as usize;
    let mapq = data[cursor + 1];
    cursor += 2;
    let _bin = read_u16_le(data, &mut cursor);
    let n_cigar_op = read_u16_le(data, &mut cursor) as usize;
    let flags = read_u16_le(data, &mut cursor);
    let l_seq = read_i32_le(data, &mut cursor);
    let next_ref_id = read_i32_le(data, &mut cursor);
    let next_pos = read_i32_le(data, &mut cursor);
    let tlen = read_i32_le(data, &mut cursor);

    if l_read_name == 0 {
        return Err(BamDecodeError::InvalidReadNameLength { length: 0 });
    }
    if l_seq < 0 {
        return Err(BamDecodeError::NegativeSequenceLength { length: l_seq });
    }
    let l_seq = l_seq as usize;

    record.reference_id = parse_reference_id(ref_id, "read")?;
    record.mate_reference_id = parse_reference_id(next_ref_id, "mate")?;
    record.position = (pos >= 0).then_some(pos);
    record.mate_position = (next_pos >= 0).then_some(next_pos);
    record.mapq = (mapq != 255).then_some(mapq);
    record.flags = flags;
    record.template_length = tlen;

    let name_offset = cursor;
    let name_bytes = take(data, &mut cursor, l_read_name, "read name")?;
    let (&last, name) = name_bytes
        .split_last()
        .ok_or(BamDecodeError::InvalidReadNameLength { length: 0 })?;
    if last != 0 {
        return Err(BamDecodeError::MissingNulTerminator {
            field: "read name",
            offset: name_offset,
        });
    }
    let name = std::str::from_utf8(name).map_err(|source| BamDecodeError::InvalidUtf8 {
        field: "read name",
        source,
    })?;
    record.name.clear();
    record.name.push_str(name);

    let cigar_bytes = take(data, &mut cursor, n_cigar_op * 4, "CIGAR")?;
    decode_cigar(cigar_bytes, n_cigar_op, &mut record.cigar)?;

    let seq_bytes = take(data, &mut cursor, l_seq.div_ceil(2), "sequence")?;
    decode_sequence(seq_bytes, l_seq, &mut record.sequence)?;

    // All-0xFF quality means the scores are absent.
    let quality = take(data, &mut cursor, l_seq, "quality scores")?;
    record.quality.clear();
    if !quality.iter().all(|&b| b == 0xFF) {
        record.quality.extend_from_slice(quality);
    }

    record.tags.set_raw(&data[cursor..]);
    record.tags.validate()?;

    restore_long_cigar(record)
}

/// BAI bin for the 0-based half-open interval `[beg, end)`.
pub fn reg2bin(beg: i64, end: i64) -> u16 {
    let end = end - 1;
    let levels: [(u32, i64); 5] = [(14, 4681), (17, 585), (20, 73), (23, 9), (26, 1)];
    for (shift, offset) in levels {
        if beg >> shift == end >> shift {
            return (offset + (beg >> shift)) as u16;
        }
    }
    0
}

fn invalid_input(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

fn reference_id_field(id: Option<usize>) -> io::Result<i32> {
    match id {
        None => Ok(-1),
        Some(id) => i32::try_from(id).map_err(|_| invalid_input(format!("reference id {} too large", id))),
    }
}

/// Append the full binary encoding of `record` (including `block_size`) to `out`.
///
/// CIGARs longer than 65,535 operations are written as a `kS mN`
/// placeholder plus a `CG:B,I` tag.
///
/// # Errors
///
/// `InvalidInput` if the record cannot be represented: read name longer
/// than 254 bytes, quality length differing from sequence length, or an
/// out-of-range reference id.
pub fn encode_record(record: &Record, out: &mut Vec<u8>) -> io::Result<()> {
    let name: &[u8] = if record.name.is_empty() {
        b"*"
    } else {
        record.name.as_bytes()
    };
    if name.len() > 254 {
        return Err(invalid_input(format!("read name too long: {} bytes", name.len())));
    }
    if !record.quality.is_empty() && record.quality.len() != record.sequence.len() {
        return Err(invalid_input(format!(
            "quality length {} differs from sequence length {}",
            record.quality.len(),
            record.sequence.len()
        )));
    }
    let l_seq = i32::try_from(record.sequence.len())
        .map_err(|_| invalid_input("sequence too long".to_string()))?;

    let long_cigar = record.cigar.len() > u16::MAX as usize;
    let placeholder;
    let cigar: &[CigarOp] = if long_cigar {
        placeholder = [
            CigarOp::SoftClip(record.sequence.len() as u32),
            CigarOp::RefSkip(record.reference_length() as u32),
        ];
        &placeholder
    } else {
        &record.cigar
    };

    let pos = record.position.unwrap_or(-1);
    let bin = match record.reference_end() {
        Some(end) => reg2bin(pos as i64, end),
        None => reg2bin(-1, 0),
    };

    let start = out.len();
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&reference_id_field(record.reference_id)?.to_le_bytes());
    out.extend_from_slice(&pos.to_le_bytes());
    out.push((name.len() + 1) as u8);
    out.push(record.mapq.unwrap_or(255));
    out.extend_from_slice(&bin.to_le_bytes());
    out.extend_from_slice(&(cigar.len() as u16).to_le_bytes());
    out.extend_from_slice(&record.flags.to_le_bytes());
    out.extend_from_slice(&l_seq.to_le_bytes());
    out.extend_from_slice(&reference_id_field(record.mate_reference_id)?.to_le_bytes());
    out.extend_from_slice(&record.mate_position.unwrap_or(-1).to_le_bytes());
    out.extend_from_slice(&record.template_length.to_le_bytes());
    out.extend_from_slice(name);
    out.push(0);
    encode_cigar(cigar, out);
    encode_sequence(&record.sequence, out);
    if record.quality.is_empty() {
        out.resize(out.len() + record.sequence.len(), 0xFF);
    } else {
        out.extend_from_slice(&record.quality);
    }
    out.extend_from_slice(record.tags.as_raw());

    if long_cigar {
        let mut tag = Tags::new();
        tag.push(&Tag {
            key: CIGAR_TAG,
            value: TagValue::Array(ArrayValue::UInt32(
                record.cigar.iter().map(CigarOp::to_packed).collect(),
            )),
        });
        out.extend_from_slice(tag.as_raw());
    }

    let block_size = i32::try_from(out.len() - start - 4)
        .map_err(|_| invalid_input("record too large".to_string()))?;
    out[start..start + 4].copy_from_slice(&block_size.to_le_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::header::Reference;

    /// Fixed fields followed by `tail`, without the block_size prefix.
    fn body(ref_id: i32, l_read_name: u8, n_cigar: u16, l_seq: i32, next_ref_id: i32, tail: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&ref_id.to_le_bytes());
        data.extend_from_slice(&100i32.to_le_bytes());
        data.push(l_read_name);
        data.push(60);
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&n_cigar.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&l_seq.to_le_bytes());
        data.extend_from_slice(&next_ref_id.to_le_bytes());
        data.extend_from_slice(&(-1i32).to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(tail);
        data
    }

    fn decode(data: &[u8]) -> Result<Record, BamDecodeError> {
        let mut record = Record::new();
        decode_record(data, &mut record).map(|()| record)
    }

    fn sample() -> Record {
        let mut record = Record::new();
        record.name = "read1".to_string();
        record.reference_id = Some(1);
        record.position = Some(100);
        record.mapq = Some(30);
        record.flags = 0x63;
        record.mate_reference_id = Some(0);
        record.mate_position = Some(50);
        record.template_length = -75;
        record.sequence = b"ACGTN".to_vec();
        record.quality = vec![30, 31, 32, 33, 2];
        record.cigar = vec![CigarOp::SoftClip(1), CigarOp::Match(4), CigarOp::HardClip(3)];
        record.tags.push_sam_field("RG:Z:grp1").unwrap();
        record
    }

    #[test]
    fn test_record_flags() {
        let mut record = Record::new();
        record.flags = FLAG_UNMAPPED;
        assert!(record.is_unmapped());
        record.flags = 0x1 | 0x10;
        assert!(!record.is_unmapped());
    }

    #[test]
    fn test_decode_minimal_record() {
        let record = decode(&body(-1, 5, 0, 0, -1, b"read\0")).unwrap();
        assert_eq!(record.name, "read");
        assert_eq!(record.reference_id, None);
        assert_eq!(record.mapq, Some(60));
        assert!(record.cigar.is_empty());
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_decode_sequence_and_quality() {
        let mut tail = b"test\0".to_vec();
        tail.extend_from_slice(&64u32.to_le_bytes()); // 4M
        tail.extend_from_slice(&[0x12, 0x48]); // ACGT
        tail.extend_from_slice(&[40, 40, 40, 40]);
        let record = decode(&body(0, 5, 1, 4, -1, &tail)).unwrap();
        assert_eq!(record.reference_id, Some(0));
        assert_eq!(record.position, Some(100));
        assert_eq!(record.sequence, b"ACGT");
        assert_eq!(record.quality, vec![40; 4]);
        assert_eq!(record.cigar, vec![CigarOp::Match(4)]);
    }

    #[test]
    fn test_missing_quality_scores() {
        let mut tail = b"test\0".to_vec();
        tail.extend_from_slice(&[0x12, 0x48]);
        tail.extend_from_slice(&[0xFF; 4]);
        let record = decode(&body(0, 5, 0, 4, -1, &tail)).unwrap();
        assert_eq!(record.sequence, b"ACGT");
        assert!(record.quality.is_empty());
    }

    #[test]
    fn test_too_short_for_fixed_fields() {
        let err = decode(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, BamDecodeError::UnexpectedEof { context: "fixed fields", .. }));
    }

    #[test]
    fn test_cigar_past_end() {
        let err = decode(&body(0, 5, 10, 0, -1, b"read\0")).unwrap_err();
        assert!(matches!(err, BamDecodeError::UnexpectedEof { context: "CIGAR", .. }));
    }

    #[test]
    fn test_invalid_utf8_in_read_name() {
        let err = decode(&body(0, 4, 0, 0, -1, &[0xFF, 0xFE, 0xFD, 0x00])).unwrap_err();
        assert!(matches!(err, BamDecodeError::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_missing_null_terminator_in_name() {
        let err = decode(&body(0, 4, 0, 0, -1, b"read")).unwrap_err();
        assert!(matches!(err, BamDecodeError::MissingNulTerminator { .. }));
    }

    #[test]
    fn test_negative_sequence_length() {
        let err = decode(&body(0, 5, 0, -1, -1, b"read\0")).unwrap_err();
        assert!(matches!(err, BamDecodeError::NegativeSequenceLength { length: -1 }));
    }

    #[test]
    fn test_extremely_large_sequence_length() {
        let err = decode(&body(0, 5, 0, i32::MAX, -1, b"read\0")).unwrap_err();
        assert!(matches!(err, BamDecodeError::UnexpectedEof { context: "sequence", .. }));
    }

    #[test]
    fn test_zero_read_name_length() {
        let err = decode(&body(0, 0, 0, 0, -1, b"")).unwrap_err();
        assert!(matches!(err, BamDecodeError::InvalidReadNameLength { length: 0 }));
    }

    #[test]
    fn test_invalid_reference_ids() {
        for invalid_id in [-2i32, -100, i32::MIN] {
            let err = decode(&body(invalid_id, 5, 0, 0, -1, b"read\0")).unwrap_err();
            assert!(matches!(err, BamDecodeError::InvalidReferenceId { field: "read", .. }));

            let err = decode(&body(0, 5, 0, 0, invalid_id, b"read\0")).unwrap_err();
            assert!(matches!(err, BamDecodeError::InvalidReferenceId { field: "mate", .. }));
        }
    }

    #[test]
    fn test_validate_references_against_header() {
        let header = Header::new(
            String::new(),
            vec![
                Reference::new("chr1".to_string(), 1000),
                Reference::new("chr2".to_string(), 2000),
            ],
        );
        let mut record = sample();
        assert!(record.validate_references(&header).is_ok());

        record.mate_reference_id = Some(2);
        let err = record.validate_references(&header).unwrap_err();
        assert!(matches!(
            err,
            BamDecodeError::ReferenceOutOfRange { field: "mate", value: 2, reference_count: 2 }
        ));
    }

    #[test]
    fn test_encoded_record_decodes_to_same_fields() {
        let record = sample();
        let mut bytes = Vec::new();
        encode_record(&record, &mut bytes).unwrap();

        let block_size = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(block_size as usize, bytes.len() - 4);

        let mut decoded = Record::new();
        decoded.sequence = b"stale".to_vec();
        decode_record(&bytes[4..], &mut decoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_bin_for_unmapped_and_mapped() {
        assert_eq!(reg2bin(-1, 0), 4680);
        assert_eq!(reg2bin(0, 1), 4681);
        // Spans a 16 kb boundary, so falls to the next level.
        assert_eq!(reg2bin(16383, 16385), 585);
    }

    #[test]
    fn test_query_length_after_clipping() {
        let record = sample();
        // 1S + 4M + 3H
        assert_eq!(record.query_length_after_clipping(), 8);
        assert_eq!(Record::new().query_length_after_clipping(), 0);
    }

    #[test]
    fn test_reference_end() {
        let mut record = sample();
        assert_eq!(record.reference_end(), Some(104));
        record.cigar.clear();
        assert_eq!(record.reference_end(), Some(101));
        record.position = None;
        assert_eq!(record.reference_end(), None);
    }

    #[test]
    fn test_long_cigar_uses_cg_tag() {
        let mut record = sample();
        record.sequence = vec![b'A'; 70_000];
        record.quality.clear();
        record.cigar = (0..70_000)
            .map(|i| if i % 2 == 0 { CigarOp::Match(1) } else { CigarOp::Insertion(1) })
            .collect();

        let mut bytes = Vec::new();
        encode_record(&record, &mut bytes).unwrap();
        let n_cigar = u16::from_le_bytes([bytes[16], bytes[17]]);
        assert_eq!(n_cigar, 2);

        let decoded = {
            let mut r = Record::new();
            decode_record(&bytes[4..], &mut r).unwrap();
            r
        };
        assert_eq!(decoded.cigar, record.cigar);
        assert!(decoded.tags.get(b"CG").unwrap().is_none());
        assert_eq!(decoded.tags.get_str(b"RG"), Some("grp1"));
    }

    #[test]
    fn test_placeholder_without_cg_tag_is_kept() {
        let mut record = sample();
        record.tags.clear();
        record.cigar = vec![CigarOp::SoftClip(5), CigarOp::RefSkip(10)];
        let mut bytes = Vec::new();
        encode_record(&record, &mut bytes).unwrap();
        let decoded = decode(&bytes[4..]).unwrap();
        assert_eq!(decoded.cigar, record.cigar);
    }

    #[test]
    fn test_encode_rejects_quality_mismatch() {
        let mut record = sample();
        record.quality.pop();
        let err = encode_record(&record, &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
