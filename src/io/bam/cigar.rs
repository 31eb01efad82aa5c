//! CIGAR (Compact Idiosyncratic Gapped Alignment Report) operations.
//!
//! # Binary Format
//!
//! In BAM, CIGAR is stored as 32-bit integers:
//! - Low 4 bits: operation type (0-8)
//! - High 28 bits: operation length (0 to 268,435,455)
//!
//! # Operations
//!
//! | Op | Code | Consumes query | Consumes reference |
//! |----|------|----------------|--------------------|
//! | M  | 0    | yes            | yes                |
//! | I  | 1    | yes            | no                 |
//! | D  | 2    | no             | yes                |
//! | N  | 3    | no             | yes                |
//! | S  | 4    | yes            | no                 |
//! | H  | 5    | no             | no                 |
//! | P  | 6    | no             | no                 |
//! | =  | 7    | yes            | yes                |
//! | X  | 8    | yes            | yes                |

use super::error::BamDecodeError;
use std::fmt::{self, Write as _};

/// CIGAR operation types.
///
/// Each operation describes a type of alignment event and its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    /// Match or mismatch (M)
    Match(u32),
    /// Insertion to reference (I)
    Insertion(u32),
    /// Deletion from reference (D)
    Deletion(u32),
    /// Skipped region from reference (N)
    RefSkip(u32),
    /// Soft clipping (S)
    SoftClip(u32),
    /// Hard clipping (H)
    HardClip(u32),
    /// Padding (P)
    Padding(u32),
    /// Sequence match (=)
    SeqMatch(u32),
    /// Sequence mismatch (X)
    SeqMismatch(u32),
}

impl CigarOp {
    /// Build an operation from its binary code and length.
    pub fn from_code(code: u32, length: u32) -> Result<Self, BamDecodeError> {
        Ok(match code {
            0 => CigarOp::Match(length),
            1 => CigarOp::Insertion(length),
            2 => CigarOp::Deletion(length),
            3 => CigarOp::RefSkip(length),
            4 => CigarOp::SoftClip(length),
            5 => CigarOp::HardClip(length),
            6 => CigarOp::Padding(length),
            7 => CigarOp::SeqMatch(length),
            8 => CigarOp::SeqMismatch(length),
            _ => return Err(BamDecodeError::InvalidCigarOp { value: code }),
        })
    }

    /// Build an operation from its SAM character and length.
    pub fn from_char(c: char, length: u32) -> Option<Self> {
        let code = match c {
            'M' => 0,
            'I' => 1,
            'D' => 2,
            'N' => 3,
            'S' => 4,
            'H' => 5,
            'P' => 6,
            '=' => 7,
            'X' => 8,
            _ => return None,
        };
        Self::from_code(code, length).ok()
    }

    /// Binary operation code (0-8).
    pub fn code(&self) -> u32 {
        match self {
            CigarOp::Match(_) => 0,
            CigarOp::Insertion(_) => 1,
            CigarOp::Deletion(_) => 2,
            CigarOp::RefSkip(_) => 3,
            CigarOp::SoftClip(_) => 4,
            CigarOp::HardClip(_) => 5,
            CigarOp::Padding(_) => 6,
            CigarOp::SeqMatch(_) => 7,
            CigarOp::SeqMismatch(_) => 8,
        }
    }

    /// Get the operation count/length.
    pub fn length(&self) -> u32 {
        match self {
            CigarOp::Match(len)
            | CigarOp::Insertion(len)
            | CigarOp::Deletion(len)
            | CigarOp::RefSkip(len)
            | CigarOp::SoftClip(len)
            | CigarOp::HardClip(len)
            | CigarOp::Padding(len)
            | CigarOp::SeqMatch(len)
            | CigarOp::SeqMismatch(len) => *len,
        }
    }

    /// Check if this operation has zero length.
    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Whether the operation consumes bases of the read.
    pub fn consumes_query(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Insertion(_)
                | CigarOp::SoftClip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    /// Whether the operation consumes bases of the reference.
    pub fn consumes_reference(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Deletion(_)
                | CigarOp::RefSkip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    /// Get the operation type as a character (for SAM format).
    pub fn as_char(&self) -> char {
        match self {
            CigarOp::Match(_) => 'M',
            CigarOp::Insertion(_) => 'I',
            CigarOp::Deletion(_) => 'D',
            CigarOp::RefSkip(_) => 'N',
            CigarOp::SoftClip(_) => 'S',
            CigarOp::HardClip(_) => 'H',
            CigarOp::Padding(_) => 'P',
            CigarOp::SeqMatch(_) => '=',
            CigarOp::SeqMismatch(_) => 'X',
        }
    }

    /// Pack into the 32-bit binary representation.
    pub fn to_packed(&self) -> u32 {
        (self.length() << 4) | self.code()
    }

    /// Unpack from the 32-bit binary representation.
    pub fn from_packed(packed: u32) -> Result<Self, BamDecodeError> {
        Self::from_code(packed & 0x0F, packed >> 4)
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.length(), self.as_char())
    }
}

/// Decode `n_ops` packed CIGAR operations into `ops`, replacing its contents.
///
/// # Errors
///
/// Returns error if `data` is shorter than `n_ops * 4` bytes or an operation
/// code is outside 0-8.
///
/// # Example
///
/// ```
/// use bamsift::io::bam::cigar::{decode_cigar, CigarOp};
///
/// // 100M = 100 << 4 | 0 = 1600 = 0x00000640 (little-endian)
/// let data = [0x40, 0x06, 0x00, 0x00];
/// let mut cigar = Vec::new();
/// decode_cigar(&data, 1, &mut cigar).unwrap();
/// assert_eq!(cigar, vec![CigarOp::Match(100)]);
/// ```
pub fn decode_cigar(data: &[u8], n_ops: usize, ops: &mut Vec<CigarOp>) -> Result<(), BamDecodeError> {
    let required_bytes = n_ops * 4;
    if data.len() < required_bytes {
        return Err(BamDecodeError::UnexpectedEof {
            context: "CIGAR",
            expected: required_bytes,
            actual: data.len(),
        });
    }

    ops.clear();
    ops.reserve(n_ops);
    for chunk in data[..required_bytes].chunks_exact(4) {
        let packed = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        ops.push(CigarOp::from_packed(packed)?);
    }

    Ok(())
}

/// Append the packed binary form of `ops` to `out`.
pub fn encode_cigar(ops: &[CigarOp], out: &mut Vec<u8>) {
    out.reserve(ops.len() * 4);
    for op in ops {
        out.extend_from_slice(&op.to_packed().to_le_bytes());
    }
}

/// Parse a SAM CIGAR string (`*` means no operations) into `ops`.
pub fn parse_cigar_text(text: &str, ops: &mut Vec<CigarOp>) -> Result<(), BamDecodeError> {
    ops.clear();
    if text == "*" {
        return Ok(());
    }

    let invalid = || BamDecodeError::InvalidField {
        field: "CIGAR",
        value: text.to_string(),
    };

    let mut length: Option<u32> = None;
    for c in text.chars() {
        if let Some(digit) = c.to_digit(10) {
            let current = length.unwrap_or(0);
            length = Some(
                current
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .filter(|v| *v < (1 << 28))
                    .ok_or_else(invalid)?,
            );
        } else {
            let len = length.take().ok_or_else(invalid)?;
            ops.push(CigarOp::from_char(c, len).ok_or_else(invalid)?);
        }
    }

    if length.is_some() || ops.is_empty() {
        return Err(invalid());
    }
    Ok(())
}

/// Render `ops` as SAM CIGAR text (`*` when empty).
pub fn format_cigar(ops: &[CigarOp], out: &mut String) {
    if ops.is_empty() {
        out.push('*');
        return;
    }
    for op in ops {
        // Writing to a String cannot fail.
        let _ = write!(out, "{}", op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cigar_op_length() {
        assert_eq!(CigarOp::Match(100).length(), 100);
        assert_eq!(CigarOp::Insertion(5).length(), 5);
    }

    #[test]
    fn test_cigar_op_display() {
        assert_eq!(format!("{}", CigarOp::Match(100)), "100M");
        assert_eq!(format!("{}", CigarOp::HardClip(5)), "5H");
    }

    #[test]
    fn test_consumption_table() {
        let query: Vec<char> = "MIDNSHP=X"
            .chars()
            .filter(|c| CigarOp::from_char(*c, 1).unwrap().consumes_query())
            .collect();
        assert_eq!(query, vec!['M', 'I', 'S', '=', 'X']);

        let reference: Vec<char> = "MIDNSHP=X"
            .chars()
            .filter(|c| CigarOp::from_char(*c, 1).unwrap().consumes_reference())
            .collect();
        assert_eq!(reference, vec!['M', 'D', 'N', '=', 'X']);
    }

    #[test]
    fn test_decode_multiple_operations() {
        // 50M 5I 45M
        let data = [
            0x20, 0x03, 0x00, 0x00, // 50M
            0x51, 0x00, 0x00, 0x00, // 5I
            0xD0, 0x02, 0x00, 0x00, // 45M
        ];
        let mut cigar = vec![CigarOp::Padding(1)];
        decode_cigar(&data, 3, &mut cigar).unwrap();
        assert_eq!(
            cigar,
            vec![CigarOp::Match(50), CigarOp::Insertion(5), CigarOp::Match(45)]
        );
    }

    #[test]
    fn test_insufficient_data_error() {
        let mut cigar = Vec::new();
        let result = decode_cigar(&[0x10, 0x00], 1, &mut cigar);
        assert!(matches!(result, Err(BamDecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_invalid_operation_code() {
        let mut cigar = Vec::new();
        let result = decode_cigar(&[0x19, 0x00, 0x00, 0x00], 1, &mut cigar);
        assert!(matches!(result, Err(BamDecodeError::InvalidCigarOp { value: 9 })));
    }

    #[test]
    fn test_large_length() {
        let mut cigar = Vec::new();
        decode_cigar(&[0xF0, 0xFF, 0xFF, 0xFF], 1, &mut cigar).unwrap();
        assert_eq!(cigar[0], CigarOp::Match(268_435_455));
    }

    #[test]
    fn test_parse_text() {
        let mut ops = Vec::new();
        parse_cigar_text("5H10S80M2I3D5=1X", &mut ops).unwrap();
        assert_eq!(ops.len(), 7);
        assert_eq!(ops[0], CigarOp::HardClip(5));
        assert_eq!(ops[6], CigarOp::SeqMismatch(1));

        parse_cigar_text("*", &mut ops).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_parse_text_rejects_garbage() {
        let mut ops = Vec::new();
        assert!(parse_cigar_text("M10", &mut ops).is_err());
        assert!(parse_cigar_text("10", &mut ops).is_err());
        assert!(parse_cigar_text("10Q", &mut ops).is_err());
        assert!(parse_cigar_text("", &mut ops).is_err());
    }

    #[test]
    fn test_format_text() {
        let mut out = String::new();
        format_cigar(&[CigarOp::SoftClip(3), CigarOp::Match(97)], &mut out);
        assert_eq!(out, "3S97M");

        out.clear();
        format_cigar(&[], &mut out);
        assert_eq!(out, "*");
    }

    proptest! {
        #[test]
        fn prop_packed_form_preserves_op(length in 0u32..(1 << 28), code in 0u32..=8u32) {
            let op = CigarOp::from_code(code, length).unwrap();
            let mut bytes = Vec::new();
            encode_cigar(&[op], &mut bytes);
            let mut decoded = Vec::new();
            decode_cigar(&bytes, 1, &mut decoded).unwrap();
            prop_assert_eq!(decoded[0], op);
        }
    }
}
