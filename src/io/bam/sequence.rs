//! 4-bit packed sequence codec.
//!
//! Sequences are stored 2 bases per byte, high nibble first. The 16 nibble
//! values are `=ACMGRSVTWYHKDBN`; anything else encodes as `N`.

use super::error::BamDecodeError;

/// 4-bit to ASCII base lookup table.
const SEQ_LOOKUP: [u8; 16] = [
    b'=', b'A', b'C', b'M', // 0-3
    b'G', b'R', b'S', b'V', // 4-7
    b'T', b'W', b'Y', b'H', // 8-11
    b'K', b'D', b'B', b'N', // 12-15
];

fn base_to_nibble(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'=' => 0,
        b'A' => 1,
        b'C' => 2,
        b'M' => 3,
        b'G' => 4,
        b'R' => 5,
        b'S' => 6,
        b'V' => 7,
        b'T' => 8,
        b'W' => 9,
        b'Y' => 10,
        b'H' => 11,
        b'K' => 12,
        b'D' => 13,
        b'B' => 14,
        _ => 15,
    }
}

/// Decode `length` packed bases from `data` into `out`, replacing its contents.
///
/// # Errors
///
/// Returns error if `data` is shorter than `ceil(length / 2)` bytes.
///
/// # Example
///
/// ```
/// use bamsift::io::bam::sequence::decode_sequence;
///
/// // 0x12 encodes 'A' (1) then 'C' (2)
/// let mut bases = Vec::new();
/// decode_sequence(&[0x12], 2, &mut bases).unwrap();
/// assert_eq!(bases, b"AC");
/// ```
pub fn decode_sequence(data: &[u8], length: usize, out: &mut Vec<u8>) -> Result<(), BamDecodeError> {
    let required_bytes = length.div_ceil(2);
    if data.len() < required_bytes {
        return Err(BamDecodeError::UnexpectedEof {
            context: "sequence",
            expected: required_bytes,
            actual: data.len(),
        });
    }

    out.clear();
    out.reserve(length);
    for &byte in &data[..length / 2] {
        out.push(SEQ_LOOKUP[(byte >> 4) as usize]);
        out.push(SEQ_LOOKUP[(byte & 0x0F) as usize]);
    }
    if length % 2 == 1 {
        out.push(SEQ_LOOKUP[(data[length / 2] >> 4) as usize]);
    }

    Ok(())
}

/// Append the packed form of `bases` to `out`. Odd lengths pad the final
/// low nibble with zero.
pub fn encode_sequence(bases: &[u8], out: &mut Vec<u8>) {
    out.reserve(bases.len().div_ceil(2));
    for chunk in bases.chunks(2) {
        let high = base_to_nibble(chunk[0]);
        let low = chunk.get(1).map_or(0, |&b| base_to_nibble(b));
        out.push((high << 4) | low);
    }
}
