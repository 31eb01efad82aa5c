//! Record decoding error types.
//!
//! Structured errors for binary and text record decoding, so callers can
//! match on the exact failure instead of parsing messages.

use std::{error, fmt, io};

/// Errors that can occur while decoding an alignment record.
///
/// # Example
///
/// ```
/// use bamsift::io::bam::error::BamDecodeError;
///
/// fn describe(err: &BamDecodeError) -> String {
///     match err {
///         BamDecodeError::ReferenceOutOfRange { field, value, reference_count } => {
///             format!("{} id {} outside 0..{}", field, value, reference_count)
///         }
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Debug)]
pub enum BamDecodeError {
    /// I/O error occurred during decoding
    Io(io::Error),

    /// Invalid reference sequence ID (must be -1 or >= 0)
    InvalidReferenceId {
        /// The invalid reference ID value
        value: i32,
        /// Which field had the invalid ID ("read" or "mate")
        field: &'static str,
    },

    /// Reference ID does not index into the header's reference list
    ReferenceOutOfRange {
        /// Which field had the ID ("read" or "mate")
        field: &'static str,
        /// The reference ID
        value: i64,
        /// Number of references declared by the header
        reference_count: usize,
    },

    /// Reference name in a text record is not declared by the header
    UnknownReferenceName {
        /// Which field had the name ("read" or "mate")
        field: &'static str,
        /// The unknown name
        name: String,
    },

    /// Invalid read name length (must be >= 1)
    InvalidReadNameLength {
        /// The invalid length value
        length: usize,
    },

    /// Missing NUL terminator in string field
    MissingNulTerminator {
        /// Which field was missing the terminator
        field: &'static str,
        /// Offset in the data where error occurred
        offset: usize,
    },

    /// Invalid UTF-8 in string field
    InvalidUtf8 {
        /// Which field had invalid UTF-8
        field: &'static str,
        /// The underlying UTF-8 error
        source: std::str::Utf8Error,
    },

    /// Invalid tag type code
    InvalidTagType {
        /// The tag name
        tag: [u8; 2],
        /// The invalid type code
        type_code: u8,
    },

    /// Invalid array subtype
    InvalidArraySubtype {
        /// The invalid subtype code
        subtype: u8,
    },

    /// Invalid CIGAR operation code
    InvalidCigarOp {
        /// The invalid operation value
        value: u32,
    },

    /// Negative sequence length (invalid)
    NegativeSequenceLength {
        /// The negative length value
        length: i32,
    },

    /// Record data shorter than its own fields claim
    UnexpectedEof {
        /// What was being parsed
        context: &'static str,
        /// Expected number of bytes
        expected: usize,
        /// Actual number of bytes available
        actual: usize,
    },

    /// A text record field could not be parsed
    InvalidField {
        /// Field name (e.g. "POS", "CIGAR")
        field: &'static str,
        /// The offending text
        value: String,
    },

    /// Generic invalid data error with context
    InvalidData {
        /// Description of what was invalid
        message: String,
    },
}

impl error::Error for BamDecodeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidUtf8 { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for BamDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),

            Self::InvalidReferenceId { value, field } => {
                write!(
                    f,
                    "Invalid {} reference ID: {} (must be -1 or >= 0)",
                    field, value
                )
            }

            Self::ReferenceOutOfRange {
                field,
                value,
                reference_count,
            } => {
                write!(
                    f,
                    "{} reference ID {} out of range (header declares {} references)",
                    field, value, reference_count
                )
            }

            Self::UnknownReferenceName { field, name } => {
                write!(f, "{} reference name {:?} not in header", field, name)
            }

            Self::InvalidReadNameLength { length } => {
                write!(f, "Invalid read name length: {}", length)
            }

            Self::MissingNulTerminator { field, offset } => {
                write!(f, "Missing NUL terminator in {} at offset {}", field, offset)
            }

            Self::InvalidUtf8 { field, source } => {
                write!(f, "Invalid UTF-8 in {}: {}", field, source)
            }

            Self::InvalidTagType { tag, type_code } => {
                write!(
                    f,
                    "Invalid tag type for {}{}: {:?}",
                    tag[0] as char, tag[1] as char, *type_code as char
                )
            }

            Self::InvalidArraySubtype { subtype } => {
                write!(f, "Invalid array subtype: {:?}", *subtype as char)
            }

            Self::InvalidCigarOp { value } => {
                write!(f, "Invalid CIGAR operation: {}", value)
            }

            Self::NegativeSequenceLength { length } => {
                write!(f, "Invalid negative sequence length: {}", length)
            }

            Self::UnexpectedEof {
                context,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Record too short while parsing {}: expected {} bytes, got {}",
                    context, expected, actual
                )
            }

            Self::InvalidField { field, value } => {
                write!(f, "Invalid {} field: {:?}", field, value)
            }

            Self::InvalidData { message } => {
                write!(f, "Invalid data: {}", message)
            }
        }
    }
}

impl From<io::Error> for BamDecodeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<BamDecodeError> for io::Error {
    fn from(e: BamDecodeError) -> Self {
        match e {
            BamDecodeError::Io(io_err) => io_err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
