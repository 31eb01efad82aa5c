//! Error types for bamsift

use crate::io::bam::error::BamDecodeError;
use std::fmt;
use thiserror::Error;

/// Result type alias for bamsift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which output a record was being written to when a write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkRole {
    /// Output receiving accepted records
    Primary,
    /// Output receiving rejected records
    Unmatched,
}

impl fmt::Display for SinkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkRole::Primary => f.write_str("primary output"),
            SinkRole::Unmatched => f.write_str("unmatched output"),
        }
    }
}

/// Error types that can occur in bamsift
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The named input or output could not be opened
    #[error("failed to open {name}: {source}")]
    Open {
        /// Display name of the stream
        name: String,
        /// Underlying transport error
        #[source]
        source: std::io::Error,
    },

    /// The leading bytes of an input did not match any supported format
    #[error("failed to open {name}: unrecognized format")]
    UnrecognizedFormat {
        /// Display name of the stream
        name: String,
    },

    /// Header could not be decoded
    #[error("invalid header in {name}: {message}")]
    InvalidHeader {
        /// Display name of the stream
        name: String,
        /// What was wrong
        message: String,
    },

    /// Stream ended part way through a header or record
    #[error("{name} is truncated while reading {context}")]
    Truncated {
        /// Display name of the stream
        name: String,
        /// What was being read when the data ran out
        context: String,
    },

    /// Structurally invalid record (including reference ids outside the header)
    #[error("malformed record {index} in {name}: {source}")]
    MalformedRecord {
        /// Display name of the stream
        name: String,
        /// Zero-based record number
        index: u64,
        /// Decoding failure
        #[source]
        source: BamDecodeError,
    },

    /// Writing a record or header failed
    #[error("error writing to {role} {name}: {source}")]
    Write {
        /// Which sink failed
        role: SinkRole,
        /// Display name of the stream
        name: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Flushing or releasing a stream failed
    #[error("error closing {name}: {source}")]
    Close {
        /// Display name of the stream
        name: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Invalid region string
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Filter or output settings that cannot be honored
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}
