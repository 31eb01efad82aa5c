//! Binary alignment (BAM) codec.
//!
//! - [`header`]: magic, SAM header text, reference list
//! - [`record`]: record layout, decode into a reused [`Record`], encode
//! - [`cigar`], [`sequence`], [`tags`]: field primitives
//! - [`reader`], [`writer`]: record streams over a decompressed transport
//!
//! BGZF framing lives in [`crate::io::compression`]; these types only see
//! the decompressed bytes.

pub mod cigar;
pub mod error;
pub mod header;
pub mod reader;
pub mod record;
pub mod sequence;
pub mod tags;
pub mod writer;

pub use cigar::CigarOp;
pub use error::BamDecodeError;
pub use header::{Header, ReadGroup, Reference, BAM_MAGIC};
pub use reader::BamReader;
pub use record::Record;
pub use tags::{ArrayValue, Tag, TagValue, Tags};
pub use writer::BamWriter;
