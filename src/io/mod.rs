//! I/O module: transports, format detection, and record codecs
//!
//! Inputs are read through a [`Lookahead`] so the first bytes can be
//! classified before any decoder is chosen. Memory stays bounded by the
//! lookahead buffer plus one batch of BGZF blocks, whatever the file size.

use std::io::{self, Read};

pub mod bam;
pub mod compression;
pub mod format;
pub mod handle;
pub mod lookahead;
pub mod sam;
pub mod sink;

pub use bam::{BamReader, BamWriter, Header, Record};
pub use compression::{bgzf_reader, BgzfReader, BgzfWriter, CompressedWriter, DataSource, MMAP_THRESHOLD};
pub use format::{detect, CompressionKind, Encoding, FormatDescriptor, Version};
pub use handle::{AlignmentReader, AlignmentWriter, DEFAULT_COMPRESSION_LEVEL};
pub use lookahead::Lookahead;
pub use sam::{SamReader, SamWriter};
pub use sink::DataSink;

/// Read into `buf` until it is full or the reader is exhausted.
///
/// Returns the number of bytes read; a short count means end of stream.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
