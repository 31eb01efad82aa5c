//! Transports and the gzip/BGZF compression layers.
//!
//! - [`DataSource`]: local file (memory-mapped above [`MMAP_THRESHOLD`]) or stdin
//! - [`BgzfReader`]: BGZF decompression in bounded parallel batches
//! - [`CompressedWriter`]: plain, gzip, or parallel BGZF output
//!
//! # BGZF
//!
//! A BGZF stream is a series of gzip members, each carrying a `BC` extra
//! subfield with the member's total size. Members are independent, so a
//! batch of [`PARALLEL_BLOCK_COUNT`] can be (de)compressed concurrently with
//! rayon while memory stays bounded by the batch size.

use crate::io::read_up_to;
use flate2::read::GzDecoder;
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Local files at least this large are memory-mapped (50 MB).
pub const MMAP_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Number of BGZF blocks decompressed or compressed per parallel batch.
///
/// Each block holds at most 64 KB uncompressed, so a batch stays around
/// 1 MB regardless of stream size.
pub const PARALLEL_BLOCK_COUNT: usize = 8;

/// Maximum uncompressed payload written into one BGZF block.
///
/// Below the 64 KB limit so incompressible data still fits after deflate.
pub const BGZF_BLOCK_SIZE: usize = 60 * 1024;

/// The empty block that terminates a well-formed BGZF stream.
pub const BGZF_EOF: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // gzip header with FEXTRA
    6, 0, 66, 67, 2, 0, 27, 0, // XLEN=6, BC subfield, BSIZE=27
    3, 0, // empty deflate block
    0, 0, 0, 0, // CRC32
    0, 0, 0, 0, // ISIZE
];

/// Fixed part of a gzip member header, up to and including XLEN.
const GZIP_FIXED_HEADER: usize = 12;

/// Where input bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Local file path
    Local(PathBuf),
    /// Standard input
    Stdin,
}

impl DataSource {
    /// Create a local file data source
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        DataSource::Local(path.as_ref().to_path_buf())
    }

    /// Interpret a command-line name, where `-` means stdin.
    pub fn from_name(name: &str) -> Self {
        if name == "-" {
            DataSource::Stdin
        } else {
            DataSource::from_path(name)
        }
    }

    /// Name used in diagnostics.
    pub fn display_name(&self) -> String {
        match self {
            DataSource::Local(path) => path.display().to_string(),
            DataSource::Stdin => "-".to_string(),
        }
    }

    /// Open the raw byte transport.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            DataSource::Local(path) => open_local_file(path),
            DataSource::Stdin => Ok(Box::new(io::stdin())),
        }
    }
}

/// Open a local file, memory-mapping it when large.
fn open_local_file(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();

    if file_size >= MMAP_THRESHOLD {
        // SAFETY: the map is read-only; concurrent truncation of the file by
        // another process is outside what this reader can guard against.
        let mmap = unsafe { Mmap::map(&file)? };
        log::debug!("memory-mapped {} ({} bytes)", path.display(), file_size);
        Ok(Box::new(io::Cursor::new(mmap)))
    } else {
        Ok(Box::new(file))
    }
}

fn truncated_block(offset: u64, expected: usize, actual: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!(
            "BGZF block at offset {} truncated: expected {} bytes, got {}",
            offset, expected, actual
        ),
    )
}

fn invalid_block(offset: u64, message: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("invalid BGZF block at offset {}: {}", offset, message),
    )
}

/// Find the `BC` subfield in a gzip extra field and return BSIZE.
fn find_bsize(extra: &[u8]) -> Option<u16> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        if extra[pos] == b'B' && extra[pos + 1] == b'C' && slen == 2 && pos + 6 <= extra.len() {
            return Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]));
        }
        pos += 4 + slen;
    }
    None
}

/// One complete compressed BGZF block.
#[derive(Debug, Clone)]
struct BgzfBlock {
    data: Vec<u8>,
    /// Stream offset of the block, for diagnostics
    offset: u64,
}

impl BgzfBlock {
    fn is_eof_marker(&self) -> bool {
        self.data == BGZF_EOF
    }
}

/// Decompress a single BGZF block, verifying CRC32 and ISIZE.
fn decompress_block(block: &BgzfBlock) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(&block.data[..]);
    let mut decompressed = Vec::with_capacity(BGZF_BLOCK_SIZE);
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| invalid_block(block.offset, &e.to_string()))?;
    Ok(decompressed)
}

/// BGZF reader decompressing [`PARALLEL_BLOCK_COUNT`] blocks at a time.
///
/// A stream that ends inside a block yields the data of every complete block
/// before it, then an `UnexpectedEof` error. A stream that ends cleanly
/// without the empty EOF block logs a warning.
pub struct BgzfReader<R: Read> {
    inner: R,
    /// Decompressed data ready to read
    output_buffer: Vec<u8>,
    output_pos: usize,
    /// Stream offset of the next block
    offset: u64,
    eof: bool,
    /// Error hit while filling the current batch, surfaced once the
    /// data decoded before it has been consumed
    pending_error: Option<io::Error>,
    saw_eof_marker: bool,
}

impl<R: Read> BgzfReader<R> {
    /// Wrap a stream positioned at the first BGZF block.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            output_buffer: Vec::new(),
            output_pos: 0,
            offset: 0,
            eof: false,
            pending_error: None,
            saw_eof_marker: false,
        }
    }

    /// Read one block; `None` at a clean end of stream.
    fn read_one_block(&mut self) -> io::Result<Option<BgzfBlock>> {
        let offset = self.offset;
        let mut header = [0u8; GZIP_FIXED_HEADER];
        match read_up_to(&mut self.inner, &mut header)? {
            0 => return Ok(None),
            GZIP_FIXED_HEADER => {}
            n => return Err(truncated_block(offset, GZIP_FIXED_HEADER, n)),
        }

        if header[0] != 0x1f || header[1] != 0x8b {
            return Err(invalid_block(offset, "bad gzip magic"));
        }
        if header[3] & 0x04 == 0 {
            return Err(invalid_block(offset, "FEXTRA flag not set"));
        }

        let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
        let mut extra = vec![0u8; xlen];
        let n = read_up_to(&mut self.inner, &mut extra)?;
        if n < xlen {
            return Err(truncated_block(offset, GZIP_FIXED_HEADER + xlen, GZIP_FIXED_HEADER + n));
        }

        let bsize = find_bsize(&extra).ok_or_else(|| invalid_block(offset, "missing BC subfield"))?;
        let block_size = bsize as usize + 1;
        let already_read = GZIP_FIXED_HEADER + xlen;
        // Header plus 8-byte CRC32/ISIZE trailer at minimum.
        if block_size < already_read + 8 {
            return Err(invalid_block(offset, &format!("block size {} too small", block_size)));
        }

        let mut data = Vec::with_capacity(block_size);
        data.extend_from_slice(&header);
        data.extend_from_slice(&extra);
        data.resize(block_size, 0);
        let n = read_up_to(&mut self.inner, &mut data[already_read..])?;
        if n < block_size - already_read {
            return Err(truncated_block(offset, block_size, already_read + n));
        }

        self.offset += block_size as u64;
        Ok(Some(BgzfBlock { data, offset }))
    }

    /// Read and decompress the next batch of blocks in parallel.
    fn read_next_chunk(&mut self) {
        let mut blocks = Vec::with_capacity(PARALLEL_BLOCK_COUNT);
        while blocks.len() < PARALLEL_BLOCK_COUNT {
            match self.read_one_block() {
                Ok(Some(block)) => blocks.push(block),
                Ok(None) => {
                    self.eof = true;
                    break;
                }
                Err(e) => {
                    self.eof = true;
                    self.pending_error = Some(e);
                    break;
                }
            }
        }

        if let Some(last) = blocks.last() {
            self.saw_eof_marker = last.is_eof_marker();
        }
        if self.eof && self.pending_error.is_none() && !self.saw_eof_marker {
            log::warn!("BGZF stream ended without an EOF marker block; data may be truncated");
        }

        let decompressed: Vec<io::Result<Vec<u8>>> = blocks.par_iter().map(decompress_block).collect();

        self.output_buffer.clear();
        self.output_pos = 0;
        for result in decompressed {
            match result {
                Ok(data) => self.output_buffer.extend_from_slice(&data),
                Err(e) => {
                    // Later blocks are dropped along with the damaged one.
                    self.eof = true;
                    self.pending_error = Some(e);
                    break;
                }
            }
        }
    }
}

impl<R: Read> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.output_pos >= self.output_buffer.len() {
            if let Some(e) = self.pending_error.take() {
                return Err(e);
            }
            if self.eof {
                return Ok(0);
            }
            // Empty blocks (including the EOF marker) decompress to nothing.
            self.read_next_chunk();
        }

        let available = &self.output_buffer[self.output_pos..];
        let to_copy = available.len().min(buf.len());
        buf[..to_copy].copy_from_slice(&available[..to_copy]);
        self.output_pos += to_copy;
        Ok(to_copy)
    }
}

/// Wrap `inner` as a buffered BGZF decompressor.
pub fn bgzf_reader<R: Read>(inner: R) -> BufReader<BgzfReader<R>> {
    BufReader::with_capacity(BGZF_BLOCK_SIZE, BgzfReader::new(inner))
}

/// Parallel BGZF writer.
///
/// Input is cut into [`BGZF_BLOCK_SIZE`] blocks; every
/// [`PARALLEL_BLOCK_COUNT`] blocks are compressed together with rayon and
/// written in order.
pub struct BgzfWriter<W: Write> {
    writer: W,
    level: Compression,
    /// Full blocks waiting to be compressed
    uncompressed_blocks: Vec<Vec<u8>>,
    current_block: Vec<u8>,
    finished: bool,
}

impl<W: Write> BgzfWriter<W> {
    /// Create a writer compressing at `level`.
    pub fn new(writer: W, level: Compression) -> Self {
        Self {
            writer,
            level,
            uncompressed_blocks: Vec::with_capacity(PARALLEL_BLOCK_COUNT),
            current_block: Vec::with_capacity(BGZF_BLOCK_SIZE),
            finished: false,
        }
    }

    /// Compress one payload into a complete BGZF block.
    fn compress_block(data: &[u8], level: Compression) -> io::Result<Vec<u8>> {
        let mut deflate = DeflateEncoder::new(Vec::with_capacity(data.len() / 2 + 64), level);
        deflate.write_all(data)?;
        let deflated = deflate.finish()?;

        let total_size = GZIP_FIXED_HEADER + 6 + deflated.len() + 8;
        let bsize = u16::try_from(total_size - 1).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "compressed BGZF block exceeds 64 KB")
        })?;

        let mut block = Vec::with_capacity(total_size);
        block.extend_from_slice(&[31, 139, 8, 4, 0, 0, 0, 0, 0, 255]);
        block.extend_from_slice(&6u16.to_le_bytes());
        block.extend_from_slice(&[b'B', b'C']);
        block.extend_from_slice(&2u16.to_le_bytes());
        block.extend_from_slice(&bsize.to_le_bytes());
        block.extend_from_slice(&deflated);
        block.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        block.extend_from_slice(&(data.len() as u32).to_le_bytes());
        Ok(block)
    }

    /// Compress and write all pending full blocks.
    fn flush_blocks(&mut self) -> io::Result<()> {
        if self.uncompressed_blocks.is_empty() {
            return Ok(());
        }

        let level = self.level;
        let compressed_blocks = self
            .uncompressed_blocks
            .par_iter()
            .map(|block| Self::compress_block(block, level))
            .collect::<io::Result<Vec<_>>>()?;

        for block in compressed_blocks {
            self.writer.write_all(&block)?;
        }
        self.uncompressed_blocks.clear();
        Ok(())
    }

    /// Write remaining data and the EOF marker. Idempotent.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        if !self.current_block.is_empty() {
            let block = std::mem::take(&mut self.current_block);
            self.uncompressed_blocks.push(block);
        }
        self.flush_blocks()?;
        self.writer.write_all(&BGZF_EOF)?;
        self.finished = true;
        Ok(())
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Get a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(io::ErrorKind::Other, "write after BGZF stream finished"));
        }
        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = BGZF_BLOCK_SIZE - self.current_block.len();
            let to_copy = remaining.len().min(space);
            self.current_block.extend_from_slice(&remaining[..to_copy]);
            remaining = &remaining[to_copy..];

            if self.current_block.len() >= BGZF_BLOCK_SIZE {
                let block = std::mem::replace(&mut self.current_block, Vec::with_capacity(BGZF_BLOCK_SIZE));
                self.uncompressed_blocks.push(block);
                if self.uncompressed_blocks.len() >= PARALLEL_BLOCK_COUNT {
                    self.flush_blocks()?;
                }
            }
        }
        Ok(buf.len())
    }

    /// Flushes the underlying writer; partial blocks stay buffered so block
    /// boundaries are not dictated by flush calls.
    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Output compression layer over a buffered transport.
pub enum CompressedWriter<W: Write> {
    /// Uncompressed
    Plain(BufWriter<W>),
    /// Single gzip member
    Gzip(GzEncoder<BufWriter<W>>),
    /// BGZF blocks compressed in parallel
    Bgzf(BgzfWriter<BufWriter<W>>),
}

impl<W: Write> CompressedWriter<W> {
    /// Uncompressed writer.
    pub fn new_plain(writer: W) -> Self {
        Self::Plain(BufWriter::new(writer))
    }

    /// Gzip writer at `level` (0-9).
    pub fn new_gzip(writer: W, level: u32) -> Self {
        Self::Gzip(GzEncoder::new(BufWriter::new(writer), Compression::new(level)))
    }

    /// BGZF writer at `level` (0-9).
    pub fn new_bgzf(writer: W, level: u32) -> Self {
        Self::Bgzf(BgzfWriter::new(BufWriter::new(writer), Compression::new(level)))
    }

    fn transport_mut(&mut self) -> &mut BufWriter<W> {
        match self {
            Self::Plain(w) => w,
            Self::Gzip(w) => w.get_mut(),
            Self::Bgzf(w) => w.get_mut(),
        }
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &W {
        match self {
            Self::Plain(w) => w.get_ref(),
            Self::Gzip(w) => w.get_ref().get_ref(),
            Self::Bgzf(w) => w.get_ref().get_ref(),
        }
    }

    /// Finalize the compressed stream and flush the transport.
    ///
    /// Both steps are always attempted. If both fail, the transport error
    /// is returned.
    pub fn finish(&mut self) -> io::Result<()> {
        let finalized = match self {
            Self::Plain(_) => Ok(()),
            Self::Gzip(w) => w.try_finish(),
            Self::Bgzf(w) => w.finish(),
        };
        let released = self.transport_mut().flush();
        released.and(finalized)
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
            Self::Bgzf(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
            Self::Bgzf(w) => w.flush(),
        }
    }
}
