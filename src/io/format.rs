//! Format detection from the first bytes of a stream.
//!
//! Detection runs in two steps over a few hundred bytes of lookahead:
//!
//! 1. [`detect_compression`] looks at the raw bytes: gzip magic `1F 8B`,
//!    and for gzip whether the first member carries the BGZF `BC` subfield.
//! 2. For compressed input, [`decode_window`] inflates a copy of the
//!    peeked bytes just far enough to see the inner magic, and
//!    [`classify`] maps the inner bytes to a [`FormatDescriptor`].
//!
//! Nothing here touches the stream itself; callers pass in peeked bytes.

use crate::io::bam::header::BAM_MAGIC;
use flate2::read::GzDecoder;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Raw bytes to peek before classifying.
pub const PEEK_LEN: usize = 512;

/// Raw bytes needed to recognize a BGZF block header.
pub const BGZF_HEADER_LEN: usize = 18;

/// Decompressed bytes examined when classifying compressed input.
pub const INNER_WINDOW: usize = 21;

/// Highest binary container version byte accepted.
pub const MAX_BAM_VERSION: u8 = 1;

/// SAM header record types that can open a text stream.
const SAM_HEADER_TAGS: [&[u8; 3]; 5] = [b"@HD", b"@SQ", b"@RG", b"@PG", b"@CO"];

/// Record encoding inside the compression layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Binary alignment container (BAM)
    Bam,
    /// Tab-delimited text (SAM)
    Sam,
}

/// Outer compression layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionKind {
    /// Uncompressed
    None,
    /// Plain gzip
    Gzip,
    /// Block gzip (BGZF)
    Bgzf,
}

/// Format version; `minor` is `None` when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major version
    pub major: u32,
    /// Minor version, if known
    pub minor: Option<u32>,
}

/// Classified format of an alignment stream.
///
/// Only sequence-alignment data is representable; input that is not
/// recognized produces no descriptor at all, so a stream handle can never be
/// built around an unrecognized format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatDescriptor {
    /// Record encoding
    pub encoding: Encoding,
    /// Compression layer
    pub compression: CompressionKind,
    /// Compression level for output; `None` means the codec default
    pub compression_level: Option<u32>,
    /// Format version
    pub version: Version,
}

impl FormatDescriptor {
    /// BAM with the given compression, version 1.
    pub fn bam(compression: CompressionKind) -> Self {
        Self {
            encoding: Encoding::Bam,
            compression,
            compression_level: None,
            version: Version { major: 1, minor: None },
        }
    }

    /// SAM with the given compression, version 1.
    pub fn sam(compression: CompressionKind) -> Self {
        Self {
            encoding: Encoding::Sam,
            compression,
            compression_level: None,
            version: Version { major: 1, minor: None },
        }
    }

    /// Set the output compression level.
    pub fn with_level(mut self, level: Option<u32>) -> Self {
        self.compression_level = level;
        self
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.encoding {
            Encoding::Bam => "BAM",
            Encoding::Sam => "SAM",
        };
        write!(f, "{} version {}", name, self.version.major)?;
        if let Some(minor) = self.version.minor {
            write!(f, ".{}", minor)?;
        }
        match self.compression {
            CompressionKind::None => Ok(()),
            CompressionKind::Gzip => f.write_str(" compressed with gzip"),
            CompressionKind::Bgzf => f.write_str(" compressed with BGZF"),
        }
    }
}

impl FromStr for FormatDescriptor {
    type Err = String;

    /// Output format names: `sam`, `bam`, `ubam` (BGZF level 0), `sam.gz` (BGZF).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sam" => Ok(Self::sam(CompressionKind::None)),
            "bam" => Ok(Self::bam(CompressionKind::Bgzf)),
            "ubam" => Ok(Self::bam(CompressionKind::Bgzf).with_level(Some(0))),
            "sam.gz" => Ok(Self::sam(CompressionKind::Bgzf)),
            other => Err(format!(
                "unknown output format {:?} (expected sam, bam, ubam, or sam.gz)",
                other
            )),
        }
    }
}

/// Classify the outer compression layer from raw leading bytes.
pub fn detect_compression(raw: &[u8]) -> CompressionKind {
    if raw.len() < 2 || raw[0] != 0x1f || raw[1] != 0x8b {
        return CompressionKind::None;
    }
    let is_bgzf = raw.len() >= BGZF_HEADER_LEN && raw[3] & 0x04 != 0 && &raw[12..16] == b"BC\x02\x00";
    if is_bgzf {
        CompressionKind::Bgzf
    } else {
        CompressionKind::Gzip
    }
}

/// Inflate a copy of peeked gzip bytes into `out`; returns bytes produced.
///
/// The peeked bytes usually end mid-stream, so a decoder error after some
/// output is expected and simply ends the window.
pub fn decode_window(raw: &[u8], out: &mut [u8]) -> usize {
    let mut decoder = GzDecoder::new(raw);
    let mut filled = 0;
    while filled < out.len() {
        match decoder.read(&mut out[filled..]) {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    filled
}

fn is_sam_header(inner: &[u8]) -> bool {
    inner.len() >= 4 && inner[3] == b'\t' && SAM_HEADER_TAGS.iter().any(|tag| &inner[..3] == *tag)
}

/// `VN:` of a leading `@HD` line, if it is visible in `inner`.
fn sam_version(inner: &[u8]) -> Version {
    let parsed = inner
        .starts_with(b"@HD\t")
        .then(|| {
            let line = inner.split(|&b| b == b'\n').next()?;
            let line = std::str::from_utf8(line).ok()?;
            let vn = line.split('\t').find_map(|field| field.strip_prefix("VN:"))?;
            let (major, minor) = vn.split_once('.')?;
            Some(Version {
                major: major.parse().ok()?,
                minor: Some(minor.parse().ok()?),
            })
        })
        .flatten();
    parsed.unwrap_or(Version { major: 1, minor: None })
}

/// Classify a stream from its raw leading bytes and the bytes they decode to.
///
/// For uncompressed input `inner` is the raw bytes themselves. Returns `None`
/// for anything unrecognized, including a binary container whose version
/// byte is outside `1..=MAX_BAM_VERSION`.
pub fn classify(raw: &[u8], inner: &[u8]) -> Option<FormatDescriptor> {
    let compression = detect_compression(raw);

    if inner.len() >= 4 && inner[..3] == BAM_MAGIC[..3] {
        let version = inner[3];
        if !(1..=MAX_BAM_VERSION).contains(&version) {
            return None;
        }
        let mut descriptor = FormatDescriptor::bam(compression);
        descriptor.version.major = u32::from(version);
        return Some(descriptor);
    }

    if is_sam_header(inner) {
        let mut descriptor = FormatDescriptor::sam(compression);
        descriptor.version = sam_version(inner);
        return Some(descriptor);
    }

    None
}

/// Detect the format of a stream from its peeked leading bytes.
pub fn detect(raw: &[u8]) -> Option<FormatDescriptor> {
    match detect_compression(raw) {
        CompressionKind::None => classify(raw, raw),
        CompressionKind::Gzip | CompressionKind::Bgzf => {
            let mut window = [0u8; INNER_WINDOW];
            let n = decode_window(raw, &mut window);
            classify(raw, &window[..n])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::compression::CompressedWriter;
    use proptest::prelude::*;
    use std::io::Write;

    fn bgzf(data: &[u8]) -> Vec<u8> {
        let mut w = CompressedWriter::new_bgzf(Vec::new(), 6);
        w.write_all(data).unwrap();
        w.finish().unwrap();
        w.get_ref().clone()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut w = CompressedWriter::new_gzip(Vec::new(), 6);
        w.write_all(data).unwrap();
        w.finish().unwrap();
        w.get_ref().clone()
    }

    #[test]
    fn test_bgzf_bam() {
        let raw = bgzf(b"BAM\x01\x00\x00\x00\x00\x00\x00\x00\x00");
        let format = detect(&raw).unwrap();
        assert_eq!(format, FormatDescriptor::bam(CompressionKind::Bgzf));
        assert_eq!(format.to_string(), "BAM version 1 compressed with BGZF");
    }

    #[test]
    fn test_gzip_bam() {
        let format = detect(&gzip(b"BAM\x01rest")).unwrap();
        assert_eq!(format.compression, CompressionKind::Gzip);
        assert_eq!(format.encoding, Encoding::Bam);
    }

    #[test]
    fn test_uncompressed_bam() {
        let format = detect(b"BAM\x01\x00\x00\x00\x00").unwrap();
        assert_eq!(format, FormatDescriptor::bam(CompressionKind::None));
    }

    #[test]
    fn test_unsupported_version() {
        assert_eq!(detect(&bgzf(b"BAM\x02rest")), None);
        assert_eq!(detect(&bgzf(b"BAM\x00rest")), None);
    }

    #[test]
    fn test_sam_text_with_version() {
        let format = detect(b"@HD\tVN:1.6\tSO:coordinate\n@SQ\tSN:chr1\tLN:10\n").unwrap();
        assert_eq!(format.encoding, Encoding::Sam);
        assert_eq!(format.compression, CompressionKind::None);
        assert_eq!(format.version, Version { major: 1, minor: Some(6) });
        assert_eq!(format.to_string(), "SAM version 1.6");
    }

    #[test]
    fn test_compressed_sam() {
        let format = detect(&bgzf(b"@SQ\tSN:chr1\tLN:1000\n")).unwrap();
        assert_eq!(format, FormatDescriptor::sam(CompressionKind::Bgzf));
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(detect(b""), None);
        assert_eq!(detect(b"\x1f"), None);
        assert_eq!(detect(b">chr1\nACGT\n"), None);
        assert_eq!(detect(&gzip(b"not an alignment")), None);
        // Gzip magic followed by garbage that will not inflate.
        assert_eq!(detect(&[0x1f, 0x8b, 8, 0, 0xff, 0xff, 0xff, 0xff]), None);
    }

    #[test]
    fn test_short_bgzf_prefix_is_plain_gzip() {
        let raw = bgzf(b"BAM\x01");
        assert_eq!(detect_compression(&raw[..17]), CompressionKind::Gzip);
        assert_eq!(detect_compression(&raw[..18]), CompressionKind::Bgzf);
    }

    #[test]
    fn test_output_format_names() {
        assert_eq!("bam".parse::<FormatDescriptor>().unwrap().compression, CompressionKind::Bgzf);
        assert_eq!("ubam".parse::<FormatDescriptor>().unwrap().compression_level, Some(0));
        assert_eq!("SAM".parse::<FormatDescriptor>().unwrap().encoding, Encoding::Sam);
        assert!("cram".parse::<FormatDescriptor>().is_err());
    }

    proptest! {
        #[test]
        fn prop_detection_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..600)) {
            prop_assert_eq!(detect(&data), detect(&data));
        }

        #[test]
        fn prop_recognized_bam_decodes_to_magic(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut data = b"BAM\x01".to_vec();
            data.extend_from_slice(&payload);
            let raw = bgzf(&data);
            let mut window = [0u8; INNER_WINDOW];
            let n = decode_window(&raw, &mut window);
            prop_assert!(n >= 4);
            prop_assert_eq!(&window[..4], b"BAM\x01");
            prop_assert_eq!(detect(&raw), Some(FormatDescriptor::bam(CompressionKind::Bgzf)));
        }
    }
}
