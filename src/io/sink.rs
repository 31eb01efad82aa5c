//! Output destinations for streaming writes
//!
//! `DataSink` is the write counterpart to
//! [`DataSource`](crate::io::compression::DataSource).
//!
//! # Example
//!
//! ```no_run
//! use bamsift::io::DataSink;
//!
//! // Write to a local file
//! let sink = DataSink::from_name("filtered.bam");
//!
//! // Write to stdout
//! let sink = DataSink::from_name("-");
//! ```

use crate::io::format::{CompressionKind, FormatDescriptor};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Output destination for streaming writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSink {
    /// Write to a local file path
    Local(PathBuf),

    /// Write to standard output
    Stdout,
}

impl DataSink {
    /// Create a sink from a file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::Local(path.as_ref().to_path_buf())
    }

    /// Create a sink for standard output
    pub fn stdout() -> Self {
        Self::Stdout
    }

    /// Interpret a command-line name, where `-` means stdout.
    pub fn from_name(name: &str) -> Self {
        if name == "-" {
            Self::Stdout
        } else {
            Self::from_path(name)
        }
    }

    /// Name used in diagnostics.
    pub fn display_name(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Stdout => "-".to_string(),
        }
    }

    /// Output format implied by the file name.
    ///
    /// - `.bam` → BGZF BAM
    /// - `.sam.gz` / `.gz` → BGZF SAM
    /// - anything else, including stdout → SAM
    pub fn default_format(&self) -> FormatDescriptor {
        let name = match self {
            Self::Local(path) => path.to_string_lossy().to_ascii_lowercase(),
            Self::Stdout => return FormatDescriptor::sam(CompressionKind::None),
        };
        if name.ends_with(".bam") {
            FormatDescriptor::bam(CompressionKind::Bgzf)
        } else if name.ends_with(".gz") {
            FormatDescriptor::sam(CompressionKind::Bgzf)
        } else {
            FormatDescriptor::sam(CompressionKind::None)
        }
    }

    /// Create (truncating) the destination.
    pub fn create(&self) -> io::Result<Box<dyn Write + Send>> {
        match self {
            Self::Local(path) => Ok(Box::new(File::create(path)?)),
            Self::Stdout => Ok(Box::new(io::stdout())),
        }
    }
}
