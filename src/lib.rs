//! bamsift: streaming BAM/SAM detection, filtering and re-encoding
//!
//! # Overview
//!
//! bamsift reads an alignment stream in any of the supported encodings
//! (BAM or SAM, each plain, gzip, or BGZF compressed), works out which one
//! it is from the leading bytes, and copies the records that pass a set of
//! filters to an output in a chosen format. Rejected records can be kept in
//! a second output.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bamsift::filter::FilterSettings;
//! use bamsift::io::{DataSink, DataSource};
//! use bamsift::view::{view, OutputConfig, ViewConfig};
//!
//! let report = view(ViewConfig {
//!     input: DataSource::from_path("in.bam"),
//!     output: OutputConfig::new(DataSink::from_path("out.sam")),
//!     unmatched: None,
//!     filters: FilterSettings {
//!         min_mapq: 10,
//!         ..Default::default()
//!     },
//! });
//! for error in &report.errors {
//!     eprintln!("{}", error);
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`io`]: transports, format detection, BAM/SAM codecs, read/write handles
//! - [`filter`]: record filter checks and the pipeline that chains them
//! - [`view`]: the copy loop that ties inputs, filters and outputs together
//! - [`error`]: the crate error type

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod filter;
pub mod io;
pub mod view;

pub use error::{Error, Result, SinkRole};
pub use filter::{FilterPipeline, FilterSettings};
pub use io::{AlignmentReader, AlignmentWriter, FormatDescriptor};
pub use view::{run, view, RunReport, ViewConfig};
