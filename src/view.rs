//! The filtered copy loop.
//!
//! ```text
//! open input ─▶ read header ─▶ write header(s)
//!   loop: read record ─▶ filter ─▶ primary | unmatched
//! close every handle ─▶ RunReport
//! ```
//!
//! The loop stops at the first fatal error (open, truncation, malformed
//! record, write). Every handle that was opened is closed exactly once on
//! every path, and every error, including close errors, ends up in the
//! [`RunReport`].

use crate::error::{Error, Result, SinkRole};
use crate::filter::{FilterPipeline, FilterSettings, Verdict};
use crate::io::bam::{Header, Record};
use crate::io::compression::DataSource;
use crate::io::format::FormatDescriptor;
use crate::io::handle::{AlignmentReader, AlignmentWriter};
use crate::io::sink::DataSink;
use std::io;

/// Record input driven by [`run`].
pub trait RecordSource {
    /// Display name for diagnostics.
    fn name(&self) -> &str;

    /// Read the header.
    fn read_header(&mut self) -> Result<Header>;

    /// Read the next record; `Ok(false)` at a clean end of stream.
    fn read_record(&mut self, header: &Header, record: &mut Record) -> Result<bool>;

    /// Release the input.
    fn close(self) -> Result<()>;
}

/// Record output driven by [`run`].
pub trait RecordSink {
    /// Display name for diagnostics.
    fn name(&self) -> &str;

    /// Write the header.
    fn write_header(&mut self, header: &Header) -> io::Result<()>;

    /// Write one record.
    fn write_record(&mut self, header: &Header, record: &Record) -> io::Result<()>;

    /// Flush and release the output.
    fn close(self) -> Result<()>;
}

impl RecordSource for AlignmentReader {
    fn name(&self) -> &str {
        AlignmentReader::name(self)
    }

    fn read_header(&mut self) -> Result<Header> {
        AlignmentReader::read_header(self)
    }

    fn read_record(&mut self, header: &Header, record: &mut Record) -> Result<bool> {
        AlignmentReader::read_record(self, header, record)
    }

    fn close(self) -> Result<()> {
        AlignmentReader::close(self)
    }
}

impl RecordSink for AlignmentWriter {
    fn name(&self) -> &str {
        AlignmentWriter::name(self)
    }

    fn write_header(&mut self, header: &Header) -> io::Result<()> {
        AlignmentWriter::write_header(self, header)
    }

    fn write_record(&mut self, header: &Header, record: &Record) -> io::Result<()> {
        AlignmentWriter::write_record(self, header, record)
    }

    fn close(self) -> Result<()> {
        AlignmentWriter::close(self)
    }
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Records read from the input
    pub records_read: u64,
    /// Records written to the primary output
    pub accepted: u64,
    /// Records rejected by the filters
    pub rejected: u64,
    /// Every error, in the order encountered
    pub errors: Vec<Error>,
}

impl RunReport {
    /// Whether the run finished without any error.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Process exit status: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }
}

fn write_error(role: SinkRole, name: &str, source: io::Error) -> Error {
    Error::Write {
        role,
        name: name.to_string(),
        source,
    }
}

fn copy_records<S, P, U>(
    source: &mut S,
    primary: &mut P,
    mut unmatched: Option<&mut U>,
    pipeline: &FilterPipeline,
    report: &mut RunReport,
) -> Result<()>
where
    S: RecordSource,
    P: RecordSink,
    U: RecordSink,
{
    let header = source.read_header()?;
    primary
        .write_header(&header)
        .map_err(|e| write_error(SinkRole::Primary, primary.name(), e))?;
    if let Some(sink) = unmatched.as_deref_mut() {
        sink.write_header(&header)
            .map_err(|e| write_error(SinkRole::Unmatched, sink.name(), e))?;
    }

    let mut record = Record::new();
    while source.read_record(&header, &mut record)? {
        let index = report.records_read;
        report.records_read += 1;

        match pipeline.evaluate(&header, &record) {
            Verdict::Accept => {
                pipeline
                    .finish_accepted(&mut record)
                    .map_err(|e| Error::MalformedRecord {
                        name: source.name().to_string(),
                        index,
                        source: e,
                    })?;
                primary
                    .write_record(&header, &record)
                    .map_err(|e| write_error(SinkRole::Primary, primary.name(), e))?;
                report.accepted += 1;
            }
            Verdict::Reject(check) => {
                report.rejected += 1;
                log::trace!("{}: rejected by {} filter", record.name, check);
                if let Some(sink) = unmatched.as_deref_mut() {
                    sink.write_record(&header, &record)
                        .map_err(|e| write_error(SinkRole::Unmatched, sink.name(), e))?;
                }
            }
        }
    }
    Ok(())
}

/// Copy `source` to `primary`, routing rejected records to `unmatched`.
///
/// All handles are closed before returning, whatever happened during the
/// copy; errors from the copy and from every close are collected.
pub fn run<S, P, U>(mut source: S, mut primary: P, mut unmatched: Option<U>, pipeline: &FilterPipeline) -> RunReport
where
    S: RecordSource,
    P: RecordSink,
    U: RecordSink,
{
    let mut report = RunReport::default();

    let copied = copy_records(&mut source, &mut primary, unmatched.as_mut(), pipeline, &mut report);
    report.record(copied);

    report.record(source.close());
    report.record(primary.close());
    if let Some(sink) = unmatched {
        report.record(sink.close());
    }

    log::info!(
        "{} records read, {} accepted, {} rejected",
        report.records_read,
        report.accepted,
        report.rejected
    );
    report
}

/// Where and how to write one output.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Destination
    pub sink: DataSink,
    /// Encoding and compression
    pub format: FormatDescriptor,
}

impl OutputConfig {
    /// Output to `sink` in the format its name implies.
    pub fn new(sink: DataSink) -> Self {
        let format = sink.default_format();
        Self { sink, format }
    }
}

/// Everything a [`view`] run needs.
#[derive(Debug)]
pub struct ViewConfig {
    /// Alignment input
    pub input: DataSource,
    /// Accepted records
    pub output: OutputConfig,
    /// Rejected records, if kept
    pub unmatched: Option<OutputConfig>,
    /// Filters
    pub filters: FilterSettings,
}

/// Open the configured handles and [`run`] them.
///
/// If opening one handle fails, the ones already open are closed and the
/// run stops before any record is read.
pub fn view(config: ViewConfig) -> RunReport {
    let mut report = RunReport::default();

    let Some(pipeline) = report.record(FilterPipeline::from_settings(config.filters)) else {
        return report;
    };
    let Some(source) = report.record(AlignmentReader::open(&config.input)) else {
        return report;
    };
    log::info!("{}: {}", source.name(), source.format());

    let Some(primary) = report.record(AlignmentWriter::create(&config.output.sink, config.output.format)) else {
        report.record(source.close());
        return report;
    };

    let unmatched = match config.unmatched {
        None => None,
        Some(output) => match AlignmentWriter::create(&output.sink, output.format) {
            Ok(writer) => Some(writer),
            Err(e) => {
                report.errors.push(e);
                report.record(source.close());
                report.record(primary.close());
                return report;
            }
        },
    };

    run(source, primary, unmatched, &pipeline)
}
