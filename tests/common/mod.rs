//! Shared fixtures for integration tests

#![allow(dead_code)]

use bamsift::io::bam::{CigarOp, Header, Record, Reference};
use bamsift::io::{AlignmentWriter, FormatDescriptor};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Writer whose bytes stay reachable after the handle is closed.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Two references: chr1 (1000 bp) and chr2 (2000 bp).
pub fn two_reference_header() -> Header {
    Header::new(
        "@HD\tVN:1.6\tSO:unsorted\n@SQ\tSN:chr1\tLN:1000\n@SQ\tSN:chr2\tLN:2000\n".to_string(),
        vec![
            Reference::new("chr1".to_string(), 1000),
            Reference::new("chr2".to_string(), 2000),
        ],
    )
}

pub fn mapped(name: &str, tid: usize, pos: i32, mapq: u8) -> Record {
    let mut record = Record::new();
    record.name = name.to_string();
    record.reference_id = Some(tid);
    record.position = Some(pos);
    record.mapq = Some(mapq);
    record.sequence = b"ACGTACGTAC".to_vec();
    record.quality = vec![30; 10];
    record.cigar = vec![CigarOp::Match(10)];
    record
}

pub fn unmapped(name: &str) -> Record {
    let mut record = Record::new();
    record.name = name.to_string();
    record.mapq = Some(0);
    record.flags = 0x4;
    record.sequence = b"ACGTACGTAC".to_vec();
    record.quality = vec![30; 10];
    record
}

/// Header plus the three records of the mapping-quality scenario.
pub fn scenario_records() -> Vec<Record> {
    vec![mapped("read1", 0, 100, 30), mapped("read2", 1, 200, 5), unmapped("read3")]
}

/// Encode `records` with `format` into memory.
pub fn encode(format: FormatDescriptor, header: &Header, records: &[Record]) -> Vec<u8> {
    let buf = SharedBuf::default();
    let mut writer = AlignmentWriter::from_writer("mem", Box::new(buf.clone()), format).unwrap();
    writer.write_header(header).unwrap();
    for record in records {
        writer.write_record(header, record).unwrap();
    }
    writer.close().unwrap();
    buf.bytes()
}
