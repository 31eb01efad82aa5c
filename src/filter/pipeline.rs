//! The ordered record filter chain.
//!
//! Checks run in a fixed order and evaluation stops at the first rejection:
//!
//! 1. query length after clipping
//! 2. mapping quality
//! 3. required/excluded flags
//! 4. region overlap (mapped records only)
//! 5. subsampling
//! 6. read-group allow list
//! 7. library
//!
//! Disabled checks are not part of the chain at all. Aux tag stripping is
//! a separate step applied only to accepted records.

use super::read_group::{read_group, resolve_library, ReadGroupSet};
use super::region::RegionFilter;
use super::settings::FilterSettings;
use super::subsample::Subsampler;
use crate::error::Result;
use crate::io::bam::{BamDecodeError, Header, Record};

/// One accept/reject predicate.
pub trait RecordFilter: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Whether `record` passes.
    fn accepts(&self, header: &Header, record: &Record) -> bool;
}

/// Outcome of running the chain on one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every check passed
    Accept,
    /// The named check failed
    Reject(&'static str),
}

impl Verdict {
    /// Whether the record was accepted.
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

struct MinQueryLength(u64);

impl RecordFilter for MinQueryLength {
    fn name(&self) -> &'static str {
        "query length"
    }

    fn accepts(&self, _header: &Header, record: &Record) -> bool {
        record.query_length_after_clipping() >= self.0
    }
}

struct MinMappingQuality(u8);

impl RecordFilter for MinMappingQuality {
    fn name(&self) -> &'static str {
        "mapping quality"
    }

    fn accepts(&self, _header: &Header, record: &Record) -> bool {
        record.mapq.unwrap_or(255) >= self.0
    }
}

struct FlagMask {
    on: u16,
    off: u16,
}

impl RecordFilter for FlagMask {
    fn name(&self) -> &'static str {
        "flags"
    }

    fn accepts(&self, _header: &Header, record: &Record) -> bool {
        record.flags & self.on == self.on && record.flags & self.off == 0
    }
}

struct RegionOverlap(Box<dyn RegionFilter>);

impl RecordFilter for RegionOverlap {
    fn name(&self) -> &'static str {
        "region"
    }

    fn accepts(&self, header: &Header, record: &Record) -> bool {
        let (Some(tid), Some(start), Some(end)) = (record.reference_id, record.position, record.reference_end()) else {
            return false;
        };
        header
            .reference_name(tid)
            .is_some_and(|name| self.0.overlaps(name, start as i64, end))
    }
}

impl RecordFilter for Subsampler {
    fn name(&self) -> &'static str {
        "subsample"
    }

    fn accepts(&self, _header: &Header, record: &Record) -> bool {
        self.keeps(record.name.as_bytes())
    }
}

struct ReadGroupAllow(ReadGroupSet);

impl RecordFilter for ReadGroupAllow {
    fn name(&self) -> &'static str {
        "read group"
    }

    fn accepts(&self, _header: &Header, record: &Record) -> bool {
        read_group(record).is_some_and(|rg| self.0.contains(rg))
    }
}

struct LibraryMatch(String);

impl RecordFilter for LibraryMatch {
    fn name(&self) -> &'static str {
        "library"
    }

    fn accepts(&self, header: &Header, record: &Record) -> bool {
        resolve_library(header, record) == Some(self.0.as_str())
    }
}

/// Ordered filter chain plus the post-accept tag strip.
#[derive(Default)]
pub struct FilterPipeline {
    checks: Vec<Box<dyn RecordFilter>>,
    strip_tags: Vec<[u8; 2]>,
}

impl FilterPipeline {
    /// Pipeline accepting everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the chain from validated settings.
    pub fn from_settings(settings: FilterSettings) -> Result<Self> {
        settings.validate()?;
        let mut pipeline = Self::new();

        if settings.min_query_length > 0 {
            pipeline.push(Box::new(MinQueryLength(settings.min_query_length)));
        }
        if settings.min_mapq > 0 {
            pipeline.push(Box::new(MinMappingQuality(settings.min_mapq)));
        }
        if settings.flag_on != 0 || settings.flag_off != 0 {
            pipeline.push(Box::new(FlagMask {
                on: settings.flag_on,
                off: settings.flag_off,
            }));
        }
        if let Some(region) = settings.region {
            pipeline.push(Box::new(RegionOverlap(region)));
        }
        if let Some(subsample) = settings.subsample {
            if subsample.fraction() > 0.0 {
                pipeline.push(Box::new(subsample));
            }
        }
        if let Some(read_groups) = settings.read_groups {
            pipeline.push(Box::new(ReadGroupAllow(read_groups)));
        }
        if let Some(library) = settings.library {
            pipeline.push(Box::new(LibraryMatch(library)));
        }
        pipeline.strip_tags = settings.strip_tags;

        log::debug!(
            "filter chain: [{}], stripping {} tags",
            pipeline.check_names().join(", "),
            pipeline.strip_tags.len()
        );
        Ok(pipeline)
    }

    /// Append a check to the end of the chain.
    pub fn push(&mut self, check: Box<dyn RecordFilter>) {
        self.checks.push(check);
    }

    /// Set the aux tags removed from accepted records.
    pub fn set_strip_tags(&mut self, tags: Vec<[u8; 2]>) {
        self.strip_tags = tags;
    }

    /// Names of the checks, in evaluation order.
    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Run the chain, stopping at the first failing check.
    pub fn evaluate(&self, header: &Header, record: &Record) -> Verdict {
        for check in &self.checks {
            if !check.accepts(header, record) {
                return Verdict::Reject(check.name());
            }
        }
        Verdict::Accept
    }

    /// Apply the post-accept edits (tag stripping) to an accepted record.
    pub fn finish_accepted(&self, record: &mut Record) -> std::result::Result<(), BamDecodeError> {
        if !self.strip_tags.is_empty() {
            record.tags.remove(&self.strip_tags)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::region::Region;
    use crate::io::bam::{CigarOp, Reference};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn header() -> Header {
        Header::new(
            "@RG\tID:grp1\tLB:lib1\n@RG\tID:grp2\tLB:lib2\n".to_string(),
            vec![
                Reference::new("chr1".to_string(), 1000),
                Reference::new("chr2".to_string(), 2000),
            ],
        )
    }

    fn record(tid: Option<usize>, pos: i32, mapq: u8, flags: u16) -> Record {
        let mut record = Record::new();
        record.name = "read".to_string();
        record.reference_id = tid;
        record.position = tid.map(|_| pos);
        record.mapq = Some(mapq);
        record.flags = flags;
        record.cigar = vec![CigarOp::Match(50)];
        record
    }

    /// Check that counts calls and answers a fixed value.
    struct Counting {
        answer: bool,
        calls: Arc<AtomicUsize>,
    }

    impl RecordFilter for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn accepts(&self, _header: &Header, _record: &Record) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[test]
    fn test_short_circuit_on_first_rejection() {
        let calls: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let answers = [true, false, true, true];
        let mut pipeline = FilterPipeline::new();
        for (answer, calls) in answers.iter().zip(&calls) {
            pipeline.push(Box::new(Counting {
                answer: *answer,
                calls: Arc::clone(calls),
            }));
        }

        let verdict = pipeline.evaluate(&header(), &record(Some(0), 0, 30, 0));
        assert_eq!(verdict, Verdict::Reject("counting"));
        let counts: Vec<usize> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(counts, vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_empty_pipeline_accepts() {
        assert!(FilterPipeline::new().evaluate(&header(), &record(None, 0, 0, 4)).is_accept());
    }

    #[test]
    fn test_mapping_quality() {
        let pipeline = FilterPipeline::from_settings(FilterSettings {
            min_mapq: 10,
            ..Default::default()
        })
        .unwrap();
        let h = header();
        assert!(pipeline.evaluate(&h, &record(Some(0), 0, 30, 0)).is_accept());
        assert_eq!(pipeline.evaluate(&h, &record(Some(1), 0, 5, 0)), Verdict::Reject("mapping quality"));
        assert!(!pipeline.evaluate(&h, &record(None, 0, 0, 4)).is_accept());

        let mut unavailable = record(Some(0), 0, 0, 0);
        unavailable.mapq = None;
        assert!(pipeline.evaluate(&h, &unavailable).is_accept());
    }

    #[test]
    fn test_flags() {
        let pipeline = FilterPipeline::from_settings(FilterSettings {
            flag_on: 0x1,
            flag_off: 0x4 | 0x100,
            ..Default::default()
        })
        .unwrap();
        let h = header();
        assert!(pipeline.evaluate(&h, &record(Some(0), 0, 30, 0x1 | 0x40)).is_accept());
        assert!(!pipeline.evaluate(&h, &record(Some(0), 0, 30, 0x40)).is_accept());
        assert!(!pipeline.evaluate(&h, &record(Some(0), 0, 30, 0x1 | 0x100)).is_accept());
    }

    #[test]
    fn test_query_length_counts_hard_clips() {
        let pipeline = FilterPipeline::from_settings(FilterSettings {
            min_query_length: 60,
            ..Default::default()
        })
        .unwrap();
        let h = header();
        let mut r = record(Some(0), 0, 30, 0);
        assert!(!pipeline.evaluate(&h, &r).is_accept());
        r.cigar.push(CigarOp::HardClip(10));
        assert!(pipeline.evaluate(&h, &r).is_accept());
    }

    #[test]
    fn test_region_requires_mapped_overlap() {
        let pipeline = FilterPipeline::from_settings(FilterSettings {
            region: Some(Box::new("chr1:101-200".parse::<Region>().unwrap())),
            ..Default::default()
        })
        .unwrap();
        let h = header();
        // [60, 110) overlaps [100, 200)
        assert!(pipeline.evaluate(&h, &record(Some(0), 60, 30, 0)).is_accept());
        assert!(!pipeline.evaluate(&h, &record(Some(0), 0, 30, 0)).is_accept());
        assert!(!pipeline.evaluate(&h, &record(Some(1), 150, 30, 0)).is_accept());
        assert!(!pipeline.evaluate(&h, &record(None, 0, 30, 4)).is_accept());
    }

    #[test]
    fn test_read_group_and_library() {
        let h = header();
        let mut r = record(Some(0), 0, 30, 0);
        r.tags.push_sam_field("RG:Z:grp2").unwrap();

        let by_group = FilterPipeline::from_settings(FilterSettings {
            read_groups: Some(ReadGroupSet::single("grp1")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(by_group.evaluate(&h, &r), Verdict::Reject("read group"));
        assert!(!by_group.evaluate(&h, &record(Some(0), 0, 30, 0)).is_accept());

        let by_library = FilterPipeline::from_settings(FilterSettings {
            library: Some("lib2".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert!(by_library.evaluate(&h, &r).is_accept());
    }

    #[test]
    fn test_subsample_independent_of_other_settings() {
        let h = header();
        let names: Vec<String> = (0..200).map(|i| format!("q{}", i)).collect();
        let only = FilterPipeline::from_settings(FilterSettings {
            subsample: Some(Subsampler::new(11, 0.5).unwrap()),
            ..Default::default()
        })
        .unwrap();
        let combined = FilterPipeline::from_settings(FilterSettings {
            subsample: Some(Subsampler::new(11, 0.5).unwrap()),
            min_mapq: 1,
            flag_off: 0x200,
            ..Default::default()
        })
        .unwrap();
        for name in &names {
            let mut r = record(Some(0), 0, 30, 0);
            r.name = name.clone();
            assert_eq!(only.evaluate(&h, &r).is_accept(), combined.evaluate(&h, &r).is_accept());
        }
    }

    #[test]
    fn test_overlapping_flag_masks_reject_everything() {
        let pipeline = FilterPipeline::from_settings(FilterSettings {
            flag_on: 0x4,
            flag_off: 0x4,
            ..Default::default()
        })
        .unwrap();
        let h = header();
        for flags in [0, 0x4, 0x1 | 0x4, 0xffff] {
            assert_eq!(pipeline.evaluate(&h, &record(Some(0), 0, 30, flags)), Verdict::Reject("flags"));
        }
    }

    #[test]
    fn test_check_order() {
        let pipeline = FilterPipeline::from_settings(FilterSettings {
            min_query_length: 1,
            min_mapq: 1,
            flag_on: 1,
            flag_off: 0,
            region: Some(Box::new(Region::new("chr1", 0, 10))),
            subsample: Some(Subsampler::new(0, 0.5).unwrap()),
            read_groups: Some(ReadGroupSet::single("grp1")),
            library: Some("lib1".to_string()),
            strip_tags: vec![*b"XA"],
        })
        .unwrap();
        assert_eq!(
            pipeline.check_names(),
            vec!["query length", "mapping quality", "flags", "region", "subsample", "read group", "library"]
        );
    }

    #[test]
    fn test_strip_tags_on_accepted() {
        let mut pipeline = FilterPipeline::new();
        pipeline.set_strip_tags(vec![*b"XA", *b"NM"]);
        let mut r = record(Some(0), 0, 30, 0);
        for field in ["NM:i:2", "RG:Z:grp1", "XA:Z:alt"] {
            r.tags.push_sam_field(field).unwrap();
        }
        pipeline.finish_accepted(&mut r).unwrap();
        let mut text = String::new();
        r.tags.write_sam(&mut text).unwrap();
        assert_eq!(text, "\tRG:Z:grp1");
    }
}
