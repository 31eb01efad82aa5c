//! Chain ordering, short-circuiting, and close aggregation through the public traits

mod common;

use bamsift::filter::{FilterPipeline, FilterSettings, RecordFilter, Subsampler, Verdict};
use bamsift::io::bam::{Header, Record};
use bamsift::view::{run, RecordSink, RecordSource};
use bamsift::{Error, Result};
use common::{mapped, scenario_records, two_reference_header};
use proptest::prelude::*;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Check that counts its invocations and returns a fixed answer.
struct Counting {
    name: &'static str,
    answer: bool,
    calls: Arc<AtomicUsize>,
}

impl RecordFilter for Counting {
    fn name(&self) -> &'static str {
        self.name
    }

    fn accepts(&self, _header: &Header, _record: &Record) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

#[test]
fn test_failing_check_stops_evaluation() {
    let header = two_reference_header();
    let record = mapped("r", 0, 0, 60);

    for failing in 0..4 {
        let counters: Vec<_> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let mut pipeline = FilterPipeline::new();
        for (k, calls) in counters.iter().enumerate() {
            pipeline.push(Box::new(Counting {
                name: ["a", "b", "c", "d"][k],
                answer: k != failing,
                calls: Arc::clone(calls),
            }));
        }

        assert_eq!(pipeline.evaluate(&header, &record), Verdict::Reject(["a", "b", "c", "d"][failing]));
        for (k, calls) in counters.iter().enumerate() {
            let expected = usize::from(k <= failing);
            assert_eq!(calls.load(Ordering::SeqCst), expected, "check {} with failure at {}", k, failing);
        }
    }
}

#[test]
fn test_configured_chain_order() {
    let pipeline = FilterPipeline::from_settings(FilterSettings {
        min_query_length: 5,
        min_mapq: 1,
        flag_off: 0x4,
        subsample: Some(Subsampler::new(1, 0.5).unwrap()),
        library: Some("lib".to_string()),
        ..Default::default()
    })
    .unwrap();
    let names = pipeline.check_names();
    assert_eq!(names.len(), 5);
    assert_eq!(names[0], "query length");
    assert_eq!(names.last(), Some(&"library"));
}

proptest! {
    #[test]
    fn prop_subsample_ignores_other_settings(name in "[A-Za-z0-9_:]{1,30}", seed in any::<u32>(), frac in 0.01f64..0.99) {
        let sampler = Subsampler::new(seed, frac).unwrap();
        let header = two_reference_header();
        let record = mapped(&name, 0, 10, 60);

        let alone = FilterPipeline::from_settings(FilterSettings {
            subsample: Some(sampler),
            ..Default::default()
        }).unwrap();
        let combined = FilterPipeline::from_settings(FilterSettings {
            min_mapq: 30,
            flag_off: 0x400,
            subsample: Some(sampler),
            ..Default::default()
        }).unwrap();

        let expected = sampler.keeps(name.as_bytes());
        prop_assert_eq!(alone.evaluate(&header, &record).is_accept(), expected);
        prop_assert_eq!(combined.evaluate(&header, &record).is_accept(), expected);
        prop_assert_eq!(sampler.keeps(name.as_bytes()), expected);
    }
}

struct ScriptedSource {
    records: std::vec::IntoIter<Record>,
    close_fails: bool,
    closes: Arc<AtomicUsize>,
}

impl RecordSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn read_header(&mut self) -> Result<Header> {
        Ok(two_reference_header())
    }

    fn read_record(&mut self, _header: &Header, record: &mut Record) -> Result<bool> {
        match self.records.next() {
            Some(next) => {
                *record = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn close(self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err(Error::Close {
                name: "scripted".to_string(),
                source: io::Error::new(io::ErrorKind::Other, "input release failed"),
            });
        }
        Ok(())
    }
}

struct CountingSink {
    close_fails: bool,
    closes: Arc<AtomicUsize>,
}

impl RecordSink for CountingSink {
    fn name(&self) -> &str {
        "counting"
    }

    fn write_header(&mut self, _header: &Header) -> io::Result<()> {
        Ok(())
    }

    fn write_record(&mut self, _header: &Header, _record: &Record) -> io::Result<()> {
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err(Error::Close {
                name: "counting".to_string(),
                source: io::Error::new(io::ErrorKind::Other, "flush failed"),
            });
        }
        Ok(())
    }
}

#[test]
fn test_each_close_attempted_once_and_failure_aggregated() {
    for (input_fails, output_fails) in [(true, false), (false, true)] {
        let input_closes = Arc::new(AtomicUsize::new(0));
        let output_closes = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            records: scenario_records().into_iter(),
            close_fails: input_fails,
            closes: Arc::clone(&input_closes),
        };
        let sink = CountingSink {
            close_fails: output_fails,
            closes: Arc::clone(&output_closes),
        };

        let report = run(source, sink, None::<CountingSink>, &FilterPipeline::new());
        assert_eq!(report.records_read, 3);
        assert_eq!(report.exit_code(), 1);
        assert!(matches!(report.errors[..], [Error::Close { .. }]));
        assert_eq!(input_closes.load(Ordering::SeqCst), 1);
        assert_eq!(output_closes.load(Ordering::SeqCst), 1);
    }
}
