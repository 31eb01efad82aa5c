//! Region filters.
//!
//! Region strings follow the usual samtools form: `chr`, `chr:beg`, or
//! `chr:beg-end`, 1-based and inclusive, with optional thousands
//! separators. They are stored 0-based half-open.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Capability answering whether an interval touches the configured regions.
pub trait RegionFilter: Send + Sync + fmt::Debug {
    /// Whether `[start, end)` on reference `name` overlaps any region.
    fn overlaps(&self, name: &str, start: i64, end: i64) -> bool;
}

/// One reference interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Reference name
    pub name: String,
    /// 0-based inclusive start
    pub start: i64,
    /// 0-based exclusive end
    pub end: i64,
}

impl Region {
    /// Interval `[start, end)` on `name`.
    pub fn new(name: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    fn intersects(&self, start: i64, end: i64) -> bool {
        start < self.end && end > self.start
    }
}

fn parse_coordinate(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|&c| c != ',').collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parse `beg` or `beg-end` (1-based inclusive) into 0-based half-open.
fn parse_range(text: &str) -> Option<(i64, i64)> {
    let (beg, end) = match text.split_once('-') {
        Some((beg, end)) => (parse_coordinate(beg)?, parse_coordinate(end)?),
        None => (parse_coordinate(text)?, i64::MAX),
    };
    (beg >= 1 && end >= beg).then_some((beg - 1, end))
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidRegion("empty region".to_string()));
        }
        // Reference names may themselves contain ':', so only a suffix that
        // parses as a range is taken as one.
        if let Some((name, range)) = s.rsplit_once(':') {
            if let Some((start, end)) = parse_range(range) {
                if name.is_empty() {
                    return Err(Error::InvalidRegion(s.to_string()));
                }
                return Ok(Region::new(name, start, end));
            }
            if range.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                return Err(Error::InvalidRegion(s.to_string()));
            }
        }
        Ok(Region::new(s, 0, i64::MAX))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (0, i64::MAX) => write!(f, "{}", self.name),
            (start, i64::MAX) => write!(f, "{}:{}", self.name, start + 1),
            (start, end) => write!(f, "{}:{}-{}", self.name, start + 1, end),
        }
    }
}

impl RegionFilter for Region {
    fn overlaps(&self, name: &str, start: i64, end: i64) -> bool {
        self.name == name && self.intersects(start, end)
    }
}

/// Several regions, indexed by reference name.
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    by_name: HashMap<String, Vec<Region>>,
}

impl RegionSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every region string.
    pub fn parse<S: AsRef<str>>(regions: &[S]) -> Result<Self> {
        let mut set = Self::new();
        for region in regions {
            set.insert(region.as_ref().parse()?);
        }
        Ok(set)
    }

    /// Add a region.
    pub fn insert(&mut self, region: Region) {
        self.by_name.entry(region.name.clone()).or_default().push(region);
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    /// Whether no regions were added.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl RegionFilter for RegionSet {
    fn overlaps(&self, name: &str, start: i64, end: i64) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|regions| regions.iter().any(|r| r.intersects(start, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!("chr1".parse::<Region>().unwrap(), Region::new("chr1", 0, i64::MAX));
        assert_eq!("chr1:100".parse::<Region>().unwrap(), Region::new("chr1", 99, i64::MAX));
        assert_eq!("chr1:1,000-2,000".parse::<Region>().unwrap(), Region::new("chr1", 999, 2000));
        assert_eq!("chrUn:alt".parse::<Region>().unwrap().name, "chrUn:alt");
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<Region>().is_err());
        assert!("chr1:0-10".parse::<Region>().is_err());
        assert!("chr1:20-10".parse::<Region>().is_err());
        assert!(":5-10".parse::<Region>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["chr1", "chr2:50", "chrX:10-20"] {
            assert_eq!(text.parse::<Region>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let region: Region = "chr1:11-20".parse().unwrap(); // [10, 20)
        assert!(region.overlaps("chr1", 0, 11));
        assert!(!region.overlaps("chr1", 0, 10));
        assert!(region.overlaps("chr1", 19, 30));
        assert!(!region.overlaps("chr1", 20, 30));
        assert!(!region.overlaps("chr2", 10, 20));
    }

    #[test]
    fn test_region_set() {
        let set = RegionSet::parse(&["chr1:1-10", "chr1:100-200", "chr2"]).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.overlaps("chr1", 150, 151));
        assert!(!set.overlaps("chr1", 50, 60));
        assert!(set.overlaps("chr2", 1_000_000, 1_000_001));
        assert!(!set.overlaps("chr3", 0, 1));
    }
}
