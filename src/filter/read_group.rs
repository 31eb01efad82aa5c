//! Read-group allow lists and library lookup.

use crate::error::{Error, Result};
use crate::io::bam::{Header, Record};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

const READ_GROUP_TAG: [u8; 2] = *b"RG";

/// Read group of `record`, from its `RG:Z` tag.
pub fn read_group(record: &Record) -> Option<&str> {
    record.tags.get_str(&READ_GROUP_TAG)
}

/// Library of `record`, resolved through its read group's `@RG LB`.
pub fn resolve_library<'h>(header: &'h Header, record: &Record) -> Option<&'h str> {
    header.library(read_group(record)?)
}

/// Set of accepted read-group ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadGroupSet {
    ids: HashSet<String>,
}

impl ReadGroupSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set holding one id.
    pub fn single(id: impl Into<String>) -> Self {
        let mut set = Self::new();
        set.insert(id);
        set
    }

    /// Parse a list: the first whitespace-delimited token of each line is
    /// an id; blank lines are ignored.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut set = Self::new();
        for line in reader.lines() {
            if let Some(id) = line?.split_whitespace().next() {
                set.insert(id);
            }
        }
        Ok(set)
    }

    /// Load a list file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let open_error = |source| Error::Open {
            name: path.display().to_string(),
            source,
        };
        let file = File::open(path).map_err(open_error)?;
        let set = Self::from_reader(BufReader::new(file)).map_err(open_error)?;
        log::debug!("{}: {} read groups", path.display(), set.len());
        Ok(set)
    }

    /// Add an id.
    pub fn insert(&mut self, id: impl Into<String>) {
        self.ids.insert(id.into());
    }

    /// Whether `id` is accepted.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
