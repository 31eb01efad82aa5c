//! Filter configuration.

use super::read_group::ReadGroupSet;
use super::region::RegionFilter;
use super::subsample::Subsampler;
use crate::error::{Error, Result};

/// Filters applied to every record. The default disables all of them.
#[derive(Debug, Default)]
pub struct FilterSettings {
    /// Minimum query length after clipping (CIGAR M/I/S/=/X/H)
    pub min_query_length: u64,
    /// Minimum mapping quality; unavailable (255) counts as 255
    pub min_mapq: u8,
    /// Flag bits that must all be set
    pub flag_on: u16,
    /// Flag bits that must all be clear
    pub flag_off: u16,
    /// Keep only mapped records overlapping these regions
    pub region: Option<Box<dyn RegionFilter>>,
    /// Keep a seeded fraction of read names
    pub subsample: Option<Subsampler>,
    /// Keep only records whose `RG` is listed
    pub read_groups: Option<ReadGroupSet>,
    /// Keep only records whose read group belongs to this library
    pub library: Option<String>,
    /// Aux tags removed from accepted records
    pub strip_tags: Vec<[u8; 2]>,
}

impl FilterSettings {
    /// Check the settings can be honored.
    pub fn validate(&self) -> Result<()> {
        if let Some(subsample) = &self.subsample {
            let fraction = subsample.fraction();
            if !(0.0..1.0).contains(&fraction) {
                return Err(Error::InvalidSettings(format!(
                    "subsample fraction {} outside [0, 1)",
                    fraction
                )));
            }
        }
        if let Some(library) = &self.library {
            if library.is_empty() {
                return Err(Error::InvalidSettings("empty library name".to_string()));
            }
        }
        Ok(())
    }
}

/// Parse a two-character aux tag key.
pub fn parse_tag_key(text: &str) -> Result<[u8; 2]> {
    match text.as_bytes() {
        &[a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphanumeric() => Ok([a, b]),
        _ => Err(Error::InvalidSettings(format!("invalid tag key {:?}", text))),
    }
}
