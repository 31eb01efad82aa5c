//! Deterministic subsampling by read name.
//!
//! A record is kept when a hash of its name, mixed with a seed, falls below
//! the configured fraction. The hash depends only on the name and seed, so
//! both mates of a pair share a decision and reruns select the same reads.

use crate::error::{Error, Result};
use std::str::FromStr;

/// X31 string hash.
fn x31_hash(s: &[u8]) -> u32 {
    let mut iter = s.iter();
    let Some(&first) = iter.next() else {
        return 0;
    };
    iter.fold(first as u32, |h, &b| (h << 5).wrapping_sub(h).wrapping_add(b as u32))
}

/// Thomas Wang's 32-bit integer mix.
fn wang_hash(mut key: u32) -> u32 {
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

/// Seeded fraction of reads to keep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subsampler {
    seed: u32,
    fraction: f64,
}

impl Subsampler {
    /// Keep `fraction` (in `[0, 1)`) of reads under `seed`.
    pub fn new(seed: u32, fraction: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(Error::InvalidSettings(format!(
                "subsample fraction {} outside [0, 1)",
                fraction
            )));
        }
        Ok(Self { seed, fraction })
    }

    /// Seed mixed into the hash.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Fraction of reads kept.
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Position of `name` in `[0, 1)` under this seed.
    pub fn position(&self, name: &[u8]) -> f64 {
        let k = wang_hash(x31_hash(name) ^ self.seed);
        f64::from(k & 0xff_ffff) / f64::from(0x100_0000)
    }

    /// Whether the read called `name` is kept.
    pub fn keeps(&self, name: &[u8]) -> bool {
        self.position(name) < self.fraction
    }
}

impl FromStr for Subsampler {
    type Err = Error;

    /// Parse `SEED.FRAC`: the integer part is the seed, the fractional part
    /// the fraction (`42.25` keeps 25% under seed 42).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidSettings(format!("invalid subsample {:?} (expected SEED.FRAC)", s));
        let (seed, frac) = s.split_once('.').ok_or_else(invalid)?;
        let seed: i64 = if seed.is_empty() { 0 } else { seed.parse().map_err(|_| invalid())? };
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let fraction: f64 = format!("0.{}", frac).parse().map_err(|_| invalid())?;
        // Seeds wrap to 32 bits like a C int.
        Self::new(seed as u32, fraction)
    }
}
