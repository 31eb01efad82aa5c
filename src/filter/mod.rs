//! Record filtering.
//!
//! [`FilterSettings`] is built once before a run; [`FilterPipeline`] turns
//! it into an ordered chain of [`RecordFilter`] checks. Region, read-group,
//! and library lookups are separate collaborators so they can be supplied
//! independently of the chain.

pub mod pipeline;
pub mod read_group;
pub mod region;
pub mod settings;
pub mod subsample;

pub use pipeline::{FilterPipeline, RecordFilter, Verdict};
pub use read_group::{read_group, resolve_library, ReadGroupSet};
pub use region::{Region, RegionFilter, RegionSet};
pub use settings::{parse_tag_key, FilterSettings};
pub use subsample::Subsampler;
