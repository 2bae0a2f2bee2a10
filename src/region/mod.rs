// src/region/mod.rs

//! Buffer bookkeeping.
//!
//! - [`rect`] defines 3-D boxes and the set algebra over them.
//! - [`tracker`] records per device which boxes of a buffer are valid.
//! - [`data_region`] owns a buffer's device replicas and its tracker.

pub mod data_region;
pub mod rect;
pub mod tracker;

pub use data_region::{Allocation, DataRegion, DataRegionPtr, RegionId};
pub use rect::{Id3, Range3, Rect};
pub use tracker::RegionTracker;
