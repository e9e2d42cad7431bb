//! Spatial index over snappable geometry segments.

pub mod static_rtree;

pub use static_rtree::{SegmentEntry, StaticRTree};
