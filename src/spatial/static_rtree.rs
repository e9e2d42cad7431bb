//! Static R-tree over segment bounding rectangles.
//!
//! Built once by the extractor: segment rectangles are sorted along a
//! Hilbert curve and written out in 4-KiB leaf pages (`.osrm.fileIndex`),
//! with one bounding rectangle per page kept memory-resident
//! (`.osrm.ramIndex`). Queries run over an in-memory `rstar` tree bulk
//! loaded from the paged leaves.

use std::path::Path;

use anyhow::{ensure, Result};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::formats::fingerprint::{RecordReader, RecordWriter};
use crate::geo::{Coordinate, COORDINATE_PRECISION};

const LEAF_FINGERPRINT: [u8; 4] = *b"WMLF";
const RAM_FINGERPRINT: [u8; 4] = *b"WMRI";
const VERSION: u16 = 1;

/// 4 KiB pages with an 8 byte header; entries are fixed-point and 20 bytes.
const PAGE_SIZE: usize = 4096;
const ENTRY_SIZE: usize = 20;
const ENTRIES_PER_PAGE: usize = (PAGE_SIZE - 8) / ENTRY_SIZE;

/// One snappable segment: its two endpoints (degrees) and the index of the
/// segment record it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentEntry {
    pub start: [f64; 2],
    pub end: [f64; 2],
    pub segment_index: u32,
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.start[0].min(self.end[0]), self.start[1].min(self.end[1])],
            [self.start[0].max(self.end[0]), self.start[1].max(self.end[1])],
        )
    }
}

impl PointDistance for SegmentEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let (dx, dy) = self.closest_point_delta(point);
        dx * dx + dy * dy
    }
}

impl SegmentEntry {
    fn closest_point_delta(&self, point: &[f64; 2]) -> (f64, f64) {
        let ex = self.end[0] - self.start[0];
        let ey = self.end[1] - self.start[1];
        let len2 = ex * ex + ey * ey;
        let ratio = if len2 > 0.0 {
            (((point[0] - self.start[0]) * ex + (point[1] - self.start[1]) * ey) / len2)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };
        let cx = self.start[0] + ex * ratio;
        let cy = self.start[1] + ey * ratio;
        (point[0] - cx, point[1] - cy)
    }
}

/// Hilbert index with 16 bits per dimension, for leaf packing.
fn hilbert_index(mut x: u32, mut y: u32) -> u64 {
    let mut d: u64 = 0;
    let mut s: u32 = 1 << 15;
    while s > 0 {
        let rx = u32::from(x & s > 0);
        let ry = u32::from(y & s > 0);
        d += (s as u64) * (s as u64) * ((3 * rx) ^ ry) as u64;
        // rotate the quadrant
        if ry == 0 {
            if rx == 1 {
                x = 65535 - x;
                y = 65535 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        s /= 2;
    }
    d
}

fn hilbert_key(entry: &SegmentEntry) -> u64 {
    // center point, discretized to 16 bits over the WGS84 range
    let cx = (entry.start[0] + entry.end[0]) / 2.0;
    let cy = (entry.start[1] + entry.end[1]) / 2.0;
    let x = (((cx + 180.0) / 360.0) * 65535.0).clamp(0.0, 65535.0) as u32;
    let y = (((cy + 90.0) / 180.0) * 65535.0).clamp(0.0, 65535.0) as u32;
    hilbert_index(x, y)
}

fn to_fixed(value: f64) -> i32 {
    (value * COORDINATE_PRECISION).round() as i32
}

fn from_fixed(value: i32) -> f64 {
    value as f64 / COORDINATE_PRECISION
}

/// The query-side index: an `rstar` tree over all segment entries.
pub struct StaticRTree {
    tree: RTree<SegmentEntry>,
}

impl StaticRTree {
    pub fn build(entries: Vec<SegmentEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Segments by increasing distance from `coordinate`.
    pub fn nearest_iter(
        &self,
        coordinate: Coordinate,
    ) -> impl Iterator<Item = &SegmentEntry> + '_ {
        self.tree
            .nearest_neighbor_iter(&[coordinate.lon_degrees(), coordinate.lat_degrees()])
    }

    /// Persist the leaf pages and the memory-resident page rectangles.
    pub fn write<P: AsRef<Path>>(&self, leaf_path: P, ram_path: P) -> Result<()> {
        let mut entries: Vec<SegmentEntry> = self.tree.iter().copied().collect();
        entries.sort_by_key(hilbert_key);

        let mut leaf_writer = RecordWriter::create(leaf_path, LEAF_FINGERPRINT, VERSION)?;
        let mut ram_writer = RecordWriter::create(ram_path, RAM_FINGERPRINT, VERSION)?;

        let pages: Vec<&[SegmentEntry]> = entries.chunks(ENTRIES_PER_PAGE).collect();
        leaf_writer.write_u32(entries.len() as u32)?;
        leaf_writer.write_u32(pages.len() as u32)?;
        ram_writer.write_u32(pages.len() as u32)?;

        for page in &pages {
            let mut min = [i32::MAX; 2];
            let mut max = [i32::MIN; 2];
            leaf_writer.write_u32(page.len() as u32)?;
            leaf_writer.write_u32(0)?; // reserved
            for entry in *page {
                let fixed = [
                    to_fixed(entry.start[0]),
                    to_fixed(entry.start[1]),
                    to_fixed(entry.end[0]),
                    to_fixed(entry.end[1]),
                ];
                for value in fixed {
                    leaf_writer.write_i32(value)?;
                }
                leaf_writer.write_u32(entry.segment_index)?;
                for d in 0..2 {
                    min[d] = min[d].min(fixed[d]).min(fixed[d + 2]);
                    max[d] = max[d].max(fixed[d]).max(fixed[d + 2]);
                }
            }
            // pad the page to its fixed size
            let padding = (ENTRIES_PER_PAGE - page.len()) * ENTRY_SIZE;
            leaf_writer.write_bytes(&vec![0u8; padding])?;

            for d in 0..2 {
                ram_writer.write_i32(min[d])?;
            }
            for d in 0..2 {
                ram_writer.write_i32(max[d])?;
            }
        }

        leaf_writer.finish()?;
        ram_writer.finish()
    }

    /// Load the paged leaves back into a queryable tree, validating each
    /// entry against its page rectangle.
    pub fn read<P: AsRef<Path>>(leaf_path: P, ram_path: P) -> Result<Self> {
        let mut ram_reader = RecordReader::open(ram_path, RAM_FINGERPRINT, VERSION)?;
        let ram_pages = ram_reader.read_u32()? as usize;
        let mut page_rects = Vec::with_capacity(ram_pages);
        for _ in 0..ram_pages {
            let min = [ram_reader.read_i32()?, ram_reader.read_i32()?];
            let max = [ram_reader.read_i32()?, ram_reader.read_i32()?];
            page_rects.push((min, max));
        }
        ram_reader.finish()?;

        let mut leaf_reader = RecordReader::open(leaf_path, LEAF_FINGERPRINT, VERSION)?;
        let entry_count = leaf_reader.read_u32()? as usize;
        let page_count = leaf_reader.read_u32()? as usize;
        ensure!(
            page_count == ram_pages,
            "leaf and ram index disagree on page count ({page_count} vs {ram_pages})"
        );

        let mut entries = Vec::with_capacity(entry_count);
        for page_index in 0..page_count {
            let used = leaf_reader.read_u32()? as usize;
            let _reserved = leaf_reader.read_u32()?;
            ensure!(used <= ENTRIES_PER_PAGE, "corrupt leaf page header");
            for slot in 0..ENTRIES_PER_PAGE {
                let mut raw = [0u8; ENTRY_SIZE];
                leaf_reader.read_bytes(&mut raw)?;
                if slot >= used {
                    continue;
                }
                let start_lon = i32::from_le_bytes(raw[0..4].try_into().unwrap());
                let start_lat = i32::from_le_bytes(raw[4..8].try_into().unwrap());
                let end_lon = i32::from_le_bytes(raw[8..12].try_into().unwrap());
                let end_lat = i32::from_le_bytes(raw[12..16].try_into().unwrap());
                let segment_index = u32::from_le_bytes(raw[16..20].try_into().unwrap());

                let (min, max) = page_rects[page_index];
                ensure!(
                    start_lon >= min[0] && start_lon <= max[0] && start_lat >= min[1] && start_lat <= max[1],
                    "leaf entry escapes its page rectangle"
                );

                entries.push(SegmentEntry {
                    start: [from_fixed(start_lon), from_fixed(start_lat)],
                    end: [from_fixed(end_lon), from_fixed(end_lat)],
                    segment_index,
                });
            }
        }
        leaf_reader.finish()?;

        Ok(Self::build(entries))
    }
}
