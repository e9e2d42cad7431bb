//! Street name table.
//!
//! Names are stored as one blob of concatenated UTF-8 plus a block-based
//! prefix-sum index: every 16th string offset is stored exactly, the fifteen
//! offsets in between as byte-length deltas. A name id addresses a block of
//! four strings — name, ref, pronunciation, destinations — exposed as
//! `string(id + k)` for k in 0..4.

use std::path::Path;

use anyhow::{ensure, Result};
use rustc_hash::FxHashMap;

use super::fingerprint::{RecordReader, RecordWriter};
use crate::types::NameId;

const FINGERPRINT: [u8; 4] = *b"WMNM";
const VERSION: u16 = 1;

pub const BLOCK_SIZE: usize = 16;
pub const STRINGS_PER_NAME: u32 = 4;

/// Block-based offset index: exact offsets every `BLOCK_SIZE` entries,
/// byte-deltas in between. Entry lengths are capped at 255 bytes.
#[derive(Debug, Default, Clone)]
pub struct RangeTable {
    block_offsets: Vec<u32>,
    deltas: Vec<u8>,
    count: u32,
}

impl RangeTable {
    pub fn from_lengths(lengths: &[u8]) -> Self {
        let mut block_offsets = Vec::with_capacity(lengths.len() / BLOCK_SIZE + 1);
        let mut offset = 0u32;
        for (i, &len) in lengths.iter().enumerate() {
            if i % BLOCK_SIZE == 0 {
                block_offsets.push(offset);
            }
            offset += len as u32;
        }
        Self {
            block_offsets,
            deltas: lengths.to_vec(),
            count: lengths.len() as u32,
        }
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Byte range of entry `index` within the blob.
    pub fn range(&self, index: u32) -> (u32, u32) {
        debug_assert!(index < self.count);
        let block = (index as usize) / BLOCK_SIZE;
        let mut start = self.block_offsets[block];
        for i in (block * BLOCK_SIZE)..(index as usize) {
            start += self.deltas[i] as u32;
        }
        (start, start + self.deltas[index as usize] as u32)
    }
}

/// Read-only view of the persisted name table.
#[derive(Debug, Default)]
pub struct NameTable {
    range: RangeTable,
    blob: Vec<u8>,
}

impl NameTable {
    /// Raw string at `index`, empty for out-of-range ids.
    pub fn string(&self, index: u32) -> &str {
        if index >= self.range.len() {
            return "";
        }
        let (start, end) = self.range.range(index);
        std::str::from_utf8(&self.blob[start as usize..end as usize]).unwrap_or("")
    }

    pub fn name(&self, id: NameId) -> &str {
        self.string(id)
    }

    pub fn reference(&self, id: NameId) -> &str {
        self.string(id + 1)
    }

    pub fn pronunciation(&self, id: NameId) -> &str {
        self.string(id + 2)
    }

    pub fn destinations(&self, id: NameId) -> &str {
        self.string(id + 3)
    }

    pub fn string_count(&self) -> u32 {
        self.range.len()
    }
}

/// Deduplicating builder used by the extractor. Ids are base string indices,
/// so they advance in strides of four; id 0 is the empty block.
#[derive(Debug)]
pub struct NameTableBuilder {
    index: FxHashMap<[String; 4], NameId>,
    strings: Vec<String>,
}

impl Default for NameTableBuilder {
    fn default() -> Self {
        let mut builder = Self {
            index: FxHashMap::default(),
            strings: Vec::new(),
        };
        // block 0: the unnamed road
        builder.add("", "", "", "");
        builder
    }
}

impl NameTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, reference: &str, pronunciation: &str, destinations: &str) -> NameId {
        let key = [
            name.to_string(),
            reference.to_string(),
            pronunciation.to_string(),
            destinations.to_string(),
        ];
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.strings.len() as NameId;
        for part in &key {
            let mut truncated = part.clone();
            truncated.truncate(255);
            self.strings.push(truncated);
        }
        self.index.insert(key, id);
        id
    }

    pub fn build(self) -> NameTable {
        let lengths: Vec<u8> = self.strings.iter().map(|s| s.len() as u8).collect();
        let mut blob = Vec::new();
        for s in &self.strings {
            blob.extend_from_slice(s.as_bytes());
        }
        NameTable {
            range: RangeTable::from_lengths(&lengths),
            blob,
        }
    }
}

pub fn write<P: AsRef<Path>>(path: P, table: &NameTable) -> Result<()> {
    let mut writer = RecordWriter::create(path, FINGERPRINT, VERSION)?;
    writer.write_u32(table.range.count)?;
    for &offset in &table.range.block_offsets {
        writer.write_u32(offset)?;
    }
    writer.write_bytes(&table.range.deltas)?;
    writer.write_u32(table.blob.len() as u32)?;
    writer.write_bytes(&table.blob)?;
    writer.finish()
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<NameTable> {
    let mut reader = RecordReader::open(path, FINGERPRINT, VERSION)?;
    let count = reader.read_u32()?;
    let block_count = (count as usize).div_ceil(BLOCK_SIZE);
    let mut block_offsets = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        block_offsets.push(reader.read_u32()?);
    }
    let mut deltas = vec![0u8; count as usize];
    reader.read_bytes(&mut deltas)?;
    let blob_len = reader.read_u32()?;
    let mut blob = vec![0u8; blob_len as usize];
    reader.read_bytes(&mut blob)?;
    reader.finish()?;

    let total: u32 = deltas.iter().map(|&d| d as u32).sum();
    ensure!(
        total == blob_len,
        "name blob length {blob_len} does not match index total {total}"
    );

    Ok(NameTable {
        range: RangeTable {
            block_offsets,
            deltas,
            count,
        },
        blob,
    })
}
