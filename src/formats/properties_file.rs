//! `.osrm.properties` — profile properties and dataset checksum — and
//! `.osrm.timestamp` — the data version string used for cache validation.

use std::path::Path;

use anyhow::{Context, Result};

use super::fingerprint::{RecordReader, RecordWriter};
use crate::profile::ProfileProperties;

const FINGERPRINT: [u8; 4] = *b"WMPR";
const VERSION: u16 = 1;

#[derive(Debug, Clone)]
pub struct DatasetProperties {
    pub profile_name: String,
    pub properties: ProfileProperties,
    /// Checksum over the edge-based graph, embedded in hints.
    pub checksum: u32,
}

pub fn write<P: AsRef<Path>>(path: P, dataset: &DatasetProperties) -> Result<()> {
    let mut writer = RecordWriter::create(path, FINGERPRINT, VERSION)?;
    let name = dataset.profile_name.as_bytes();
    writer.write_u16(name.len() as u16)?;
    writer.write_bytes(name)?;
    writer.write_i32(dataset.properties.u_turn_penalty)?;
    writer.write_i32(dataset.properties.traffic_signal_penalty)?;
    writer.write_u8(dataset.properties.continue_straight_at_waypoint as u8)?;
    writer.write_u8(dataset.properties.use_turn_restrictions as u8)?;
    writer.write_u32(dataset.checksum)?;
    writer.finish()
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<DatasetProperties> {
    let mut reader = RecordReader::open(path, FINGERPRINT, VERSION)?;
    let name_len = reader.read_u16()? as usize;
    let mut name = vec![0u8; name_len];
    reader.read_bytes(&mut name)?;
    let properties = ProfileProperties {
        u_turn_penalty: reader.read_i32()?,
        traffic_signal_penalty: reader.read_i32()?,
        continue_straight_at_waypoint: reader.read_u8()? != 0,
        use_turn_restrictions: reader.read_u8()? != 0,
    };
    let checksum = reader.read_u32()?;
    reader.finish()?;
    Ok(DatasetProperties {
        profile_name: String::from_utf8(name).context("profile name is not valid UTF-8")?,
        properties,
        checksum,
    })
}

pub fn write_timestamp<P: AsRef<Path>>(path: P, timestamp: &str) -> Result<()> {
    std::fs::write(path.as_ref(), timestamp)
        .with_context(|| format!("failed to write {}", path.as_ref().display()))
}

pub fn read_timestamp<P: AsRef<Path>>(path: P) -> Result<String> {
    std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read {}", path.as_ref().display()))
}
