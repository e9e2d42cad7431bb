//! `.osrm.icd` — intersection bearing and entry classes, and
//! `.osrm.tld` — turn lane descriptions.

use std::path::Path;

use anyhow::Result;

use super::fingerprint::{RecordReader, RecordWriter};
use crate::extractor::guidance::lanes::LaneDescription;

const ICD_FINGERPRINT: [u8; 4] = *b"WMIC";
const TLD_FINGERPRINT: [u8; 4] = *b"WMTL";
const VERSION: u16 = 1;

pub struct IntersectionClasses {
    pub bearing_classes: Vec<Vec<u16>>,
    pub entry_classes: Vec<u32>,
}

pub fn write_classes<P: AsRef<Path>>(path: P, classes: &IntersectionClasses) -> Result<()> {
    let mut writer = RecordWriter::create(path, ICD_FINGERPRINT, VERSION)?;
    writer.write_u32(classes.bearing_classes.len() as u32)?;
    for bearings in &classes.bearing_classes {
        writer.write_u16(bearings.len() as u16)?;
        for &bearing in bearings {
            writer.write_u16(bearing)?;
        }
    }
    writer.write_u32(classes.entry_classes.len() as u32)?;
    for &entry in &classes.entry_classes {
        writer.write_u32(entry)?;
    }
    writer.finish()
}

pub fn read_classes<P: AsRef<Path>>(path: P) -> Result<IntersectionClasses> {
    let mut reader = RecordReader::open(path, ICD_FINGERPRINT, VERSION)?;
    let bearing_count = reader.read_u32()? as usize;
    let mut bearing_classes = Vec::with_capacity(bearing_count);
    for _ in 0..bearing_count {
        let size = reader.read_u16()? as usize;
        let mut bearings = Vec::with_capacity(size);
        for _ in 0..size {
            bearings.push(reader.read_u16()?);
        }
        bearing_classes.push(bearings);
    }
    let entry_count = reader.read_u32()? as usize;
    let mut entry_classes = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        entry_classes.push(reader.read_u32()?);
    }
    reader.finish()?;
    Ok(IntersectionClasses {
        bearing_classes,
        entry_classes,
    })
}

pub fn write_lane_descriptions<P: AsRef<Path>>(
    path: P,
    descriptions: &[LaneDescription],
) -> Result<()> {
    let mut writer = RecordWriter::create(path, TLD_FINGERPRINT, VERSION)?;
    writer.write_u32(descriptions.len() as u32)?;
    for description in descriptions {
        writer.write_u16(description.len() as u16)?;
        for &mask in description {
            writer.write_u16(mask)?;
        }
    }
    writer.finish()
}

pub fn read_lane_descriptions<P: AsRef<Path>>(path: P) -> Result<Vec<LaneDescription>> {
    let mut reader = RecordReader::open(path, TLD_FINGERPRINT, VERSION)?;
    let count = reader.read_u32()? as usize;
    let mut descriptions = Vec::with_capacity(count);
    for _ in 0..count {
        let size = reader.read_u16()? as usize;
        let mut lanes = Vec::with_capacity(size);
        for _ in 0..size {
            lanes.push(reader.read_u16()?);
        }
        descriptions.push(lanes);
    }
    reader.finish()?;
    Ok(descriptions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::guidance::lanes::parse_lane_string;
    use tempfile::NamedTempFile;

    #[test]
    fn test_classes_round_trip() -> Result<()> {
        let classes = IntersectionClasses {
            bearing_classes: vec![vec![0, 90, 180, 270], vec![45, 225]],
            entry_classes: vec![0b1011, 0b11],
        };
        let tmp = NamedTempFile::new()?;
        write_classes(tmp.path(), &classes)?;
        let loaded = read_classes(tmp.path())?;
        assert_eq!(loaded.bearing_classes, classes.bearing_classes);
        assert_eq!(loaded.entry_classes, classes.entry_classes);
        Ok(())
    }

    #[test]
    fn test_lane_descriptions_round_trip() -> Result<()> {
        let descriptions = vec![
            parse_lane_string("left|through|right"),
            parse_lane_string("through|through"),
        ];
        let tmp = NamedTempFile::new()?;
        write_lane_descriptions(tmp.path(), &descriptions)?;
        assert_eq!(read_lane_descriptions(tmp.path())?, descriptions);
        Ok(())
    }
}
