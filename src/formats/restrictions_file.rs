//! `.osrm.restrictions` — turn restrictions keyed by internal node ids.

use std::path::Path;

use anyhow::Result;

use super::fingerprint::{RecordReader, RecordWriter};
use crate::extractor::graph_builder::InternalRestriction;

const FINGERPRINT: [u8; 4] = *b"WMRS";
const VERSION: u16 = 1;

pub fn write<P: AsRef<Path>>(path: P, restrictions: &[InternalRestriction]) -> Result<()> {
    let mut writer = RecordWriter::create(path, FINGERPRINT, VERSION)?;
    writer.write_u32(restrictions.len() as u32)?;
    for restriction in restrictions {
        writer.write_u32(restriction.from)?;
        writer.write_u32(restriction.via)?;
        writer.write_u32(restriction.to)?;
        writer.write_u8(restriction.only as u8)?;
    }
    writer.finish()
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<InternalRestriction>> {
    let mut reader = RecordReader::open(path, FINGERPRINT, VERSION)?;
    let count = reader.read_u32()? as usize;
    let mut restrictions = Vec::with_capacity(count);
    for _ in 0..count {
        restrictions.push(InternalRestriction {
            from: reader.read_u32()?,
            via: reader.read_u32()?,
            to: reader.read_u32()?,
            only: reader.read_u8()? != 0,
        });
    }
    reader.finish()?;
    Ok(restrictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_round_trip() -> Result<()> {
        let restrictions = vec![
            InternalRestriction {
                from: 1,
                via: 2,
                to: 3,
                only: false,
            },
            InternalRestriction {
                from: 7,
                via: 2,
                to: 9,
                only: true,
            },
        ];
        let tmp = NamedTempFile::new()?;
        write(tmp.path(), &restrictions)?;
        assert_eq!(read(tmp.path())?, restrictions);
        Ok(())
    }
}
