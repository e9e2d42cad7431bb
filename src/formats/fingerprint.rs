//! Fingerprinted, checksummed record files.
//!
//! Every persisted table starts with a 4-byte fingerprint plus a format
//! version and ends with a CRC-64/GO-ISO footer over everything written.
//! A fingerprint or checksum mismatch aborts the load.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{ensure, Context, Result};
use crc::{Crc, CRC_64_GO_ISO};

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Sequential writer that checksums every byte it emits.
pub struct RecordWriter {
    inner: BufWriter<File>,
    digest: crc::Digest<'static, u64>,
}

impl RecordWriter {
    pub fn create<P: AsRef<Path>>(path: P, fingerprint: [u8; 4], version: u16) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("failed to create {}", path.as_ref().display()))?;
        let mut writer = Self {
            inner: BufWriter::new(file),
            digest: CRC64.digest(),
        };
        writer.write_bytes(&fingerprint)?;
        writer.write_u16(version)?;
        writer.write_u16(0)?; // reserved
        Ok(writer)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.digest.update(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Write the CRC footer and flush.
    pub fn finish(mut self) -> Result<()> {
        let checksum = self.digest.finalize();
        self.inner.write_all(&checksum.to_le_bytes())?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Sequential reader that validates the fingerprint up front and the CRC
/// footer in `finish`.
pub struct RecordReader {
    inner: BufReader<File>,
    digest: crc::Digest<'static, u64>,
}

impl RecordReader {
    pub fn open<P: AsRef<Path>>(path: P, fingerprint: [u8; 4], version: u16) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("failed to open {}", path.as_ref().display()))?;
        let mut reader = Self {
            inner: BufReader::new(file),
            digest: CRC64.digest(),
        };
        let mut header = [0u8; 8];
        reader.read_bytes(&mut header)?;
        ensure!(
            header[0..4] == fingerprint,
            "fingerprint mismatch in {}: expected {:02X?}, found {:02X?}",
            path.as_ref().display(),
            fingerprint,
            &header[0..4]
        );
        let file_version = u16::from_le_bytes([header[4], header[5]]);
        ensure!(
            file_version == version,
            "format version mismatch in {}: expected {}, found {}",
            path.as_ref().display(),
            version,
            file_version
        );
        Ok(reader)
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        self.digest.update(buf);
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    /// Validate the trailing checksum; must be called after the last record.
    pub fn finish(mut self) -> Result<()> {
        let computed = self.digest.finalize();
        let mut footer = [0u8; 8];
        self.inner.read_exact(&mut footer)?;
        let stored = u64::from_le_bytes(footer);
        ensure!(
            computed == stored,
            "checksum mismatch: computed 0x{computed:016X}, stored 0x{stored:016X}"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};
    use tempfile::NamedTempFile;

    const FP: [u8; 4] = *b"WMTS";

    #[test]
    fn test_round_trip() -> Result<()> {
        let tmp = NamedTempFile::new()?;
        let mut w = RecordWriter::create(tmp.path(), FP, 1)?;
        w.write_u32(42)?;
        w.write_i64(-7)?;
        w.finish()?;

        let mut r = RecordReader::open(tmp.path(), FP, 1)?;
        assert_eq!(r.read_u32()?, 42);
        assert_eq!(r.read_i64()?, -7);
        r.finish()?;
        Ok(())
    }

    #[test]
    fn test_fingerprint_mismatch() -> Result<()> {
        let tmp = NamedTempFile::new()?;
        RecordWriter::create(tmp.path(), FP, 1)?.finish()?;
        assert!(RecordReader::open(tmp.path(), *b"XXXX", 1).is_err());
        Ok(())
    }

    #[test]
    fn test_corruption_detected() -> Result<()> {
        let tmp = NamedTempFile::new()?;
        let mut w = RecordWriter::create(tmp.path(), FP, 1)?;
        w.write_u64(0xDEAD_BEEF)?;
        w.finish()?;

        {
            let mut file = std::fs::OpenOptions::new().write(true).open(tmp.path())?;
            file.seek(SeekFrom::Start(9))?;
            file.write_all(&[0xFF])?;
        }

        let mut r = RecordReader::open(tmp.path(), FP, 1)?;
        let _ = r.read_u64()?;
        assert!(r.finish().is_err(), "corrupted payload must fail the checksum");
        Ok(())
    }
}
