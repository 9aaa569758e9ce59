//! On-disk artifact envelope shared by the persisted indexes.
//!
//! Every persisted index file carries a fixed header (magic, format version,
//! payload length, crc32 checksum) followed by a bincode payload. The header
//! lets a load distinguish "not one of our files" from "one of our files that
//! rotted on disk"; both surface as [`PalisadeError::CorruptIndex`] so a bad
//! artifact disables only the namespace that owns it.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{PalisadeError, Result};

/// Current artifact format version.
pub const FORMAT_VERSION: u32 = 1;

/// Write a payload to `path` under the standard envelope.
pub fn write_artifact(path: &Path, magic: &[u8; 4], payload: &[u8]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(magic)?;
    writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    writer.write_u64::<LittleEndian>(payload.len() as u64)?;
    writer.write_u32::<LittleEndian>(crc32fast::hash(payload))?;
    writer.write_all(payload)?;
    writer.flush()?;

    Ok(())
}

/// Read a payload from `path`, validating the envelope.
pub fn read_artifact(path: &Path, magic: &[u8; 4]) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut found_magic = [0u8; 4];
    reader.read_exact(&mut found_magic).map_err(|_| {
        PalisadeError::corrupt(format!("{}: truncated header", path.display()))
    })?;
    if &found_magic != magic {
        return Err(PalisadeError::corrupt(format!(
            "{}: bad magic {:?}",
            path.display(),
            found_magic
        )));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(PalisadeError::corrupt(format!(
            "{}: unsupported format version {version}",
            path.display()
        )));
    }

    let payload_len = reader.read_u64::<LittleEndian>()?;
    let expected_crc = reader.read_u32::<LittleEndian>()?;

    // The length field is untrusted; it must agree with the actual file
    // size before any allocation happens.
    const HEADER_LEN: u64 = 20;
    let file_len = reader.get_ref().metadata()?.len();
    if payload_len != file_len.saturating_sub(HEADER_LEN) {
        return Err(PalisadeError::corrupt(format!(
            "{}: payload length {payload_len} disagrees with file size {file_len}",
            path.display()
        )));
    }

    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload).map_err(|_| {
        PalisadeError::corrupt(format!("{}: truncated payload", path.display()))
    })?;

    let actual_crc = crc32fast::hash(&payload);
    if actual_crc != expected_crc {
        return Err(PalisadeError::corrupt(format!(
            "{}: checksum mismatch (expected {expected_crc:08x}, got {actual_crc:08x})",
            path.display()
        )));
    }

    Ok(payload)
}
