//! Framed on-disk encoding shared by every persisted file
//!
//! Layout: `magic[4] | version u32 LE | crc32 u32 LE | len u64 LE | payload`.
//! The payload is MessagePack (named fields). The CRC covers the payload.

use crate::error::{CtseError, CtseResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Bytes before the payload
pub const HEADER_LEN: usize = 20;

/// Encode `value` into a framed buffer.
pub fn encode_framed<T: Serialize>(magic: &[u8; 4], version: u32, value: &T) -> CtseResult<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(value)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(magic);
    buf.write_u32::<LittleEndian>(version)?;
    buf.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    buf.write_u64::<LittleEndian>(payload.len() as u64)?;
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a framed buffer, validating magic, version, length and checksum.
pub fn decode_framed<T: DeserializeOwned>(magic: &[u8; 4], version: u32, buf: &[u8]) -> CtseResult<T> {
    if buf.len() < HEADER_LEN {
        return Err(CtseError::Corruption(format!(
            "file too small ({} bytes)",
            buf.len()
        )));
    }
    if &buf[0..4] != magic {
        return Err(CtseError::Corruption(format!(
            "bad magic: expected {:?}, found {:?}",
            String::from_utf8_lossy(magic),
            String::from_utf8_lossy(&buf[0..4])
        )));
    }
    let mut header = &buf[4..HEADER_LEN];
    let found_version = header.read_u32::<LittleEndian>()?;
    if found_version != version {
        return Err(CtseError::Corruption(format!(
            "unsupported format version {} (expected {})",
            found_version, version
        )));
    }
    let crc = header.read_u32::<LittleEndian>()?;
    let len = header.read_u64::<LittleEndian>()? as usize;
    let payload = &buf[HEADER_LEN..];
    if payload.len() != len {
        return Err(CtseError::Corruption(format!(
            "payload length {} does not match header {}",
            payload.len(),
            len
        )));
    }
    if crc32fast::hash(payload) != crc {
        return Err(CtseError::Corruption("checksum mismatch".to_string()));
    }
    Ok(rmp_serde::from_slice(payload)?)
}

/// Create `path`, write `bytes`, fsync.
pub fn write_synced(path: &Path, bytes: &[u8]) -> CtseResult<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Replace `path` atomically: temp + fsync + rename + directory fsync.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> CtseResult<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!("{}.tmp", file_name));
    write_synced(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    sync_dir(dir)
}

/// Read and decode a framed file.
pub fn read_framed<T: DeserializeOwned>(path: &Path, magic: &[u8; 4], version: u32) -> CtseResult<T> {
    let buf = std::fs::read(path)?;
    decode_framed(magic, version, &buf).map_err(|e| match e {
        CtseError::Corruption(msg) => {
            CtseError::Corruption(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Fsync a directory so renames inside it are durable.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> CtseResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Directory fsync is not available on this platform.
#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> CtseResult<()> {
    Ok(())
}
