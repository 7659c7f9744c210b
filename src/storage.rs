use log::debug;
use rollcall_vision::Embedding;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::roster::Roster;

const SNAPSHOT_MAGIC: [u8; 4] = *b"RCEB";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub name: String,
    pub embedding: Vec<f32>,
}

/// Snapshot layout: postcard `Header` followed by a postcard
/// `Vec<IdentityRecord>` in roster order.
pub fn encode(roster: &Roster) -> Result<Vec<u8>> {
    let header = Header {
        magic: SNAPSHOT_MAGIC,
        version: SNAPSHOT_VERSION,
    };
    let records: Vec<IdentityRecord> = roster
        .iter()
        .map(|(name, embedding)| IdentityRecord {
            name: name.to_string(),
            embedding: embedding.to_vec(),
        })
        .collect();

    let mut data = postcard::to_allocvec(&header)?;
    data.extend(postcard::to_allocvec(&records)?);
    Ok(data)
}

pub fn decode(path: &Path, data: &[u8]) -> Result<Roster> {
    let corrupt = |reason: String| StoreError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason,
    };

    let (header, rest) = postcard::take_from_bytes::<Header>(data)
        .map_err(|e| corrupt(format!("header: {e}")))?;
    if header.magic != SNAPSHOT_MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }
    if header.version != SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: header.version,
            expected: SNAPSHOT_VERSION,
        });
    }

    let records: Vec<IdentityRecord> =
        postcard::from_bytes(rest).map_err(|e| corrupt(format!("records: {e}")))?;

    let mut roster = Roster::new();
    for record in records {
        let name = record.name.clone();
        let previous = roster
            .insert(record.name, Embedding::from(record.embedding))
            .map_err(|e| corrupt(format!("identity {name:?}: {e}")))?;
        if previous.is_some() {
            return Err(corrupt(format!("duplicate identity {name:?}")));
        }
    }
    Ok(roster)
}

/// Read the snapshot at `path`; `Ok(None)` when there is none yet.
pub fn read_snapshot(path: &Path) -> Result<Option<Roster>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path).map_err(|e| unavailable(path, e))?;
    decode(path, &data).map(Some)
}

/// Replace the snapshot at `path` with `roster`.
///
/// The bytes go to a temporary file in the same directory which is synced
/// and then renamed over `path`, so readers see either the old or the new
/// snapshot in full.
pub fn write_snapshot(path: &Path, roster: &Roster) -> Result<()> {
    let data = encode(roster)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| unavailable(&dir, e))?;

    let tmp = temp_path(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(&data)?;
        file.sync_all()
    });
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp);
        return Err(unavailable(&tmp, source));
    }

    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(unavailable(path, source));
    }

    // make the rename itself durable
    if let Ok(d) = File::open(&dir) {
        let _ = d.sync_all();
    }

    debug!(
        "wrote {} identities ({} bytes) to {}",
        roster.len(),
        data.len(),
        path.display()
    );
    Ok(())
}

fn unavailable(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::StorageUnavailable {
        path: path.to_path_buf(),
        source,
    }
}

pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}
