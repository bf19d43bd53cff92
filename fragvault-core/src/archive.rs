use std::collections::BTreeMap;

use thiserror::Error;

/// Relative entry path to its content; `None` marks a directory entry.
pub type ArchiveEntries = BTreeMap<String, Option<Vec<u8>>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("archive format is not supported: {0}")]
    Unsupported(String),
    #[error("unable to read archive: {0}")]
    Read(String),
}

pub trait ArchiveReader {
    fn read_entries(&self, blob: &[u8]) -> Result<ArchiveEntries, ArchiveError>;
}

const LOCAL_FILE_HEADER: &[u8] = b"PK\x03\x04";
const END_OF_CENTRAL_DIRECTORY: &[u8] = b"PK\x05\x06";

/// Checks the leading signature only; says nothing about whether the rest
/// of the archive is readable.
pub fn looks_like_zip(blob: &[u8]) -> bool {
    blob.starts_with(LOCAL_FILE_HEADER) || blob.starts_with(END_OF_CENTRAL_DIRECTORY)
}

pub const DEFAULT_MAX_EXPANDED_BYTES: u64 = 256 * 1024 * 1024;

/// Decodes zip archives, refusing to inflate more than `max_expanded_bytes`
/// of file content in total.
#[derive(Debug, Clone, Copy)]
pub struct ZipArchiveReader {
    max_expanded_bytes: u64,
}

impl ZipArchiveReader {
    pub fn with_limit(max_expanded_bytes: u64) -> Self {
        Self { max_expanded_bytes }
    }

    pub fn max_expanded_bytes(&self) -> u64 {
        self.max_expanded_bytes
    }
}

impl Default for ZipArchiveReader {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_EXPANDED_BYTES)
    }
}

impl ArchiveReader for ZipArchiveReader {
    fn read_entries(&self, blob: &[u8]) -> Result<ArchiveEntries, ArchiveError> {
        if !looks_like_zip(blob) {
            return Err(ArchiveError::Unsupported(
                "blob does not start with a zip signature".to_string(),
            ));
        }
        read_zip(blob, self.max_expanded_bytes)
    }
}

#[cfg(feature = "zip")]
fn read_zip(blob: &[u8], max_expanded_bytes: u64) -> Result<ArchiveEntries, ArchiveError> {
    use std::io::{Cursor, Read};

    let too_large = |path: &str| {
        ArchiveError::Read(format!(
            "{path}: archive expands past {max_expanded_bytes} bytes"
        ))
    };

    let mut archive = zip::ZipArchive::new(Cursor::new(blob))
        .map_err(|err| ArchiveError::Read(err.to_string()))?;
    let mut entries = ArchiveEntries::new();
    let mut remaining = max_expanded_bytes;
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|err| ArchiveError::Read(err.to_string()))?;
        let Some(path) = normalize_entry_name(file.name())? else {
            continue;
        };
        let content = if file.is_dir() {
            None
        } else {
            if file.size() > remaining {
                return Err(too_large(&path));
            }
            // The declared size may lie, so cap the stream as well.
            let mut data = Vec::new();
            (&mut file)
                .take(remaining.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|err| ArchiveError::Read(format!("{path}: {err}")))?;
            let read = data.len() as u64;
            if read > remaining {
                return Err(too_large(&path));
            }
            remaining -= read;
            Some(data)
        };
        entries.insert(path, content);
    }
    Ok(entries)
}

#[cfg(not(feature = "zip"))]
fn read_zip(_blob: &[u8], _max_expanded_bytes: u64) -> Result<ArchiveEntries, ArchiveError> {
    Err(ArchiveError::Unsupported(
        "zip support is not compiled into this build".to_string(),
    ))
}

/// `Ok(None)` for entries that name the archive root itself. Backslashes
/// written by Windows archivers are read as separators.
fn normalize_entry_name(raw: &str) -> Result<Option<String>, ArchiveError> {
    let unified = raw.replace('\\', "/");
    let trimmed = unified.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }
    let unsafe_segment = trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if unsafe_segment {
        return Err(ArchiveError::Read(format!("invalid entry path: {raw}")));
    }
    Ok(Some(trimmed.to_string()))
}
