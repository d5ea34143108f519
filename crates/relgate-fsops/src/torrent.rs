//! Reads the file list out of torrent metainfo.

use std::fs;
use std::path::Path;

use relgate_core::{FileEntry, IncludedFileList};
use serde::Deserialize;

use crate::error::{FsOpsError, FsOpsResult};

/// File layout described by a metainfo file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetainfo {
    /// Suggested payload name (file name or top-level directory).
    pub name: String,
    /// Payload files relative to the payload root.
    pub files: IncludedFileList,
    /// Whether the payload is a single file rather than a directory.
    pub single_file: bool,
}

impl TorrentMetainfo {
    /// Sum of all payload file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.total_size()
    }
}

#[derive(Debug, Deserialize)]
struct RawMetainfo {
    info: RawInfo,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    name: String,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    length: u64,
    path: Vec<String>,
}

/// Decode metainfo bytes.
///
/// # Errors
///
/// Returns an error when the bytes are not bencoded metainfo or describe no files.
pub fn parse_metainfo(bytes: &[u8]) -> FsOpsResult<TorrentMetainfo> {
    let raw: RawMetainfo = serde_bencode::from_bytes(bytes)
        .map_err(|source| FsOpsError::Metainfo { path: None, source })?;
    into_metainfo(raw.info)
}

/// Read and decode a metainfo file.
///
/// # Errors
///
/// Returns an error when the file cannot be read or decoded.
pub fn read_metainfo(path: &Path) -> FsOpsResult<TorrentMetainfo> {
    let bytes = fs::read(path).map_err(|source| FsOpsError::io("read_metainfo", path, source))?;
    let raw: RawMetainfo = serde_bencode::from_bytes(&bytes).map_err(|source| {
        FsOpsError::Metainfo {
            path: Some(path.to_path_buf()),
            source,
        }
    })?;
    into_metainfo(raw.info)
}

fn into_metainfo(info: RawInfo) -> FsOpsResult<TorrentMetainfo> {
    if info.name.trim().is_empty() || info.name.contains(['/', '\\']) || info.name == ".." {
        return Err(FsOpsError::Rejected {
            field: "info.name",
            reason: "unsafe_name",
            value: Some(info.name),
        });
    }

    match (info.files, info.length) {
        (Some(files), _) => {
            let mut entries = Vec::with_capacity(files.len());
            for file in files {
                if file
                    .path
                    .iter()
                    .any(|part| part.is_empty() || part == ".." || part.contains(['/', '\\']))
                {
                    return Err(FsOpsError::Rejected {
                        field: "info.files.path",
                        reason: "unsafe_component",
                        value: Some(file.path.join("/")),
                    });
                }
                entries.push(FileEntry::new(file.path.join("/"), file.length));
            }
            Ok(TorrentMetainfo {
                name: info.name,
                files: entries.into_iter().collect(),
                single_file: false,
            })
        }
        (None, Some(length)) => Ok(TorrentMetainfo {
            files: std::iter::once(FileEntry::new(info.name.clone(), length)).collect(),
            name: info.name,
            single_file: true,
        }),
        (None, None) => Err(FsOpsError::Rejected {
            field: "info",
            reason: "no_files",
            value: Some(info.name),
        }),
    }
}
