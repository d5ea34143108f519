//! Lays out the included files of a release under the upload directory.

use std::fs;
use std::path::Path;

use relgate_core::IncludedFileList;
use tracing::{debug, warn};

use crate::error::{FsOpsError, FsOpsResult};

/// How the included files were placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeSummary {
    /// Files placed by hard link.
    pub linked: usize,
    /// Files copied because linking failed.
    pub copied: usize,
}

impl MaterializeSummary {
    /// Total files placed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.linked + self.copied
    }
}

/// Hard link each included file from `source` into `destination`, copying when
/// linking is not possible (for example across filesystems).
///
/// `source` is either the payload directory, whose entries are resolved by
/// name, or a single payload file.
///
/// # Errors
///
/// Returns an error when a directory cannot be created or a file cannot be
/// linked or copied.
pub fn materialize_release(
    source: &Path,
    list: &IncludedFileList,
    destination: &Path,
) -> FsOpsResult<MaterializeSummary> {
    fs::create_dir_all(destination).map_err(|source_err| {
        FsOpsError::io("materialize.create_dir", destination, source_err)
    })?;

    let single_file = source.is_file();
    let mut summary = MaterializeSummary::default();
    for entry in list.included() {
        let from = if single_file {
            source.to_path_buf()
        } else {
            source.join(&entry.name)
        };
        let target = destination.join(&entry.name);
        if target.exists() {
            debug!(path = %target.display(), "release file already in place");
            summary.linked += 1;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source_err| {
                FsOpsError::io("materialize.create_parent", parent, source_err)
            })?;
        }
        match fs::hard_link(&from, &target) {
            Ok(()) => summary.linked += 1,
            Err(link_err) => {
                warn!(
                    error = %link_err,
                    path = %from.display(),
                    "hard link failed; copying release file"
                );
                fs::copy(&from, &target).map_err(|source_err| {
                    FsOpsError::io("materialize.copy_file", &from, source_err)
                })?;
                summary.copied += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_core::FileEntry;

    #[cfg(unix)]
    #[test]
    fn included_files_are_hard_linked() -> anyhow::Result<()> {
        use std::os::unix::fs::MetadataExt;

        let temp = tempfile::Builder::new().prefix("relgate-fsops-").tempdir()?;
        let payload = temp.path().join("payload");
        fs::create_dir_all(payload.join("Subs"))?;
        fs::write(payload.join("movie.mkv"), b"video")?;
        fs::write(payload.join("Subs").join("movie.srt"), b"subs")?;
        fs::write(payload.join("sample.mkv"), b"sample")?;

        let mut list: IncludedFileList = ["movie.mkv", "Subs/movie.srt", "sample.mkv"]
            .into_iter()
            .map(|name| FileEntry::new(name, 1))
            .collect();
        list.exclude_where(|entry| entry.name == "sample.mkv");

        let destination = temp.path().join("release").join("Movie");
        let summary = materialize_release(&payload, &list, &destination)?;
        assert_eq!(summary.total(), 2);
        assert!(!destination.join("sample.mkv").exists());
        assert_eq!(
            fs::metadata(payload.join("movie.mkv"))?.ino(),
            fs::metadata(destination.join("movie.mkv"))?.ino()
        );
        assert!(destination.join("Subs").join("movie.srt").is_file());
        Ok(())
    }

    #[test]
    fn single_file_payload_is_placed_by_name() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let payload = temp.path().join("movie.mkv");
        fs::write(&payload, b"video")?;
        let list: IncludedFileList = std::iter::once(FileEntry::new("movie.mkv", 5)).collect();

        let destination = temp.path().join("out");
        materialize_release(&payload, &list, &destination)?;
        assert_eq!(fs::read(destination.join("movie.mkv"))?, b"video");

        let again = materialize_release(&payload, &list, &destination)?;
        assert_eq!(again.total(), 1);
        Ok(())
    }

    #[test]
    fn missing_source_file_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let list: IncludedFileList = std::iter::once(FileEntry::new("gone.mkv", 5)).collect();
        let err = materialize_release(temp.path(), &list, &temp.path().join("out"))
            .expect_err("missing source");
        assert!(matches!(err, FsOpsError::Io { .. }));
    }
}
