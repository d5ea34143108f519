//! Builds file lists from content already on disk.

use std::fs;
use std::path::Path;

use relgate_core::{FileEntry, IncludedFileList};
use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};

/// List the regular files under `path` relative to it, sorted by name.
///
/// A single file yields one entry named after the file itself.
///
/// # Errors
///
/// Returns an error when the path cannot be inspected or traversed.
pub fn list_directory(path: &Path) -> FsOpsResult<IncludedFileList> {
    let metadata =
        fs::metadata(path).map_err(|source| FsOpsError::io("list_directory.stat", path, source))?;
    if metadata.is_file() {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| FsOpsError::Rejected {
                field: "path",
                reason: "no_file_name",
                value: Some(path.display().to_string()),
            })?;
        return Ok(std::iter::once(FileEntry::new(name, metadata.len())).collect());
    }

    let mut list = IncludedFileList::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry =
            entry.map_err(|source| FsOpsError::walk("list_directory.walk", path, source))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|source| FsOpsError::walk("list_directory.metadata", entry.path(), source))?
            .len();
        let relative = entry
            .path()
            .strip_prefix(path)
            .map_err(|_| FsOpsError::Rejected {
                field: "source_path",
                reason: "strip_prefix",
                value: Some(entry.path().to_string_lossy().into_owned()),
            })?
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        list.push(relative, size);
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_files_are_listed_with_forward_slashes() -> anyhow::Result<()> {
        let temp = tempfile::Builder::new().prefix("relgate-fsops-").tempdir()?;
        fs::create_dir_all(temp.path().join("Subs"))?;
        fs::write(temp.path().join("movie.mkv"), b"12345")?;
        fs::write(temp.path().join("Subs").join("movie.srt"), b"1")?;

        let list = list_directory(temp.path())?;
        let names: Vec<_> = list.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Subs/movie.srt", "movie.mkv"]);
        assert_eq!(list.total_size(), 6);
        Ok(())
    }

    #[test]
    fn single_file_lists_itself() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("movie.mkv");
        fs::write(&file, b"abc")?;
        let list = list_directory(&file)?;
        assert!(list.is_included("movie.mkv"));
        Ok(())
    }

    #[test]
    fn missing_path_is_an_io_error() {
        let err = list_directory(Path::new("/nonexistent/relgate")).expect_err("missing");
        assert!(matches!(err, FsOpsError::Io { .. }));
    }
}
