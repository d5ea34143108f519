//! File lists describing the contents of a downloaded release.

use std::path::PathBuf;

/// One file inside a torrent or release directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the release root, `/`-separated.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    included: bool,
}

impl FileEntry {
    /// Build an included entry.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            included: true,
        }
    }

    /// Whether the file still takes part in validation.
    #[must_use]
    pub const fn is_included(&self) -> bool {
        self.included
    }

    /// Lower-cased extension without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let file_name = self.file_name();
        let (stem, extension) = file_name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(extension.to_ascii_lowercase())
    }

    /// Final path component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Ordered list of files with monotone exclusion.
///
/// There is no way to re-include an entry: once excluded it stays out for the
/// lifetime of the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludedFileList {
    files: Vec<FileEntry>,
}

impl IncludedFileList {
    /// Empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Append an included entry.
    pub fn push(&mut self, name: impl Into<String>, size: u64) {
        self.files.push(FileEntry::new(name, size));
    }

    /// All entries in discovery order.
    #[must_use]
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Entries still included.
    pub fn included(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter(|entry| entry.is_included())
    }

    /// Exclude every entry matching `predicate`; returns how many were newly excluded.
    pub fn exclude_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&FileEntry) -> bool,
    {
        let mut excluded = 0;
        for entry in &mut self.files {
            if entry.included && predicate(entry) {
                entry.included = false;
                excluded += 1;
            }
        }
        excluded
    }

    /// Whether `name` is present and included.
    #[must_use]
    pub fn is_included(&self, name: &str) -> bool {
        self.files
            .iter()
            .any(|entry| entry.name == name && entry.included)
    }

    /// Number of entries, included or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of the sizes of all entries.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|entry| entry.size).sum()
    }
}

impl FromIterator<FileEntry> for IncludedFileList {
    fn from_iter<T: IntoIterator<Item = FileEntry>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Files found in a materialised release, split by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseContents {
    /// Video files, in path order.
    pub video_files: Vec<PathBuf>,
    /// Subtitles, disc metadata and other files that travel with the videos.
    pub additional_files: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_list() -> IncludedFileList {
        ["Movie/movie.mkv", "Movie/sample.mkv", "Movie/movie.nfo"]
            .into_iter()
            .map(|name| FileEntry::new(name, 10))
            .collect()
    }

    #[test]
    fn exclusion_is_monotone() {
        let mut list = sample_list();
        let first = list.exclude_where(|entry| entry.file_name().starts_with("sample"));
        assert_eq!(first, 1);
        let second = list.exclude_where(|entry| entry.file_name().starts_with("sample"));
        assert_eq!(second, 0);
        assert!(!list.is_included("Movie/sample.mkv"));
        assert_eq!(list.included().count(), 2);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn extension_is_lowercased_and_ignores_dotfiles() {
        assert_eq!(FileEntry::new("a/B.MKV", 1).extension().as_deref(), Some("mkv"));
        assert_eq!(FileEntry::new("a/.hidden", 1).extension(), None);
        assert_eq!(FileEntry::new("noext", 1).extension(), None);
    }

    #[test]
    fn total_size_counts_every_entry() {
        assert_eq!(sample_list().total_size(), 30);
    }
}
