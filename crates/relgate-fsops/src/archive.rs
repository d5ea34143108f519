//! Unpacks scene RAR sets into the upload tree with an external `unrar`.
//!
//! # Design
//! - Only the first volume of each set is handed to the tool; it follows the
//!   `.r00`/`.partNN.rar` chain itself.
//! - Volumes are never placed in the upload tree; only what they contain is.

use std::fs;
use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use relgate_core::IncludedFileList;
use tracing::{debug, warn};

use crate::error::{FsOpsError, FsOpsResult};
use crate::validator::RAR_PART;

/// Program used when no `unrar` path is configured.
pub const DEFAULT_UNRAR_PROGRAM: &str = "unrar";

static NUMBERED_VOLUME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\.part(\d+)\.rar$").ok());

/// Whether `name` is a RAR volume (`.rar`, `.r00`, `.r01`, ...).
#[must_use]
pub fn is_rar_volume(name: &str) -> bool {
    RAR_PART.as_ref().is_some_and(|pattern| pattern.is_match(name))
}

/// Names of the included entries that open a RAR set, in list order.
///
/// `movie.rar` and `movie.part1.rar` open a set; `movie.r00` and
/// `movie.part2.rar` continue one.
#[must_use]
pub fn first_rar_volumes(list: &IncludedFileList) -> Vec<String> {
    list.included()
        .filter(|entry| entry.extension().as_deref() == Some("rar"))
        .filter(|entry| {
            let numbered = NUMBERED_VOLUME
                .as_ref()
                .and_then(|pattern| pattern.captures(&entry.name))
                .and_then(|captures| captures.get(1))
                .and_then(|number| number.as_str().parse::<u32>().ok());
            numbered.is_none_or(|number| number == 1)
        })
        .map(|entry| entry.name.clone())
        .collect()
}

/// Runs `unrar x` for one archive at a time.
#[derive(Debug, Clone)]
pub struct RarExtractor {
    program: PathBuf,
}

impl Default for RarExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_UNRAR_PROGRAM)
    }
}

impl RarExtractor {
    /// Extractor invoking `program`; a bare name is resolved through `PATH`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Configured program.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Extract `archive` into `destination`, overwriting files already there.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the tool cannot be started or the destination
    /// cannot be created, and [`FsOpsError::Extraction`] when the tool exits
    /// unsuccessfully.
    pub fn extract(&self, archive: &Path, destination: &Path) -> FsOpsResult<()> {
        fs::create_dir_all(destination)
            .map_err(|source| FsOpsError::io("archive.create_dir", destination, source))?;
        let mut target = destination.as_os_str().to_owned();
        target.push(MAIN_SEPARATOR_STR);

        debug!(
            program = %self.program.display(),
            archive = %archive.display(),
            "extracting rar set"
        );
        let output = Command::new(&self.program)
            .args(["x", "-o+", "-y", "-idq"])
            .arg(archive)
            .arg(&target)
            .output()
            .map_err(|source| FsOpsError::io("archive.spawn", &self.program, source))?;
        if !output.status.success() {
            warn!(
                archive = %archive.display(),
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "unrar failed"
            );
            return Err(FsOpsError::Extraction {
                program: self.program.clone(),
                archive: archive.to_path_buf(),
                exit_code: output.status.code(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_core::FileEntry;

    fn list(names: &[&str]) -> IncludedFileList {
        names.iter().map(|name| FileEntry::new(*name, 1)).collect()
    }

    #[test]
    fn first_volumes_open_each_set() {
        let files = list(&[
            "movie.rar",
            "movie.r00",
            "movie.r01",
            "Extras/extras.part01.rar",
            "Extras/extras.part02.rar",
            "movie.nfo",
        ]);
        assert_eq!(
            first_rar_volumes(&files),
            vec!["movie.rar".to_string(), "Extras/extras.part01.rar".to_string()]
        );
    }

    #[test]
    fn excluded_sets_are_not_extracted() {
        let mut files = list(&["movie.rar", "Sample/sample.rar"]);
        files.exclude_where(|entry| entry.name.starts_with("Sample/"));
        assert_eq!(first_rar_volumes(&files), vec!["movie.rar".to_string()]);
    }

    #[test]
    fn volumes_are_recognised_case_insensitively() {
        assert!(is_rar_volume("Movie.RAR"));
        assert!(is_rar_volume("movie.r17"));
        assert!(!is_rar_volume("movie.mkv"));
        assert!(!is_rar_volume("library.rar.txt"));
    }

    #[test]
    fn missing_program_is_an_io_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let extractor = RarExtractor::new(temp.path().join("no-such-unrar"));
        let err = extractor
            .extract(&temp.path().join("movie.rar"), &temp.path().join("out"))
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected spawn failure"))?;
        assert!(matches!(err, FsOpsError::Io { operation: "archive.spawn", .. }));
        Ok(())
    }
}
