//! Release file-list policy.
//!
//! # Design
//! - Exclusion is applied through [`IncludedFileList::exclude_where`], so it only ever narrows.
//! - Extension checks are case-insensitive and work on `/`-separated relative names.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use relgate_core::{FileEntry, IncludedFileList, PipelineError, PipelineResult, ReleaseContents};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};

/// Preset token expanding to [`SKIP_FLUFF_PATTERNS`].
pub const SKIP_FLUFF_PRESET: &str = "@skip_fluff";
const SKIP_FLUFF_PATTERNS: &[&str] = &[
    "**/sample/**",
    "**/samples/**",
    "**/extras/**",
    "**/proof/**",
    "**/screens/**",
];

/// Extensions treated as uploadable video.
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["avi", "divx", "m2ts", "mkv", "mp4", "mpg", "vob"];
/// Extensions that travel with the video files.
pub const DEFAULT_ADDITIONAL_EXTENSIONS: &[&str] = &["bup", "idx", "ifo", "srt", "sub"];

pub(crate) static RAR_PART: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^.+\.(?:rar|r\d+)$").ok());

/// Decides which files of a release take part in validation.
#[derive(Debug, Clone)]
pub struct FileListValidator {
    video_extensions: BTreeSet<String>,
    additional_extensions: BTreeSet<String>,
    exclude: Option<GlobSet>,
}

impl FileListValidator {
    /// Build a validator from extension lists and exclusion globs.
    ///
    /// # Errors
    ///
    /// Returns an error when a pattern is blank or fails to compile.
    pub fn new<S: AsRef<str>>(
        video_extensions: &[S],
        additional_extensions: &[S],
        exclude_patterns: &[S],
    ) -> FsOpsResult<Self> {
        let mut patterns = Vec::new();
        for pattern in exclude_patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                return Err(FsOpsError::Rejected {
                    field: "exclude_patterns",
                    reason: "empty_pattern",
                    value: Some(pattern.to_string()),
                });
            }
            if pattern == SKIP_FLUFF_PRESET {
                patterns.extend(SKIP_FLUFF_PATTERNS.iter().map(ToString::to_string));
            } else {
                patterns.push(pattern.to_string());
            }
        }

        Ok(Self {
            video_extensions: normalise_extensions(video_extensions),
            additional_extensions: normalise_extensions(additional_extensions),
            exclude: build_globset(patterns)?,
        })
    }

    /// Whether `name` carries a video extension.
    #[must_use]
    pub fn is_video(&self, name: &str) -> bool {
        extension_of(name).is_some_and(|ext| self.video_extensions.contains(&ext))
    }

    /// Whether `name` carries an additional-file extension.
    #[must_use]
    pub fn is_additional(&self, name: &str) -> bool {
        extension_of(name).is_some_and(|ext| self.additional_extensions.contains(&ext))
    }

    /// Whether `name` is excluded by the sample rule or the exclusion globs.
    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        is_sample(name)
            || self
                .exclude
                .as_ref()
                .is_some_and(|globs| globs.is_match(Path::new(name)))
    }

    /// Exclude sample and fluff files; returns how many entries were excluded.
    pub fn apply_exclusions(&self, list: &mut IncludedFileList) -> usize {
        let excluded = list.exclude_where(|entry| self.is_excluded(&entry.name));
        if excluded > 0 {
            debug!(excluded, "excluded files from release");
        }
        excluded
    }

    /// Whether the included files look like a DVD or Blu-ray structure.
    #[must_use]
    pub fn has_disc_image_marker(&self, list: &IncludedFileList) -> bool {
        list.included().any(|entry| {
            let in_disc_dir = entry.name.split('/').any(|component| {
                component.eq_ignore_ascii_case("VIDEO_TS") || component.eq_ignore_ascii_case("BDMV")
            });
            in_disc_dir || matches!(entry.extension().as_deref(), Some("ifo" | "vob"))
        })
    }

    /// Number of included video files.
    #[must_use]
    pub fn count_videos(&self, list: &IncludedFileList) -> usize {
        list.included()
            .filter(|entry| self.is_video(&entry.name))
            .count()
    }

    /// Reject releases with more than one included video unless they are disc images.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MultipleVideoFiles`] when the count check fails.
    pub fn check_video_count(
        &self,
        is_disc_image: bool,
        list: &IncludedFileList,
    ) -> PipelineResult<()> {
        if is_disc_image {
            return Ok(());
        }
        let count = self.count_videos(list);
        if count > 1 {
            return Err(PipelineError::MultipleVideoFiles { count });
        }
        Ok(())
    }

    /// Whether the list holds more than one RAR part, which marks scene packaging.
    #[must_use]
    pub fn is_scene_release(list: &IncludedFileList) -> bool {
        let Some(pattern) = RAR_PART.as_ref() else {
            return false;
        };
        list.files()
            .iter()
            .filter(|entry| pattern.is_match(&entry.name))
            .take(2)
            .count()
            > 1
    }

    /// Classify the files present under `path` into videos and additional files.
    ///
    /// Entries the list marks as excluded are skipped, as are files matching the
    /// exclusion rules.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be traversed.
    pub fn validate_directory(
        &self,
        path: &Path,
        list: &IncludedFileList,
    ) -> FsOpsResult<ReleaseContents> {
        let mut contents = ReleaseContents::default();
        let mut entries = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry
                .map_err(|source| FsOpsError::walk("validate_directory.walk", path, source))?;
            if entry.file_type().is_file() {
                entries.push(entry.into_path());
            }
        }

        for file in entries {
            let relative = relative_name(path, &file);
            let excluded_by_list = list
                .files()
                .iter()
                .any(|entry| entry.name == relative && !entry.is_included());
            if excluded_by_list || self.is_excluded(&relative) {
                continue;
            }
            if self.is_video(&relative) {
                contents.video_files.push(file);
            } else if self.is_additional(&relative) {
                contents.additional_files.push(file);
            }
        }
        Ok(contents)
    }
}

impl Default for FileListValidator {
    fn default() -> Self {
        Self {
            video_extensions: normalise_extensions(DEFAULT_VIDEO_EXTENSIONS),
            additional_extensions: normalise_extensions(DEFAULT_ADDITIONAL_EXTENSIONS),
            exclude: None,
        }
    }
}

fn normalise_extensions<S: AsRef<str>>(extensions: &[S]) -> BTreeSet<String> {
    extensions
        .iter()
        .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn extension_of(name: &str) -> Option<String> {
    FileEntry::new(name, 0).extension()
}

fn is_sample(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem)
        .to_ascii_lowercase();
    stem.ends_with("sample")
}

fn relative_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: Vec<String>) -> FsOpsResult<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| FsOpsError::pattern("exclude_patterns", pattern.clone(), source))?,
        );
    }
    Ok(Some(builder.build().map_err(|source| {
        FsOpsError::pattern("exclude_patterns", "<set>".to_string(), source)
    })?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn list(names: &[&str]) -> IncludedFileList {
        names.iter().map(|name| FileEntry::new(*name, 1)).collect()
    }

    fn validator() -> anyhow::Result<FileListValidator> {
        Ok(FileListValidator::new(
            DEFAULT_VIDEO_EXTENSIONS,
            DEFAULT_ADDITIONAL_EXTENSIONS,
            &[SKIP_FLUFF_PRESET],
        )?)
    }

    #[test]
    fn scene_release_with_sample_passes_video_count() -> anyhow::Result<()> {
        let validator = validator()?;
        let mut files = list(&["movie.mkv", "movie.r01", "movie.rar", "sample.mkv"]);

        validator.apply_exclusions(&mut files);
        assert!(!files.is_included("sample.mkv"));
        assert!(FileListValidator::is_scene_release(&files));
        validator.check_video_count(false, &files)?;
        Ok(())
    }

    #[test]
    fn single_rar_is_not_scene() {
        let files = list(&["movie.rar", "movie.nfo"]);
        assert!(!FileListValidator::is_scene_release(&files));
        let upper = list(&["MOVIE.RAR", "MOVIE.R00"]);
        assert!(FileListValidator::is_scene_release(&upper));
    }

    #[test]
    fn multiple_videos_fail_unless_disc_image() -> anyhow::Result<()> {
        let validator = validator()?;
        let files = list(&["cd1.avi", "cd2.avi"]);
        let err = validator
            .check_video_count(false, &files)
            .expect_err("two videos should fail");
        assert!(matches!(err, PipelineError::MultipleVideoFiles { count: 2 }));
        validator.check_video_count(true, &files)?;
        Ok(())
    }

    #[test]
    fn skip_fluff_and_sample_stems_are_excluded() -> anyhow::Result<()> {
        let validator = validator()?;
        let mut files = list(&[
            "Movie/Movie.mkv",
            "Movie/Proof/proof.jpg",
            "Movie/Extras/interview.mkv",
            "Movie/movie-sample.mkv",
            "Movie/Movie.srt",
        ]);
        assert_eq!(validator.apply_exclusions(&mut files), 3);
        let remaining: Vec<_> = files.included().map(|entry| entry.name.as_str()).collect();
        assert_eq!(remaining, vec!["Movie/Movie.mkv", "Movie/Movie.srt"]);
        Ok(())
    }

    #[test]
    fn disc_markers_are_detected() {
        let validator = FileListValidator::default();
        assert!(validator.has_disc_image_marker(&list(&["Disc/VIDEO_TS/VTS_01_1.VOB"])));
        assert!(validator.has_disc_image_marker(&list(&["Disc/BDMV/index.bdmv"])));
        assert!(!validator.has_disc_image_marker(&list(&["movie.mkv"])));
    }

    #[test]
    fn blank_patterns_are_rejected() {
        let err = FileListValidator::new(&["mkv"], &["srt"], &[" "]).expect_err("blank pattern");
        assert!(matches!(err, FsOpsError::Rejected { .. }));
    }

    #[test]
    fn validate_directory_classifies_files() -> anyhow::Result<()> {
        let validator = validator()?;
        let temp = tempfile::Builder::new().prefix("relgate-fsops-").tempdir()?;
        let root = temp.path();
        fs::write(root.join("movie.mkv"), b"video")?;
        fs::write(root.join("movie.srt"), b"subs")?;
        fs::write(root.join("movie.nfo"), b"info")?;
        fs::write(root.join("sample.mkv"), b"video")?;

        let contents = validator.validate_directory(root, &IncludedFileList::new())?;
        assert_eq!(contents.video_files, vec![root.join("movie.mkv")]);
        assert_eq!(contents.additional_files, vec![root.join("movie.srt")]);
        Ok(())
    }
}
