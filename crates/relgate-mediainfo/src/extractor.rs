//! Runs the analysis tool and turns its output into validated media records.

use std::path::{Path, PathBuf};

use relgate_core::{MediaCharacteristics, PipelineError, PipelineResult};
use tokio::process::Command;
use tracing::{debug, info};

use crate::parse::{parse_report, validate_media};

/// Invokes `mediainfo <file>` and parses the report.
#[derive(Debug, Clone)]
pub struct MediaInfoExtractor {
    program: PathBuf,
}

impl Default for MediaInfoExtractor {
    fn default() -> Self {
        Self::new("mediainfo")
    }
}

impl MediaInfoExtractor {
    /// Use `program` as the analysis tool.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Configured tool path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Capture the raw report for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] when the tool cannot be spawned and
    /// [`PipelineError::ToolExecution`] when it exits unsuccessfully.
    pub async fn read_report(&self, path: &Path) -> PipelineResult<String> {
        info!(path = %path.display(), "reading media info");
        let output = Command::new(&self.program)
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| PipelineError::io("mediainfo.spawn", &self.program, source))?;

        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "mediainfo failed"
            );
            return Err(PipelineError::ToolExecution {
                program: self.program.clone(),
                path: path.to_path_buf(),
                exit_code: output.status.code(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Analyse one file and run the validation gate.
    ///
    /// `base` is stripped from the `Complete name` line of the report.
    ///
    /// # Errors
    ///
    /// Returns an error when the tool fails or the record does not pass the gate.
    pub async fn extract(
        &self,
        path: &Path,
        base: Option<&Path>,
    ) -> PipelineResult<MediaCharacteristics> {
        let report = self.read_report(path).await?;
        let record = parse_report(path, &report, base)?;
        validate_media(&record)?;
        Ok(record)
    }

    /// Analyse a sequence of files in order.
    ///
    /// With `keep_only_first_vob` only the first `.vob` segment is analysed, so
    /// the result may be shorter than `files`.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failure.
    pub async fn extract_all(
        &self,
        files: &[PathBuf],
        base: Option<&Path>,
        keep_only_first_vob: bool,
    ) -> PipelineResult<Vec<MediaCharacteristics>> {
        let mut seen_vob = false;
        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let is_vob = file
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("vob"));
            if is_vob && keep_only_first_vob {
                if seen_vob {
                    continue;
                }
                seen_vob = true;
            }
            records.push(self.extract(file, base).await?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let extractor = MediaInfoExtractor::new("/nonexistent/relgate-mediainfo");
        let err = extractor
            .read_report(Path::new("movie.mkv"))
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn default_program_is_mediainfo() {
        assert_eq!(
            MediaInfoExtractor::default().program(),
            Path::new("mediainfo")
        );
    }
}
