//! Backend for content that is already on local disk.

use async_trait::async_trait;
use relgate_config::SourceSettings;
use relgate_core::{IncludedFileList, PipelineError, PipelineResult, ReleaseJob};
use relgate_fsops::{FileListValidator, list_directory};
use tracing::info;

use crate::automation::{AutomationPolicy, PolicyError};
use crate::backend::SourceBackend;

/// Registry name of the backend.
pub const FILE: &str = "file";

/// Jobs whose `release_download_path` already holds the release.
#[derive(Debug)]
pub struct FileBackend {
    max_parallel: usize,
    automation: AutomationPolicy,
    files: FileListValidator,
}

impl FileBackend {
    /// Build the backend from its settings.
    ///
    /// # Errors
    ///
    /// Returns an error when the automation settings are invalid.
    pub fn from_settings(
        settings: &SourceSettings,
        files: FileListValidator,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            max_parallel: settings.max_parallel_downloads(),
            automation: AutomationPolicy::from_settings(settings)?,
            files,
        })
    }
}

#[async_trait]
impl SourceBackend for FileBackend {
    fn name(&self) -> &str {
        FILE
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn automation(&self) -> &AutomationPolicy {
        &self.automation
    }

    fn file_policy(&self) -> &FileListValidator {
        &self.files
    }

    fn maximum_parallel_downloads(&self) -> usize {
        self.max_parallel
    }

    fn uses_torrent(&self) -> bool {
        false
    }

    async fn prepare_download(&self, job: &mut ReleaseJob) -> PipelineResult<()> {
        let path = job
            .release_download_path
            .clone()
            .ok_or(PipelineError::MissingState {
                field: "release_download_path",
            })?;

        if job.release_name.is_none() {
            let name = if path.is_file() {
                path.file_stem()
            } else {
                path.file_name()
            };
            job.release_name = name.map(|name| name.to_string_lossy().into_owned());
        }
        if job.size.is_none() {
            job.size = Some(list_directory(&path)?.total_size());
        }
        job.touch();
        info!(
            backend = FILE,
            job_id = %job.id,
            path = %path.display(),
            "using local release"
        );
        Ok(())
    }

    async fn included_file_list(&self, job: &ReleaseJob) -> PipelineResult<IncludedFileList> {
        let path = job
            .release_download_path
            .as_deref()
            .ok_or(PipelineError::MissingState {
                field: "release_download_path",
            })?;
        Ok(list_directory(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_test_support::fixtures::{temp_dir, write_file};

    fn backend() -> anyhow::Result<FileBackend> {
        Ok(FileBackend::from_settings(
            &SourceSettings::default(),
            FileListValidator::default(),
        )?)
    }

    #[tokio::test]
    async fn directory_name_becomes_release_name() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-sources-")?;
        let release = temp.path().join("Movie.2010.720p");
        write_file(&release, "movie.mkv", b"12345")?;
        write_file(&release, "movie.srt", b"1")?;

        let backend = backend()?;
        let mut job = ReleaseJob::new("local:1", FILE);
        job.release_download_path = Some(release.clone());
        backend.prepare_download(&mut job).await?;

        assert_eq!(job.release_name.as_deref(), Some("Movie.2010.720p"));
        assert_eq!(job.size, Some(6));
        assert!(!backend.uses_torrent());
        let list = backend.included_file_list(&job).await?;
        assert_eq!(list.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn single_file_uses_its_stem() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-sources-")?;
        let file = write_file(temp.path(), "Movie.2010.mkv", b"123")?;
        let mut job = ReleaseJob::new("local:2", FILE);
        job.release_download_path = Some(file);
        backend()?.prepare_download(&mut job).await?;
        assert_eq!(job.release_name.as_deref(), Some("Movie.2010"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_path_is_missing_state() -> anyhow::Result<()> {
        let mut job = ReleaseJob::new("local:3", FILE);
        let err = backend()?
            .prepare_download(&mut job)
            .await
            .expect_err("no path");
        assert!(matches!(err, PipelineError::MissingState { .. }));
        Ok(())
    }
}
