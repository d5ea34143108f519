//! Backend for jobs created from metainfo dropped into the watch directory.

use std::path::Path;

use async_trait::async_trait;
use relgate_config::SourceSettings;
use relgate_core::{PipelineError, PipelineResult, ReleaseJob};
use relgate_fsops::{FileListValidator, read_metainfo};
use tracing::debug;

use crate::automation::{AutomationPolicy, PolicyError};
use crate::backend::SourceBackend;

/// Registry name of the backend, also the source name of metainfo descriptors.
pub const TORRENT: &str = "torrent";

/// Jobs whose metainfo was captured at ingest.
#[derive(Debug)]
pub struct TorrentFileBackend {
    max_parallel: usize,
    automation: AutomationPolicy,
    files: FileListValidator,
}

impl TorrentFileBackend {
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

fn captured_metainfo(job: &ReleaseJob) -> PipelineResult<&Path> {
    job.source_torrent_file_path
        .as_deref()
        .ok_or(PipelineError::MissingState {
            field: "source_torrent_file_path",
        })
}

#[async_trait]
impl SourceBackend for TorrentFileBackend {
    fn name(&self) -> &str {
        TORRENT
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

    async fn prepare_download(&self, job: &mut ReleaseJob) -> PipelineResult<()> {
        let meta = read_metainfo(captured_metainfo(job)?)?;
        if job.release_name.is_none() {
            job.release_name = Some(meta.name.clone());
        }
        if job.size.is_none() {
            job.size = Some(meta.total_size());
        }
        job.touch();
        Ok(())
    }

    async fn download_torrent(&self, job: &ReleaseJob, destination: &Path) -> PipelineResult<()> {
        let source = captured_metainfo(job)?;
        if source == destination {
            debug!(job_id = %job.id, "metainfo already in place");
            return Ok(());
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| PipelineError::io("download.create_dir", parent, err))?;
        }
        tokio::fs::copy(source, destination)
            .await
            .map_err(|err| PipelineError::io("download.copy", source, err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_test_support::fixtures::{TorrentBuilder, temp_dir, write_file};

    #[tokio::test]
    async fn metainfo_supplies_name_size_and_files() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-sources-")?;
        let bytes = TorrentBuilder::new("Movie.2010.720p")
            .file(&["movie.mkv"], 900)
            .file(&["movie.nfo"], 10)
            .build()?;
        let metainfo = write_file(temp.path(), "in.torrent", &bytes)?;

        let backend =
            TorrentFileBackend::from_settings(&SourceSettings::default(), FileListValidator::default())?;
        let mut job = ReleaseJob::new("torrent:in.torrent", TORRENT);
        job.source_torrent_file_path = Some(metainfo);
        backend.prepare_download(&mut job).await?;
        assert_eq!(job.release_name.as_deref(), Some("Movie.2010.720p"));
        assert_eq!(job.size, Some(910));

        let destination = temp.path().join("job").join("job.torrent");
        backend.download_torrent(&job, &destination).await?;
        assert_eq!(std::fs::read(&destination)?, bytes);

        let list = backend.included_file_list(&job).await?;
        assert!(list.is_included("movie.mkv"));
        Ok(())
    }
}
