//! The capability every source backend implements.

use std::path::Path;

use async_trait::async_trait;
use relgate_core::{
    IncludedFileList, PipelineError, PipelineResult, ReleaseContents, ReleaseJob,
};
use relgate_fsops::{FileListValidator, read_metainfo};

use crate::automation::AutomationPolicy;

/// A pluggable indexer or content source.
///
/// Policy methods have default implementations built on the backend's
/// [`FileListValidator`]; backends override them only when their releases need
/// different treatment.
#[async_trait]
pub trait SourceBackend: Send + Sync {
    /// Registry name, matched against a job's announcement source name.
    fn name(&self) -> &str;

    /// Whether the backend has what it needs (credentials, endpoints) to run.
    fn is_enabled(&self) -> bool;

    /// Automation filter and stop settings.
    fn automation(&self) -> &AutomationPolicy;

    /// File-list policy used by the default checks.
    fn file_policy(&self) -> &FileListValidator;

    /// Download slot ceiling for this backend.
    fn maximum_parallel_downloads(&self) -> usize {
        1
    }

    /// Whether the backend fetches a metainfo file during the download stage.
    fn uses_torrent(&self) -> bool {
        true
    }

    /// Establish a session and refresh any catalog state.
    async fn login(&self) -> PipelineResult<()> {
        Ok(())
    }

    /// Enrich release name and size before downloading; lookups that find
    /// nothing are logged, not raised.
    async fn prepare_download(&self, job: &mut ReleaseJob) -> PipelineResult<()>;

    /// Fetch the metainfo for `job` into `destination`.
    async fn download_torrent(&self, job: &ReleaseJob, destination: &Path) -> PipelineResult<()> {
        let _ = (job, destination);
        Err(PipelineError::backend(
            self.name(),
            "download_torrent",
            "metainfo download not supported by this backend",
        ))
    }

    /// Files that make up the downloaded release.
    async fn included_file_list(&self, job: &ReleaseJob) -> PipelineResult<IncludedFileList> {
        metainfo_file_list(job)
    }

    /// Reject file lists that violate the release policy.
    fn check_file_list(&self, job: &ReleaseJob, list: &IncludedFileList) -> PipelineResult<()> {
        self.file_policy().check_video_count(job.is_dvd_image(), list)
    }

    /// Flag scene releases; never fails.
    fn detect_scene_release(&self, job: &mut ReleaseJob, list: &IncludedFileList) {
        if FileListValidator::is_scene_release(list) {
            job.set_scene_release();
        }
    }

    /// Split the materialised release into video and additional files.
    fn validate_extracted_release(
        &self,
        job: &ReleaseJob,
        list: &IncludedFileList,
    ) -> PipelineResult<ReleaseContents> {
        let path = job
            .release_upload_path
            .as_deref()
            .ok_or(PipelineError::MissingState {
                field: "release_upload_path",
            })?;
        let contents = self.file_policy().validate_directory(path, list)?;
        if contents.video_files.is_empty() {
            return Err(PipelineError::NoVideoFiles {
                path: path.to_path_buf(),
            });
        }
        Ok(contents)
    }

    /// Announcement id for `url` when the backend recognises it.
    async fn id_from_url(&self, url: &str) -> Option<String> {
        let _ = url;
        None
    }

    /// URL for an announcement id.
    fn url_from_id(&self, id: &str) -> String {
        id.to_string()
    }
}

/// File list read from the job's metainfo; empty when no metainfo is on disk.
///
/// # Errors
///
/// Returns an error when the metainfo exists but cannot be decoded.
pub fn metainfo_file_list(job: &ReleaseJob) -> PipelineResult<IncludedFileList> {
    match job.source_torrent_file_path.as_deref() {
        Some(path) if path.is_file() => Ok(read_metainfo(path)?.files),
        _ => Ok(IncludedFileList::new()),
    }
}
