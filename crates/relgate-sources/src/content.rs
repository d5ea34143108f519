//! Hand-off of fetched metainfo to the component that downloads the payload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use relgate_config::ClientSettings;
use relgate_core::{PipelineError, PipelineResult, ReleaseJob};
use relgate_fsops::{TorrentMetainfo, read_metainfo};
use tokio::time::Instant;
use tracing::{debug, info};

/// Turns a metainfo file into a payload on local disk.
#[async_trait]
pub trait ContentClient: Send + Sync {
    /// Fetch the payload described by `metainfo` and return its root path.
    async fn fetch(&self, job: &ReleaseJob, metainfo: &Path) -> PipelineResult<PathBuf>;
}

/// Client that drops metainfo into a torrent client's watch directory and
/// waits for the payload to show up under the client's download root.
#[derive(Debug, Clone)]
pub struct WatchDirClient {
    watch_dir: PathBuf,
    download_root: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
}

impl WatchDirClient {
    /// Build a client with explicit timings.
    #[must_use]
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        download_root: impl Into<PathBuf>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            download_root: download_root.into(),
            timeout,
            poll_interval,
        }
    }

    /// Build a client from the configured client section.
    #[must_use]
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(
            &settings.watch_dir,
            &settings.download_root,
            Duration::from_secs(settings.timeout_secs),
            Duration::from_millis(settings.poll_interval_ms),
        )
    }

    fn payload_root(&self, meta: &TorrentMetainfo) -> PathBuf {
        self.download_root.join(&meta.name)
    }

    fn is_complete(&self, meta: &TorrentMetainfo) -> bool {
        let root = self.payload_root(meta);
        meta.files.files().iter().all(|entry| {
            let path = if meta.single_file {
                root.clone()
            } else {
                root.join(&entry.name)
            };
            std::fs::metadata(&path).is_ok_and(|info| info.is_file() && info.len() >= entry.size)
        })
    }
}

#[async_trait]
impl ContentClient for WatchDirClient {
    async fn fetch(&self, job: &ReleaseJob, metainfo: &Path) -> PipelineResult<PathBuf> {
        let meta = read_metainfo(metainfo)?;
        let root = self.payload_root(&meta);
        if self.is_complete(&meta) {
            debug!(job_id = %job.id, path = %root.display(), "payload already present");
            return Ok(root);
        }

        tokio::fs::create_dir_all(&self.watch_dir)
            .await
            .map_err(|err| PipelineError::io("client.create_watch_dir", &self.watch_dir, err))?;
        let queued = self.watch_dir.join(format!("{}.torrent", job.id));
        tokio::fs::copy(metainfo, &queued)
            .await
            .map_err(|err| PipelineError::io("client.queue_metainfo", &queued, err))?;
        info!(
            job_id = %job.id,
            metainfo = %queued.display(),
            "metainfo handed to torrent client"
        );

        let started = Instant::now();
        loop {
            if self.is_complete(&meta) {
                info!(job_id = %job.id, path = %root.display(), "payload complete");
                return Ok(root);
            }
            if started.elapsed() >= self.timeout {
                return Err(PipelineError::ContentTimeout {
                    path: root,
                    waited_secs: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
