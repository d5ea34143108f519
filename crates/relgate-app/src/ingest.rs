//! Turns announcement descriptors dropped into the watch directory into jobs.
//!
//! # Design
//! - A descriptor is consumed only after its job is persisted; anything that
//!   is not understood, or duplicates a known announcement, stays on disk.
//! - JSON descriptors are tried first, then raw torrent metainfo.
//! - New job ids go onto the bounded runner queue; a full queue applies
//!   backpressure to the scan.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use relgate_core::{PipelineError, PipelineResult, ReleaseJob};
use relgate_events::{Event, EventBus};
use relgate_fsops::{TorrentMetainfo, parse_metainfo};
use relgate_runtime::{JobStore, RuntimeError};
use relgate_sources::TORRENT;
use relgate_telemetry::Metrics;
use serde::{Deserialize, Deserializer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const FORMAT_JSON: &str = "json";
const FORMAT_TORRENT: &str = "torrent";

/// JSON announcement; keys outside the allow-list are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnnouncementDescriptor {
    /// IMDb identifier.
    #[serde(default)]
    pub imdb_id: Option<String>,
    /// Movie title.
    #[serde(default)]
    pub title: Option<String>,
    /// Release year, as a number or a numeric string.
    #[serde(default, deserialize_with = "deserialize_year")]
    pub year: Option<u16>,
    /// Announcement identifier.
    #[serde(default)]
    pub announcement_id: Option<String>,
    /// Backend the announcement belongs to.
    #[serde(default)]
    pub announcement_source_name: Option<String>,
    /// Cover art location.
    #[serde(default)]
    pub cover_art_url: Option<String>,
    /// Announced codec.
    #[serde(default)]
    pub codec: Option<String>,
    /// Announced container.
    #[serde(default)]
    pub container: Option<String>,
    /// Announced source medium.
    #[serde(default)]
    pub source: Option<String>,
    /// Remaster or edition title.
    #[serde(default)]
    pub remaster_title: Option<String>,
    /// Announced resolution.
    #[serde(default)]
    pub resolution: Option<String>,
}

impl AnnouncementDescriptor {
    /// Build the waiting job described by this announcement.
    ///
    /// `file_name` names the descriptor and stands in for a missing
    /// announcement id.
    #[must_use]
    pub fn into_job(self, file_name: &str) -> ReleaseJob {
        let announcement_id = non_empty(self.announcement_id)
            .unwrap_or_else(|| format!("announcement:{file_name}"));
        let source_name = non_empty(self.announcement_source_name).unwrap_or_default();
        let mut job = ReleaseJob::new(announcement_id, source_name);
        job.imdb_id = non_empty(self.imdb_id);
        job.title = non_empty(self.title);
        job.year = self.year;
        job.cover_art_url = non_empty(self.cover_art_url);
        job.codec = non_empty(self.codec);
        job.container = non_empty(self.container);
        job.source = non_empty(self.source);
        job.remaster_title = non_empty(self.remaster_title);
        job.resolution = non_empty(self.resolution);
        job
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum YearValue {
    Number(u16),
    Text(String),
}

fn deserialize_year<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<YearValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(YearValue::Number(year)) => Ok(Some(year)),
        Some(YearValue::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<u16>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom("year is not a number"))
        }
    }
}

/// Parse a JSON announcement descriptor.
///
/// # Errors
///
/// Returns the JSON error when the bytes are not an announcement object.
pub fn parse_descriptor(bytes: &[u8]) -> Result<AnnouncementDescriptor, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// What happened to one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A job was created and the descriptor removed.
    Created(Uuid),
    /// The announcement already has a job; the descriptor was left in place.
    Duplicate {
        /// Job that owns the announcement.
        existing: Uuid,
    },
    /// No format matched; the descriptor was left in place.
    Unrecognised,
}

/// Tally of one watch directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Jobs created, in descriptor order.
    pub created: Vec<Uuid>,
    /// Descriptors naming an announcement that already has a job.
    pub duplicates: usize,
    /// Descriptors no format understood.
    pub unrecognised: usize,
    /// Descriptors that hit an IO or persistence failure.
    pub failed: usize,
}

enum Parsed {
    Json(ReleaseJob),
    Torrent {
        job: ReleaseJob,
        bytes: Vec<u8>,
    },
}

/// Scans the watch directory and creates jobs.
#[derive(Debug)]
pub struct AnnouncementIngester {
    watch_dir: PathBuf,
    work_root: PathBuf,
    store: Arc<JobStore>,
    queue: mpsc::Sender<Uuid>,
    events: EventBus,
    metrics: Option<Metrics>,
}

impl AnnouncementIngester {
    /// Build an ingester feeding `queue`.
    #[must_use]
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        work_root: impl Into<PathBuf>,
        store: Arc<JobStore>,
        queue: mpsc::Sender<Uuid>,
        events: EventBus,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            work_root: work_root.into(),
            store,
            queue,
            events,
            metrics,
        }
    }

    /// Directory being scanned.
    #[must_use]
    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Process every regular file in the watch directory, sorted by name.
    ///
    /// Per-descriptor failures are logged and counted, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error when the watch directory cannot be created or listed.
    pub async fn scan(&self) -> AppResult<ScanSummary> {
        tokio::fs::create_dir_all(&self.watch_dir)
            .await
            .map_err(|err| AppError::io("ingest.create_dir", Some(self.watch_dir.clone()), err))?;

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.watch_dir)
            .await
            .map_err(|err| AppError::io("ingest.read_dir", Some(self.watch_dir.clone()), err))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| AppError::io("ingest.read_dir", Some(self.watch_dir.clone()), err))?
        {
            let is_file = entry
                .file_type()
                .await
                .is_ok_and(|file_type| file_type.is_file());
            if is_file {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut summary = ScanSummary::default();
        for path in files {
            match self.ingest_file(&path).await {
                Ok(IngestOutcome::Created(id)) => summary.created.push(id),
                Ok(IngestOutcome::Duplicate { .. }) => summary.duplicates += 1,
                Ok(IngestOutcome::Unrecognised) => summary.unrecognised += 1,
                Err(err) => {
                    summary.failed += 1;
                    error!(
                        path = %path.display(),
                        error = %err.describe(),
                        "announcement ingest failed"
                    );
                }
            }
        }
        if !summary.created.is_empty() {
            info!(
                created = summary.created.len(),
                duplicates = summary.duplicates,
                unrecognised = summary.unrecognised,
                "announcement scan finished"
            );
        }
        Ok(summary)
    }

    /// Turn one descriptor into a job.
    ///
    /// # Errors
    ///
    /// Returns an error when the descriptor cannot be read or the job cannot
    /// be persisted.
    pub async fn ingest_file(&self, path: &Path) -> PipelineResult<IngestOutcome> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| PipelineError::io("ingest.read", path, err))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(parsed) = parse(&bytes, &file_name) else {
            warn!(path = %path.display(), "announcement descriptor not recognised; leaving it in place");
            return Ok(IngestOutcome::Unrecognised);
        };

        let (mut job, format, metainfo) = match parsed {
            Parsed::Json(job) => (job, FORMAT_JSON, None),
            Parsed::Torrent { job, bytes } => (job, FORMAT_TORRENT, Some(bytes)),
        };

        if let Some(existing) = self.store.find_by_announcement(&job.announcement_id).await {
            warn!(
                path = %path.display(),
                announcement_id = %job.announcement_id,
                existing = %existing.id,
                "announcement already has a job; leaving descriptor in place"
            );
            return Ok(IngestOutcome::Duplicate {
                existing: existing.id,
            });
        }

        let job_dir = self.work_root.join(job.id.to_string());
        if let Some(bytes) = metainfo {
            tokio::fs::create_dir_all(&job_dir)
                .await
                .map_err(|err| PipelineError::io("ingest.create_job_dir", &job_dir, err))?;
            let target = job_dir.join(format!("{}.torrent", job.id));
            tokio::fs::write(&target, bytes)
                .await
                .map_err(|err| PipelineError::io("ingest.write_metainfo", &target, err))?;
            job.source_torrent_file_path = Some(target);
        }

        match self.store.insert(&job).await {
            Ok(()) => {}
            Err(RuntimeError::DuplicateAnnouncement { existing, .. }) => {
                let _ = tokio::fs::remove_dir_all(&job_dir).await;
                warn!(
                    path = %path.display(),
                    existing = %existing,
                    "announcement already has a job; leaving descriptor in place"
                );
                return Ok(IngestOutcome::Duplicate { existing });
            }
            Err(err) => return Err(err.into()),
        }

        if let Err(err) = tokio::fs::remove_file(path).await {
            error!(
                path = %path.display(),
                job_id = %job.id,
                error = %err,
                "job persisted but descriptor could not be removed"
            );
        }

        info!(
            job_id = %job.id,
            announcement_id = %job.announcement_id,
            source = %job.announcement_source_name,
            format,
            "job created from announcement"
        );
        self.events.publish(Event::JobCreated {
            job_id: job.id,
            announcement_id: job.announcement_id.clone(),
            source: job.announcement_source_name.clone(),
        });
        if let Some(metrics) = &self.metrics {
            metrics.inc_announcement(format);
        }
        if self.queue.send(job.id).await.is_err() {
            warn!(job_id = %job.id, "job queue closed; job stays waiting until restart");
        }
        Ok(IngestOutcome::Created(job.id))
    }

    /// Scan every `interval` until the task is aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.scan().await {
                    error!(
                        path = %self.watch_dir.display(),
                        error = %err,
                        "announcement scan failed"
                    );
                }
            }
        })
    }
}

fn parse(bytes: &[u8], file_name: &str) -> Option<Parsed> {
    match parse_descriptor(bytes) {
        Ok(descriptor) => return Some(Parsed::Json(descriptor.into_job(file_name))),
        Err(err) => debug!(file_name, error = %err, "not a JSON announcement"),
    }
    match parse_metainfo(bytes) {
        Ok(meta) => Some(Parsed::Torrent {
            job: torrent_job(&meta, file_name),
            bytes: bytes.to_vec(),
        }),
        Err(err) => {
            debug!(file_name, error = %err, "not a torrent descriptor");
            None
        }
    }
}

fn torrent_job(meta: &TorrentMetainfo, file_name: &str) -> ReleaseJob {
    let mut job = ReleaseJob::new(format!("torrent:{file_name}"), TORRENT);
    job.release_name = Some(meta.name.clone());
    job.size = Some(meta.total_size());
    job
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_test_support::fixtures::{SHAWSHANK_DESCRIPTOR, TorrentBuilder};

    #[test]
    fn shawshank_descriptor_maps_to_job_fields() -> anyhow::Result<()> {
        let job = parse_descriptor(SHAWSHANK_DESCRIPTOR.as_bytes())?.into_job("shawshank.json");
        assert_eq!(job.imdb_id.as_deref(), Some("tt0111161"));
        assert_eq!(job.title.as_deref(), Some("The Shawshank Redemption"));
        assert_eq!(job.year, Some(1994));
        assert_eq!(job.announcement_id, "announcement:shawshank.json");
        assert!(job.announcement_source_name.is_empty());
        Ok(())
    }

    #[test]
    fn year_accepts_numeric_strings_and_ignores_unknown_keys() -> anyhow::Result<()> {
        let descriptor = parse_descriptor(
            br#"{"Year":"2010","AnnouncementId":"https://indexer.example/details/7",
                "AnnouncementSourceName":"prowlarr","JobRunningState":"Failed"}"#,
        )?;
        assert_eq!(descriptor.year, Some(2010));
        let job = descriptor.into_job("x.json");
        assert_eq!(job.announcement_id, "https://indexer.example/details/7");
        assert_eq!(job.announcement_source_name, "prowlarr");
        assert_eq!(job.state, relgate_core::JobState::WaitingForStart);
        Ok(())
    }

    #[test]
    fn non_numeric_year_is_rejected() {
        assert!(parse_descriptor(br#"{"Year":"soon"}"#).is_err());
        assert!(parse_descriptor(b"[1, 2]").is_err());
    }

    #[test]
    fn torrent_bytes_become_torrent_jobs() -> anyhow::Result<()> {
        let bytes = TorrentBuilder::new("Movie.2010.720p")
            .file(&["movie.mkv"], 700)
            .file(&["movie.nfo"], 1)
            .build()?;
        let Some(Parsed::Torrent { job, .. }) = parse(&bytes, "movie.torrent") else {
            anyhow::bail!("expected a torrent descriptor");
        };
        assert_eq!(job.announcement_id, "torrent:movie.torrent");
        assert_eq!(job.announcement_source_name, TORRENT);
        assert_eq!(job.release_name.as_deref(), Some("Movie.2010.720p"));
        assert_eq!(job.size, Some(701));
        Ok(())
    }

    #[test]
    fn garbage_matches_no_format() {
        assert!(parse(b"just some notes", "notes.txt").is_none());
    }
}
