//! Drives release jobs through the pipeline stages.
//!
//! # Design
//! - A job is owned by at most one runner task; the claim set enforces it.
//! - Every state change is persisted before the next stage starts. Jobs cut
//!   off mid-stage are failed when the store reopens and wait for a manual
//!   retry.
//! - Each backend logs in behind its own session lock; a slow login holds up
//!   only jobs on that backend.
//! - Stop requests, stop points and the automation filter are checked only at
//!   stage boundaries.
//! - Scene RAR sets are unpacked into the release directory; their volumes
//!   are not copied.
//! - Fatal errors end at this boundary: the job is failed with the error's
//!   description and nothing propagates to the caller.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use relgate_core::{
    IncludedFileList, JobState, ParkReason, PipelineError, PipelineResult, ReleaseJob,
};
use relgate_events::{Event, EventBus};
use relgate_fsops::{RarExtractor, first_rar_volumes, is_rar_volume, materialize_release};
use relgate_mediainfo::MediaInfoExtractor;
use relgate_runtime::JobStore;
use relgate_sources::{BackendRegistry, ContentClient, SourceBackend};
use relgate_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::limiter::ConcurrencyLimiter;

const RELEASE_DIR: &str = "release";

/// How a call to [`JobRunner::run_job`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The job reached a terminal state.
    Finished(JobState),
    /// Another task already owns the job.
    Busy,
    /// The job is not in the store.
    Missing,
    /// The job was not waiting for a runner.
    NotWaiting(JobState),
    /// No enabled backend is registered under the job's source name; the job
    /// stays waiting.
    NoBackend,
}

/// Collaborators of the runner.
#[derive(Clone)]
pub struct RunnerDeps {
    /// Backends keyed by source name.
    pub registry: BackendRegistry,
    /// Job persistence.
    pub store: Arc<JobStore>,
    /// Per-backend download slots.
    pub limiter: ConcurrencyLimiter,
    /// Payload fetcher for torrent-based backends.
    pub content: Arc<dyn ContentClient>,
    /// Media analysis.
    pub mediainfo: MediaInfoExtractor,
    /// Unpacks scene RAR sets during extraction.
    pub archives: RarExtractor,
    /// Lifecycle events.
    pub events: EventBus,
    /// Pipeline metrics.
    pub metrics: Option<Metrics>,
    /// Root of the per-job work directories.
    pub work_root: PathBuf,
}

/// Moves jobs from `WaitingForStart` to a terminal state.
pub struct JobRunner {
    registry: BackendRegistry,
    store: Arc<JobStore>,
    limiter: ConcurrencyLimiter,
    content: Arc<dyn ContentClient>,
    mediainfo: MediaInfoExtractor,
    archives: RarExtractor,
    events: EventBus,
    metrics: Option<Metrics>,
    work_root: PathBuf,
    queue: mpsc::Sender<Uuid>,
    sessions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<bool>>>>,
    degraded: Mutex<HashSet<String>>,
    claimed: Mutex<HashSet<Uuid>>,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("registry", &self.registry)
            .field("work_root", &self.work_root)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Parked,
}

struct Claim<'a> {
    claimed: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl JobRunner {
    /// Build a runner; `queue` is the sender side of the worker queue and is
    /// used to re-enqueue retried jobs.
    #[must_use]
    pub fn new(deps: RunnerDeps, queue: mpsc::Sender<Uuid>) -> Self {
        Self {
            registry: deps.registry,
            store: deps.store,
            limiter: deps.limiter,
            content: deps.content,
            mediainfo: deps.mediainfo,
            archives: deps.archives,
            events: deps.events,
            metrics: deps.metrics,
            work_root: deps.work_root,
            queue,
            sessions: Mutex::new(HashMap::new()),
            degraded: Mutex::new(HashSet::new()),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Job persistence used by the runner.
    #[must_use]
    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Work directory of `job_id`.
    #[must_use]
    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.work_root.join(job_id.to_string())
    }

    /// Run one job until it finishes, parks or fails.
    pub async fn run_job(&self, id: Uuid) -> RunOutcome {
        let Some(_claim) = self.claim(id) else {
            debug!(job_id = %id, "job already owned by another runner task");
            return RunOutcome::Busy;
        };
        let Some(mut job) = self.store.get(id).await else {
            warn!(job_id = %id, "queued job not found in store");
            return RunOutcome::Missing;
        };
        if job.state != JobState::WaitingForStart {
            debug!(job_id = %id, state = %job.state, "job not waiting; skipping");
            return RunOutcome::NotWaiting(job.state);
        }
        let Some(backend) = self.registry.enabled(&job.announcement_source_name) else {
            warn!(
                job_id = %id,
                source = %job.announcement_source_name,
                "no enabled backend for job; leaving it waiting"
            );
            return RunOutcome::NoBackend;
        };

        info!(
            job_id = %id,
            backend = backend.name(),
            release = job.display_name(),
            "job started"
        );
        if let Err(err) = self.drive(&mut job, backend.as_ref()).await {
            self.record_failure(&mut job, &err).await;
        }
        RunOutcome::Finished(job.state)
    }

    /// Reset a failed or parked job to `WaitingForStart` as a manual job and
    /// queue it again.
    ///
    /// # Errors
    ///
    /// Returns an error when the job is unknown or not failed or parked, or
    /// when the queue is closed.
    pub async fn retry(&self, id: Uuid) -> AppResult<ReleaseJob> {
        let before = self
            .store
            .get(id)
            .await
            .map(|job| job.state)
            .ok_or(AppError::Runtime {
                operation: "runner.retry",
                source: relgate_runtime::RuntimeError::NotFound { job_id: id },
            })?;
        let job = self
            .store
            .reset_for_retry(id)
            .await
            .map_err(|err| AppError::runtime("runner.retry", err))?;
        self.events.publish(Event::JobStateChanged {
            job_id: id,
            from: before,
            to: job.state,
        });
        info!(job_id = %id, from = %before, "job reset for manual retry");
        self.queue.send(id).await.map_err(|_| AppError::QueueClosed)?;
        Ok(job)
    }

    /// Ask a job to stop at its next stage boundary.
    ///
    /// # Errors
    ///
    /// Returns an error when the job is unknown or the flag cannot be persisted.
    pub async fn request_stop(&self, id: Uuid) -> AppResult<ReleaseJob> {
        let job = self
            .store
            .request_stop(id)
            .await
            .map_err(|err| AppError::runtime("runner.request_stop", err))?;
        info!(job_id = %id, state = %job.state, "stop requested");
        Ok(job)
    }

    /// Queue every waiting job found in the store.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::QueueClosed`] when the queue is gone.
    pub async fn enqueue_waiting(&self) -> AppResult<usize> {
        let waiting = self.store.waiting().await;
        let count = waiting.len();
        for id in waiting {
            self.queue.send(id).await.map_err(|_| AppError::QueueClosed)?;
        }
        if count > 0 {
            info!(count, "queued waiting jobs from store");
        }
        Ok(count)
    }

    /// Spawn `count` workers draining `receiver`; they exit when every sender
    /// is dropped.
    pub fn spawn_workers(
        self: &Arc<Self>,
        receiver: mpsc::Receiver<Uuid>,
        count: usize,
    ) -> Vec<JoinHandle<()>> {
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        (0..count.max(1))
            .map(|worker| {
                let runner = Arc::clone(self);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    debug!(worker, "runner worker started");
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(id) = next else {
                            break;
                        };
                        let outcome = runner.run_job(id).await;
                        debug!(worker, job_id = %id, ?outcome, "job run finished");
                    }
                    debug!(worker, "runner worker stopped");
                })
            })
            .collect()
    }

    fn claim(&self, id: Uuid) -> Option<Claim<'_>> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        claimed.insert(id).then_some(Claim {
            claimed: &self.claimed,
            id,
        })
    }

    async fn drive(&self, job: &mut ReleaseJob, backend: &dyn SourceBackend) -> PipelineResult<()> {
        if let Some(reason) = backend.automation().filter_rejection(job) {
            return self.park(job, reason).await;
        }

        if self.enter(job, backend, JobState::Downloading).await? == Flow::Parked {
            return Ok(());
        }
        self.download(job, backend).await?;

        if self.enter(job, backend, JobState::Extracting).await? == Flow::Parked {
            return Ok(());
        }
        let Some(list) = self.extract(job, backend).await? else {
            return Ok(());
        };

        if self.enter(job, backend, JobState::Validating).await? == Flow::Parked {
            return Ok(());
        }
        let video_files = self.validate(job, backend, &list).await?;

        if self.enter(job, backend, JobState::ReadyForUpload).await? == Flow::Parked {
            return Ok(());
        }
        self.hand_off(job, &video_files);
        Ok(())
    }

    /// Stage boundary: honour stop requests and stop points, then move to `next`.
    async fn enter(
        &self,
        job: &mut ReleaseJob,
        backend: &dyn SourceBackend,
        next: JobState,
    ) -> PipelineResult<Flow> {
        self.refresh_stop_flag(job).await;
        if job.stop_requested {
            self.park(job, ParkReason::StopRequested).await?;
            return Ok(Flow::Parked);
        }
        if let Some(reason) = backend.automation().stop_before(job, next) {
            self.park(job, reason).await?;
            return Ok(Flow::Parked);
        }

        let from = job.state;
        job.transition(next)?;
        self.store.update(job).await?;
        self.events.publish(Event::JobStateChanged {
            job_id: job.id,
            from,
            to: next,
        });
        if let Some(metrics) = &self.metrics {
            metrics.inc_stage(next.as_str(), "entered");
        }
        info!(job_id = %job.id, backend = backend.name(), stage = %next, "stage entered");
        Ok(Flow::Continue)
    }

    async fn download(&self, job: &mut ReleaseJob, backend: &dyn SourceBackend) -> PipelineResult<()> {
        self.ensure_logged_in(backend).await?;

        match backend.prepare_download(job).await {
            Ok(()) => {}
            Err(err) if err.kind().is_soft() => {
                warn!(
                    job_id = %job.id,
                    backend = backend.name(),
                    error = %err.describe(),
                    "download preparation found nothing; continuing"
                );
            }
            Err(err) => return Err(err),
        }
        self.store.update(job).await?;

        if !backend.uses_torrent() {
            return Ok(());
        }

        let _permit = self.limiter.acquire(backend.name()).await;
        let destination = self.job_dir(job.id).join(format!("{}.torrent", job.id));
        backend.download_torrent(job, &destination).await?;
        job.source_torrent_file_path = Some(destination.clone());
        job.touch();
        self.store.update(job).await?;
        debug!(job_id = %job.id, path = %destination.display(), "metainfo stored");

        let payload = self.content.fetch(job, &destination).await?;
        job.release_download_path = Some(payload);
        job.touch();
        self.store.update(job).await?;
        Ok(())
    }

    /// Returns `None` when the job was parked on a multiple-video release.
    async fn extract(
        &self,
        job: &mut ReleaseJob,
        backend: &dyn SourceBackend,
    ) -> PipelineResult<Option<IncludedFileList>> {
        let mut list = backend.included_file_list(job).await?;
        let policy = backend.file_policy();
        policy.apply_exclusions(&mut list);
        if policy.has_disc_image_marker(&list) {
            job.is_dvd_image = true;
        }

        match backend.check_file_list(job, &list) {
            Ok(()) => {}
            Err(PipelineError::MultipleVideoFiles { count })
                if backend.automation().parks_on_multiple_videos(job) =>
            {
                self.park(job, ParkReason::MultipleVideos { count }).await?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        }
        backend.detect_scene_release(job, &list);

        let source = job
            .release_download_path
            .clone()
            .ok_or(PipelineError::MissingState {
                field: "release_download_path",
            })?;
        let destination = release_path(&self.work_root, job.id, &release_dir_name(job));
        let archives = first_rar_volumes(&list);
        let mut loose = list.clone();
        if !archives.is_empty() {
            loose.exclude_where(|entry| is_rar_volume(&entry.name));
        }
        let summary = materialize(source.clone(), loose, destination.clone()).await?;
        for archive in &archives {
            let volume = if source.is_file() {
                source.clone()
            } else {
                source.join(archive)
            };
            unpack(self.archives.clone(), volume, destination.clone()).await?;
        }
        info!(
            job_id = %job.id,
            linked = summary.linked,
            copied = summary.copied,
            archives = archives.len(),
            path = %destination.display(),
            "release materialised"
        );

        job.release_upload_path = Some(destination);
        job.touch();
        self.store.update(job).await?;
        Ok(Some(list))
    }

    async fn validate(
        &self,
        job: &mut ReleaseJob,
        backend: &dyn SourceBackend,
        list: &IncludedFileList,
    ) -> PipelineResult<Vec<PathBuf>> {
        let contents = backend.validate_extracted_release(job, list)?;
        let base = job.release_upload_path.clone();
        let media = match self
            .mediainfo
            .extract_all(&contents.video_files, base.as_deref(), job.is_dvd_image())
            .await
        {
            Ok(media) => {
                if let Some(metrics) = &self.metrics {
                    for _ in &media {
                        metrics.inc_media_analysis("ok");
                    }
                }
                media
            }
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_media_analysis("failed");
                }
                return Err(err);
            }
        };
        debug!(
            job_id = %job.id,
            videos = contents.video_files.len(),
            additional = contents.additional_files.len(),
            "release validated"
        );
        job.media = media;
        job.touch();
        self.store.update(job).await?;
        Ok(contents.video_files)
    }

    fn hand_off(&self, job: &ReleaseJob, video_files: &[PathBuf]) {
        let release_path = job
            .release_upload_path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        self.events.publish(Event::ReadyForUpload {
            job_id: job.id,
            release_path,
            video_files: video_files
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
        });
        info!(job_id = %job.id, release = job.display_name(), "release ready for upload");
    }

    fn session(&self, backend: &str) -> Arc<tokio::sync::Mutex<bool>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(backend.to_string()).or_default())
    }

    async fn ensure_logged_in(&self, backend: &dyn SourceBackend) -> PipelineResult<()> {
        let session = self.session(backend.name());
        let mut logged_in = session.lock().await;
        if *logged_in {
            return Ok(());
        }
        match backend.login().await {
            Ok(()) => {
                *logged_in = true;
                self.events.publish(Event::BackendLoggedIn {
                    backend: backend.name().to_string(),
                });
                info!(backend = backend.name(), "backend logged in");
                self.set_degraded(backend.name(), false);
                Ok(())
            }
            Err(err) => {
                self.set_degraded(backend.name(), true);
                Err(err)
            }
        }
    }

    fn set_degraded(&self, backend: &str, degraded: bool) {
        let snapshot = {
            let mut set = self.degraded.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = if degraded {
                set.insert(backend.to_string())
            } else {
                set.remove(backend)
            };
            if !changed {
                return;
            }
            let mut names: Vec<String> = set.iter().cloned().collect();
            names.sort();
            names
        };
        warn!(degraded = ?snapshot, "backend health changed");
        self.events.publish(Event::HealthChanged { degraded: snapshot });
    }

    async fn refresh_stop_flag(&self, job: &mut ReleaseJob) {
        if let Some(stored) = self.store.get(job.id).await {
            if stored.stop_requested {
                job.stop_requested = true;
            }
        }
    }

    async fn park(&self, job: &mut ReleaseJob, reason: ParkReason) -> PipelineResult<()> {
        let stage = job.state;
        job.park(reason.clone())?;
        self.store.update(job).await?;
        if let Some(metrics) = &self.metrics {
            metrics.inc_stage(stage.as_str(), "parked");
        }
        info!(job_id = %job.id, stage = %stage, reason = %reason.describe(), "job parked");
        self.events.publish(Event::JobParked {
            job_id: job.id,
            reason,
        });
        Ok(())
    }

    async fn record_failure(&self, job: &mut ReleaseJob, err: &PipelineError) {
        let stage = job.state;
        let kind = err.kind();
        let message = err.describe();
        error!(job_id = %job.id, stage = %stage, kind = kind.as_str(), error = %message, "job failed");

        if let Err(transition) = job.fail(message.clone()) {
            error!(job_id = %job.id, error = %transition.describe(), "could not mark job failed");
            return;
        }
        if let Err(persist) = self.store.update(job).await {
            error!(job_id = %job.id, error = %persist, "could not persist failed job");
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_stage(stage.as_str(), "failed");
            metrics.inc_job_failed(kind.as_str());
        }
        self.events.publish(Event::JobFailed {
            job_id: job.id,
            kind: kind.as_str().to_string(),
            message,
        });
    }
}

async fn materialize(
    source: PathBuf,
    list: IncludedFileList,
    destination: PathBuf,
) -> PipelineResult<relgate_fsops::MaterializeSummary> {
    let target = destination.clone();
    tokio::task::spawn_blocking(move || materialize_release(&source, &list, &destination))
        .await
        .map_err(|err| PipelineError::io("materialize.join", target, std::io::Error::other(err)))?
        .map_err(PipelineError::from)
}

async fn unpack(
    extractor: RarExtractor,
    archive: PathBuf,
    destination: PathBuf,
) -> PipelineResult<()> {
    let target = archive.clone();
    tokio::task::spawn_blocking(move || extractor.extract(&archive, &destination))
        .await
        .map_err(|err| PipelineError::io("unpack.join", target, std::io::Error::other(err)))?
        .map_err(PipelineError::from)
}

/// Directory name for the materialised release; path separators are replaced
/// and an empty name falls back to the job id.
fn release_dir_name(job: &ReleaseJob) -> String {
    let name: String = job
        .display_name()
        .trim()
        .chars()
        .map(|ch| if matches!(ch, '/' | '\\') { '_' } else { ch })
        .collect();
    if name.is_empty() || name == "." || name == ".." {
        job.id.to_string()
    } else {
        name
    }
}

/// Path of `name` relative to the job's release directory.
#[must_use]
pub fn release_path(work_root: &Path, job_id: Uuid, name: &str) -> PathBuf {
    work_root
        .join(job_id.to_string())
        .join(RELEASE_DIR)
        .join(name)
}
