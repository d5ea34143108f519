//! Directory of JSON job records with an in-memory index.
//!
//! # Design
//! - One pretty-printed `<id>.json` per job, replaced atomically through a
//!   temporary file and rename.
//! - The index lock is held across the disk write so the file and the map
//!   never disagree.
//! - Jobs found mid-stage at open were cut off by a shutdown; they are
//!   failed so a manual retry can pick them up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use relgate_core::{JobOrigin, JobState, ReleaseJob};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{RuntimeError, RuntimeResult};

const RECORD_EXTENSION: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";
/// Error recorded on jobs that were mid-stage when the process stopped.
pub const INTERRUPTED_ERROR: &str = "interrupted: the pipeline stopped while the job was running";

/// Durable store of release jobs.
#[derive(Debug)]
pub struct JobStore {
    dir: PathBuf,
    jobs: RwLock<HashMap<Uuid, ReleaseJob>>,
}

impl JobStore {
    /// Open the store rooted at `dir`, creating it when missing and loading
    /// every record found.
    ///
    /// Unreadable records are skipped with a warning. Jobs left in
    /// `Downloading`, `Extracting` or `Validating` are moved to `Failed` with
    /// [`INTERRUPTED_ERROR`].
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created or listed, or an
    /// interrupted job cannot be rewritten.
    pub async fn open(dir: impl Into<PathBuf>) -> RuntimeResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| RuntimeError::io("store.create_dir", &dir, err))?;

        let mut jobs = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|err| RuntimeError::io("store.read_dir", &dir, err))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| RuntimeError::io("store.read_dir", &dir, err))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match read_record(&path).await {
                Ok(job) => {
                    jobs.insert(job.id, job);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable job record"),
            }
        }

        let store = Self {
            dir,
            jobs: RwLock::new(jobs),
        };
        let interrupted = store.fail_interrupted().await?;
        info!(
            path = %store.dir.display(),
            jobs = store.jobs.read().await.len(),
            interrupted,
            "job store opened"
        );
        Ok(store)
    }

    async fn fail_interrupted(&self) -> RuntimeResult<usize> {
        let mut jobs = self.jobs.write().await;
        let mut count = 0;
        for job in jobs.values_mut() {
            if !job.state.is_in_flight() {
                continue;
            }
            let state = job.state;
            job.fail(INTERRUPTED_ERROR)
                .map_err(|source| RuntimeError::Transition { source })?;
            self.write_record(job).await?;
            warn!(job_id = %job.id, %state, "job was interrupted mid-stage; marked failed");
            count += 1;
        }
        Ok(count)
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a new job.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::DuplicateAnnouncement`] when another job already
    /// owns the announcement, or an IO error when the record cannot be written.
    pub async fn insert(&self, job: &ReleaseJob) -> RuntimeResult<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs
            .values()
            .find(|other| other.announcement_id == job.announcement_id)
        {
            return Err(RuntimeError::DuplicateAnnouncement {
                announcement_id: job.announcement_id.clone(),
                existing: existing.id,
            });
        }
        self.write_record(job).await?;
        jobs.insert(job.id, job.clone());
        debug!(job_id = %job.id, announcement_id = %job.announcement_id, "job inserted");
        Ok(())
    }

    /// Replace the stored copy of an existing job.
    ///
    /// A stop request already recorded for the job is kept even when `job`
    /// was read before the request arrived.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotFound`] for unknown jobs, or an IO error when
    /// the record cannot be written.
    pub async fn update(&self, job: &ReleaseJob) -> RuntimeResult<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get(&job.id)
            .ok_or(RuntimeError::NotFound { job_id: job.id })?;
        let mut record = job.clone();
        record.stop_requested |= stored.stop_requested;
        self.write_record(&record).await?;
        jobs.insert(record.id, record);
        Ok(())
    }

    /// Snapshot of one job.
    pub async fn get(&self, id: Uuid) -> Option<ReleaseJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<ReleaseJob> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    /// Ids of jobs waiting for a runner, oldest first.
    pub async fn waiting(&self) -> Vec<Uuid> {
        self.list()
            .await
            .into_iter()
            .filter(|job| job.state == JobState::WaitingForStart)
            .map(|job| job.id)
            .collect()
    }

    /// Job created for `announcement_id`, if any.
    pub async fn find_by_announcement(&self, announcement_id: &str) -> Option<ReleaseJob> {
        self.jobs
            .read()
            .await
            .values()
            .find(|job| job.announcement_id == announcement_id)
            .cloned()
    }

    /// Ask the runner to stop the job at its next stage boundary.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotFound`] for unknown jobs, or an IO error when
    /// the record cannot be written.
    pub async fn request_stop(&self, id: Uuid) -> RuntimeResult<ReleaseJob> {
        self.modify(id, |job| {
            job.stop_requested = true;
            job.touch();
            Ok(())
        })
        .await
    }

    /// Put a failed or parked job back to `WaitingForStart` as a manual job.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Transition`] when the job is not failed or parked.
    pub async fn reset_for_retry(&self, id: Uuid) -> RuntimeResult<ReleaseJob> {
        self.modify(id, |job| {
            job.transition(JobState::WaitingForStart)
                .map_err(|source| RuntimeError::Transition { source })?;
            job.origin = JobOrigin::Manual;
            Ok(())
        })
        .await
    }

    /// Delete a job that reached a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ActiveJob`] while the job is still in the pipeline.
    pub async fn remove(&self, id: Uuid) -> RuntimeResult<ReleaseJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get(&id).ok_or(RuntimeError::NotFound { job_id: id })?;
        if !job.state.is_terminal() {
            return Err(RuntimeError::ActiveJob {
                job_id: id,
                state: job.state,
            });
        }
        let path = self.record_path(id);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| RuntimeError::io("store.remove", &path, err))?;
        let removed = jobs.remove(&id).ok_or(RuntimeError::NotFound { job_id: id })?;
        info!(job_id = %id, "job removed");
        Ok(removed)
    }

    async fn modify<F>(&self, id: Uuid, change: F) -> RuntimeResult<ReleaseJob>
    where
        F: FnOnce(&mut ReleaseJob) -> RuntimeResult<()>,
    {
        let mut jobs = self.jobs.write().await;
        let mut job = jobs
            .get(&id)
            .cloned()
            .ok_or(RuntimeError::NotFound { job_id: id })?;
        change(&mut job)?;
        self.write_record(&job).await?;
        jobs.insert(id, job.clone());
        Ok(job)
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    async fn write_record(&self, job: &ReleaseJob) -> RuntimeResult<()> {
        let path = self.record_path(job.id);
        let body = serde_json::to_vec_pretty(job)
            .map_err(|err| RuntimeError::json("store.encode", &path, err))?;
        let mut staging = path.clone().into_os_string();
        staging.push(TEMP_SUFFIX);
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, body)
            .await
            .map_err(|err| RuntimeError::io("store.write", &staging, err))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|err| RuntimeError::io("store.rename", &path, err))?;
        Ok(())
    }
}

async fn read_record(path: &Path) -> RuntimeResult<ReleaseJob> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| RuntimeError::io("store.read", path, err))?;
    serde_json::from_slice(&bytes).map_err(|err| RuntimeError::json("store.decode", path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_core::ParkReason;
    use relgate_test_support::fixtures::{sample_job, temp_dir};

    #[tokio::test]
    async fn records_survive_reopen() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-store-")?;
        let job = sample_job("prowlarr");
        {
            let store = JobStore::open(temp.path()).await?;
            store.insert(&job).await?;
        }
        let store = JobStore::open(temp.path()).await?;
        assert_eq!(store.get(job.id).await, Some(job.clone()));
        assert_eq!(store.waiting().await, vec![job.id]);
        assert!(temp.path().join(format!("{}.json", job.id)).is_file());
        Ok(())
    }

    #[tokio::test]
    async fn announcement_ids_are_unique() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-store-")?;
        let store = JobStore::open(temp.path()).await?;
        let first = sample_job("prowlarr");
        store.insert(&first).await?;

        let second = sample_job("prowlarr");
        let err = store.insert(&second).await.expect_err("duplicate");
        assert!(matches!(
            err,
            RuntimeError::DuplicateAnnouncement { existing, .. } if existing == first.id
        ));
        assert_eq!(store.list().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn update_requires_existing_job() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-store-")?;
        let store = JobStore::open(temp.path()).await?;
        let err = store
            .update(&sample_job("prowlarr"))
            .await
            .expect_err("unknown");
        assert!(matches!(err, RuntimeError::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn active_jobs_cannot_be_removed() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-store-")?;
        let store = JobStore::open(temp.path()).await?;
        let mut job = sample_job("prowlarr");
        store.insert(&job).await?;

        let err = store.remove(job.id).await.expect_err("still waiting");
        assert!(matches!(err, RuntimeError::ActiveJob { .. }));

        job.fail("boom")?;
        store.update(&job).await?;
        store.remove(job.id).await?;
        assert!(store.get(job.id).await.is_none());
        assert!(!temp.path().join(format!("{}.json", job.id)).exists());
        Ok(())
    }

    #[tokio::test]
    async fn retry_resets_failed_job_as_manual() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-store-")?;
        let store = JobStore::open(temp.path()).await?;
        let mut job = sample_job("prowlarr");
        store.insert(&job).await?;

        let err = store.reset_for_retry(job.id).await.expect_err("not failed");
        assert!(matches!(err, RuntimeError::Transition { .. }));

        job.park(ParkReason::StopRequested)?;
        store.update(&job).await?;
        let retried = store.reset_for_retry(job.id).await?;
        assert_eq!(retried.state, JobState::WaitingForStart);
        assert_eq!(retried.origin, JobOrigin::Manual);
        assert!(retried.park_reason.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn stop_request_is_persisted() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-store-")?;
        let store = JobStore::open(temp.path()).await?;
        let job = sample_job("prowlarr");
        store.insert(&job).await?;
        store.request_stop(job.id).await?;

        let reopened = JobStore::open(temp.path()).await?;
        assert!(reopened.get(job.id).await.is_some_and(|job| job.stop_requested));
        Ok(())
    }

    #[tokio::test]
    async fn stale_copies_keep_the_stop_request() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-store-")?;
        let store = JobStore::open(temp.path()).await?;
        let mut job = sample_job("prowlarr");
        store.insert(&job).await?;
        store.request_stop(job.id).await?;

        job.transition(JobState::Downloading)?;
        store.update(&job).await?;
        let stored = store.get(job.id).await.expect("job stored");
        assert!(stored.stop_requested);
        assert_eq!(stored.state, JobState::Downloading);
        Ok(())
    }

    #[tokio::test]
    async fn interrupted_jobs_fail_on_reopen() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-store-")?;
        let mut job = sample_job("prowlarr");
        {
            let store = JobStore::open(temp.path()).await?;
            store.insert(&job).await?;
            job.transition(JobState::Downloading)?;
            store.update(&job).await?;
        }

        let store = JobStore::open(temp.path()).await?;
        let recovered = store.get(job.id).await.expect("job stored");
        assert_eq!(recovered.state, JobState::Failed);
        assert_eq!(recovered.last_error.as_deref(), Some(INTERRUPTED_ERROR));
        assert!(store.waiting().await.is_empty());

        let retried = store.reset_for_retry(job.id).await?;
        assert_eq!(retried.state, JobState::WaitingForStart);
        assert_eq!(store.waiting().await, vec![job.id]);

        let reopened = JobStore::open(temp.path()).await?;
        assert_eq!(
            reopened.get(job.id).await.map(|job| job.state),
            Some(JobState::WaitingForStart)
        );
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_records_are_skipped() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-store-")?;
        std::fs::write(temp.path().join("broken.json"), b"{not json")?;
        std::fs::write(temp.path().join("notes.txt"), b"ignored")?;
        let store = JobStore::open(temp.path()).await?;
        assert!(store.list().await.is_empty());
        Ok(())
    }
}
