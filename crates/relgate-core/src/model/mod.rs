//! Domain models for release jobs.
//!
//! # Design
//! - Jobs are plain data; only the runner and the active backend mutate them.
//! - State changes go through [`ReleaseJob::transition`] so forward-only ordering holds.

mod files;
mod media;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

pub use files::{FileEntry, IncludedFileList, ReleaseContents};
pub use media::MediaCharacteristics;

/// Running state of a release job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created and waiting for a runner.
    WaitingForStart,
    /// Metainfo and payload are being fetched.
    Downloading,
    /// File list is being inspected and materialised.
    Extracting,
    /// Extracted release is being validated.
    Validating,
    /// Release passed every gate and awaits the upload step.
    ReadyForUpload,
    /// A fatal error stopped the job.
    Failed,
    /// Automatic progression was halted without an error.
    Parked,
}

impl JobState {
    /// Stable lowercase identifier used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WaitingForStart => "waiting_for_start",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Validating => "validating",
            Self::ReadyForUpload => "ready_for_upload",
            Self::Failed => "failed",
            Self::Parked => "parked",
        }
    }

    /// Whether no further automatic progress happens from this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ReadyForUpload | Self::Failed | Self::Parked)
    }

    /// Whether a runner was working on the job in this state.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Downloading | Self::Extracting | Self::Validating)
    }

    /// The stage that follows this one on the happy path.
    #[must_use]
    pub const fn next_stage(self) -> Option<Self> {
        match self {
            Self::WaitingForStart => Some(Self::Downloading),
            Self::Downloading => Some(Self::Extracting),
            Self::Extracting => Some(Self::Validating),
            Self::Validating => Some(Self::ReadyForUpload),
            Self::ReadyForUpload | Self::Failed | Self::Parked => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Failed | Self::Parked, Self::WaitingForStart) => true,
            (from, Self::Failed | Self::Parked) => !from.is_terminal(),
            (from, to) => from.next_stage() == Some(to),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a job entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobOrigin {
    /// Created from an announcement; subject to automation policy.
    #[default]
    Automatic,
    /// Started or retried by an operator; automation stops do not apply.
    Manual,
}

/// Stage boundary at which automatic jobs may be halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPoint {
    /// Halt before the metainfo is fetched.
    BeforeDownloading,
    /// Halt before the file list is inspected.
    BeforeExtracting,
    /// Halt before media validation.
    BeforeValidating,
    /// Halt before the job is handed to the upload step.
    BeforeUploading,
}

impl StopPoint {
    /// State the job would enter right after this boundary.
    #[must_use]
    pub const fn guarded_state(self) -> JobState {
        match self {
            Self::BeforeDownloading => JobState::Downloading,
            Self::BeforeExtracting => JobState::Extracting,
            Self::BeforeValidating => JobState::Validating,
            Self::BeforeUploading => JobState::ReadyForUpload,
        }
    }

    /// Settings spelling of the stop point.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeDownloading => "beforedownloading",
            Self::BeforeExtracting => "beforeextracting",
            Self::BeforeValidating => "beforevalidating",
            Self::BeforeUploading => "beforeuploading",
        }
    }
}

/// Raised when a stop point setting is not recognised.
#[derive(Debug, Error)]
#[error("unknown stop point")]
pub struct UnknownStopPoint {
    /// Offending settings value.
    pub value: String,
}

impl FromStr for StopPoint {
    type Err = UnknownStopPoint;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "beforedownloading" => Ok(Self::BeforeDownloading),
            "beforeextracting" => Ok(Self::BeforeExtracting),
            "beforevalidating" => Ok(Self::BeforeValidating),
            "beforeuploading" => Ok(Self::BeforeUploading),
            _ => Err(UnknownStopPoint {
                value: value.to_string(),
            }),
        }
    }
}

/// Why a job was parked instead of progressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ParkReason {
    /// The backend's automatic job filter rejected the job.
    FilteredOut {
        /// Filter expression that did not match.
        expression: String,
    },
    /// A configured stop point was reached.
    StopPoint {
        /// Boundary that halted the job.
        point: StopPoint,
    },
    /// The release holds several videos and the backend asks to stop on that.
    MultipleVideos {
        /// Number of included video files.
        count: usize,
    },
    /// An operator asked the job to stop.
    StopRequested,
}

impl ParkReason {
    /// Operator-facing summary.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::FilteredOut { expression } => {
                format!("automatic job filter did not match ({expression})")
            }
            Self::StopPoint { point } => format!("stopped at {}", point.as_str()),
            Self::MultipleVideos { count } => {
                format!("release contains {count} video files")
            }
            Self::StopRequested => "stop requested".to_string(),
        }
    }
}

/// The unit of work moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseJob {
    /// Internal identifier.
    pub id: Uuid,
    /// Identifier of the announcement; may itself be a URL.
    pub announcement_id: String,
    /// Backend the announcement came from.
    pub announcement_source_name: String,
    /// IMDb identifier (`tt…`).
    pub imdb_id: Option<String>,
    /// Movie title.
    pub title: Option<String>,
    /// Release year.
    pub year: Option<u16>,
    /// Scene or group release name.
    pub release_name: Option<String>,
    /// Announced codec.
    pub codec: Option<String>,
    /// Announced container.
    pub container: Option<String>,
    /// Announced source medium.
    pub source: Option<String>,
    /// Remaster or edition title.
    pub remaster_title: Option<String>,
    /// Announced resolution.
    pub resolution: Option<String>,
    /// Cover art location.
    pub cover_art_url: Option<String>,
    /// Payload size in bytes.
    pub size: Option<u64>,
    /// Local metainfo path.
    pub source_torrent_file_path: Option<PathBuf>,
    /// Where the downloaded payload lives.
    pub release_download_path: Option<PathBuf>,
    /// Where the vetted release is materialised for upload.
    pub release_upload_path: Option<PathBuf>,
    /// Scene heuristic flag.
    pub is_scene_release: bool,
    /// Disc-image flag; set from the file list or the announced codec.
    pub is_dvd_image: bool,
    /// Current running state.
    pub state: JobState,
    /// How the job entered the pipeline.
    #[serde(default)]
    pub origin: JobOrigin,
    /// Operator asked the job to stop at the next boundary.
    #[serde(default)]
    pub stop_requested: bool,
    /// Description of the failure that moved the job to `Failed`.
    pub last_error: Option<String>,
    /// Why the job was parked.
    pub park_reason: Option<ParkReason>,
    /// Media records of the validated video files.
    #[serde(default)]
    pub media: Vec<MediaCharacteristics>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ReleaseJob {
    /// Build a new job waiting for a runner.
    #[must_use]
    pub fn new(announcement_id: impl Into<String>, source_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            announcement_id: announcement_id.into(),
            announcement_source_name: source_name.into(),
            imdb_id: None,
            title: None,
            year: None,
            release_name: None,
            codec: None,
            container: None,
            source: None,
            remaster_title: None,
            resolution: None,
            cover_art_url: None,
            size: None,
            source_torrent_file_path: None,
            release_download_path: None,
            release_upload_path: None,
            is_scene_release: false,
            is_dvd_image: false,
            state: JobState::WaitingForStart,
            origin: JobOrigin::Automatic,
            stop_requested: false,
            last_error: None,
            park_reason: None,
            media: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the release is a full disc structure.
    #[must_use]
    pub fn is_dvd_image(&self) -> bool {
        self.is_dvd_image
            || self
                .codec
                .as_deref()
                .is_some_and(|codec| codec.eq_ignore_ascii_case("dvd5") || codec.eq_ignore_ascii_case("dvd9"))
    }

    /// Flag the job as a scene release.
    pub fn set_scene_release(&mut self) {
        self.is_scene_release = true;
        self.touch();
    }

    /// Whether automation policy applies to this job.
    #[must_use]
    pub const fn is_automatic(&self) -> bool {
        matches!(self.origin, JobOrigin::Automatic)
    }

    /// Human-friendly label for logs.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.release_name
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or(&self.announcement_id)
    }

    /// Move the job to `next`, rejecting skipped or backward stages.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTransition`] when the move is not allowed.
    pub fn transition(&mut self, next: JobState) -> PipelineResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                job_id: self.id,
                from: self.state,
                to: next,
            });
        }
        if next == JobState::WaitingForStart {
            self.last_error = None;
            self.park_reason = None;
            self.stop_requested = false;
        }
        self.state = next;
        self.touch();
        Ok(())
    }

    /// Record a fatal error and move to `Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTransition`] when the job is already terminal.
    pub fn fail(&mut self, message: impl Into<String>) -> PipelineResult<()> {
        self.transition(JobState::Failed)?;
        self.last_error = Some(message.into());
        Ok(())
    }

    /// Park the job with the given reason.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTransition`] when the job is already terminal.
    pub fn park(&mut self, reason: ParkReason) -> PipelineResult<()> {
        self.transition(JobState::Parked)?;
        self.park_reason = Some(reason);
        Ok(())
    }

    /// Refresh the mutation timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward_one_stage() {
        assert!(JobState::WaitingForStart.can_transition_to(JobState::Downloading));
        assert!(JobState::Downloading.can_transition_to(JobState::Extracting));
        assert!(JobState::Validating.can_transition_to(JobState::ReadyForUpload));
        assert!(!JobState::WaitingForStart.can_transition_to(JobState::Extracting));
        assert!(!JobState::Extracting.can_transition_to(JobState::Downloading));
        assert!(!JobState::ReadyForUpload.can_transition_to(JobState::WaitingForStart));
    }

    #[test]
    fn failure_and_park_reachable_from_active_states_only() {
        for state in [
            JobState::WaitingForStart,
            JobState::Downloading,
            JobState::Extracting,
            JobState::Validating,
        ] {
            assert!(state.can_transition_to(JobState::Failed));
            assert!(state.can_transition_to(JobState::Parked));
        }
        assert!(!JobState::ReadyForUpload.can_transition_to(JobState::Failed));
        assert!(!JobState::Failed.can_transition_to(JobState::Parked));
    }

    #[test]
    fn retry_clears_failure_details() -> anyhow::Result<()> {
        let mut job = ReleaseJob::new("https://indexer.example/details/1", "prowlarr");
        job.transition(JobState::Downloading)?;
        job.fail("no download link")?;
        assert_eq!(job.last_error.as_deref(), Some("no download link"));

        job.transition(JobState::WaitingForStart)?;
        assert_eq!(job.state, JobState::WaitingForStart);
        assert!(job.last_error.is_none());
        Ok(())
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let mut job = ReleaseJob::new("id", "file");
        let err = job
            .transition(JobState::Validating)
            .expect_err("skip should be rejected");
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        assert_eq!(job.state, JobState::WaitingForStart);
    }

    #[test]
    fn dvd_codec_marks_disc_image() {
        let mut job = ReleaseJob::new("id", "file");
        assert!(!job.is_dvd_image());
        job.codec = Some("DVD9".to_string());
        assert!(job.is_dvd_image());
    }

    #[test]
    fn stop_points_parse_case_insensitively() {
        assert_eq!(
            "BeforeExtracting".parse::<StopPoint>().ok(),
            Some(StopPoint::BeforeExtracting)
        );
        assert!("later".parse::<StopPoint>().is_err());
    }

    #[test]
    fn parked_jobs_serialise_their_reason() -> anyhow::Result<()> {
        let mut job = ReleaseJob::new("id", "prowlarr");
        job.park(ParkReason::MultipleVideos { count: 3 })?;
        let raw = serde_json::to_string(&job)?;
        let restored: ReleaseJob = serde_json::from_str(&raw)?;
        assert_eq!(restored.state, JobState::Parked);
        assert_eq!(
            restored.park_reason,
            Some(ParkReason::MultipleVideos { count: 3 })
        );
        Ok(())
    }
}
