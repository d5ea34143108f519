//! # Design
//!
//! - One taxonomy for every failure a release job can hit.
//! - Constant messages; context lives in fields and is rendered by [`PipelineError::describe`].
//! - The runner branches on [`ErrorKind`] rather than on message text.

use std::error::Error;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::model::JobState;

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors produced while moving a job through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An announcement descriptor was not understood.
    #[error("announcement descriptor not recognised")]
    ParseFailure {
        /// Descriptor path.
        path: PathBuf,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// The announcement could not be matched in the backend catalog.
    #[error("no indexer entry matched the announcement")]
    NoIndexerMatch {
        /// Backend that ran the lookup.
        backend: String,
        /// Announcement that was looked up.
        announcement_id: String,
    },
    /// Link resolution yielded nothing to download.
    #[error("no download link found")]
    NoDownloadLink {
        /// Backend that ran the lookup.
        backend: String,
        /// Announcement that was looked up.
        announcement_id: String,
    },
    /// An external tool (`mediainfo`, `unrar`) exited unsuccessfully.
    #[error("external tool failed")]
    ToolExecution {
        /// Program that was executed.
        program: PathBuf,
        /// File the tool was run on.
        path: PathBuf,
        /// Exit code, when the process was not killed by a signal.
        exit_code: Option<i32>,
    },
    /// Parsed media attributes failed the validation gate.
    #[error("invalid media info")]
    InvalidMediaInfo {
        /// File whose report was rejected.
        path: PathBuf,
        /// Attribute that failed.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// More than one included video file in a non-disc release.
    #[error("release contains multiple video files")]
    MultipleVideoFiles {
        /// Number of included video files.
        count: usize,
    },
    /// The materialised release holds no video.
    #[error("release contains no video files")]
    NoVideoFiles {
        /// Directory that was searched.
        path: PathBuf,
    },
    /// The payload did not complete in time.
    #[error("content download timed out")]
    ContentTimeout {
        /// Payload root that was awaited.
        path: PathBuf,
        /// Seconds spent waiting.
        waited_secs: u64,
    },
    /// Filesystem failures.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A backend session or HTTP exchange failed.
    #[error("source backend operation failed")]
    Backend {
        /// Backend name.
        backend: String,
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        source: Box<dyn Error + Send + Sync>,
    },
    /// A job tried to move to a state it cannot reach.
    #[error("invalid job state transition")]
    InvalidTransition {
        /// Job identifier.
        job_id: Uuid,
        /// Current state.
        from: JobState,
        /// Requested state.
        to: JobState,
    },
    /// Required job data was not present when a stage needed it.
    #[error("missing job state")]
    MissingState {
        /// Field that was missing.
        field: &'static str,
    },
    /// Job persistence failed.
    #[error("job store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Coarse classification used by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Descriptor not recognised; left for inspection.
    ParseFailure,
    /// Catalog lookup found nothing; the job continues unenriched.
    NoIndexerMatch,
    /// Download link missing.
    NoDownloadLink,
    /// Analysis tool failure.
    ToolExecution,
    /// Media validation gate rejected a file.
    InvalidMediaInfo,
    /// Video-count policy violated.
    MultipleVideoFiles,
    /// No video in the release.
    NoVideoFiles,
    /// Filesystem, network, persistence or bookkeeping failure.
    Infrastructure,
}

impl ErrorKind {
    /// Whether the failure is logged and skipped instead of failing the job.
    #[must_use]
    pub const fn is_soft(self) -> bool {
        matches!(self, Self::ParseFailure | Self::NoIndexerMatch)
    }

    /// Stable identifier for metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseFailure => "parse_failure",
            Self::NoIndexerMatch => "no_indexer_match",
            Self::NoDownloadLink => "no_download_link",
            Self::ToolExecution => "tool_execution",
            Self::InvalidMediaInfo => "invalid_media_info",
            Self::MultipleVideoFiles => "multiple_video_files",
            Self::NoVideoFiles => "no_video_files",
            Self::Infrastructure => "infrastructure",
        }
    }
}

impl PipelineError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ParseFailure { .. } => ErrorKind::ParseFailure,
            Self::NoIndexerMatch { .. } => ErrorKind::NoIndexerMatch,
            Self::NoDownloadLink { .. } => ErrorKind::NoDownloadLink,
            Self::ToolExecution { .. } => ErrorKind::ToolExecution,
            Self::InvalidMediaInfo { .. } => ErrorKind::InvalidMediaInfo,
            Self::MultipleVideoFiles { .. } => ErrorKind::MultipleVideoFiles,
            Self::NoVideoFiles { .. } => ErrorKind::NoVideoFiles,
            Self::ContentTimeout { .. }
            | Self::Io { .. }
            | Self::Backend { .. }
            | Self::InvalidTransition { .. }
            | Self::MissingState { .. }
            | Self::Store { .. } => ErrorKind::Infrastructure,
        }
    }

    /// Message plus context, suitable for the job record.
    #[must_use]
    pub fn describe(&self) -> String {
        let context = match self {
            Self::ParseFailure { path, reason } => format!("{} ({reason})", path.display()),
            Self::NoIndexerMatch {
                backend,
                announcement_id,
            }
            | Self::NoDownloadLink {
                backend,
                announcement_id,
            } => format!("{backend}: {announcement_id}"),
            Self::ToolExecution {
                program,
                path,
                exit_code,
            } => format!(
                "{} {} exited with {}",
                program.display(),
                path.display(),
                exit_code.map_or_else(|| "signal".to_string(), |code| code.to_string())
            ),
            Self::InvalidMediaInfo { path, field, value } => format!(
                "{}: {field}={}",
                path.display(),
                value.as_deref().unwrap_or("unset")
            ),
            Self::MultipleVideoFiles { count } => format!("{count} video files"),
            Self::NoVideoFiles { path } => path.display().to_string(),
            Self::ContentTimeout { path, waited_secs } => {
                format!("{} after {waited_secs}s", path.display())
            }
            Self::Io {
                operation,
                path,
                source,
            } => format!("{operation} {}: {source}", path.display()),
            Self::Backend {
                backend,
                operation,
                source,
            } => format!("{backend} {operation}: {source}"),
            Self::InvalidTransition { job_id, from, to } => {
                format!("{job_id}: {from} -> {to}")
            }
            Self::MissingState { field } => (*field).to_string(),
            Self::Store { operation, source } => format!("{operation}: {source}"),
        };
        format!("{self}: {context}")
    }

    /// Wrap a filesystem failure.
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap a backend failure.
    #[must_use]
    pub fn backend<E>(backend: impl Into<String>, operation: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::Backend {
            backend: backend.into(),
            operation,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_kinds_are_parse_and_match_failures() {
        let soft = PipelineError::NoIndexerMatch {
            backend: "prowlarr".to_string(),
            announcement_id: "x".to_string(),
        };
        assert!(soft.kind().is_soft());

        let fatal = PipelineError::MultipleVideoFiles { count: 2 };
        assert!(!fatal.kind().is_soft());
        assert_eq!(fatal.kind().as_str(), "multiple_video_files");
    }

    #[test]
    fn describe_includes_context() {
        let err = PipelineError::InvalidMediaInfo {
            path: PathBuf::from("movie.mkv"),
            field: "width",
            value: Some("0".to_string()),
        };
        assert_eq!(err.describe(), "invalid media info: movie.mkv: width=0");

        let tool = PipelineError::ToolExecution {
            program: PathBuf::from("mediainfo"),
            path: PathBuf::from("a.mkv"),
            exit_code: Some(1),
        };
        assert!(tool.describe().ends_with("exited with 1"));
    }

    #[test]
    fn helpers_preserve_sources() {
        let err = PipelineError::io("read", "x", io::Error::other("boom"));
        assert!(err.source().is_some());
        let backend = PipelineError::backend("prowlarr", "login", "refused");
        assert!(backend.source().is_some());
        assert_eq!(backend.kind(), ErrorKind::Infrastructure);
    }
}
