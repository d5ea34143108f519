//! # Design
//!
//! - Constant messages; the failing path or job lives in fields.
//! - Converts into [`PipelineError::Store`] so the runner sees one taxonomy.

use std::io;
use std::path::PathBuf;

use relgate_core::{JobState, PipelineError};
use thiserror::Error;
use uuid::Uuid;

/// Result alias for job store operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by the job store.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Reading or writing a job record failed.
    #[error("job store io failure")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A job record could not be encoded or decoded.
    #[error("job record serialisation failed")]
    Json {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Another job already owns the announcement.
    #[error("announcement already has a job")]
    DuplicateAnnouncement {
        /// Announcement identifier.
        announcement_id: String,
        /// Job that owns it.
        existing: Uuid,
    },
    /// No job with the given id.
    #[error("job not found")]
    NotFound {
        /// Requested job id.
        job_id: Uuid,
    },
    /// The job is still moving through the pipeline.
    #[error("job is not in a terminal state")]
    ActiveJob {
        /// Job id.
        job_id: Uuid,
        /// Current state.
        state: JobState,
    },
    /// The job refused a state change.
    #[error("job state change rejected")]
    Transition {
        /// Underlying pipeline error.
        #[source]
        source: PipelineError,
    },
}

impl RuntimeError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<RuntimeError> for PipelineError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Transition { source } => source,
            other => Self::Store {
                operation: "job_store",
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_core::ErrorKind;

    #[test]
    fn store_errors_are_infrastructure_failures() {
        let err: PipelineError = RuntimeError::NotFound {
            job_id: Uuid::nil(),
        }
        .into();
        assert!(matches!(err, PipelineError::Store { .. }));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn transition_errors_unwrap_to_the_pipeline_error() {
        let err: PipelineError = RuntimeError::Transition {
            source: PipelineError::InvalidTransition {
                job_id: Uuid::nil(),
                from: JobState::Downloading,
                to: JobState::WaitingForStart,
            },
        }
        .into();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    }
}
