//! # Design
//!
//! - Application-level errors for bootstrap and the long-running tasks.
//! - Constant messages; the operation and crate-local source travel in fields.
//! - Job failures never surface here; the runner records them on the job.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or validated.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: relgate_config::ConfigError,
    },
    /// Telemetry setup failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: relgate_telemetry::TelemetryError,
    },
    /// The job store failed.
    #[error("job store operation failed")]
    Runtime {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: relgate_runtime::RuntimeError,
    },
    /// A backend's automation settings were rejected.
    #[error("backend policy rejected")]
    Policy {
        /// Operation identifier.
        operation: &'static str,
        /// Source policy error.
        source: relgate_sources::PolicyError,
    },
    /// File-list policy could not be built.
    #[error("file policy operation failed")]
    FsOps {
        /// Operation identifier.
        operation: &'static str,
        /// Source fsops error.
        source: relgate_fsops::FsOpsError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// The job queue closed while work was still being submitted.
    #[error("job queue closed")]
    QueueClosed,
    /// Required dependency was missing.
    #[error("missing dependency")]
    MissingDependency {
        /// Name of the missing dependency.
        name: &'static str,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: relgate_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: relgate_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn runtime(
        operation: &'static str,
        source: relgate_runtime::RuntimeError,
    ) -> Self {
        Self::Runtime { operation, source }
    }

    pub(crate) const fn policy(
        operation: &'static str,
        source: relgate_sources::PolicyError,
    ) -> Self {
        Self::Policy { operation, source }
    }

    pub(crate) const fn fsops(operation: &'static str, source: relgate_fsops::FsOpsError) -> Self {
        Self::FsOps { operation, source }
    }

    pub(crate) const fn io(
        operation: &'static str,
        path: Option<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use uuid::Uuid;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "load",
            relgate_config::ConfigError::InvalidField {
                section: "runner".to_string(),
                field: "workers".to_string(),
                value: Some("0".to_string()),
                reason: "zero",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert!(config.source().is_some());

        let runtime = AppError::runtime(
            "store.get",
            relgate_runtime::RuntimeError::NotFound {
                job_id: Uuid::nil(),
            },
        );
        assert!(matches!(runtime, AppError::Runtime { .. }));

        let policy = AppError::policy(
            "registry.build",
            relgate_sources::PolicyError::UnknownStopPoint {
                field: "StopAutomaticJob",
                value: "never".to_string(),
            },
        );
        assert!(matches!(policy, AppError::Policy { .. }));

        let io = AppError::io(
            "ingest.read_dir",
            Some(PathBuf::from("/watch")),
            io::Error::other("boom"),
        );
        assert!(matches!(io, AppError::Io { path: Some(_), .. }));
        assert_eq!(io.to_string(), "io operation failed");
    }

    #[test]
    fn dependency_errors_have_constant_messages() {
        let err = AppError::MissingDependency { name: "mediainfo" };
        assert_eq!(err.to_string(), "missing dependency");
        assert_eq!(AppError::QueueClosed.to_string(), "job queue closed");
    }
}
