//! # Design
//!
//! - Every failure names the release operation and the path or pattern it
//!   touched; messages stay constant.
//! - The runner only sees [`PipelineError`]; metainfo problems become
//!   `ParseFailure`, a failed `unrar` becomes `ToolExecution`, everything else
//!   is infrastructure.

use std::io;
use std::path::PathBuf;

use relgate_core::PipelineError;
use thiserror::Error;

/// Result alias for release file handling.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced while inspecting or materialising releases.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// Reading, linking or copying a release file failed.
    #[error("release file operation failed")]
    Io {
        /// Step that failed, e.g. `materialize.copy_file`.
        operation: &'static str,
        /// File or directory being handled.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// Walking a release tree failed.
    #[error("release tree walk failed")]
    Walk {
        /// Step that failed.
        operation: &'static str,
        /// Entry the walk stopped at.
        path: PathBuf,
        /// Underlying error.
        source: walkdir::Error,
    },
    /// An exclusion pattern did not compile.
    #[error("exclusion pattern rejected")]
    Pattern {
        /// Step that compiled the pattern.
        operation: &'static str,
        /// The pattern as configured.
        pattern: String,
        /// Underlying error.
        source: globset::Error,
    },
    /// A torrent descriptor was not valid bencoded metainfo.
    #[error("torrent metainfo not decodable")]
    Metainfo {
        /// Descriptor path when read from disk.
        path: Option<PathBuf>,
        /// Underlying error.
        source: serde_bencode::Error,
    },
    /// `unrar` exited unsuccessfully.
    #[error("rar extraction failed")]
    Extraction {
        /// Program that ran.
        program: PathBuf,
        /// First volume of the set.
        archive: PathBuf,
        /// Exit code, when the process was not killed by a signal.
        exit_code: Option<i32>,
    },
    /// Release input was structurally unusable (empty name, escaping path).
    #[error("release input rejected")]
    Rejected {
        /// What was checked.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
        /// The rejected value, when printable.
        value: Option<String>,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walk(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walk {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) const fn pattern(
        operation: &'static str,
        pattern: String,
        source: globset::Error,
    ) -> Self {
        Self::Pattern {
            operation,
            pattern,
            source,
        }
    }
}

impl From<FsOpsError> for PipelineError {
    fn from(err: FsOpsError) -> Self {
        match err {
            FsOpsError::Io {
                operation,
                path,
                source,
            } => Self::io(operation, path, source),
            FsOpsError::Walk {
                operation,
                path,
                source,
            } => Self::io(operation, path, io::Error::from(source)),
            FsOpsError::Extraction {
                program,
                archive,
                exit_code,
            } => Self::ToolExecution {
                program,
                path: archive,
                exit_code,
            },
            FsOpsError::Metainfo { path, .. } => Self::ParseFailure {
                path: path.unwrap_or_default(),
                reason: "torrent metainfo not recognised",
            },
            other @ (FsOpsError::Pattern { .. } | FsOpsError::Rejected { .. }) => {
                Self::io("fsops", PathBuf::new(), io::Error::other(other))
            }
        }
    }
}
