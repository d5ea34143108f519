#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Backend-agnostic release job model and the pipeline error taxonomy.
//!
//! Layout: `model/` (jobs, file lists, media records), `error.rs` (`PipelineError`).

pub mod error;
pub mod model;

pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use model::{
    FileEntry, IncludedFileList, JobOrigin, JobState, MediaCharacteristics, ParkReason,
    ReleaseContents, ReleaseJob, StopPoint, UnknownStopPoint,
};
