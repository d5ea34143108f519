#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Release pipeline wiring: ingestion, download slots and the job runner.
//!
//! Layout: `ingest.rs` (watch directory scan), `limiter.rs` (per-backend
//! download slots), `runner.rs` (job state machine and workers),
//! `bootstrap.rs` (service wiring and shutdown).

/// Application bootstrap and service wiring.
pub mod bootstrap;
/// Application error types.
pub mod error;
/// Announcement descriptor ingestion.
pub mod ingest;
/// Per-backend download slots.
pub mod limiter;
/// Job state machine.
pub mod runner;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
pub use ingest::{AnnouncementDescriptor, AnnouncementIngester, IngestOutcome, ScanSummary};
pub use limiter::{ConcurrencyLimiter, DownloadPermit};
pub use runner::{JobRunner, RunOutcome, RunnerDeps, release_path};
