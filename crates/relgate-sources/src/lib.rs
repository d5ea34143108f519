#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Pluggable source backends that resolve announcements into downloadable releases.
//!
//! Layout: `backend.rs` (the [`SourceBackend`] capability), `automation.rs`
//! (per-backend filters and stop points), `prowlarr/` (indexer-manager backend),
//! `file.rs` and `torrent.rs` (local backends), `content.rs` (payload hand-off),
//! `registry.rs` (dispatch by source name).

pub mod automation;
pub mod backend;
pub mod content;
pub mod file;
pub mod prowlarr;
pub mod registry;
pub mod torrent;

pub use automation::{AutomationPolicy, FilterField, JobFilter, PolicyError};
pub use backend::{SourceBackend, metainfo_file_list};
pub use content::{ContentClient, WatchDirClient};
pub use file::{FILE, FileBackend};
pub use prowlarr::{IndexerCatalog, IndexerRecord, PROWLARR, ProwlarrBackend};
pub use registry::{BackendRegistry, build_registry};
pub use torrent::{TORRENT, TorrentFileBackend};
