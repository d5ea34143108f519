#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! File-list policy and filesystem helpers for downloaded releases.
//!
//! Layout: `validator.rs` (exclusions, video-count and scene checks),
//! `torrent.rs` (metainfo file lists), `scan.rs` (directory listings),
//! `materialize.rs` (hard link or copy into the upload tree), `archive.rs`
//! (scene RAR sets unpacked with `unrar`).

pub mod archive;
pub mod error;
pub mod materialize;
pub mod scan;
pub mod torrent;
pub mod validator;

pub use archive::{DEFAULT_UNRAR_PROGRAM, RarExtractor, first_rar_volumes, is_rar_volume};
pub use error::{FsOpsError, FsOpsResult};
pub use materialize::{MaterializeSummary, materialize_release};
pub use scan::list_directory;
pub use torrent::{TorrentMetainfo, parse_metainfo, read_metainfo};
pub use validator::{
    DEFAULT_ADDITIONAL_EXTENSIONS, DEFAULT_VIDEO_EXTENSIONS, FileListValidator, SKIP_FLUFF_PRESET,
};
