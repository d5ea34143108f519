#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Persistence for release jobs.

pub mod error;
pub mod store;

pub use error::{RuntimeError, RuntimeResult};
pub use store::{INTERRUPTED_ERROR, JobStore};
