#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (temp dirs, metainfo builder, sample jobs), mediainfo.rs (fake analysis tool),
//! unrar.rs (fake archive tool).

pub mod fixtures;
pub mod mediainfo;
pub mod unrar;
