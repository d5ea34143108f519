#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Media characteristics extraction through the `mediainfo` command-line tool.
//!
//! Layout: `parse.rs` (report parsing and the validation gate), `extractor.rs` (subprocess runner).

pub mod extractor;
pub mod parse;

pub use extractor::MediaInfoExtractor;
pub use parse::{
    make_complete_name_relative, parse_dimension, parse_duration, parse_report, validate_media,
};
