#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! File-backed pipeline configuration with environment overrides.
//!
//! Layout: `model.rs` (typed settings), `loader.rs` (JSON document + env
//! overrides), `validate.rs` (structural checks), `defaults.rs` (fallback values).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, apply_env_overrides, load, load_from_path};
pub use model::{ClientSettings, LoggingSettings, PipelineConfig, SourceSettings};
pub use validate::{parse_multiple_video_stop, validate};
