//! Logging initialisation.
//!
//! # Design
//! - One entry point installs the fmt or JSON subscriber; `RUST_LOG` wins over
//!   the configured level.
//! - The build SHA is recorded once and shared with the pipeline span.

use once_cell::sync::OnceCell;
use tracing::span::EnteredSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{Result, TelemetryError};

/// Level directive used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static PIPELINE_BUILD: OnceCell<String> = OnceCell::new();

/// Install the process-wide subscriber for the pipeline.
///
/// # Errors
///
/// Returns [`TelemetryError::SubscriberInstall`] when a subscriber is already
/// in place.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let _ = PIPELINE_BUILD.set(config.build_sha.to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.format == LogFormat::Json {
        registry
            .with(fmt::layer().json().flatten_event(true).with_target(false))
            .try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(false)).try_init()
    };
    installed.map_err(|source| TelemetryError::SubscriberInstall { source })
}

/// Build SHA given to [`init_logging`], or `dev` before logging is set up.
#[must_use]
pub fn build_sha() -> &'static str {
    PIPELINE_BUILD.get().map_or("dev", String::as_str)
}

/// Keeps the process-wide `relgate` span entered; every log line emitted while
/// it lives carries the run mode, crate version and build SHA.
#[derive(Debug)]
pub struct GlobalContextGuard {
    _span: EnteredSpan,
}

impl GlobalContextGuard {
    /// Enter the `relgate` span tagged with `mode` (for example `pipeline`).
    #[must_use]
    pub fn new(mode: &str) -> Self {
        let span = tracing::info_span!(
            "relgate",
            mode = %mode,
            version = env!("CARGO_PKG_VERSION"),
            build_sha = %build_sha(),
        );
        Self {
            _span: span.entered(),
        }
    }
}

/// Settings handed to [`init_logging`], borrowed from the pipeline config.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// `EnvFilter` directive, e.g. `info` or `relgate_app=debug`.
    pub level: &'a str,
    /// Line format.
    pub format: LogFormat,
    /// Commit the binary was built from.
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Compact human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Pretty for debug builds, JSON for release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Format named in configuration, falling back to [`LogFormat::infer`].
    #[must_use]
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            Some(value) if value.eq_ignore_ascii_case("pretty") => Self::Pretty,
            _ => Self::infer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_from_setting_parses_variants() {
        assert_eq!(LogFormat::from_setting(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some(" Pretty ")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_setting(Some("xml")), LogFormat::infer());
        assert_eq!(LogFormat::from_setting(None), LogFormat::infer());
    }

    #[test]
    fn context_guard_enters_the_pipeline_span() {
        let guard = GlobalContextGuard::new("pipeline");
        drop(guard);
    }

    #[test]
    fn second_install_is_rejected() {
        let settings = LoggingConfig {
            level: "debug",
            format: LogFormat::Json,
            build_sha: "abc123",
        };
        let _ = init_logging(&settings);
        assert!(matches!(
            init_logging(&settings),
            Err(TelemetryError::SubscriberInstall { .. })
        ));
    }
}
