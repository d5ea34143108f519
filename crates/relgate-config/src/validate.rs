//! Structural validation of a loaded configuration.

use std::path::Path;

use relgate_core::StopPoint;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{PipelineConfig, SourceSettings};

/// Check paths, counts and per-source stop settings.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first offending field.
pub fn validate(config: &PipelineConfig) -> ConfigResult<()> {
    require_path("paths", "watch_dir", &config.watch_dir)?;
    require_path("paths", "work_root", &config.work_root)?;
    require_path("paths", "job_store_dir", &config.job_store_dir)?;
    require_path("paths", "mediainfo_path", &config.mediainfo_path)?;
    require_path("paths", "unrar_path", &config.unrar_path)?;
    require_path("client", "watch_dir", &config.client.watch_dir)?;
    require_path("client", "download_root", &config.client.download_root)?;

    if config.workers == 0 {
        return Err(ConfigError::invalid(
            "runner",
            "workers",
            Some("0".to_string()),
            "must_be_positive",
        ));
    }
    if config.queue_capacity == 0 {
        return Err(ConfigError::invalid(
            "runner",
            "queue_capacity",
            Some("0".to_string()),
            "must_be_positive",
        ));
    }
    if config.poll_interval_secs == 0 {
        return Err(ConfigError::invalid(
            "ingest",
            "poll_interval_secs",
            Some("0".to_string()),
            "must_be_positive",
        ));
    }
    if config.client.poll_interval_ms == 0 {
        return Err(ConfigError::invalid(
            "client",
            "poll_interval_ms",
            Some("0".to_string()),
            "must_be_positive",
        ));
    }
    if config
        .video_extensions
        .iter()
        .all(|ext| ext.trim().is_empty())
    {
        return Err(ConfigError::invalid(
            "files",
            "video_extensions",
            None,
            "must_not_be_empty",
        ));
    }
    if let Some(format) = config.logging.format.as_deref()
        && !matches!(format, "json" | "pretty")
    {
        return Err(ConfigError::invalid(
            "logging",
            "format",
            Some(format.to_string()),
            "unknown_format",
        ));
    }

    for (name, settings) in &config.sources {
        validate_source(name, settings)?;
    }
    Ok(())
}

fn validate_source(name: &str, settings: &SourceSettings) -> ConfigResult<()> {
    let stop = settings.stop_automatic_job.trim();
    if !stop.is_empty() && stop.parse::<StopPoint>().is_err() {
        return Err(ConfigError::invalid(
            name,
            "StopAutomaticJob",
            Some(stop.to_string()),
            "unknown_stop_point",
        ));
    }
    parse_multiple_video_stop(&settings.stop_automatic_job_if_there_are_multiple_videos).map_err(
        |value| {
            ConfigError::invalid(
                name,
                "StopAutomaticJobIfThereAreMultipleVideos",
                Some(value),
                "unknown_stop_point",
            )
        },
    )?;
    Ok(())
}

/// Interpret the multiple-videos stop setting.
///
/// Blank, `no`, `false` and `0` disable it; `yes`, `true`, `1` or any stop
/// point enable it.
///
/// # Errors
///
/// Returns the offending value when it is none of the above.
pub fn parse_multiple_video_stop(value: &str) -> Result<bool, String> {
    let normalised = value.trim().to_ascii_lowercase();
    match normalised.as_str() {
        "" | "no" | "false" | "0" => Ok(false),
        "yes" | "true" | "1" => Ok(true),
        other if other.parse::<StopPoint>().is_ok() => Ok(true),
        _ => Err(value.to_string()),
    }
}

fn require_path(section: &'static str, field: &'static str, path: &Path) -> ConfigResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::invalid(section, field, None, "empty_path"));
    }
    Ok(())
}
