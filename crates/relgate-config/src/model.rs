//! Typed configuration models.
//!
//! # Design
//! - Every field has a default so a partial document is enough to start.
//! - Per-source settings keep the `PascalCase` key names operators already use.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory scanned for announcement descriptors.
    pub watch_dir: PathBuf,
    /// Root under which per-job work directories are created.
    pub work_root: PathBuf,
    /// Directory holding one JSON record per job.
    pub job_store_dir: PathBuf,
    /// Path to the `mediainfo` executable.
    pub mediainfo_path: PathBuf,
    /// Path to the `unrar` executable used for scene RAR sets.
    pub unrar_path: PathBuf,
    /// Extensions treated as uploadable video.
    pub video_extensions: Vec<String>,
    /// Extensions that travel with the video files.
    pub additional_extensions: Vec<String>,
    /// Exclusion globs; `@skip_fluff` expands to the sample/extras preset.
    pub exclude_patterns: Vec<String>,
    /// Seconds between watch directory scans.
    pub poll_interval_secs: u64,
    /// Number of runner workers.
    pub workers: usize,
    /// Capacity of the job queue between the ingester and the workers.
    pub queue_capacity: usize,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Torrent client hand-off settings.
    pub client: ClientSettings,
    /// Per-backend settings keyed by backend name.
    pub sources: BTreeMap<String, SourceSettings>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from(defaults::WATCH_DIR),
            work_root: PathBuf::from(defaults::WORK_ROOT),
            job_store_dir: PathBuf::from(defaults::JOB_STORE_DIR),
            mediainfo_path: PathBuf::from(defaults::MEDIAINFO_PATH),
            unrar_path: PathBuf::from(defaults::UNRAR_PATH),
            video_extensions: to_strings(defaults::VIDEO_EXTENSIONS),
            additional_extensions: to_strings(defaults::ADDITIONAL_EXTENSIONS),
            exclude_patterns: to_strings(defaults::EXCLUDE_PATTERNS),
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
            workers: defaults::WORKERS,
            queue_capacity: defaults::QUEUE_CAPACITY,
            logging: LoggingSettings::default(),
            client: ClientSettings::default(),
            sources: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Settings for `name`, or defaults when the source is not configured.
    #[must_use]
    pub fn source(&self, name: &str) -> SourceSettings {
        self.sources.get(name).cloned().unwrap_or_default()
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// `json` or `pretty`; inferred from the build profile when absent.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: None,
        }
    }
}

/// Settings for handing metainfo to a torrent client through a watch directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// The client's watch directory.
    pub watch_dir: PathBuf,
    /// Where the client writes completed payloads.
    pub download_root: PathBuf,
    /// Seconds to wait for a payload to complete.
    pub timeout_secs: u64,
    /// Milliseconds between completeness checks.
    pub poll_interval_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from(defaults::CLIENT_WATCH_DIR),
            download_root: PathBuf::from(defaults::CLIENT_DOWNLOAD_ROOT),
            timeout_secs: defaults::CLIENT_TIMEOUT_SECS,
            poll_interval_ms: defaults::CLIENT_POLL_INTERVAL_MS,
        }
    }
}

/// Settings for a single source backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SourceSettings {
    /// API key; an empty key disables key-gated backends.
    pub api_key: String,
    /// Base URL of the backend service.
    pub url: String,
    /// Whitespace-separated `field=glob` terms automatic jobs must match.
    pub automatic_job_filter: String,
    /// Download slot ceiling; non-positive values fall back to one.
    pub maximum_parallel_downloads: Option<i64>,
    /// Stop point for automatic jobs.
    pub stop_automatic_job: String,
    /// `yes`, `true`, `1` or a stop point to park automatic jobs with several videos.
    pub stop_automatic_job_if_there_are_multiple_videos: String,
}

impl SourceSettings {
    /// Effective download slot ceiling.
    #[must_use]
    pub fn max_parallel_downloads(&self) -> usize {
        self.maximum_parallel_downloads
            .filter(|value| *value > 0)
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(defaults::MAX_PARALLEL_DOWNLOADS)
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_parallel_downloads_fall_back_to_one() {
        let mut settings = SourceSettings::default();
        assert_eq!(settings.max_parallel_downloads(), 1);
        settings.maximum_parallel_downloads = Some(0);
        assert_eq!(settings.max_parallel_downloads(), 1);
        settings.maximum_parallel_downloads = Some(-3);
        assert_eq!(settings.max_parallel_downloads(), 1);
        settings.maximum_parallel_downloads = Some(3);
        assert_eq!(settings.max_parallel_downloads(), 3);
    }

    #[test]
    fn source_settings_use_pascal_case_keys() -> anyhow::Result<()> {
        let settings: SourceSettings = serde_json::from_str(
            r#"{"ApiKey":"k","Url":"http://prowlarr:9696","MaximumParallelDownloads":2,
                "StopAutomaticJobIfThereAreMultipleVideos":"yes"}"#,
        )?;
        assert_eq!(settings.api_key, "k");
        assert_eq!(settings.max_parallel_downloads(), 2);
        assert_eq!(settings.stop_automatic_job_if_there_are_multiple_videos, "yes");
        Ok(())
    }

    #[test]
    fn unknown_source_yields_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.source("prowlarr"), SourceSettings::default());
        assert_eq!(config.workers, 4);
    }
}
