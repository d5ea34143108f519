//! Fallback values for settings absent from the configuration document.

pub(crate) const WATCH_DIR: &str = "announcements";
pub(crate) const WORK_ROOT: &str = "work";
pub(crate) const JOB_STORE_DIR: &str = "jobs";
pub(crate) const MEDIAINFO_PATH: &str = "mediainfo";
pub(crate) const UNRAR_PATH: &str = "unrar";
pub(crate) const VIDEO_EXTENSIONS: &[&str] = &["avi", "divx", "m2ts", "mkv", "mp4", "mpg", "vob"];
pub(crate) const ADDITIONAL_EXTENSIONS: &[&str] = &["bup", "idx", "ifo", "srt", "sub"];
pub(crate) const EXCLUDE_PATTERNS: &[&str] = &["@skip_fluff"];
pub(crate) const POLL_INTERVAL_SECS: u64 = 30;
pub(crate) const WORKERS: usize = 4;
pub(crate) const QUEUE_CAPACITY: usize = 256;
pub(crate) const LOG_LEVEL: &str = "info";
pub(crate) const CLIENT_WATCH_DIR: &str = "client/watch";
pub(crate) const CLIENT_DOWNLOAD_ROOT: &str = "client/downloads";
pub(crate) const CLIENT_TIMEOUT_SECS: u64 = 6 * 60 * 60;
pub(crate) const CLIENT_POLL_INTERVAL_MS: u64 = 5_000;
pub(crate) const MAX_PARALLEL_DOWNLOADS: usize = 1;
