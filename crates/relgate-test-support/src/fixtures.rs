//! Test fixtures: temp directories, metainfo bytes and sample jobs.

use std::fs;
use std::path::{Path, PathBuf};

use relgate_core::ReleaseJob;
use serde::Serialize;
use serde_bytes::ByteBuf;
use tempfile::TempDir;

/// Create a temp directory with a recognisable prefix.
///
/// # Errors
///
/// Returns an error when the directory cannot be created.
pub fn temp_dir(prefix: &str) -> anyhow::Result<TempDir> {
    Ok(tempfile::Builder::new().prefix(prefix).tempdir()?)
}

/// Write `contents` to `dir/name`, creating parents, and return the path.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    Ok(path)
}

/// The Shawshank announcement used throughout the suites.
pub const SHAWSHANK_DESCRIPTOR: &str =
    r#"{"ImdbId":"tt0111161","Title":"The Shawshank Redemption","Year":1994}"#;

/// A waiting job with typical announcement metadata.
#[must_use]
pub fn sample_job(source: &str) -> ReleaseJob {
    let mut job = ReleaseJob::new("https://indexer.example/details/42", source);
    job.imdb_id = Some("tt0111161".to_string());
    job.title = Some("The Shawshank Redemption".to_string());
    job.year = Some(1994);
    job.codec = Some("x264".to_string());
    job.container = Some("MKV".to_string());
    job.resolution = Some("720p".to_string());
    job.source = Some("Blu-ray".to_string());
    job
}

#[derive(Serialize)]
struct Metainfo {
    announce: String,
    info: Info,
}

#[derive(Serialize)]
struct Info {
    name: String,
    #[serde(rename = "piece length")]
    piece_length: u64,
    pieces: ByteBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<InfoFile>>,
}

#[derive(Serialize)]
struct InfoFile {
    length: u64,
    path: Vec<String>,
}

/// Builds bencoded metainfo for tests.
#[derive(Debug, Clone)]
pub struct TorrentBuilder {
    name: String,
    length: Option<u64>,
    files: Vec<(Vec<String>, u64)>,
}

impl TorrentBuilder {
    /// Multi-file metainfo rooted at `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            length: None,
            files: Vec::new(),
        }
    }

    /// Single-file metainfo.
    #[must_use]
    pub fn single(name: &str, length: u64) -> Self {
        Self {
            name: name.to_string(),
            length: Some(length),
            files: Vec::new(),
        }
    }

    /// Add a payload file by path components.
    #[must_use]
    pub fn file(mut self, path: &[&str], length: u64) -> Self {
        self.files
            .push((path.iter().map(ToString::to_string).collect(), length));
        self
    }

    /// Encode the metainfo.
    ///
    /// # Errors
    ///
    /// Returns an error when encoding fails.
    pub fn build(self) -> anyhow::Result<Vec<u8>> {
        let files = if self.files.is_empty() {
            None
        } else {
            Some(
                self.files
                    .into_iter()
                    .map(|(path, length)| InfoFile { length, path })
                    .collect(),
            )
        };
        let metainfo = Metainfo {
            announce: "http://tracker.example/announce".to_string(),
            info: Info {
                name: self.name,
                piece_length: 16_384,
                pieces: ByteBuf::from(vec![0_u8; 20]),
                length: self.length,
                files,
            },
        };
        Ok(serde_bencode::to_bytes(&metainfo)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_emits_bencoded_dictionary() -> anyhow::Result<()> {
        let bytes = TorrentBuilder::single("movie.mkv", 10).build()?;
        assert_eq!(bytes.first(), Some(&b'd'));
        assert_eq!(bytes.last(), Some(&b'e'));
        Ok(())
    }

    #[test]
    fn sample_job_waits_for_start() {
        let job = sample_job("prowlarr");
        assert_eq!(job.state, relgate_core::JobState::WaitingForStart);
        assert_eq!(job.year, Some(1994));
    }
}
