//! Indexer-manager backend speaking the Prowlarr API.
//!
//! # Design
//! - The session (HTTP client with the API key header plus the indexer catalog)
//!   is rebuilt wholesale on login and read-only afterwards.
//! - Lookup misses are soft; only [`ProwlarrBackend::download_torrent`] turns a
//!   missing link into a failure.

mod catalog;
mod newznab;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use relgate_config::SourceSettings;
use relgate_core::{PipelineError, PipelineResult, ReleaseJob};
use relgate_fsops::FileListValidator;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::automation::{AutomationPolicy, PolicyError};
use crate::backend::SourceBackend;

pub use catalog::{IndexerCatalog, IndexerRecord};
pub use newznab::{NewznabItem, find_announcement, parse_first_channel};

/// Registry name of the backend.
pub const PROWLARR: &str = "prowlarr";
const HEADER_API_KEY: &str = "x-api-key";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Session {
    client: Client,
    catalog: IndexerCatalog,
}

/// Backend resolving announcements through the Prowlarr indexer manager.
#[derive(Debug)]
pub struct ProwlarrBackend {
    api_key: String,
    base_url: String,
    max_parallel: usize,
    automation: AutomationPolicy,
    files: FileListValidator,
    session: RwLock<Option<Session>>,
}

impl ProwlarrBackend {
    /// Build the backend from its settings.
    ///
    /// # Errors
    ///
    /// Returns an error when the automation settings are invalid.
    pub fn from_settings(
        settings: &SourceSettings,
        files: FileListValidator,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            api_key: settings.api_key.trim().to_string(),
            base_url: settings.url.trim().trim_end_matches('/').to_string(),
            max_parallel: settings.max_parallel_downloads(),
            automation: AutomationPolicy::from_settings(settings)?,
            files,
            session: RwLock::new(None),
        })
    }

    /// Current catalog, empty before login.
    pub async fn catalog(&self) -> IndexerCatalog {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.catalog.clone())
            .unwrap_or_default()
    }

    async fn session(&self) -> PipelineResult<Session> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(PipelineError::MissingState {
                field: "prowlarr_session",
            })
    }

    fn http_error(operation: &'static str, err: reqwest::Error) -> PipelineError {
        PipelineError::backend(PROWLARR, operation, err)
    }

    /// Search the indexer owning the announcement and return the matching item.
    async fn match_imdb(&self, job: &ReleaseJob) -> PipelineResult<NewznabItem> {
        let no_match = || PipelineError::NoIndexerMatch {
            backend: PROWLARR.to_string(),
            announcement_id: job.announcement_id.clone(),
        };
        let Some(imdb) = job.imdb_id.as_deref().filter(|id| !id.is_empty()) else {
            return Err(no_match());
        };

        let session = self.session().await?;
        let Some(indexer) = session.catalog.resolve(&job.announcement_id) else {
            return Err(no_match());
        };

        let url = format!("{}/api/v1/indexer/{}/newznab", self.base_url, indexer.id);
        let body = session
            .client
            .get(&url)
            .query(&[("t", "movie"), ("imdbid", imdb)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Self::http_error("newznab.search", err))?
            .text()
            .await
            .map_err(|err| Self::http_error("newznab.read", err))?;

        find_announcement(&body, &job.announcement_id)
            .map_err(|err| PipelineError::backend(PROWLARR, "newznab.parse", err))?
            .ok_or_else(no_match)
    }
}

#[async_trait]
impl SourceBackend for ProwlarrBackend {
    fn name(&self) -> &str {
        PROWLARR
    }

    fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn automation(&self) -> &AutomationPolicy {
        &self.automation
    }

    fn file_policy(&self) -> &FileListValidator {
        &self.files
    }

    fn maximum_parallel_downloads(&self) -> usize {
        self.max_parallel
    }

    async fn login(&self) -> PipelineResult<()> {
        info!(backend = PROWLARR, "logging in");
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|err| PipelineError::backend(PROWLARR, "login.header", err))?;
        headers.insert(HEADER_API_KEY, key);
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|err| Self::http_error("login.client", err))?;

        let records: Vec<IndexerRecord> = client
            .get(format!("{}/api/v1/indexer", self.base_url))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Self::http_error("login.indexers", err))?
            .json()
            .await
            .map_err(|err| Self::http_error("login.decode", err))?;

        let catalog = IndexerCatalog::from_records(records);
        info!(
            backend = PROWLARR,
            indexers = ?catalog.names().collect::<Vec<_>>(),
            "loaded indexers"
        );
        *self.session.write().await = Some(Session { client, catalog });
        Ok(())
    }

    async fn prepare_download(&self, job: &mut ReleaseJob) -> PipelineResult<()> {
        info!(
            backend = PROWLARR,
            announcement_id = %job.announcement_id,
            "processing announcement"
        );
        if job.imdb_id.as_deref().is_none_or(str::is_empty) {
            return Ok(());
        }
        match self.match_imdb(job).await {
            Ok(item) => {
                if job.release_name.is_none() {
                    job.release_name = item.title;
                }
                if job.size.is_none() {
                    job.size = item.size;
                }
                job.touch();
                Ok(())
            }
            Err(err) if err.kind().is_soft() => {
                warn!(
                    backend = PROWLARR,
                    job_id = %job.id,
                    "could not find release info in prowlarr"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn download_torrent(&self, job: &ReleaseJob, destination: &Path) -> PipelineResult<()> {
        let no_link = || PipelineError::NoDownloadLink {
            backend: PROWLARR.to_string(),
            announcement_id: job.announcement_id.clone(),
        };
        let item = match self.match_imdb(job).await {
            Ok(item) => item,
            Err(err) if err.kind().is_soft() => return Err(no_link()),
            Err(err) => return Err(err),
        };
        let link = item.link.ok_or_else(no_link)?;

        let session = self.session().await?;
        let bytes = session
            .client
            .get(&link)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Self::http_error("download.fetch", err))?
            .bytes()
            .await
            .map_err(|err| Self::http_error("download.read", err))?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PipelineError::io("download.create_dir", parent, source))?;
        }
        tokio::fs::write(destination, &bytes)
            .await
            .map_err(|source| PipelineError::io("download.write", destination, source))?;
        info!(
            backend = PROWLARR,
            job_id = %job.id,
            bytes = bytes.len(),
            "metainfo downloaded"
        );
        Ok(())
    }

    async fn id_from_url(&self, url: &str) -> Option<String> {
        let guard = self.session.read().await;
        let session = guard.as_ref()?;
        session.catalog.resolve(url).map(|_| url.to_string())
    }
}
