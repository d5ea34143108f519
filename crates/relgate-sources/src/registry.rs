//! Backends keyed by the source name jobs are announced under.

use std::collections::BTreeMap;
use std::sync::Arc;

use relgate_config::PipelineConfig;
use relgate_fsops::FileListValidator;
use tracing::info;

use crate::automation::PolicyError;
use crate::backend::SourceBackend;
use crate::file::{FILE, FileBackend};
use crate::prowlarr::{PROWLARR, ProwlarrBackend};
use crate::torrent::{TORRENT, TorrentFileBackend};

/// Runtime dispatch table from source name to backend.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn SourceBackend>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under its own name, replacing any previous entry.
    pub fn register(&mut self, backend: Arc<dyn SourceBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Backend registered under `name`, enabled or not.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceBackend>> {
        self.backends.get(name).cloned()
    }

    /// Backend registered under `name` when it is enabled.
    #[must_use]
    pub fn enabled(&self, name: &str) -> Option<Arc<dyn SourceBackend>> {
        self.get(name).filter(|backend| backend.is_enabled())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// All registered backends.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SourceBackend>> {
        self.backends.values()
    }
}

/// Register every shipped backend with its configured settings.
///
/// # Errors
///
/// Returns an error when a backend's automation settings are invalid.
pub fn build_registry(
    config: &PipelineConfig,
    files: &FileListValidator,
) -> Result<BackendRegistry, PolicyError> {
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(ProwlarrBackend::from_settings(
        &config.source(PROWLARR),
        files.clone(),
    )?));
    registry.register(Arc::new(FileBackend::from_settings(
        &config.source(FILE),
        files.clone(),
    )?));
    registry.register(Arc::new(TorrentFileBackend::from_settings(
        &config.source(TORRENT),
        files.clone(),
    )?));

    for backend in registry.iter() {
        info!(
            backend = backend.name(),
            enabled = backend.is_enabled(),
            max_parallel = backend.maximum_parallel_downloads(),
            "source backend registered"
        );
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_config::SourceSettings;

    #[test]
    fn prowlarr_needs_an_api_key() -> anyhow::Result<()> {
        let mut config = PipelineConfig::default();
        let registry = build_registry(&config, &FileListValidator::default())?;
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![FILE, PROWLARR, TORRENT]
        );
        assert!(registry.get(PROWLARR).is_some());
        assert!(registry.enabled(PROWLARR).is_none());
        assert!(registry.enabled(FILE).is_some());

        config.sources.insert(
            PROWLARR.to_string(),
            SourceSettings {
                api_key: "key".to_string(),
                url: "http://prowlarr:9696".to_string(),
                maximum_parallel_downloads: Some(3),
                ..SourceSettings::default()
            },
        );
        let registry = build_registry(&config, &FileListValidator::default())?;
        let prowlarr = registry
            .enabled(PROWLARR)
            .ok_or_else(|| anyhow::anyhow!("prowlarr should be enabled"))?;
        assert_eq!(prowlarr.maximum_parallel_downloads(), 3);
        Ok(())
    }

    #[test]
    fn invalid_stop_point_is_rejected() {
        let mut config = PipelineConfig::default();
        config.sources.insert(
            FILE.to_string(),
            SourceSettings {
                stop_automatic_job: "beforelunch".to_string(),
                ..SourceSettings::default()
            },
        );
        let err = build_registry(&config, &FileListValidator::default()).expect_err("bad stop");
        assert!(matches!(err, PolicyError::UnknownStopPoint { .. }));
    }
}
