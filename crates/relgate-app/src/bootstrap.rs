use std::sync::Arc;
use std::time::Duration;

use relgate_config::PipelineConfig;
use relgate_events::EventBus;
use relgate_fsops::{FileListValidator, RarExtractor};
use relgate_mediainfo::MediaInfoExtractor;
use relgate_runtime::JobStore;
use relgate_sources::{ContentClient, WatchDirClient, build_registry};
use relgate_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics, build_sha};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::ingest::AnnouncementIngester;
use crate::limiter::ConcurrencyLimiter;
use crate::runner::{JobRunner, RunnerDeps};

/// Dependencies required to bootstrap the pipeline.
pub(crate) struct BootstrapDependencies {
    config: PipelineConfig,
    events: EventBus,
    metrics: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) fn from_env() -> AppResult<Self> {
        let config = relgate_config::load().map_err(|err| AppError::config("config.load", err))?;
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            config,
            events: EventBus::new(),
            metrics,
        })
    }
}

/// Wired pipeline services, ready to be started.
pub(crate) struct Services {
    pub(crate) runner: Arc<JobRunner>,
    pub(crate) ingester: Arc<AnnouncementIngester>,
    pub(crate) receiver: mpsc::Receiver<Uuid>,
}

/// Build the store, backends and tasks described by `config`.
pub(crate) async fn assemble(
    config: &PipelineConfig,
    events: &EventBus,
    metrics: &Metrics,
) -> AppResult<Services> {
    check_mediainfo(config)?;
    tokio::fs::create_dir_all(&config.work_root)
        .await
        .map_err(|err| AppError::io("work_root.create", Some(config.work_root.clone()), err))?;

    let files = FileListValidator::new(
        &config.video_extensions,
        &config.additional_extensions,
        &config.exclude_patterns,
    )
    .map_err(|err| AppError::fsops("file_policy.new", err))?;
    let registry =
        build_registry(config, &files).map_err(|err| AppError::policy("registry.build", err))?;
    let store = Arc::new(
        JobStore::open(&config.job_store_dir)
            .await
            .map_err(|err| AppError::runtime("job_store.open", err))?,
    );

    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    let content: Arc<dyn ContentClient> = Arc::new(WatchDirClient::from_settings(&config.client));
    let limiter = ConcurrencyLimiter::from_registry(&registry, Some(metrics.clone()));
    let runner = Arc::new(JobRunner::new(
        RunnerDeps {
            registry,
            store: Arc::clone(&store),
            limiter,
            content,
            mediainfo: MediaInfoExtractor::new(&config.mediainfo_path),
            archives: RarExtractor::new(&config.unrar_path),
            events: events.clone(),
            metrics: Some(metrics.clone()),
            work_root: config.work_root.clone(),
        },
        sender.clone(),
    ));
    let ingester = Arc::new(AnnouncementIngester::new(
        &config.watch_dir,
        &config.work_root,
        store,
        sender,
        events.clone(),
        Some(metrics.clone()),
    ));

    Ok(Services {
        runner,
        ingester,
        receiver,
    })
}

/// Entry point for the pipeline boot sequence.
///
/// # Errors
///
/// Returns an error if dependency construction or startup fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let BootstrapDependencies {
        config,
        events,
        metrics,
    } = dependencies;

    let logging = LoggingConfig {
        level: &config.logging.level,
        format: LogFormat::from_setting(config.logging.format.as_deref()),
        build_sha: build_sha(),
    };
    relgate_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("pipeline");

    info!(
        watch_dir = %config.watch_dir.display(),
        work_root = %config.work_root.display(),
        workers = config.workers,
        "relgate pipeline starting"
    );

    let Services {
        runner,
        ingester,
        receiver,
    } = assemble(&config, &events, &metrics).await?;

    let mut tasks: Vec<JoinHandle<()>> = runner.spawn_workers(receiver, config.workers);
    runner.enqueue_waiting().await?;
    tasks.push(Arc::clone(&ingester).spawn(Duration::from_secs(config.poll_interval_secs)));
    info!(tasks = tasks.len(), "pipeline tasks running");

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::io("signal.ctrl_c", None, err))?;
    info!("shutdown requested");

    for task in tasks {
        if !task.is_finished() {
            task.abort();
        }
        if let Err(err) = task.await {
            if !err.is_cancelled() {
                warn!(error = %err, "pipeline task join failed");
            }
        }
    }

    match metrics.render() {
        Ok(rendered) => debug!(metrics = %rendered, "final metrics"),
        Err(err) => warn!(error = %err, "metrics render failed"),
    }
    info!("relgate pipeline stopped");
    Ok(())
}

/// Reject an explicit `mediainfo` path that does not exist; bare program names
/// are resolved through `PATH` when the tool runs.
fn check_mediainfo(config: &PipelineConfig) -> AppResult<()> {
    let path = &config.mediainfo_path;
    if path.components().count() > 1 && !path.is_file() {
        warn!(path = %path.display(), "mediainfo not found");
        return Err(AppError::MissingDependency { name: "mediainfo" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_test_support::fixtures::{SHAWSHANK_DESCRIPTOR, temp_dir, write_file};
    use std::path::PathBuf;

    fn config_in(root: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            watch_dir: root.join("watch"),
            work_root: root.join("work"),
            job_store_dir: root.join("jobs"),
            mediainfo_path: PathBuf::from("mediainfo"),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn assemble_wires_ingester_to_workers() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-bootstrap-")?;
        let config = config_in(temp.path());
        let events = EventBus::with_capacity(16);
        let metrics = Metrics::new()?;

        let Services {
            runner,
            ingester,
            mut receiver,
        } = assemble(&config, &events, &metrics).await?;
        assert!(config.work_root.is_dir());

        write_file(&config.watch_dir, "shawshank.json", SHAWSHANK_DESCRIPTOR.as_bytes())?;
        let summary = ingester.scan().await?;
        assert_eq!(summary.created.len(), 1);
        assert_eq!(receiver.recv().await, summary.created.first().copied());
        assert_eq!(runner.store().waiting().await, summary.created);
        Ok(())
    }

    #[tokio::test]
    async fn missing_explicit_mediainfo_is_rejected() -> anyhow::Result<()> {
        let temp = temp_dir("relgate-bootstrap-")?;
        let mut config = config_in(temp.path());
        config.mediainfo_path = temp.path().join("bin/mediainfo");
        let err = assemble(&config, &EventBus::new(), &Metrics::new()?)
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected assemble to fail"))?;
        assert!(matches!(
            err,
            AppError::MissingDependency { name: "mediainfo" }
        ));
        Ok(())
    }
}
