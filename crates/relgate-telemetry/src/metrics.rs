//! Prometheus-backed pipeline metrics.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Label values are the stable identifiers from the core model (`JobState::as_str`,
//!   `ErrorKind::as_str`), never free text.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared by the pipeline tasks.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

struct MetricsInner {
    registry: Registry,
    announcements_ingested_total: IntCounterVec,
    job_stage_total: IntCounterVec,
    downloads_in_flight: IntGaugeVec,
    media_analyses_total: IntCounterVec,
    jobs_failed_total: IntCounterVec,
}

impl Metrics {
    /// Construct a registry with the pipeline collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let announcements_ingested_total = counter_vec(
            "announcements_ingested_total",
            "Announcement descriptors turned into jobs by format",
            &["format"],
        )?;
        let job_stage_total = counter_vec(
            "job_stage_total",
            "Job stage outcomes by stage and status",
            &["stage", "status"],
        )?;
        let downloads_in_flight = IntGaugeVec::new(
            Opts::new("downloads_in_flight", "Downloads holding a backend slot"),
            &["backend"],
        )
        .map_err(|source| TelemetryError::definition("downloads_in_flight", source))?;
        let media_analyses_total = counter_vec(
            "media_analyses_total",
            "Media analysis runs by outcome",
            &["outcome"],
        )?;
        let jobs_failed_total =
            counter_vec("jobs_failed_total", "Failed jobs by error kind", &["kind"])?;

        register(&registry, "announcements_ingested_total", &announcements_ingested_total)?;
        register(&registry, "job_stage_total", &job_stage_total)?;
        register(&registry, "downloads_in_flight", &downloads_in_flight)?;
        register(&registry, "media_analyses_total", &media_analyses_total)?;
        register(&registry, "jobs_failed_total", &jobs_failed_total)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                announcements_ingested_total,
                job_stage_total,
                downloads_in_flight,
                media_analyses_total,
                jobs_failed_total,
            }),
        })
    }

    /// Count an ingested announcement of the given descriptor format.
    pub fn inc_announcement(&self, format: &str) {
        self.inner
            .announcements_ingested_total
            .with_label_values(&[format])
            .inc();
    }

    /// Count a stage outcome (`started`, `completed`, `failed`, `parked`).
    pub fn inc_stage(&self, stage: &str, status: &str) {
        self.inner
            .job_stage_total
            .with_label_values(&[stage, status])
            .inc();
    }

    /// Adjust the in-flight gauge of `backend` by `delta`.
    pub fn add_download_in_flight(&self, backend: &str, delta: i64) {
        self.inner
            .downloads_in_flight
            .with_label_values(&[backend])
            .add(delta);
    }

    /// Current in-flight downloads of `backend`.
    #[must_use]
    pub fn downloads_in_flight(&self, backend: &str) -> i64 {
        self.inner
            .downloads_in_flight
            .with_label_values(&[backend])
            .get()
    }

    /// Count a media analysis outcome (`ok`, `tool_error`, `invalid`).
    pub fn inc_media_analysis(&self, outcome: &str) {
        self.inner
            .media_analyses_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count a failed job by error kind.
    pub fn inc_job_failed(&self, kind: &str) {
        self.inner
            .jobs_failed_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Failed jobs recorded for `kind`.
    #[must_use]
    pub fn jobs_failed(&self, kind: &str) -> u64 {
        self.inner.jobs_failed_total.with_label_values(&[kind]).get()
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Exposition { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::ExpositionEncoding { source })
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::definition(name, source))
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::registration(name, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_gauges_render() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_announcement("json");
        metrics.inc_stage("downloading", "completed");
        metrics.add_download_in_flight("prowlarr", 2);
        metrics.add_download_in_flight("prowlarr", -1);
        metrics.inc_media_analysis("ok");
        metrics.inc_job_failed("no_video_files");

        assert_eq!(metrics.downloads_in_flight("prowlarr"), 1);
        assert_eq!(metrics.jobs_failed("no_video_files"), 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("announcements_ingested_total{format=\"json\"} 1"));
        assert!(rendered.contains("downloads_in_flight{backend=\"prowlarr\"} 1"));
        assert!(rendered.contains("job_stage_total"));
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_job_failed("io");
        assert_eq!(second.jobs_failed("io"), 0);
        Ok(())
    }
}
