//! Per-backend download slots.
//!
//! # Design
//! - One semaphore per backend name; backends never share slots.
//! - Permits are RAII guards, so a slot comes back on every exit path,
//!   including early returns and task cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use relgate_telemetry::Metrics;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use relgate_sources::BackendRegistry;

const FALLBACK_CEILING: usize = 1;

#[derive(Debug)]
struct Slot {
    semaphore: Arc<Semaphore>,
    ceiling: usize,
}

/// Bounds the number of concurrent downloads per backend.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    metrics: Option<Metrics>,
}

impl ConcurrencyLimiter {
    /// Limiter with no pre-registered backends.
    #[must_use]
    pub fn new(metrics: Option<Metrics>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            metrics,
        }
    }

    /// Limiter whose ceilings come from each registered backend.
    #[must_use]
    pub fn from_registry(registry: &BackendRegistry, metrics: Option<Metrics>) -> Self {
        let limiter = Self::new(metrics);
        for backend in registry.iter() {
            limiter.register(backend.name(), backend.maximum_parallel_downloads());
        }
        limiter
    }

    /// Set the ceiling for `backend`; zero is raised to one.
    ///
    /// Re-registering an existing backend keeps its current semaphore.
    pub fn register(&self, backend: &str, ceiling: usize) {
        let ceiling = ceiling.max(FALLBACK_CEILING);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(backend.to_string()).or_insert_with(|| Slot {
            semaphore: Arc::new(Semaphore::new(ceiling)),
            ceiling,
        });
    }

    /// Wait for a free slot on `backend`.
    ///
    /// Unknown backends get a single slot on first use.
    pub async fn acquire(&self, backend: &str) -> DownloadPermit {
        let semaphore = self.semaphore(backend);
        let permit = loop {
            match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => break permit,
                // Slots are never closed.
                Err(_) => tokio::task::yield_now().await,
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.add_download_in_flight(backend, 1);
        }
        debug!(backend, "download slot acquired");
        DownloadPermit {
            backend: backend.to_string(),
            metrics: self.metrics.clone(),
            _permit: permit,
        }
    }

    /// Slots currently held on `backend`.
    #[must_use]
    pub fn in_flight(&self, backend: &str) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(backend).map_or(0, |slot| {
            slot.ceiling
                .saturating_sub(slot.semaphore.available_permits())
        })
    }

    /// Configured ceiling for `backend`, if it has been seen.
    #[must_use]
    pub fn ceiling(&self, backend: &str) -> Option<usize> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(backend).map(|slot| slot.ceiling)
    }

    fn semaphore(&self, backend: &str) -> Arc<Semaphore> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(backend.to_string()).or_insert_with(|| Slot {
            semaphore: Arc::new(Semaphore::new(FALLBACK_CEILING)),
            ceiling: FALLBACK_CEILING,
        });
        Arc::clone(&slot.semaphore)
    }
}

/// A held download slot; dropping it frees the slot.
#[derive(Debug)]
pub struct DownloadPermit {
    backend: String,
    metrics: Option<Metrics>,
    _permit: OwnedSemaphorePermit,
}

impl DownloadPermit {
    /// Backend the slot belongs to.
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }
}

impl Drop for DownloadPermit {
    fn drop(&mut self) {
        if let Some(metrics) = &self.metrics {
            metrics.add_download_in_flight(&self.backend, -1);
        }
        debug!(backend = %self.backend, "download slot released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_admits_more_than_the_ceiling() {
        let limiter = ConcurrencyLimiter::new(None);
        limiter.register("prowlarr", 2);

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _permit = limiter.acquire("prowlarr").await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.expect("download task panicked");
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(limiter.in_flight("prowlarr"), 0);
    }

    #[tokio::test]
    async fn dropping_a_permit_frees_the_slot() {
        let limiter = ConcurrencyLimiter::new(None);
        let permit = limiter.acquire("file").await;
        assert_eq!(permit.backend(), "file");
        assert_eq!(limiter.in_flight("file"), 1);
        assert_eq!(limiter.ceiling("file"), Some(1));

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), limiter.acquire("file")).await;
        assert!(blocked.is_err());

        drop(permit);
        assert_eq!(limiter.in_flight("file"), 0);
        let _again = limiter.acquire("file").await;
        assert_eq!(limiter.in_flight("file"), 1);
    }

    #[tokio::test]
    async fn backends_do_not_share_slots() {
        let limiter = ConcurrencyLimiter::new(None);
        limiter.register("prowlarr", 1);
        limiter.register("torrent", 0);
        assert_eq!(limiter.ceiling("torrent"), Some(1));

        let _prowlarr = limiter.acquire("prowlarr").await;
        let torrent =
            tokio::time::timeout(Duration::from_millis(50), limiter.acquire("torrent")).await;
        assert!(torrent.is_ok());
    }

    #[tokio::test]
    async fn permits_drive_the_in_flight_gauge() -> anyhow::Result<()> {
        let metrics = Metrics::new()?;
        let limiter = ConcurrencyLimiter::new(Some(metrics.clone()));
        limiter.register("prowlarr", 3);

        let first = limiter.acquire("prowlarr").await;
        let second = limiter.acquire("prowlarr").await;
        assert_eq!(metrics.downloads_in_flight("prowlarr"), 2);
        drop(first);
        drop(second);
        assert_eq!(metrics.downloads_in_flight("prowlarr"), 0);
        Ok(())
    }
}
