#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Job lifecycle events for the release pipeline.
//!
//! The bus hands every event a sequential identifier and keeps a bounded
//! replay ring so late subscribers (the upload step, a dashboard) can catch up
//! from the last id they saw. Delivery uses `tokio::broadcast`; when a
//! subscriber lags, the oldest events are dropped for it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use relgate_core::{JobState, ParkReason};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

/// Identifier assigned to each published event.
pub type EventId = u64;

const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Pipeline events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Event {
    JobCreated {
        job_id: Uuid,
        announcement_id: String,
        source: String,
    },
    JobStateChanged {
        job_id: Uuid,
        from: JobState,
        to: JobState,
    },
    JobParked {
        job_id: Uuid,
        reason: ParkReason,
    },
    JobFailed {
        job_id: Uuid,
        kind: String,
        message: String,
    },
    /// The release is vetted and materialised; the upload step takes over.
    ReadyForUpload {
        job_id: Uuid,
        release_path: String,
        video_files: Vec<String>,
    },
    BackendLoggedIn {
        backend: String,
    },
    HealthChanged {
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "job_created",
            Self::JobStateChanged { .. } => "job_state_changed",
            Self::JobParked { .. } => "job_parked",
            Self::JobFailed { .. } => "job_failed",
            Self::ReadyForUpload { .. } => "ready_for_upload",
            Self::BackendLoggedIn { .. } => "backend_logged_in",
            Self::HealthChanged { .. } => "health_changed",
        }
    }

    /// Job the event is about, if any.
    #[must_use]
    pub const fn job_id(&self) -> Option<Uuid> {
        match self {
            Self::JobCreated { job_id, .. }
            | Self::JobStateChanged { job_id, .. }
            | Self::JobParked { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::ReadyForUpload { job_id, .. } => Some(*job_id),
            Self::BackendLoggedIn { .. } | Self::HealthChanged { .. } => None,
        }
    }
}

/// Event plus its id and emission time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub event: Event,
}

/// Shared event bus built on `tokio::broadcast`.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Bus whose broadcast channel and replay ring hold `capacity` events.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish an event and return its id.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe, replaying buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            backlog.extend(buffer.iter().filter(|item| item.id > since).cloned());
        }

        EventStream {
            backlog,
            receiver: self.sender.subscribe(),
        }
    }

    /// Id of the most recent event still in the replay ring.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Yields the replay backlog first, then live events.
#[derive(Debug)]
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Next event, or `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Adapt into a [`Stream`]; lagged items are skipped.
    #[must_use]
    pub fn into_stream(self) -> impl Stream<Item = EventEnvelope> + Send + 'static {
        tokio_stream::iter(self.backlog)
            .chain(BroadcastStream::new(self.receiver).filter_map(Result::ok))
    }
}
