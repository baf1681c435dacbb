//! Event recording and batch submission.
//!
//! This module provides [`EventRecorder`], the client-side queue that
//! buffers analytics events in a durable store and uploads them in batches.
//!
//! ## Module Structure
//!
//! - `admission` - Append plus oldest-first eviction under the size ceiling
//! - `batch` - Batch assembly under the submission byte budget
//! - `submission` - One `PutEvents` call per batch and result classification
//! - `worker` - Single-slot task that serializes submission runs
//!
//! ## Delivery Guarantees
//!
//! Events are delivered at least once. A record leaves the store only when
//! it was accepted, permanently rejected, found corrupt, or evicted by the
//! pending-size ceiling. Retryable failures stay in the store for the next
//! run.
//!
//! Neither [`EventRecorder::record_event`] nor
//! [`EventRecorder::submit_events`] returns an error: analytics failures
//! are logged and never interrupt the host application.

mod admission;
mod batch;
mod submission;
mod worker;

#[cfg(test)]
mod tests;

pub use batch::{Batch, BatchAssembler, BatchedEvent};
pub use submission::{
    BatchOutcome, EventResult, SubmissionEngine, SubmissionOutcome, ACCEPTED_MESSAGE,
};

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinError;

use crate::client::SharedEventsServiceClient;
use crate::config::{ConfigurationProvider, RecorderConfig};
use crate::endpoint::SharedTargetingProvider;
use crate::error::AnalyticsError;
use crate::event::AnalyticsEvent;
use crate::store::{self, EventCursor, RecordId, SharedEventStore, SqliteEventStore};

use worker::SubmissionWorker;

/// Handle of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordHandle(RecordId);

impl RecordHandle {
    /// Returns the store id of the record.
    pub fn id(&self) -> RecordId {
        self.0
    }
}

/// Outcome of one submission run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    /// Event ids accepted by the service
    pub successful: HashSet<String>,
    /// Event ids permanently rejected and discarded
    pub failed: HashSet<String>,
    /// Number of batches assembled during the run
    pub batches: usize,
}

impl SubmissionReport {
    fn merge(&mut self, outcome: &BatchOutcome) {
        self.successful.extend(outcome.successful.iter().cloned());
        self.failed.extend(outcome.failed.iter().cloned());
    }
}

/// Everything a submission run needs, shared with the worker task.
pub(crate) struct RecorderCore {
    application_id: String,
    store: SharedEventStore,
    client: SharedEventsServiceClient,
    targeting: SharedTargetingProvider,
    config: Arc<dyn ConfigurationProvider>,
}

impl RecorderCore {
    fn record(&self, event: &AnalyticsEvent) -> Option<RecordHandle> {
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(event_type = %event.event_type, error = %e, "Failed to serialize event");
                return None;
            }
        };
        admission::admit(self.store.as_ref(), self.config.as_ref(), &payload).map(RecordHandle)
    }

    /// Runs assemble/submit/delete cycles until the store is drained or the
    /// per-run batch ceiling is reached.
    ///
    /// Store reads and deletes run on the blocking pool; only the
    /// `PutEvents` call is awaited on the worker task.
    pub(crate) async fn run_submission(&self) -> SubmissionReport {
        let mut report = SubmissionReport::default();
        let max_batches = self.config.max_submission_allowed();
        let assembler = BatchAssembler::new(
            self.config.max_submission_size(),
            self.config.clipped_event_length(),
        );
        let engine = SubmissionEngine::new(
            &self.client,
            &self.application_id,
            self.config.terminal_error_policy(),
        );
        let mut cursor = store::query_all(&self.store);

        while report.batches < max_batches {
            let batch = match next_batch(assembler, cursor).await {
                Ok((batch, rest)) => {
                    cursor = rest;
                    batch
                }
                Err(e) => {
                    tracing::error!(error = %e, "Batch assembly task failed");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            report.batches += 1;

            let endpoint = self.targeting.current_endpoint();
            let outcome = engine.submit(batch, endpoint).await;
            report.merge(&outcome);

            if let Err(e) = delete_scheduled(&self.store, outcome.delete_schedule).await {
                tracing::error!(error = %e, "Delete task failed");
                break;
            }
        }

        if report.batches > 0 {
            tracing::info!(
                batches = report.batches,
                successful = report.successful.len(),
                failed = report.failed.len(),
                "Event submission run finished"
            );
        }
        report
    }

    fn pending_events(&self) -> Vec<AnalyticsEvent> {
        store::query_all(&self.store)
            .filter_map(|record| record.payload)
            .filter_map(|payload| AnalyticsEvent::from_payload(&payload).ok())
            .collect()
    }
}

/// Assembles the next batch off the async runtime, handing the cursor back.
async fn next_batch(
    assembler: BatchAssembler,
    mut cursor: EventCursor,
) -> Result<(Batch, EventCursor), JoinError> {
    tokio::task::spawn_blocking(move || {
        let batch = assembler.assemble(&mut cursor);
        (batch, cursor)
    })
    .await
}

/// Deletes every scheduled record off the async runtime.
async fn delete_scheduled(
    store: &SharedEventStore,
    schedule: BTreeMap<RecordId, Option<u64>>,
) -> Result<(), JoinError> {
    if schedule.is_empty() {
        return Ok(());
    }
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        for (id, known_size) in schedule {
            match store.delete(id, known_size) {
                Ok(0) => tracing::debug!(record_id = id, "Pending event already removed"),
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(record_id = id, error = %e, "Failed to delete submitted event")
                }
            }
        }
    })
    .await
}

/// Durable, size-bounded analytics event queue with batched upload.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use aws_pinpoint_analytics::{
///     AnalyticsEvent, EndpointProfile, EventRecorder, PinpointEventsClient, SharedTargeting,
/// };
///
/// # async fn example() -> Result<(), aws_pinpoint_analytics::AnalyticsError> {
/// let recorder = EventRecorder::builder("my-pinpoint-app-id")
///     .store_path("/var/lib/my-app/events.db")?
///     .client(Arc::new(PinpointEventsClient::from_env().await?))
///     .targeting(Arc::new(SharedTargeting::new(Some(EndpointProfile::new("device-1")))))
///     .build()?;
///
/// recorder.record_event(&AnalyticsEvent::new("app_open"));
/// if let Some(report) = recorder.submit_events() {
///     let report = report.await.expect("worker alive");
///     println!("{} events delivered", report.successful.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct EventRecorder {
    core: Arc<RecorderCore>,
    worker: SubmissionWorker,
}

impl EventRecorder {
    /// Starts building a recorder for a Pinpoint application.
    pub fn builder(application_id: impl Into<String>) -> EventRecorderBuilder {
        EventRecorderBuilder {
            application_id: application_id.into(),
            store: None,
            client: None,
            targeting: None,
            config: None,
        }
    }

    /// Persists an event, evicting the oldest pending events if the
    /// pending-size ceiling is exceeded.
    ///
    /// Returns `None` if the event could not be stored. Never blocks on the
    /// network.
    pub fn record_event(&self, event: &AnalyticsEvent) -> Option<RecordHandle> {
        self.core.record(event)
    }

    /// Requests a submission run on the worker.
    ///
    /// Returns a receiver for the run's report, or `None` when a run is
    /// already waiting and this trigger was coalesced into it.
    pub fn submit_events(&self) -> Option<oneshot::Receiver<SubmissionReport>> {
        self.worker.trigger()
    }

    /// Returns every decodable pending event, oldest first.
    pub fn pending_events(&self) -> Vec<AnalyticsEvent> {
        self.core.pending_events()
    }

    /// Returns the total size of pending events, or `None` if the store
    /// cannot be read.
    pub fn pending_size(&self) -> Option<u64> {
        match self.core.store.total_pending_size() {
            Ok(size) => Some(size),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read pending size");
                None
            }
        }
    }

    /// Stops accepting triggers and waits for queued runs to finish.
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
    }
}

/// Builder for [`EventRecorder`].
pub struct EventRecorderBuilder {
    application_id: String,
    store: Option<SharedEventStore>,
    client: Option<SharedEventsServiceClient>,
    targeting: Option<SharedTargetingProvider>,
    config: Option<Arc<dyn ConfigurationProvider>>,
}

impl EventRecorderBuilder {
    /// Uses an existing store.
    pub fn store(mut self, store: SharedEventStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Opens a SQLite store at `path`.
    pub fn store_path(mut self, path: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        self.store = Some(Arc::new(SqliteEventStore::open(path)?));
        Ok(self)
    }

    /// Sets the events service client.
    pub fn client(mut self, client: SharedEventsServiceClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the targeting provider.
    pub fn targeting(mut self, targeting: SharedTargetingProvider) -> Self {
        self.targeting = Some(targeting);
        self
    }

    /// Sets the configuration provider. Defaults to [`RecorderConfig::default`].
    pub fn config(mut self, config: Arc<dyn ConfigurationProvider>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the recorder and spawns its submission worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<EventRecorder, AnalyticsError> {
        if self.application_id.is_empty() {
            return Err(AnalyticsError::validation("Application id must not be empty"));
        }
        let store = self
            .store
            .ok_or_else(|| AnalyticsError::validation("An event store is required"))?;
        let client = self
            .client
            .ok_or_else(|| AnalyticsError::validation("An events service client is required"))?;
        let targeting = self
            .targeting
            .ok_or_else(|| AnalyticsError::validation("A targeting provider is required"))?;
        let config = self
            .config
            .unwrap_or_else(|| Arc::new(RecorderConfig::default()));

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            AnalyticsError::validation(format!("EventRecorder requires a Tokio runtime: {}", e))
        })?;

        let core = Arc::new(RecorderCore {
            application_id: self.application_id,
            store,
            client,
            targeting,
            config,
        });
        let worker = SubmissionWorker::spawn(Arc::clone(&core), &runtime);

        Ok(EventRecorder { core, worker })
    }
}
