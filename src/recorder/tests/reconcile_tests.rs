//! Tests for submission runs against a real store.

use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use crate::client::{EventItemResponse, SharedEventsServiceClient};
use crate::config::{ConfigurationProvider, RecorderConfig};
use crate::endpoint::{EndpointProfile, SharedTargeting, SharedTargetingProvider};
use crate::error::AnalyticsError;
use crate::event::AnalyticsEvent;
use crate::recorder::{RecorderCore, SubmissionReport};
use crate::store::{EventRecord, EventStore, RecordId, RecordSummary, SharedEventStore, SqliteEventStore};

use super::{memory_store, respond, seed_events, ScriptedClient};

const ENDPOINT_ID: &str = "endpoint-1";

fn core(
    store: SharedEventStore,
    client: &Arc<ScriptedClient>,
    targeting: SharedTargetingProvider,
    config: RecorderConfig,
) -> RecorderCore {
    let client: SharedEventsServiceClient = client.clone();
    let config: Arc<dyn ConfigurationProvider> = Arc::new(config);
    RecorderCore {
        application_id: "app-1".to_string(),
        store,
        client,
        targeting,
        config,
    }
}

fn targeting() -> SharedTargetingProvider {
    Arc::new(SharedTargeting::new(Some(EndpointProfile::new(ENDPOINT_ID))))
}

fn one_event_budget(store: &SqliteEventStore) -> u64 {
    store.query_oldest(1).unwrap()[0].size
}

#[tokio::test]
async fn test_run_drains_store() {
    let (store, shared) = memory_store();
    let events = seed_events(store.as_ref(), 5);
    let client = Arc::new(ScriptedClient::new());
    let core = core(shared, &client, targeting(), RecorderConfig::default());

    let report = core.run_submission().await;

    assert_eq!(report.batches, 1);
    assert_eq!(report.successful.len(), 5);
    for event in &events {
        assert!(report.successful.contains(&event.event_id));
    }
    assert_eq!(store.count().unwrap(), 0);
    assert_eq!(store.total_pending_size().unwrap(), 0);
}

#[tokio::test]
async fn test_empty_store_makes_no_call() {
    let (_store, shared) = memory_store();
    let client = Arc::new(ScriptedClient::new());
    let core = core(shared, &client, targeting(), RecorderConfig::default());

    let report = core.run_submission().await;

    assert_eq!(report, SubmissionReport::default());
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_run_stops_at_max_submissions() {
    let (store, shared) = memory_store();
    seed_events(store.as_ref(), 10);
    let budget = one_event_budget(&store);
    let client = Arc::new(ScriptedClient::new());
    let config = RecorderConfig::default()
        .with_max_submission_size(budget)
        .with_max_submission_allowed(3);
    let core = core(shared, &client, targeting(), config);

    let report = core.run_submission().await;

    assert_eq!(report.batches, 3);
    assert_eq!(client.call_count(), 3);
    assert_eq!(report.successful.len(), 3);
    assert_eq!(store.count().unwrap(), 7);

    let report = core.run_submission().await;
    assert_eq!(report.batches, 3);
    assert_eq!(store.count().unwrap(), 4);
}

#[tokio::test]
async fn test_retryable_events_survive_the_run() {
    let (store, shared) = memory_store();
    let events = seed_events(store.as_ref(), 3);
    let client = Arc::new(ScriptedClient::new());
    client.push(Ok(respond(
        ENDPOINT_ID,
        vec![
            (events[0].event_id.clone(), EventItemResponse::accepted()),
            (events[1].event_id.clone(), EventItemResponse::new(500, "Throttled")),
            (events[2].event_id.clone(), EventItemResponse::new(400, "BadRequestException")),
        ],
    )));
    let core = core(shared.clone(), &client, targeting(), RecorderConfig::default());

    let report = core.run_submission().await;

    assert!(report.successful.contains(&events[0].event_id));
    assert!(report.failed.contains(&events[2].event_id));
    assert!(!report.successful.contains(&events[1].event_id));
    assert!(!report.failed.contains(&events[1].event_id));

    let pending: Vec<_> = core.pending_events().into_iter().map(|e| e.event_id).collect();
    assert_eq!(pending, vec![events[1].event_id.clone()]);
    assert_eq!(
        store.total_pending_size().unwrap(),
        events[1].to_payload().unwrap().len() as u64
    );
}

#[tokio::test]
async fn test_transient_failure_keeps_whole_batch() {
    let (store, shared) = memory_store();
    seed_events(store.as_ref(), 4);
    let client = Arc::new(ScriptedClient::new());
    client.push(Err(AnalyticsError::transport("offline")));
    let core = core(shared, &client, targeting(), RecorderConfig::default());

    let report = core.run_submission().await;

    assert_eq!(report.batches, 1);
    assert!(report.successful.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(store.count().unwrap(), 4);

    // The next run succeeds with the default accept-all response.
    let report = core.run_submission().await;
    assert_eq!(report.successful.len(), 4);
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_missing_endpoint_discards_events() {
    let (store, shared) = memory_store();
    let events = seed_events(store.as_ref(), 2);
    let client = Arc::new(ScriptedClient::new());
    let targeting: SharedTargetingProvider = Arc::new(SharedTargeting::new(None));
    let core = core(shared, &client, targeting, RecorderConfig::default());

    let report = core.run_submission().await;

    assert_eq!(client.call_count(), 0);
    assert_eq!(report.failed.len(), events.len());
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_corrupt_only_batch_is_cleaned_without_a_call() {
    let (store, shared) = memory_store();
    store.insert_raw(10, None);
    store.append("garbage").unwrap();
    let client = Arc::new(ScriptedClient::new());
    let core = core(shared, &client, targeting(), RecorderConfig::default());

    let report = core.run_submission().await;

    assert_eq!(report.batches, 1);
    assert_eq!(client.call_count(), 0);
    assert_eq!(store.count().unwrap(), 0);
    assert_eq!(store.total_pending_size().unwrap(), 0);
}

#[tokio::test]
async fn test_endpoint_is_read_per_batch() {
    let (store, shared) = memory_store();
    seed_events(store.as_ref(), 2);
    let budget = one_event_budget(&store);
    let client = Arc::new(ScriptedClient::new());
    let targeting = Arc::new(SharedTargeting::new(Some(EndpointProfile::new(ENDPOINT_ID))));
    let provider: SharedTargetingProvider = targeting.clone();
    let config = RecorderConfig::default().with_max_submission_size(budget);
    let core = core(shared, &client, provider, config);

    core.run_submission().await;
    targeting.set(Some(EndpointProfile::new("endpoint-2")));
    seed_events(store.as_ref(), 1);
    core.run_submission().await;

    let endpoints: Vec<_> = client.calls().into_iter().map(|c| c.endpoint_id).collect();
    assert_eq!(endpoints, vec![ENDPOINT_ID, ENDPOINT_ID, "endpoint-2"]);
}

#[tokio::test]
async fn test_event_recorded_twice_shares_one_result() {
    let (store, shared) = memory_store();
    let event = AnalyticsEvent::new("purchase");
    let payload = event.to_payload().unwrap();
    store.append(&payload).unwrap();
    store.append(&payload).unwrap();
    let client = Arc::new(ScriptedClient::new());
    let core = core(shared, &client, targeting(), RecorderConfig::default());

    let report = core.run_submission().await;

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].events.len(), 1);
    assert!(report.successful.contains(&event.event_id));
    assert_eq!(store.count().unwrap(), 0);
}

/// Store that remembers which threads read from and deleted from it.
struct ThreadTrackingStore {
    inner: SqliteEventStore,
    threads: Mutex<Vec<ThreadId>>,
}

impl ThreadTrackingStore {
    fn new() -> Self {
        Self {
            inner: SqliteEventStore::open_in_memory().unwrap(),
            threads: Mutex::new(Vec::new()),
        }
    }

    fn track(&self) {
        self.threads.lock().unwrap().push(std::thread::current().id());
    }
}

impl EventStore for ThreadTrackingStore {
    fn append(&self, payload: &str) -> Result<RecordId, AnalyticsError> {
        self.inner.append(payload)
    }

    fn query_oldest(&self, limit: usize) -> Result<Vec<RecordSummary>, AnalyticsError> {
        self.inner.query_oldest(limit)
    }

    fn read_after(&self, after: RecordId, limit: usize) -> Result<Vec<EventRecord>, AnalyticsError> {
        self.track();
        self.inner.read_after(after, limit)
    }

    fn delete(&self, id: RecordId, known_size: Option<u64>) -> Result<usize, AnalyticsError> {
        self.track();
        self.inner.delete(id, known_size)
    }

    fn total_pending_size(&self) -> Result<u64, AnalyticsError> {
        self.inner.total_pending_size()
    }
}

#[tokio::test]
async fn test_store_work_stays_off_the_runtime_thread() {
    let store = Arc::new(ThreadTrackingStore::new());
    seed_events(&store.inner, 3);
    let shared: SharedEventStore = store.clone();
    let client = Arc::new(ScriptedClient::new());
    let core = core(shared, &client, targeting(), RecorderConfig::default());
    let runtime_thread = std::thread::current().id();

    let report = core.run_submission().await;

    assert_eq!(report.successful.len(), 3);
    assert_eq!(store.inner.count().unwrap(), 0);
    let threads = store.threads.lock().unwrap();
    assert!(!threads.is_empty());
    assert!(threads.iter().all(|thread| *thread != runtime_thread));
}
