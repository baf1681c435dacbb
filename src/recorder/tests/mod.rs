//! Tests for the recorder module.

mod reconcile_tests;

#[cfg(test)]
mod property_tests;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{
    EventItemResponse, EventsResponse, EventsServiceClient, ItemResponse, PutEventsRequest,
};
use crate::error::AnalyticsError;
use crate::event::AnalyticsEvent;
use crate::store::{EventStore, SharedEventStore, SqliteEventStore};

/// Mock client that replays queued results and accepts everything once the
/// queue runs dry.
#[derive(Default)]
pub(super) struct ScriptedClient {
    responses: Mutex<VecDeque<Result<EventsResponse, AnalyticsError>>>,
    calls: Mutex<Vec<PutEventsRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<EventsResponse, AnalyticsError>) {
        self.responses.lock().unwrap().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<PutEventsRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventsServiceClient for ScriptedClient {
    async fn put_events(&self, request: PutEventsRequest) -> Result<EventsResponse, AnalyticsError> {
        let scripted = self.responses.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| Ok(accept_all(&request)));
        self.calls.lock().unwrap().push(request);
        result
    }
}

/// Builds a response that accepts every event in `request`.
pub(super) fn accept_all(request: &PutEventsRequest) -> EventsResponse {
    respond(
        &request.endpoint_id,
        request
            .events
            .keys()
            .map(|id| (id.clone(), EventItemResponse::accepted())),
    )
}

/// Builds a response for one endpoint from per-event results.
pub(super) fn respond(
    endpoint_id: &str,
    events: impl IntoIterator<Item = (String, EventItemResponse)>,
) -> EventsResponse {
    let mut response = EventsResponse::default();
    response.results.insert(
        endpoint_id.to_string(),
        ItemResponse {
            endpoint_item_response: None,
            events_item_response: events.into_iter().collect(),
        },
    );
    response
}

pub(super) fn memory_store() -> (Arc<SqliteEventStore>, SharedEventStore) {
    let store = Arc::new(SqliteEventStore::open_in_memory().unwrap());
    let shared: SharedEventStore = store.clone();
    (store, shared)
}

/// Appends events and returns them in insertion order.
pub(super) fn seed_events(store: &dyn EventStore, count: usize) -> Vec<AnalyticsEvent> {
    (0..count)
        .map(|i| {
            let event = AnalyticsEvent::with_timestamp("test_event", 1_700_000_000_000 + i as i64)
                .with_attribute("index", i.to_string());
            store.append(&event.to_payload().unwrap()).unwrap();
            event
        })
        .collect()
}
