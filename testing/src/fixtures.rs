//! Builders for events, endpoints, and recorders used across tests.

use std::sync::Arc;

use aws_pinpoint_analytics::{
    AnalyticsError, AnalyticsEvent, ConfigurationProvider, EndpointProfile, EventRecorder,
    SharedEventStore, SharedEventsServiceClient, SharedTargeting, SqliteEventStore,
};

/// Application id used by test recorders.
pub const TEST_APP_ID: &str = "test-application";

/// Endpoint id used by test targeting providers.
pub const TEST_ENDPOINT_ID: &str = "test-endpoint";

/// Creates a numbered event with a fixed timestamp.
///
/// Events with single-digit indices serialize to payloads of equal length.
pub fn numbered_event(index: usize) -> AnalyticsEvent {
    AnalyticsEvent::with_timestamp("test_event", 1_700_000_000_000)
        .with_attribute("index", index.to_string())
}

/// Creates an event whose serialized payload is at least `bytes` long.
///
/// Padding is spread over attributes of at most 1000 characters, so the
/// largest reachable payload is a little under 50 KB.
pub fn padded_event(bytes: usize) -> AnalyticsEvent {
    let mut event = numbered_event(0);
    let mut index = 0;
    while event.to_payload().map(|p| p.len()).unwrap_or(usize::MAX) < bytes {
        let missing = bytes - event.to_payload().map(|p| p.len()).unwrap_or(0);
        if !event.add_attribute(format!("pad{}", index), "x".repeat(missing.min(1000))) {
            break;
        }
        index += 1;
    }
    event
}

/// Creates a targeting provider holding the test endpoint.
pub fn test_targeting() -> Arc<SharedTargeting> {
    Arc::new(SharedTargeting::new(Some(EndpointProfile::new(TEST_ENDPOINT_ID))))
}

/// Creates an in-memory store.
pub fn memory_store() -> Result<Arc<SqliteEventStore>, AnalyticsError> {
    Ok(Arc::new(SqliteEventStore::open_in_memory()?))
}

/// Builds a recorder over `store` using the test application and endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn test_recorder(
    store: SharedEventStore,
    client: SharedEventsServiceClient,
    config: Arc<dyn ConfigurationProvider>,
) -> Result<EventRecorder, AnalyticsError> {
    EventRecorder::builder(TEST_APP_ID)
        .store(store)
        .client(client)
        .targeting(test_targeting())
        .config(config)
        .build()
}
