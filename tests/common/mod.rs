//! Shared test utilities for integration tests.
//!
//! This module provides helpers and proptest strategies for creating test
//! fixtures used across integration tests.

#![allow(dead_code)] // These utilities are used by other integration test files

use std::path::Path;
use std::sync::{Arc, Once};

use aws_pinpoint_analytics::{
    AnalyticsError, EventRecorder, RecorderConfig, SharedEventStore, SqliteEventStore,
};
use aws_pinpoint_analytics_testing::{test_recorder, MockEventsClient};
use proptest::prelude::*;

static INIT_TRACING: Once = Once::new();

/// Installs a test-writer tracing subscriber once per test binary.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Opens an on-disk store under `dir`.
pub fn disk_store(dir: &Path) -> Result<Arc<SqliteEventStore>, AnalyticsError> {
    Ok(Arc::new(SqliteEventStore::open(dir.join("events.db"))?))
}

/// Builds a recorder over `store` with a mock client and static config.
pub fn recorder(
    store: Arc<SqliteEventStore>,
    client: Arc<MockEventsClient>,
    config: RecorderConfig,
) -> EventRecorder {
    let store: SharedEventStore = store;
    test_recorder(store, client, Arc::new(config)).unwrap()
}

// =============================================================================
// Proptest Strategies
// =============================================================================

/// Strategy for event types within the service's length limit.
pub fn event_type_strategy() -> impl Strategy<Value = String> {
    "[a-z_]{1,50}"
}

/// Strategy for small attribute maps.
pub fn attributes_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::vec(("[a-z]{1,10}", "[a-zA-Z0-9 ]{0,40}"), 0..8)
}
