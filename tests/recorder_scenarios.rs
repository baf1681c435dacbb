//! Integration tests for recording, eviction, and submission against an
//! on-disk store.

mod common;

use std::sync::Arc;

use aws_pinpoint_analytics::{
    AnalyticsError, AnalyticsEvent, EventItemResponse, RecorderConfig,
    SharedEventStore,
};
use aws_pinpoint_analytics_testing::{
    numbered_event, padded_event, DefaultAnswer, MockEventsClient, TEST_APP_ID,
    TEST_ENDPOINT_ID,
};
use proptest::prelude::*;
use tempfile::TempDir;

use common::*;

#[tokio::test]
async fn test_events_survive_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let events: Vec<_> = (0..3).map(numbered_event).collect();

    {
        let client = Arc::new(MockEventsClient::new());
        let recorder = recorder(
            disk_store(dir.path()).unwrap(),
            client.clone(),
            RecorderConfig::default(),
        );
        for event in &events {
            assert!(recorder.record_event(event).is_some());
        }
        recorder.shutdown().await;
        assert_eq!(client.call_count(), 0);
    }

    let store = disk_store(dir.path()).unwrap();
    let client = Arc::new(MockEventsClient::new());
    let recorder = recorder(store.clone(), client.clone(), RecorderConfig::default());

    let pending: Vec<_> = recorder.pending_events().into_iter().map(|e| e.event_id).collect();
    let expected: Vec<_> = events.iter().map(|e| e.event_id.clone()).collect();
    assert_eq!(pending, expected);

    let report = recorder.submit_events().unwrap().await.unwrap();
    assert_eq!(report.successful.len(), 3);
    assert_eq!(store.count().unwrap(), 0);

    let calls = client.get_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].application_id, TEST_APP_ID);
    assert_eq!(calls[0].endpoint_id, TEST_ENDPOINT_ID);
    recorder.shutdown().await;
}

#[tokio::test]
async fn test_sixteen_kib_ceiling_keeps_newest_events() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = disk_store(dir.path()).unwrap();
    let client = Arc::new(MockEventsClient::new());
    let config = RecorderConfig::default().with_max_pending_size(16 * 1024);
    let recorder = recorder(store.clone(), client, config);

    let events: Vec<_> = (0..20).map(|_| padded_event(1024)).collect();
    let size = events[0].to_payload().unwrap().len() as u64;
    for event in &events {
        recorder.record_event(event);
    }

    let kept = (16 * 1024 / size) as usize;
    let pending: Vec<_> = recorder.pending_events().into_iter().map(|e| e.event_id).collect();
    let newest: Vec<_> = events[events.len() - kept..]
        .iter()
        .map(|e| e.event_id.clone())
        .collect();
    assert_eq!(pending, newest);
    assert!(recorder.pending_size().unwrap() <= 16 * 1024);
    recorder.shutdown().await;
}

#[tokio::test]
async fn test_run_is_bounded_by_max_submissions() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = disk_store(dir.path()).unwrap();
    let client = Arc::new(MockEventsClient::new());
    let one_event = numbered_event(0).to_payload().unwrap().len() as u64;
    let config = RecorderConfig::default()
        .with_max_submission_size(one_event * 2)
        .with_max_submission_allowed(2);
    let recorder = recorder(store.clone(), client.clone(), config);

    for i in 0..9 {
        recorder.record_event(&numbered_event(i));
    }

    let report = recorder.submit_events().unwrap().await.unwrap();
    assert_eq!(report.batches, 2);
    assert_eq!(report.successful.len(), 4);
    assert_eq!(client.call_count(), 2);
    assert!(client.get_calls().iter().all(|c| c.event_ids.len() == 2));
    assert_eq!(store.count().unwrap(), 5);

    recorder.submit_events().unwrap().await.unwrap();
    let last = recorder.submit_events().unwrap().await.unwrap();
    assert_eq!(last.batches, 1);
    assert_eq!(store.count().unwrap(), 0);
    recorder.shutdown().await;
}

#[tokio::test]
async fn test_retryable_events_are_delivered_later() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = disk_store(dir.path()).unwrap();
    let flaky = numbered_event(1);
    let client = Arc::new(
        MockEventsClient::new()
            .with_event_answer(flaky.event_id.clone(), EventItemResponse::new(500, "Throttled")),
    );
    let recorder = recorder(store.clone(), client.clone(), RecorderConfig::default());

    recorder.record_event(&numbered_event(0));
    recorder.record_event(&flaky);
    recorder.record_event(&numbered_event(2));

    let first = recorder.submit_events().unwrap().await.unwrap();
    assert_eq!(first.successful.len(), 2);
    assert!(!first.successful.contains(&flaky.event_id));
    assert!(!first.failed.contains(&flaky.event_id));
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(
        recorder.pending_size(),
        Some(flaky.to_payload().unwrap().len() as u64)
    );

    client.clear_event_answer(&flaky.event_id);
    let second = recorder.submit_events().unwrap().await.unwrap();
    assert!(second.successful.contains(&flaky.event_id));
    assert_eq!(store.count().unwrap(), 0);
    recorder.shutdown().await;
}

#[tokio::test]
async fn test_terminal_rejections_are_discarded() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = disk_store(dir.path()).unwrap();
    let client = Arc::new(MockEventsClient::new().with_default_answer(DefaultAnswer::Reject {
        status_code: 400,
        message: "ValidationException: Event timestamp too old".to_string(),
    }));
    let recorder = recorder(store.clone(), client, RecorderConfig::default());

    for i in 0..3 {
        recorder.record_event(&numbered_event(i));
    }

    let report = recorder.submit_events().unwrap().await.unwrap();
    assert_eq!(report.failed.len(), 3);
    assert!(report.successful.is_empty());
    assert_eq!(store.count().unwrap(), 0);
    recorder.shutdown().await;
}

#[tokio::test]
async fn test_outage_then_recovery() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = disk_store(dir.path()).unwrap();
    let client = Arc::new(
        MockEventsClient::new()
            .with_response(Err(AnalyticsError::transport("network unreachable")))
            .with_response(Err(AnalyticsError::service(
                503,
                "ServiceUnavailableException",
                "try again",
            ))),
    );
    let recorder = recorder(store.clone(), client.clone(), RecorderConfig::default());
    recorder.record_event(&numbered_event(0));

    for _ in 0..2 {
        let report = recorder.submit_events().unwrap().await.unwrap();
        assert!(report.successful.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(store.count().unwrap(), 1);
    }

    let report = recorder.submit_events().unwrap().await.unwrap();
    assert_eq!(report.successful.len(), 1);
    assert_eq!(client.call_count(), 3);
    recorder.shutdown().await;
}

#[tokio::test]
async fn test_non_finite_metric_is_never_silently_lost() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = disk_store(dir.path()).unwrap();
    let client = Arc::new(MockEventsClient::new());
    let recorder = recorder(store.clone(), client.clone(), RecorderConfig::default());

    // The builder drops the NaN metric and keeps the event.
    let purchase = AnalyticsEvent::new("purchase").with_metric("price", f64::NAN);
    assert!(purchase.metrics.is_empty());
    assert!(recorder.record_event(&purchase).is_some());

    // A NaN written straight into the map is refused at record time.
    let mut refund = AnalyticsEvent::new("refund");
    refund.metrics.insert("amount".to_string(), f64::INFINITY);
    assert!(recorder.record_event(&refund).is_none());
    assert_eq!(store.count().unwrap(), 1);

    let report = recorder.submit_events().unwrap().await.unwrap();
    assert!(report.successful.contains(&purchase.event_id));
    assert_eq!(client.call_count(), 1);
    assert_eq!(client.get_calls()[0].event_ids, vec![purchase.event_id.clone()]);
    assert_eq!(store.count().unwrap(), 0);
    recorder.shutdown().await;
}

#[tokio::test]
async fn test_config_changes_apply_without_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = disk_store(dir.path()).unwrap();
    let shared_store: SharedEventStore = store.clone();
    let config = Arc::new(std::sync::RwLock::new(
        RecorderConfig::default().with_max_submission_allowed(1),
    ));
    let one_event = numbered_event(0).to_payload().unwrap().len() as u64;
    config.write().unwrap().max_submission_size = one_event;
    let client = Arc::new(MockEventsClient::new());
    let recorder = aws_pinpoint_analytics_testing::test_recorder(
        shared_store,
        client.clone(),
        config.clone(),
    )
    .unwrap();

    for i in 0..4 {
        recorder.record_event(&numbered_event(i));
    }
    recorder.submit_events().unwrap().await.unwrap();
    assert_eq!(store.count().unwrap(), 3);

    config.write().unwrap().max_submission_allowed = 3;
    let report = recorder.submit_events().unwrap().await.unwrap();
    assert_eq!(report.batches, 3);
    assert_eq!(store.count().unwrap(), 0);
    recorder.shutdown().await;
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Recorded events come back unchanged from the store.
    #[test]
    fn prop_pending_events_match_recorded(
        event_type in event_type_strategy(),
        attributes in attributes_strategy(),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let dir = TempDir::new().unwrap();
            let recorder = recorder(
                disk_store(dir.path()).unwrap(),
                Arc::new(MockEventsClient::new()),
                RecorderConfig::default(),
            );

            let mut event = AnalyticsEvent::new(event_type.clone());
            for (key, value) in &attributes {
                event.add_attribute(key.clone(), value.clone());
            }
            recorder.record_event(&event);

            let pending = recorder.pending_events();
            recorder.shutdown().await;
            assert_eq!(pending, vec![event]);
        });
    }
}
