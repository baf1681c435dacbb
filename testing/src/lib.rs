//! Testing utilities for the Pinpoint analytics event recorder
//!
//! This crate provides tools for exercising an [`EventRecorder`] without
//! AWS infrastructure.
//!
//! # Features
//!
//! - **MockEventsClient**: Scriptable `PutEvents` client that records calls
//! - **Fixtures**: Event, endpoint, store, and recorder builders
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use aws_pinpoint_analytics::RecorderConfig;
//! use aws_pinpoint_analytics_testing::{memory_store, numbered_event, test_recorder, MockEventsClient};
//!
//! #[tokio::test]
//! async fn test_delivery() {
//!     let client = Arc::new(MockEventsClient::new());
//!     let recorder = test_recorder(
//!         memory_store().unwrap(),
//!         client.clone(),
//!         Arc::new(RecorderConfig::default()),
//!     )
//!     .unwrap();
//!
//!     recorder.record_event(&numbered_event(1));
//!     let report = recorder.submit_events().unwrap().await.unwrap();
//!
//!     assert_eq!(report.successful.len(), 1);
//!     assert_eq!(client.call_count(), 1);
//! }
//! ```
//!
//! [`EventRecorder`]: aws_pinpoint_analytics::EventRecorder

pub mod fixtures;
pub mod mock_client;

pub use fixtures::{
    memory_store, numbered_event, padded_event, test_recorder, test_targeting, TEST_APP_ID,
    TEST_ENDPOINT_ID,
};
pub use mock_client::{DefaultAnswer, MockEventsClient, PutEventsCall};

// Re-export key types from the recorder crate for convenience
pub use aws_pinpoint_analytics::{
    AnalyticsError, AnalyticsEvent, EndpointProfile, EventItemResponse, EventsResponse,
    EventsServiceClient, PutEventsRequest, RecorderConfig, SubmissionReport,
};
