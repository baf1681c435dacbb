//! # Amazon Pinpoint Analytics Event Recorder
//!
//! An offline-tolerant, size-bounded analytics event queue that persists
//! events locally and uploads them to Amazon Pinpoint in batches.
//!
//! ## Overview
//!
//! Applications record events as they happen. Each event is written to a
//! local SQLite store immediately, so nothing is lost when the device is
//! offline or the process restarts. A single background worker later reads
//! the store oldest-first, groups events into batches under a byte budget,
//! and submits each batch with one `PutEvents` call.
//!
//! ### Key Features
//!
//! - **At-least-once delivery**: Events stay in the store until the service
//!   accepts them or rejects them permanently.
//! - **Bounded storage**: When pending events exceed the configured ceiling,
//!   the oldest ones are evicted first.
//! - **Partial-failure bookkeeping**: Per-event results are reconciled
//!   individually. Retryable failures stay queued for the next run.
//! - **Non-blocking recording**: [`EventRecorder::record_event`] never waits
//!   on the network and never returns an error to the caller.
//! - **Coalesced submission**: Submission runs execute one at a time; extra
//!   triggers while one is waiting are dropped.
//!
//! ## Getting Started
//!
//! ```toml
//! [dependencies]
//! aws-pinpoint-analytics = "0.1"
//! tokio = { version = "1.0", features = ["full"] }
//! ```
//!
//! ### Recording and Submitting Events
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aws_pinpoint_analytics::{
//!     AnalyticsEvent, EndpointProfile, EventRecorder, PinpointEventsClient, RecorderConfig,
//!     SharedTargeting,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), aws_pinpoint_analytics::AnalyticsError> {
//!     let targeting = Arc::new(SharedTargeting::new(Some(
//!         EndpointProfile::new("device-1234").with_user_id("user-42"),
//!     )));
//!
//!     let recorder = EventRecorder::builder("my-pinpoint-app-id")
//!         .store_path("./analytics/events.db")?
//!         .client(Arc::new(PinpointEventsClient::from_env().await?))
//!         .targeting(targeting)
//!         .config(Arc::new(RecorderConfig::default().with_max_submission_allowed(5)))
//!         .build()?;
//!
//!     let event = AnalyticsEvent::new("level_complete")
//!         .with_attribute("level", "3")
//!         .with_metric("score", 1250.0);
//!     recorder.record_event(&event);
//!
//!     if let Some(report) = recorder.submit_events() {
//!         if let Ok(report) = report.await {
//!             println!("delivered {} events", report.successful.len());
//!         }
//!     }
//!
//!     recorder.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! [`RecorderConfig`] holds the tunables. The recorder reads them through
//! [`ConfigurationProvider`] on every operation, so a provider backed by a
//! lock (such as `RwLock<RecorderConfig>`) can be updated while the recorder
//! runs.
//!
//! | Option | Default | Purpose |
//! |--------|---------|---------|
//! | `max_submission_size` | 100 KiB | Byte budget of one batch |
//! | `max_pending_size` | 5 MiB | Pending-size ceiling (never below 16 KiB) |
//! | `max_submission_allowed` | 3 | Batches per submission run |
//! | `clipped_event_length` | 10 | Characters of a payload shown in logs |
//! | `terminal_error_codes` | validation errors | Codes that discard events |
//!
//! ## Targeting
//!
//! Every batch is submitted together with the current endpoint profile,
//! read from a [`TargetingProvider`] at submission time. If the provider has
//! no profile, the batch is discarded without a network call.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]. Payloads only appear in logs clipped
//! to `clipped_event_length` characters.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod recorder;
pub mod store;

// Re-export main types at crate root
pub use client::{
    EventItemResponse, EventsResponse, EventsServiceClient, ItemResponse, PinpointClientConfig,
    PinpointEventsClient, PutEventsRequest, SharedEventsServiceClient,
};
pub use config::*;
pub use endpoint::{
    EndpointDemographic, EndpointLocation, EndpointProfile, EndpointUser, SharedTargeting,
    SharedTargetingProvider, TargetingProvider,
};
pub use error::{AnalyticsError, AwsError};
pub use event::{AnalyticsEvent, AppDetails, SdkInfo, Session};
pub use recorder::{EventRecorder, EventRecorderBuilder, RecordHandle, SubmissionReport};
pub use store::{EventRecord, EventStore, RecordId, SharedEventStore, SqliteEventStore};
