//! Submission of one batch and classification of its results.
//!
//! Each event moves from pending to exactly one of three states:
//!
//! - **successful**: the service answered `Accepted`; the record is deleted.
//! - **failed**: the service rejected it with a terminal error (or there was
//!   no endpoint to submit under); the record is deleted and never retried.
//! - **retryable**: anything else; the record stays in the store untouched.

use std::collections::{BTreeMap, HashSet};

use crate::client::{EventsResponse, PutEventsRequest, SharedEventsServiceClient};
use crate::config::TerminalErrorPolicy;
use crate::endpoint::EndpointProfile;
use crate::error::AnalyticsError;
use crate::store::RecordId;

use super::batch::Batch;

/// Message the service uses for an accepted event.
pub const ACCEPTED_MESSAGE: &str = "Accepted";

/// Result of one `PutEvents` call, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// The call went through; per-event results still need inspecting.
    Accepted(EventsResponse),
    /// The whole call was rejected with a terminal error.
    PermanentFailure(String),
    /// The call failed in a way worth retrying later.
    Transient(String),
}

impl SubmissionOutcome {
    /// Classifies the result of a `put_events` call.
    pub fn classify(
        result: Result<EventsResponse, AnalyticsError>,
        policy: &TerminalErrorPolicy,
    ) -> Self {
        match result {
            Ok(response) => Self::Accepted(response),
            Err(error) => match error.error_code() {
                Some(code) if policy.is_terminal(code) => Self::PermanentFailure(error.to_string()),
                _ => Self::Transient(error.to_string()),
            },
        }
    }
}

/// Classification of a single event-item message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    Successful,
    Failed,
    Retryable,
}

impl EventResult {
    /// Classifies an event-item message.
    pub fn from_message(message: &str, policy: &TerminalErrorPolicy) -> Self {
        if message.eq_ignore_ascii_case(ACCEPTED_MESSAGE) {
            Self::Successful
        } else if policy.is_terminal(message) {
            Self::Failed
        } else {
            Self::Retryable
        }
    }
}

/// Outcome of submitting one batch.
///
/// `delete_schedule` is the batch's schedule with retryable records removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub successful: HashSet<String>,
    pub failed: HashSet<String>,
    pub delete_schedule: BTreeMap<RecordId, Option<u64>>,
    /// Whether a network call was made
    pub submitted: bool,
}

/// Turns batches into `PutEvents` calls.
pub struct SubmissionEngine<'a> {
    client: &'a SharedEventsServiceClient,
    application_id: &'a str,
    policy: TerminalErrorPolicy,
}

impl<'a> SubmissionEngine<'a> {
    pub fn new(
        client: &'a SharedEventsServiceClient,
        application_id: &'a str,
        policy: TerminalErrorPolicy,
    ) -> Self {
        Self {
            client,
            application_id,
            policy,
        }
    }

    /// Submits `batch` under `endpoint` with exactly one call (or none).
    pub async fn submit(&self, batch: Batch, endpoint: Option<EndpointProfile>) -> BatchOutcome {
        let Batch {
            events,
            delete_schedule,
            ..
        } = batch;
        let mut outcome = BatchOutcome {
            delete_schedule,
            ..Default::default()
        };

        if events.is_empty() {
            return outcome;
        }

        let Some(endpoint) = endpoint else {
            tracing::warn!(
                events = events.len(),
                "No endpoint profile available, discarding batch"
            );
            outcome
                .failed
                .extend(events.iter().map(|e| e.event.event_id.clone()));
            return outcome;
        };

        let request =
            PutEventsRequest::new(self.application_id, &endpoint, events.iter().map(|e| &e.event));
        outcome.submitted = true;
        let result = self.client.put_events(request).await;

        match SubmissionOutcome::classify(result, &self.policy) {
            SubmissionOutcome::Accepted(response) => {
                let item = response.for_endpoint(&endpoint.endpoint_id);

                match item.and_then(|i| i.endpoint_item_response.as_ref()) {
                    Some(r) => tracing::debug!(
                        endpoint_id = %endpoint.endpoint_id,
                        status_code = r.status_code,
                        message = %r.message,
                        "Endpoint update result"
                    ),
                    None => tracing::debug!(
                        endpoint_id = %endpoint.endpoint_id,
                        "No endpoint result in response"
                    ),
                }

                for batched in &events {
                    let event_id = &batched.event.event_id;
                    let result = item
                        .and_then(|i| i.events_item_response.get(event_id))
                        .map(|r| (EventResult::from_message(&r.message, &self.policy), r));

                    match result {
                        Some((EventResult::Successful, _)) => {
                            tracing::debug!(event_id = %event_id, "Event accepted");
                            outcome.successful.insert(event_id.clone());
                        }
                        Some((EventResult::Failed, r)) => {
                            tracing::warn!(
                                event_id = %event_id,
                                status_code = r.status_code,
                                message = %r.message,
                                "Event rejected, will not retry"
                            );
                            outcome.failed.insert(event_id.clone());
                        }
                        Some((EventResult::Retryable, r)) => {
                            tracing::warn!(
                                event_id = %event_id,
                                status_code = r.status_code,
                                message = %r.message,
                                "Event failed, will retry"
                            );
                            outcome.delete_schedule.remove(&batched.record_id);
                        }
                        None => {
                            tracing::warn!(event_id = %event_id, "No result for event, will retry");
                            outcome.delete_schedule.remove(&batched.record_id);
                        }
                    }
                }
            }
            SubmissionOutcome::PermanentFailure(reason) => {
                tracing::error!(
                    events = events.len(),
                    reason = %reason,
                    "Batch rejected, discarding its events"
                );
                outcome
                    .failed
                    .extend(events.iter().map(|e| e.event.event_id.clone()));
            }
            SubmissionOutcome::Transient(reason) => {
                tracing::warn!(
                    events = events.len(),
                    reason = %reason,
                    "Batch submission failed, will retry"
                );
                for batched in &events {
                    outcome.delete_schedule.remove(&batched.record_id);
                }
            }
        }

        outcome
    }
}
