//! Mock implementation of EventsServiceClient for testing.
//!
//! This module provides a mock events client that can be used for testing
//! the event recorder without requiring AWS infrastructure.
//!
//! # Examples
//!
//! ```
//! use aws_pinpoint_analytics_testing::MockEventsClient;
//! use aws_pinpoint_analytics::AnalyticsError;
//!
//! // Accept every event
//! let client = MockEventsClient::new();
//!
//! // Fail the first call, accept afterwards
//! let client = MockEventsClient::new()
//!     .with_response(Err(AnalyticsError::transport("offline")));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use aws_pinpoint_analytics::{
    AnalyticsError, EventItemResponse, EventsResponse, EventsServiceClient, ItemResponse,
    PutEventsRequest,
};

/// Record of a put_events call made to the mock client.
#[derive(Debug, Clone)]
pub struct PutEventsCall {
    /// The application id of the call
    pub application_id: String,
    /// The endpoint id the batch was submitted under
    pub endpoint_id: String,
    /// Event ids in the batch
    pub event_ids: Vec<String>,
}

impl From<&PutEventsRequest> for PutEventsCall {
    fn from(request: &PutEventsRequest) -> Self {
        let mut event_ids: Vec<String> = request.events.keys().cloned().collect();
        event_ids.sort();
        Self {
            application_id: request.application_id.clone(),
            endpoint_id: request.endpoint_id.clone(),
            event_ids,
        }
    }
}

/// Per-event answer used when no scripted response is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultAnswer {
    /// Accept every event.
    AcceptAll,
    /// Answer every event with the given status code and message.
    Reject { status_code: i32, message: String },
}

/// Mock implementation of EventsServiceClient for testing.
///
/// This mock client allows you to:
/// - Queue whole-call results, returned in FIFO order
/// - Override the answer for individual event ids
/// - Record all calls made for verification in tests
/// - Add latency to every call
///
/// # Thread Safety
///
/// The mock client uses internal mutexes to allow safe concurrent access
/// from multiple tasks.
///
/// # Examples
///
/// ```
/// use aws_pinpoint_analytics_testing::MockEventsClient;
/// use aws_pinpoint_analytics::EventItemResponse;
///
/// let client = MockEventsClient::new()
///     .with_event_answer("event-1", EventItemResponse::new(500, "Internal error"));
/// ```
pub struct MockEventsClient {
    /// Queue of whole-call results to return
    responses: Mutex<VecDeque<Result<EventsResponse, AnalyticsError>>>,
    /// Answers for specific event ids
    event_answers: Mutex<HashMap<String, EventItemResponse>>,
    /// Answer for events without an override
    default_answer: Mutex<DefaultAnswer>,
    /// Record of all calls made
    calls: Mutex<Vec<PutEventsCall>>,
    /// Calls currently in flight
    in_flight: AtomicUsize,
    /// Highest number of overlapping calls observed
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl Default for MockEventsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEventsClient {
    /// Creates a mock client that accepts every event.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            event_answers: Mutex::new(HashMap::new()),
            default_answer: Mutex::new(DefaultAnswer::AcceptAll),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Queues a whole-call result.
    ///
    /// Results are returned in the order they were added. Once all queued
    /// results are consumed, the client answers each event individually.
    pub fn with_response(self, response: Result<EventsResponse, AnalyticsError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Overrides the answer for one event id.
    pub fn with_event_answer(self, event_id: impl Into<String>, answer: EventItemResponse) -> Self {
        self.event_answers.lock().unwrap().insert(event_id.into(), answer);
        self
    }

    /// Sets the answer for events without an override.
    pub fn with_default_answer(self, answer: DefaultAnswer) -> Self {
        *self.default_answer.lock().unwrap() = answer;
        self
    }

    /// Delays every call by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Changes the answer for events without an override.
    pub fn set_default_answer(&self, answer: DefaultAnswer) {
        *self.default_answer.lock().unwrap() = answer;
    }

    /// Removes the override for one event id.
    pub fn clear_event_answer(&self, event_id: &str) {
        self.event_answers.lock().unwrap().remove(event_id);
    }

    /// Returns all calls made so far.
    pub fn get_calls(&self) -> Vec<PutEventsCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Returns the highest number of calls that overlapped in time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Clears all recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn answer(&self, request: &PutEventsRequest) -> EventsResponse {
        let answers = self.event_answers.lock().unwrap();
        let default_answer = self.default_answer.lock().unwrap().clone();

        let events_item_response = request
            .events
            .keys()
            .map(|id| {
                let answer = answers.get(id).cloned().unwrap_or_else(|| match &default_answer {
                    DefaultAnswer::AcceptAll => EventItemResponse::accepted(),
                    DefaultAnswer::Reject {
                        status_code,
                        message,
                    } => EventItemResponse::new(*status_code, message.clone()),
                });
                (id.clone(), answer)
            })
            .collect();

        let mut response = EventsResponse::default();
        response.results.insert(
            request.endpoint_id.clone(),
            ItemResponse {
                endpoint_item_response: None,
                events_item_response,
            },
        );
        response
    }
}

#[async_trait]
impl EventsServiceClient for MockEventsClient {
    async fn put_events(&self, request: PutEventsRequest) -> Result<EventsResponse, AnalyticsError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls.lock().unwrap().push(PutEventsCall::from(&request));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.responses.lock().unwrap().pop_front();
        let result = match scripted {
            Some(result) => result,
            None => Ok(self.answer(&request)),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
