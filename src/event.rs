//! Analytics event model.
//!
//! An [`AnalyticsEvent`] is what applications record. It is stored in the
//! local record store as a self-contained JSON payload and converted to the
//! wire shape of the events service at submission time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalyticsError;

/// Maximum number of attributes and metrics (combined) on one event.
pub const MAX_ATTRIBUTES_AND_METRICS: usize = 50;

/// Maximum length of an attribute or metric key.
pub const MAX_KEY_LENGTH: usize = 50;

/// Maximum length of an attribute value.
pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 1000;

/// Maximum length of an event type.
pub const MAX_EVENT_TYPE_LENGTH: usize = 50;

/// Session bounds attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier
    pub id: String,
    /// Session start, milliseconds since the Unix epoch
    pub start_timestamp: i64,
    /// Session stop, milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_timestamp: Option<i64>,
    /// Session duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

impl Session {
    /// Creates an open session starting at `start_timestamp`.
    pub fn new(id: impl Into<String>, start_timestamp: i64) -> Self {
        Self {
            id: id.into(),
            start_timestamp,
            stop_timestamp: None,
            duration: None,
        }
    }

    /// Closes the session at `stop_timestamp` and records its duration.
    pub fn stopped_at(mut self, stop_timestamp: i64) -> Self {
        self.stop_timestamp = Some(stop_timestamp);
        self.duration = Some((stop_timestamp - self.start_timestamp).max(0));
        self
    }
}

/// Application metadata sent with every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppDetails {
    /// Package name of the application
    #[serde(default)]
    pub package_name: String,
    /// Human readable application title
    #[serde(default)]
    pub title: String,
    /// Application version code
    #[serde(default)]
    pub version_code: String,
    /// Application version name
    #[serde(default)]
    pub version_name: String,
}

/// Client SDK metadata sent with every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkInfo {
    /// SDK name
    pub name: String,
    /// SDK version
    pub version: String,
}

impl Default for SdkInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// One analytics event.
///
/// # Example
///
/// ```rust
/// use aws_pinpoint_analytics::AnalyticsEvent;
///
/// let event = AnalyticsEvent::new("level_complete")
///     .with_attribute("level", "3")
///     .with_metric("score", 1200.0);
/// assert_eq!(event.attributes.get("level").map(String::as_str), Some("3"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Application-defined identifier used to correlate service results
    pub event_id: String,
    /// Event type, e.g. `_session.start`
    pub event_type: String,
    /// Event time, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Session the event belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    /// String attributes
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Numeric metrics
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    /// Client SDK metadata
    #[serde(default)]
    pub sdk: SdkInfo,
    /// Application metadata
    #[serde(default)]
    pub app: AppDetails,
}

impl AnalyticsEvent {
    /// Creates an event of `event_type` stamped with the current time.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self::with_timestamp(event_type, chrono::Utc::now().timestamp_millis())
    }

    /// Creates an event of `event_type` at a given time.
    pub fn with_timestamp(event_type: impl Into<String>, timestamp: i64) -> Self {
        let event_type = event_type.into();
        let clipped = clip(&event_type, MAX_EVENT_TYPE_LENGTH);
        if clipped.len() != event_type.len() {
            tracing::warn!(
                event_type = %event_type,
                "Event type exceeds {} characters and was clipped",
                MAX_EVENT_TYPE_LENGTH
            );
        }
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: clipped,
            timestamp,
            session: None,
            attributes: HashMap::new(),
            metrics: HashMap::new(),
            sdk: SdkInfo::default(),
            app: AppDetails::default(),
        }
    }

    /// Attaches a session.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Attaches application metadata.
    pub fn with_app(mut self, app: AppDetails) -> Self {
        self.app = app;
        self
    }

    /// Adds an attribute, see [`AnalyticsEvent::add_attribute`].
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_attribute(key, value);
        self
    }

    /// Adds a metric, see [`AnalyticsEvent::add_metric`].
    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.add_metric(key, value);
        self
    }

    /// Adds an attribute.
    ///
    /// Keys and values are clipped to [`MAX_KEY_LENGTH`] and
    /// [`MAX_ATTRIBUTE_VALUE_LENGTH`]. Returns false (and drops the attribute)
    /// when the event already holds [`MAX_ATTRIBUTES_AND_METRICS`] entries.
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = clip(&key.into(), MAX_KEY_LENGTH);
        if !self.attributes.contains_key(&key) && self.is_full() {
            tracing::warn!(key = %key, "Max number of attributes/metrics reached, dropping attribute");
            return false;
        }
        let value = clip(&value.into(), MAX_ATTRIBUTE_VALUE_LENGTH);
        self.attributes.insert(key, value);
        true
    }

    /// Adds a metric.
    ///
    /// Keys are clipped to [`MAX_KEY_LENGTH`]. Returns false (and drops the
    /// metric) when the value is NaN or infinite, or when the event already
    /// holds [`MAX_ATTRIBUTES_AND_METRICS`] entries.
    pub fn add_metric(&mut self, key: impl Into<String>, value: f64) -> bool {
        let key = clip(&key.into(), MAX_KEY_LENGTH);
        if !value.is_finite() {
            tracing::warn!(key = %key, value = %value, "Metric value is not finite, dropping metric");
            return false;
        }
        if !self.metrics.contains_key(&key) && self.is_full() {
            tracing::warn!(key = %key, "Max number of attributes/metrics reached, dropping metric");
            return false;
        }
        self.metrics.insert(key, value);
        true
    }

    fn is_full(&self) -> bool {
        self.attributes.len() + self.metrics.len() >= MAX_ATTRIBUTES_AND_METRICS
    }

    /// Serializes the event into a store payload.
    ///
    /// Fails on non-finite metric values, which JSON cannot represent.
    pub fn to_payload(&self) -> Result<String, AnalyticsError> {
        if let Some((key, value)) = self.metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(AnalyticsError::validation(format!(
                "Metric {} has non-finite value {}",
                key, value
            )));
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a store payload back into an event.
    pub fn from_payload(payload: &str) -> Result<Self, AnalyticsError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Truncates `value` to at most `max_chars` characters.
pub(crate) fn clip(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

/// Truncates `value` for a log line, marking the cut with an ellipsis.
pub(crate) fn clip_for_log(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}
