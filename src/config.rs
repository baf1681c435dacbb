//! Configuration for the event recorder.
//!
//! Recorder options are read through [`ConfigurationProvider`] on every
//! operation rather than captured at construction, so a provider backed by
//! a lock can change limits while the recorder is running.
//!
//! ## Defaults
//!
//! | Option | Default |
//! |---|---|
//! | `max_submission_size` | 100 KiB per batch |
//! | `max_pending_size` | 5 MiB, never below [`MIN_PENDING_SIZE`] |
//! | `max_submission_allowed` | 3 batches per run |
//! | `clipped_event_length` | 10 characters of event JSON in logs |
//! | `terminal_error_codes` | `ValidationException`, `SerializationException`, `BadRequestException` |

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Default byte budget for one submitted batch.
pub const DEFAULT_MAX_SUBMISSION_SIZE: u64 = 1024 * 100;

/// Default ceiling for the total size of pending events.
pub const DEFAULT_MAX_PENDING_SIZE: u64 = 5 * 1024 * 1024;

/// Absolute floor applied to the pending-size ceiling.
pub const MIN_PENDING_SIZE: u64 = 16 * 1024;

/// Default number of batches submitted per run.
pub const DEFAULT_MAX_SUBMISSION_ALLOWED: usize = 3;

/// Default number of event JSON characters included in log lines.
pub const DEFAULT_CLIPPED_EVENT_LENGTH: usize = 10;

/// Error codes that mark a submission as permanently failed by default.
pub const DEFAULT_TERMINAL_ERROR_CODES: [&str; 3] = [
    "ValidationException",
    "SerializationException",
    "BadRequestException",
];

/// Recorder options.
///
/// # Example
///
/// ```rust
/// use aws_pinpoint_analytics::RecorderConfig;
///
/// let config = RecorderConfig::default()
///     .with_max_submission_size(64 * 1024)
///     .with_max_submission_allowed(5);
/// assert_eq!(config.max_submission_size, 64 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Byte budget of one batch.
    pub max_submission_size: u64,
    /// Ceiling for the total pending size; evicts oldest events above it.
    pub max_pending_size: u64,
    /// Maximum number of batches submitted per run.
    pub max_submission_allowed: usize,
    /// Number of event JSON characters shown in log lines.
    pub clipped_event_length: usize,
    /// Error codes or message fragments that mark a failure as permanent.
    pub terminal_error_codes: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_submission_size: DEFAULT_MAX_SUBMISSION_SIZE,
            max_pending_size: DEFAULT_MAX_PENDING_SIZE,
            max_submission_allowed: DEFAULT_MAX_SUBMISSION_ALLOWED,
            clipped_event_length: DEFAULT_CLIPPED_EVENT_LENGTH,
            terminal_error_codes: DEFAULT_TERMINAL_ERROR_CODES
                .iter()
                .map(|code| code.to_string())
                .collect(),
        }
    }
}

impl RecorderConfig {
    /// Sets the batch byte budget.
    pub fn with_max_submission_size(mut self, bytes: u64) -> Self {
        self.max_submission_size = bytes;
        self
    }

    /// Sets the pending-size ceiling.
    pub fn with_max_pending_size(mut self, bytes: u64) -> Self {
        self.max_pending_size = bytes;
        self
    }

    /// Sets the per-run batch ceiling.
    pub fn with_max_submission_allowed(mut self, count: usize) -> Self {
        self.max_submission_allowed = count;
        self
    }

    /// Sets the number of event JSON characters shown in log lines.
    pub fn with_clipped_event_length(mut self, length: usize) -> Self {
        self.clipped_event_length = length;
        self
    }

    /// Replaces the list of terminal error codes.
    pub fn with_terminal_error_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminal_error_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Parses a configuration from JSON, filling missing keys with defaults.
    pub fn from_json(json: &str) -> Result<Self, crate::AnalyticsError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Source of recorder options, consulted on every operation.
pub trait ConfigurationProvider: Send + Sync {
    /// Returns the batch byte budget.
    fn max_submission_size(&self) -> u64;

    /// Returns the configured pending-size ceiling (before the floor is applied).
    fn max_pending_size(&self) -> u64;

    /// Returns the per-run batch ceiling.
    fn max_submission_allowed(&self) -> usize;

    /// Returns the number of event JSON characters shown in log lines.
    fn clipped_event_length(&self) -> usize;

    /// Returns the policy deciding which failures are permanent.
    fn terminal_error_policy(&self) -> TerminalErrorPolicy;

    /// Returns the pending-size ceiling with [`MIN_PENDING_SIZE`] applied.
    fn effective_pending_ceiling(&self) -> u64 {
        self.max_pending_size().max(MIN_PENDING_SIZE)
    }
}

impl ConfigurationProvider for RecorderConfig {
    fn max_submission_size(&self) -> u64 {
        self.max_submission_size
    }

    fn max_pending_size(&self) -> u64 {
        self.max_pending_size
    }

    fn max_submission_allowed(&self) -> usize {
        self.max_submission_allowed
    }

    fn clipped_event_length(&self) -> usize {
        self.clipped_event_length
    }

    fn terminal_error_policy(&self) -> TerminalErrorPolicy {
        TerminalErrorPolicy::new(self.terminal_error_codes.clone())
    }
}

/// A configuration that can be replaced while the recorder runs.
///
/// A poisoned lock falls back to the defaults.
impl ConfigurationProvider for RwLock<RecorderConfig> {
    fn max_submission_size(&self) -> u64 {
        self.read()
            .map(|c| c.max_submission_size)
            .unwrap_or(DEFAULT_MAX_SUBMISSION_SIZE)
    }

    fn max_pending_size(&self) -> u64 {
        self.read()
            .map(|c| c.max_pending_size)
            .unwrap_or(DEFAULT_MAX_PENDING_SIZE)
    }

    fn max_submission_allowed(&self) -> usize {
        self.read()
            .map(|c| c.max_submission_allowed)
            .unwrap_or(DEFAULT_MAX_SUBMISSION_ALLOWED)
    }

    fn clipped_event_length(&self) -> usize {
        self.read()
            .map(|c| c.clipped_event_length)
            .unwrap_or(DEFAULT_CLIPPED_EVENT_LENGTH)
    }

    fn terminal_error_policy(&self) -> TerminalErrorPolicy {
        self.read()
            .map(|c| c.terminal_error_policy())
            .unwrap_or_default()
    }
}

/// Decides whether an error code or event-item message is terminal.
///
/// Matching is case-insensitive and by substring, so both a bare code
/// (`BadRequestException`) and a message embedding it match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalErrorPolicy {
    codes: Vec<String>,
}

impl Default for TerminalErrorPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINAL_ERROR_CODES.iter().map(|c| c.to_string()))
    }
}

impl TerminalErrorPolicy {
    /// Creates a policy from a list of terminal codes.
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|c| c.into().to_ascii_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Returns true if `text` names a permanent failure.
    pub fn is_terminal(&self, text: &str) -> bool {
        let text = text.to_ascii_lowercase();
        self.codes.iter().any(|code| text.contains(code.as_str()))
    }

    /// Returns the normalized codes of this policy.
    pub fn codes(&self) -> &[String] {
        &self.codes
    }
}
