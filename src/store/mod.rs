//! Durable store of pending event records.
//!
//! ## Module Structure
//!
//! - `sqlite` - SQLite-backed [`EventStore`]
//! - `cursor` - Forward-only, paging cursor over stored records
//!
//! ## Size Accounting
//!
//! Stores keep a running total of the `size` column. Deleting with a known
//! size adjusts it in place; deleting without one (or a failed delete)
//! invalidates it, and the next [`EventStore::total_pending_size`] call
//! recomputes it from the stored rows.

mod cursor;
mod sqlite;

pub use cursor::{EventCursor, DEFAULT_CURSOR_PAGE_SIZE};
pub use sqlite::SqliteEventStore;

use std::sync::Arc;

use crate::error::AnalyticsError;

/// Store-assigned record identifier. Unique and increasing.
pub type RecordId = i64;

/// One stored record with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Store-assigned id
    pub id: RecordId,
    /// Size declared at write time
    pub size: u64,
    /// Serialized event; `None` when the row is corrupt
    pub payload: Option<String>,
}

impl EventRecord {
    /// Returns the actual payload length, or zero if there is no payload.
    pub fn payload_len(&self) -> u64 {
        self.payload.as_ref().map(|p| p.len() as u64).unwrap_or(0)
    }

    /// Returns true if the declared size matches the payload.
    pub fn is_size_consistent(&self) -> bool {
        self.payload.is_some() && self.size == self.payload_len()
    }
}

/// Id and size of a stored record, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSummary {
    pub id: RecordId,
    pub size: u64,
}

/// Storage medium for pending events.
///
/// Implementations must be safe to use from the recording threads and the
/// submission worker at the same time.
pub trait EventStore: Send + Sync {
    /// Persists a payload and returns its new id.
    ///
    /// Either the whole record becomes visible or nothing does.
    fn append(&self, payload: &str) -> Result<RecordId, AnalyticsError>;

    /// Returns up to `limit` records, oldest first, without payloads.
    fn query_oldest(&self, limit: usize) -> Result<Vec<RecordSummary>, AnalyticsError>;

    /// Returns up to `limit` full records with an id greater than `after`, oldest first.
    fn read_after(&self, after: RecordId, limit: usize) -> Result<Vec<EventRecord>, AnalyticsError>;

    /// Deletes one record and returns the number of rows removed (0 or 1).
    ///
    /// With `known_size` the running total is adjusted in place; without it
    /// the total is invalidated.
    fn delete(&self, id: RecordId, known_size: Option<u64>) -> Result<usize, AnalyticsError>;

    /// Returns the sum of `size` over all stored records.
    fn total_pending_size(&self) -> Result<u64, AnalyticsError>;
}

/// Shared store type.
pub type SharedEventStore = Arc<dyn EventStore>;

/// Opens a cursor over every stored record, oldest first.
pub fn query_all(store: &SharedEventStore) -> EventCursor {
    EventCursor::new(Arc::clone(store), DEFAULT_CURSOR_PAGE_SIZE)
}
