//! Forward-only cursor over stored records.

use std::collections::VecDeque;

use super::{EventRecord, RecordId, SharedEventStore};

/// Number of rows fetched from the store per page.
pub const DEFAULT_CURSOR_PAGE_SIZE: usize = 64;

/// Lazy, forward-only scan of a store, oldest record first.
///
/// Rows are fetched a page at a time by id, so the cursor never re-reads a
/// consumed row and holds no store lock between pages. Records inserted
/// while the scan runs may or may not be seen; records deleted before their
/// page is fetched are skipped. A read error ends the scan.
pub struct EventCursor {
    store: SharedEventStore,
    page: VecDeque<EventRecord>,
    page_size: usize,
    last_id: RecordId,
    exhausted: bool,
}

impl EventCursor {
    /// Creates a cursor positioned before the oldest record.
    pub fn new(store: SharedEventStore, page_size: usize) -> Self {
        Self {
            store,
            page: VecDeque::new(),
            page_size: page_size.max(1),
            last_id: 0,
            exhausted: false,
        }
    }

    /// Returns the next record without consuming it.
    pub fn peek(&mut self) -> Option<&EventRecord> {
        self.fill();
        self.page.front()
    }

    /// Returns true once every record has been consumed.
    pub fn is_exhausted(&mut self) -> bool {
        self.peek().is_none()
    }

    fn fill(&mut self) {
        if !self.page.is_empty() || self.exhausted {
            return;
        }
        match self.store.read_after(self.last_id, self.page_size) {
            Ok(rows) if rows.is_empty() => self.exhausted = true,
            Ok(rows) => {
                if let Some(last) = rows.last() {
                    self.last_id = last.id;
                }
                self.page.extend(rows);
            }
            Err(e) => {
                tracing::error!(after_id = self.last_id, error = %e, "Failed to read pending events");
                self.exhausted = true;
            }
        }
    }
}

impl Iterator for EventCursor {
    type Item = EventRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.fill();
        self.page.pop_front()
    }
}
