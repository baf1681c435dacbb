//! Batch assembly from the record store.

use std::collections::BTreeMap;

use crate::event::{clip_for_log, AnalyticsEvent};
use crate::store::{EventCursor, EventRecord, RecordId};

/// A decoded event tagged with the record it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedEvent {
    pub record_id: RecordId,
    pub event: AnalyticsEvent,
}

/// One submission-sized group of records.
///
/// `delete_schedule` maps every consumed record id to its known size (or
/// `None` for corrupt rows whose size cannot be trusted). `events` holds the
/// decodable subset, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub events: Vec<BatchedEvent>,
    pub delete_schedule: BTreeMap<RecordId, Option<u64>>,
    /// Sum of payload bytes of every consumed record
    pub size: u64,
}

impl Batch {
    /// Returns true if no record was consumed.
    pub fn is_empty(&self) -> bool {
        self.delete_schedule.is_empty()
    }
}

/// Builds batches under a byte budget.
#[derive(Debug, Clone, Copy)]
pub struct BatchAssembler {
    budget: u64,
    clipped_event_length: usize,
}

impl BatchAssembler {
    /// Creates an assembler with a byte budget per batch.
    pub fn new(budget: u64, clipped_event_length: usize) -> Self {
        Self {
            budget,
            clipped_event_length,
        }
    }

    /// Consumes records from `cursor` into one batch.
    ///
    /// A record is taken while the batch stays within the budget. The first
    /// record is always taken, even if it alone exceeds the budget, so every
    /// non-empty cursor yields a non-empty batch. A record that does not fit
    /// stays on the cursor for the next batch.
    pub fn assemble(&self, cursor: &mut EventCursor) -> Batch {
        let mut batch = Batch::default();

        loop {
            let len = match cursor.peek() {
                Some(record) => record.payload_len(),
                None => break,
            };
            if !batch.is_empty() && batch.size + len > self.budget {
                break;
            }
            let Some(record) = cursor.next() else {
                break;
            };
            batch.size += len;
            self.take(record, &mut batch);
        }

        if !batch.is_empty() {
            tracing::debug!(
                records = batch.delete_schedule.len(),
                events = batch.events.len(),
                bytes = batch.size,
                "Assembled event batch"
            );
        }
        batch
    }

    fn take(&self, record: EventRecord, batch: &mut Batch) {
        let Some(payload) = record.payload.as_deref() else {
            tracing::warn!(record_id = record.id, "Pending event has no payload, discarding");
            batch.delete_schedule.insert(record.id, None);
            return;
        };

        if !record.is_size_consistent() {
            tracing::warn!(
                record_id = record.id,
                declared_size = record.size,
                actual_size = payload.len(),
                "Pending event size does not match its payload, discarding"
            );
            batch.delete_schedule.insert(record.id, None);
            return;
        }

        match AnalyticsEvent::from_payload(payload) {
            Ok(event) => {
                batch.delete_schedule.insert(record.id, Some(record.size));
                batch.events.push(BatchedEvent {
                    record_id: record.id,
                    event,
                });
            }
            Err(e) => {
                tracing::warn!(
                    record_id = record.id,
                    event = %clip_for_log(payload, self.clipped_event_length),
                    error = %e,
                    "Pending event could not be decoded, discarding"
                );
                batch.delete_schedule.insert(record.id, Some(record.size));
            }
        }
    }
}
