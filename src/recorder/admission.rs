//! Size-bounded admission of new events.

use crate::config::ConfigurationProvider;
use crate::event::clip_for_log;
use crate::store::{EventStore, RecordId};

/// Number of oldest records fetched per eviction round trip.
pub(crate) const EVICTION_PAGE_SIZE: usize = 5;

/// Appends `payload` to the store, then evicts oldest records until the
/// pending size is back under the effective ceiling.
///
/// Returns the id of the new record even if eviction later removed it.
/// Returns `None` if the store rejected the write.
pub(crate) fn admit(
    store: &dyn EventStore,
    config: &dyn ConfigurationProvider,
    payload: &str,
) -> Option<RecordId> {
    let id = match store.append(payload) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Failed to record event to local store");
            return None;
        }
    };

    tracing::debug!(
        record_id = id,
        size = payload.len(),
        event = %clip_for_log(payload, config.clipped_event_length()),
        "Event recorded to local store"
    );

    enforce_pending_ceiling(store, config.effective_pending_ceiling());
    Some(id)
}

/// Deletes oldest records while the pending size exceeds `ceiling`.
///
/// Stops when the ceiling is met, the store is empty, a round makes no
/// progress, or a delete fails. Returns the number of evicted records.
pub(crate) fn enforce_pending_ceiling(store: &dyn EventStore, ceiling: u64) -> usize {
    let mut evicted = 0;

    loop {
        let mut remaining = match store.total_pending_size() {
            Ok(total) => total,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read pending size");
                break;
            }
        };
        if remaining <= ceiling {
            break;
        }

        let oldest = match store.query_oldest(EVICTION_PAGE_SIZE) {
            Ok(oldest) => oldest,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query oldest pending events");
                break;
            }
        };

        let mut progressed = false;
        for summary in oldest {
            if remaining <= ceiling {
                break;
            }
            match store.delete(summary.id, Some(summary.size)) {
                Ok(0) => {}
                Ok(_) => {
                    evicted += 1;
                    progressed = true;
                    remaining = remaining.saturating_sub(summary.size);
                }
                Err(e) => {
                    tracing::error!(record_id = summary.id, error = %e, "Failed to evict pending event");
                    return evicted;
                }
            }
        }

        if !progressed {
            break;
        }
    }

    if evicted > 0 {
        tracing::warn!(
            evicted = evicted,
            ceiling = ceiling,
            "Pending events exceeded the size ceiling, oldest events were evicted"
        );
    }
    evicted
}
