//! Property-based tests for admission, batch assembly, classification and
//! submission runs.

use std::sync::Arc;

use proptest::prelude::*;

use crate::client::SharedEventsServiceClient;
use crate::config::{
    ConfigurationProvider, RecorderConfig, TerminalErrorPolicy, DEFAULT_CLIPPED_EVENT_LENGTH,
};
use crate::endpoint::{EndpointProfile, SharedTargeting};
use crate::recorder::{BatchAssembler, EventResult, RecorderCore};
use crate::store::{query_all, EventStore, SqliteEventStore};

use super::super::admission::admit;
use super::{memory_store, seed_events, ScriptedClient};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After every admission the pending size is back under the effective ceiling.
    #[test]
    fn prop_admission_converges_under_ceiling(
        sizes in proptest::collection::vec(1usize..4096, 1..60),
        ceiling in 0u64..64 * 1024,
    ) {
        let store = SqliteEventStore::open_in_memory().unwrap();
        let config = RecorderConfig::default().with_max_pending_size(ceiling);
        let effective = config.effective_pending_ceiling();

        for size in sizes {
            prop_assert!(admit(&store, &config, &"p".repeat(size)).is_some());
            let total = store.total_pending_size().unwrap();
            prop_assert!(total <= effective);
        }
    }

    /// Batches cover every record exactly once, in order, and respect the
    /// budget unless a single record exceeds it on its own.
    #[test]
    fn prop_batches_partition_store(
        sizes in proptest::collection::vec(1usize..300, 0..40),
        budget in 1u64..600,
    ) {
        let (store, shared) = memory_store();
        let ids: Vec<_> = sizes.iter().map(|&s| store.append(&"r".repeat(s)).unwrap()).collect();
        let assembler = BatchAssembler::new(budget, DEFAULT_CLIPPED_EVENT_LENGTH);
        let mut cursor = query_all(&shared);

        let mut seen = Vec::new();
        loop {
            let batch = assembler.assemble(&mut cursor);
            if batch.is_empty() {
                break;
            }
            prop_assert!(batch.delete_schedule.len() == 1 || batch.size <= budget);
            seen.extend(batch.delete_schedule.keys().copied());
        }

        prop_assert_eq!(seen, ids);
    }

    /// "Accepted" in any letter case is always a success.
    #[test]
    fn prop_accepted_in_any_case_is_successful(flips in proptest::collection::vec(any::<bool>(), 8)) {
        let message: String = "accepted"
            .chars()
            .zip(flips)
            .map(|(c, upper)| if upper { c.to_ascii_uppercase() } else { c })
            .collect();
        let policy = TerminalErrorPolicy::default();
        prop_assert_eq!(EventResult::from_message(&message, &policy), EventResult::Successful);
    }

    /// A message is terminal exactly when it embeds a configured code.
    #[test]
    fn prop_terminal_matches_configured_codes(
        prefix in "[a-z ]{0,6}",
        suffix in "[a-z ]{0,6}",
        code_index in 0usize..3,
    ) {
        let policy = TerminalErrorPolicy::default();
        let code = policy.codes()[code_index].clone();
        let message = format!("{}{}{}", prefix, code.to_ascii_uppercase(), suffix);
        prop_assert_eq!(EventResult::from_message(&message, &policy), EventResult::Failed);
        prop_assert_eq!(EventResult::from_message(&prefix, &policy), EventResult::Retryable);
    }

    /// A run issues one call per batch and never more than the ceiling.
    #[test]
    fn prop_run_calls_bounded(count in 0usize..10, per_batch in 1u64..4, max_allowed in 1usize..5) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let (store, shared) = memory_store();
            seed_events(store.as_ref(), count);
            let one_event = store.query_oldest(1).unwrap().first().map(|s| s.size).unwrap_or(1);
            let client = Arc::new(ScriptedClient::new());
            let shared_client: SharedEventsServiceClient = client.clone();
            let config = RecorderConfig::default()
                .with_max_submission_size(one_event * per_batch)
                .with_max_submission_allowed(max_allowed);
            let core = RecorderCore {
                application_id: "app-1".to_string(),
                store: shared,
                client: shared_client,
                targeting: Arc::new(SharedTargeting::new(Some(EndpointProfile::new("ep")))),
                config: Arc::new(config),
            };

            let report = core.run_submission().await;

            let needed = (count as u64 + per_batch - 1) / per_batch;
            let expected_calls = needed.min(max_allowed as u64) as usize;
            assert_eq!(client.call_count(), expected_calls);
            assert_eq!(report.batches, expected_calls);
            let delivered = (expected_calls as u64 * per_batch).min(count as u64) as usize;
            assert_eq!(report.successful.len(), delivered);
            assert_eq!(store.count().unwrap() as usize, count - delivered);
        });
    }
}
