//! Monotonic counters backed by the store
//!
//! A claim reads the counter, then writes `next_value + 1` guarded by the
//! counter's version. Losing that race surfaces as
//! [`StoreError::Conflict`]; the sequencer never retries on its own, so the
//! caller can retry the whole claim-and-use step.

use crate::model::{Counter, CounterKind};
use crate::store::{ChatStore, StoreError, StoreResult};
use std::sync::Arc;
use tracing::trace;

#[derive(Clone)]
pub struct Sequencer {
    store: Arc<dyn ChatStore>,
}

impl Sequencer {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Claim the next value of `kind`
    pub async fn claim_next(&self, kind: CounterKind) -> StoreResult<i64> {
        let counter = match self.store.load_counter(kind).await? {
            Some(counter) => counter,
            None => {
                let fresh = Counter::new(kind);
                self.store.insert_counter(&fresh).await?;
                fresh
            }
        };

        let claimed = counter.next_value;
        let next_value = claimed.checked_add(1).ok_or_else(|| {
            StoreError::Corrupt(format!("counter {} overflowed at {}", kind, claimed))
        })?;

        self.store.compare_and_set_counter(&counter, next_value).await?;

        trace!(counter = %kind, value = claimed, "Claimed sequence value");
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqlChatStore;

    fn sequencer() -> (Sequencer, Arc<dyn ChatStore>) {
        let store: Arc<dyn ChatStore> = Arc::new(SqlChatStore::memory().unwrap());
        (Sequencer::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_first_claim_starts_at_one() {
        let (sequencer, _) = sequencer();
        assert_eq!(sequencer.claim_next(CounterKind::MessageSequence).await.unwrap(), 1);
        assert_eq!(sequencer.claim_next(CounterKind::MessageSequence).await.unwrap(), 2);
        assert_eq!(sequencer.claim_next(CounterKind::MessageSequence).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_persisted_value_advances_by_one_per_claim() {
        let (sequencer, store) = sequencer();
        for _ in 0..5 {
            sequencer.claim_next(CounterKind::MessageSequence).await.unwrap();
        }

        let counter = store.load_counter(CounterKind::MessageSequence).await.unwrap().unwrap();
        assert_eq!(counter.next_value, 6);
        assert_eq!(counter.version, 5);
    }

    #[tokio::test]
    async fn test_claim_after_concurrent_write_conflicts() {
        let (sequencer, store) = sequencer();
        sequencer.claim_next(CounterKind::MessageSequence).await.unwrap();

        // Another writer advances the counter between our read and write.
        let seen = store.load_counter(CounterKind::MessageSequence).await.unwrap().unwrap();
        store.compare_and_set_counter(&seen, seen.next_value + 1).await.unwrap();
        let err = store.compare_and_set_counter(&seen, seen.next_value + 1).await.unwrap_err();
        assert!(err.is_conflict());

        // Fresh claims continue past the other writer's value.
        assert_eq!(sequencer.claim_next(CounterKind::MessageSequence).await.unwrap(), 3);
    }
}
