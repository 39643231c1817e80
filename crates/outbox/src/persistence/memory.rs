//! In-memory implementation of OutboxStore for testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;

/// Internal event state
struct EventState {
    event: OutboxEvent,
    /// Insertion order, breaks `created_at` ties
    seq: u64,
}

/// In-memory implementation of OutboxStore
///
/// This is primarily for testing. Claiming happens under a single write
/// lock, which gives the same exclusivity as `FOR UPDATE SKIP LOCKED`.
///
/// # Example
///
/// ```
/// use fleetops_outbox::persistence::InMemoryOutboxStore;
///
/// let store = InMemoryOutboxStore::new();
/// ```
pub struct InMemoryOutboxStore {
    events: RwLock<HashMap<Uuid, EventState>>,
    next_seq: AtomicU64,
    claim_unavailable: AtomicBool,
    unavailable: AtomicBool,
}

impl InMemoryOutboxStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            claim_unavailable: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make `claim_batch` fail, as on a store without skip-locking
    pub fn set_claim_unavailable(&self, unavailable: bool) {
        self.claim_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every read fail, as during a database outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every pending event due now
    ///
    /// Stands in for the passage of time: retry delays elapse and claim
    /// leases expire.
    pub fn make_all_due(&self) {
        let now = Utc::now();
        for state in self.events.write().values_mut() {
            if state.event.status == OutboxStatus::Pending {
                state.event.available_at = now;
            }
        }
    }

    /// Snapshot of all events, oldest first
    pub fn events(&self) -> Vec<OutboxEvent> {
        let events = self.events.read();
        let mut states: Vec<&EventState> = events.values().collect();
        states.sort_by_key(|s| (s.event.created_at, s.seq));
        states.into_iter().map(|s| s.event.clone()).collect()
    }

    /// Get the number of pending events
    pub fn pending_count(&self) -> usize {
        self.count(OutboxStatus::Pending)
    }

    /// Get the number of dead-lettered events
    pub fn failed_count(&self) -> usize {
        self.count(OutboxStatus::Failed)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.events.write().clear();
    }

    fn count(&self, status: OutboxStatus) -> usize {
        self.events
            .read()
            .values()
            .filter(|s| s.event.status == status)
            .count()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    /// Ids of due pending events, oldest first
    fn due_ids(events: &HashMap<Uuid, EventState>, limit: usize) -> Vec<Uuid> {
        let now = Utc::now();
        let mut due: Vec<&EventState> = events
            .values()
            .filter(|s| s.event.status == OutboxStatus::Pending && s.event.available_at <= now)
            .collect();
        due.sort_by_key(|s| (s.event.created_at, s.seq));
        due.into_iter().take(limit).map(|s| s.event.id).collect()
    }

    /// Apply a transition to a pending event; terminal events are left as is
    fn update<F>(&self, id: Uuid, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut OutboxEvent),
    {
        let mut events = self.events.write();
        let state = events.get_mut(&id).ok_or(StoreError::EventNotFound(id))?;
        if state.event.status.is_terminal() {
            return Ok(());
        }
        f(&mut state.event);
        Ok(())
    }
}

/// `now + delay`, or an error when the instant is not representable
fn after(delay: Duration) -> Result<DateTime<Utc>, StoreError> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| Utc::now().checked_add_signed(delay))
        .ok_or_else(|| StoreError::Serialization(format!("delay out of range: {delay:?}")))
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn enqueue(&self, event: NewOutboxEvent) -> Result<Uuid, StoreError> {
        self.check_available()?;

        let mut events = self.events.write();

        if let Some(key) = &event.deduplication_key {
            let existing = events
                .values()
                .find(|s| s.event.deduplication_key.as_ref() == Some(key));
            if let Some(existing) = existing {
                return Err(StoreError::DuplicateEvent {
                    key: key.clone(),
                    existing_id: Some(existing.event.id),
                });
            }
        }

        let id = Uuid::now_v7();
        let now = Utc::now();
        events.insert(
            id,
            EventState {
                event: OutboxEvent {
                    id,
                    aggregate_type: event.aggregate_type,
                    aggregate_id: event.aggregate_id,
                    event_type: event.event_type,
                    payload: event.payload,
                    status: OutboxStatus::Pending,
                    attempts: 0,
                    available_at: now,
                    last_error: None,
                    deduplication_key: event.deduplication_key,
                    created_at: now,
                    processed_at: None,
                },
                seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            },
        );
        Ok(id)
    }

    async fn claim_batch(&self, limit: usize, lease: Duration) -> Result<Vec<Uuid>, StoreError> {
        self.check_available()?;
        if self.claim_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::ClaimUnavailable(
                "skip-locked claiming disabled".to_string(),
            ));
        }

        let leased_until = after(lease)?;

        // Select and lease under one write lock
        let mut events = self.events.write();
        let ids = Self::due_ids(&events, limit);
        for id in &ids {
            if let Some(state) = events.get_mut(id) {
                state.event.available_at = leased_until;
            }
        }

        Ok(ids)
    }

    async fn load(&self, ids: &[Uuid]) -> Result<Vec<OutboxEvent>, StoreError> {
        self.check_available()?;

        let events = self.events.read();
        let mut loaded: Vec<&EventState> = ids.iter().filter_map(|id| events.get(id)).collect();
        loaded.sort_by_key(|s| (s.event.created_at, s.seq));
        Ok(loaded.into_iter().map(|s| s.event.clone()).collect())
    }

    async fn find_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        self.check_available()?;

        let events = self.events.read();
        Ok(Self::due_ids(&events, limit)
            .into_iter()
            .filter_map(|id| events.get(&id).map(|s| s.event.clone()))
            .collect())
    }

    async fn mark_processed(&self, id: Uuid) -> Result<(), StoreError> {
        self.update(id, |event| {
            event.status = OutboxStatus::Processed;
            event.processed_at = Some(Utc::now());
            event.last_error = None;
        })
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        error: &str,
        delay: Duration,
    ) -> Result<(), StoreError> {
        let available_at = after(delay)?;

        self.update(id, |event| {
            event.status = OutboxStatus::Pending;
            event.attempts += 1;
            event.last_error = Some(error.to_string());
            event.available_at = available_at;
        })
    }

    async fn mark_dead(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        self.update(id, |event| {
            event.status = OutboxStatus::Failed;
            event.attempts += 1;
            event.last_error = Some(error.to_string());
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<OutboxEvent>, StoreError> {
        self.check_available()?;
        Ok(self.events.read().get(&id).map(|s| s.event.clone()))
    }

    async fn stats(&self) -> Result<OutboxStats, StoreError> {
        self.check_available()?;

        let mut stats = OutboxStats::default();
        for state in self.events.read().values() {
            match state.event.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Processed => stats.processed += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    const LEASE: Duration = Duration::from_secs(60);

    fn booking_event(id: &str) -> NewOutboxEvent {
        NewOutboxEvent::new(
            "Booking",
            id,
            "BookingCreated",
            serde_json::json!({"bookingId": id}),
        )
    }

    #[tokio::test]
    async fn test_enqueue_defaults() {
        let store = InMemoryOutboxStore::new();
        let id = store.enqueue(booking_event("b-1")).await.unwrap();

        let event = store.get(id).await.unwrap().unwrap();
        assert_eq!(event.status, OutboxStatus::Pending);
        assert_eq!(event.attempts, 0);
        assert!(event.available_at <= Utc::now());
        assert!(event.processed_at.is_none());
        assert!(event.last_error.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_deduplication_key() {
        let store = InMemoryOutboxStore::new();

        let first = store
            .enqueue(booking_event("b-1").with_deduplication_key("booking-created:b-1"))
            .await
            .unwrap();

        let result = store
            .enqueue(booking_event("b-1").with_deduplication_key("booking-created:b-1"))
            .await;

        match result {
            Err(StoreError::DuplicateEvent { existing_id, .. }) => {
                assert_eq!(existing_id, Some(first));
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_events_without_key_are_never_duplicates() {
        let store = InMemoryOutboxStore::new();
        store.enqueue(booking_event("b-1")).await.unwrap();
        store.enqueue(booking_event("b-1")).await.unwrap();
        assert_eq!(store.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_claim_is_oldest_first_and_leased() {
        let store = InMemoryOutboxStore::new();
        let first = store.enqueue(booking_event("b-1")).await.unwrap();
        let second = store.enqueue(booking_event("b-2")).await.unwrap();
        let third = store.enqueue(booking_event("b-3")).await.unwrap();

        let claimed = store.claim_batch(2, LEASE).await.unwrap();
        assert_eq!(claimed, vec![first, second]);

        // Leased events are not claimable again
        let claimed = store.claim_batch(10, LEASE).await.unwrap();
        assert_eq!(claimed, vec![third]);

        let claimed = store.claim_batch(10, LEASE).await.unwrap();
        assert!(claimed.is_empty());

        // Lease expiry makes them claimable again
        store.make_all_due();
        let claimed = store.claim_batch(10, LEASE).await.unwrap();
        assert_eq!(claimed.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_never_overlap() {
        let store = Arc::new(InMemoryOutboxStore::new());
        for i in 0..100 {
            store.enqueue(booking_event(&format!("b-{i}"))).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.claim_batch(7, LEASE).await.unwrap()
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for id in handle.await.unwrap() {
                total += 1;
                assert!(seen.insert(id), "event {id} claimed twice");
            }
        }
        assert_eq!(total, 56);
    }

    #[tokio::test]
    async fn test_claim_unavailable_but_find_pending_works() {
        let store = InMemoryOutboxStore::new();
        let id = store.enqueue(booking_event("b-1")).await.unwrap();
        store.set_claim_unavailable(true);

        let result = store.claim_batch(10, LEASE).await;
        assert!(matches!(result, Err(StoreError::ClaimUnavailable(_))));

        let pending = store.find_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        // No lease was taken
        let pending = store.find_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let store = InMemoryOutboxStore::new();
        let id = store.enqueue(booking_event("b-1")).await.unwrap();

        store
            .schedule_retry(id, "journal offline", Duration::from_secs(30))
            .await
            .unwrap();
        let event = store.get(id).await.unwrap().unwrap();
        assert_eq!(event.status, OutboxStatus::Pending);
        assert_eq!(event.attempts, 1);
        assert_eq!(event.last_error.as_deref(), Some("journal offline"));
        assert!(event.available_at > Utc::now());

        // Not due while the retry delay runs
        assert!(store.find_pending(10).await.unwrap().is_empty());

        store.mark_processed(id).await.unwrap();
        let event = store.get(id).await.unwrap().unwrap();
        assert_eq!(event.status, OutboxStatus::Processed);
        assert_eq!(event.attempts, 1);
        assert!(event.processed_at.is_some());
        assert!(event.last_error.is_none());
    }

    #[tokio::test]
    async fn test_mark_dead() {
        let store = InMemoryOutboxStore::new();
        let id = store.enqueue(booking_event("b-1")).await.unwrap();

        store.mark_dead(id, "gave up").await.unwrap();

        let event = store.get(id).await.unwrap().unwrap();
        assert_eq!(event.status, OutboxStatus::Failed);
        assert_eq!(event.attempts, 1);
        assert!(event.processed_at.is_none());

        // Dead events are never claimed again
        store.make_all_due();
        assert!(store.claim_batch(10, LEASE).await.unwrap().is_empty());
        assert!(store.find_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_events_never_transition() {
        let store = InMemoryOutboxStore::new();
        let id = store.enqueue(booking_event("b-1")).await.unwrap();

        store.mark_processed(id).await.unwrap();
        store.mark_dead(id, "late duplicate").await.unwrap();
        store
            .schedule_retry(id, "late duplicate", Duration::from_secs(1))
            .await
            .unwrap();

        let event = store.get(id).await.unwrap().unwrap();
        assert_eq!(event.status, OutboxStatus::Processed);
        assert_eq!(event.attempts, 0);
        assert!(event.last_error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let store = InMemoryOutboxStore::new();
        let result = store.mark_processed(Uuid::now_v7()).await;
        assert!(matches!(result, Err(StoreError::EventNotFound(_))));
    }

    #[tokio::test]
    async fn test_unrepresentable_delay_is_an_error() {
        let store = InMemoryOutboxStore::new();
        let id = store.enqueue(booking_event("b-1")).await.unwrap();

        let huge = Duration::from_millis(100_000_000_000_000_000);
        let result = store.schedule_retry(id, "timeout", huge).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));

        let event = store.get(id).await.unwrap().unwrap();
        assert_eq!(event.attempts, 0);
        assert!(store.claim_batch(10, huge).await.is_err());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = InMemoryOutboxStore::new();
        let a = store.enqueue(booking_event("b-1")).await.unwrap();
        let b = store.enqueue(booking_event("b-2")).await.unwrap();
        store.enqueue(booking_event("b-3")).await.unwrap();

        store.mark_processed(a).await.unwrap();
        store.mark_dead(b, "boom").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats,
            OutboxStats {
                pending: 1,
                processed: 1,
                failed: 1,
            }
        );
    }
}
