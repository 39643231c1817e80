//! OutboxStore trait definition

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::ProjectedEvent;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Event not found
    #[error("outbox event not found: {0}")]
    EventNotFound(Uuid),

    /// Deduplication key already used by another event
    #[error("duplicate outbox event for deduplication key {key} (existing id: {existing_id:?})")]
    DuplicateEvent {
        key: String,
        existing_id: Option<Uuid>,
    },

    /// The exclusive-claim primitive is not usable on this store
    #[error("claim primitive unavailable: {0}")]
    ClaimUnavailable(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the error means "this logical event was already enqueued"
    ///
    /// Producers treat this as success: the business transaction must not
    /// fail because its notification already exists.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateEvent { .. })
    }
}

/// Outbox event status
///
/// `Failed` is terminal: the event exhausted its attempts and was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Waiting for `available_at`, or claimed under a lease
    Pending,

    /// Dispatched successfully
    Processed,

    /// Dead-lettered
    Failed,
}

impl OutboxStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::Serialization(format!(
                "unknown outbox status: {other}"
            ))),
        }
    }
}

/// Definition of an event to be enqueued
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub deduplication_key: Option<String>,
}

impl NewOutboxEvent {
    /// Create an event from raw parts
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            deduplication_key: None,
        }
    }

    /// Create an event from a recognized, strongly-typed event
    ///
    /// Uses the same field names the dispatcher will deserialize.
    pub fn for_event<E: ProjectedEvent>(event: &E) -> Result<Self, StoreError> {
        let payload =
            serde_json::to_value(event).map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(Self::new(
            E::AGGREGATE_TYPE,
            event.aggregate_id(),
            E::EVENT_TYPE,
            payload,
        ))
    }

    /// Set a deduplication key for enqueue-time idempotence
    pub fn with_deduplication_key(mut self, key: impl Into<String>) -> Self {
        self.deduplication_key = Some(key.into());
        self
    }
}

/// A persisted outbox event
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub available_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub deduplication_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Event counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxStats {
    pub pending: u64,
    pub processed: u64,
    pub failed: u64,
}

/// Store for outbox events
///
/// Only the processor mutates events after enqueue, and only one processor
/// holds the lease on a claimed event, so the `mark_*`/`schedule_retry`
/// transitions are plain single-row updates.
#[async_trait]
pub trait OutboxStore: Send + Sync + 'static {
    /// Insert a new `Pending` event with zero attempts, available now
    async fn enqueue(&self, event: NewOutboxEvent) -> Result<Uuid, StoreError>;

    /// Exclusively claim up to `limit` due events, oldest first
    ///
    /// Claimed events have `available_at` pushed to `now + lease` so no other
    /// claimer can select them until the lease expires. Two concurrent
    /// callers never receive the same id.
    async fn claim_batch(&self, limit: usize, lease: Duration) -> Result<Vec<Uuid>, StoreError>;

    /// Load events by id, oldest first
    async fn load(&self, ids: &[Uuid]) -> Result<Vec<OutboxEvent>, StoreError>;

    /// Non-exclusive lookup of up to `limit` due events, oldest first
    ///
    /// Fallback when `claim_batch` is unavailable. Takes no lease.
    async fn find_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError>;

    /// Mark an event processed
    async fn mark_processed(&self, id: Uuid) -> Result<(), StoreError>;

    /// Record a failed attempt and make the event due again after `delay`
    async fn schedule_retry(&self, id: Uuid, error: &str, delay: Duration)
        -> Result<(), StoreError>;

    /// Record the final failed attempt and dead-letter the event
    async fn mark_dead(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Get a single event
    async fn get(&self, id: Uuid) -> Result<Option<OutboxEvent>, StoreError>;

    /// Count events by status
    async fn stats(&self) -> Result<OutboxStats, StoreError>;
}
