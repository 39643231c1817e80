//! Projection trait and in-memory journal

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Error type for projection appends
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Projection backend unreachable
    #[error("projection unavailable: {0}")]
    Unavailable(String),

    /// Entry refused by the projection, e.g. a constraint violation
    #[error("projection rejected entry: {0}")]
    Rejected(String),
}

/// One append against a read-model projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionEntry {
    /// Outbox event that produced this entry
    pub source_event_id: Uuid,
    pub kind: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub summary: String,
    pub fields: Map<String, Value>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only read-model projection
///
/// Delivery is at-least-once, so the same `source_event_id` may be appended
/// more than once. Implementations must either ignore the repeat or be an
/// append-only log where a repeated line is harmless.
#[async_trait]
pub trait Projection: Send + Sync + 'static {
    /// Append one entry
    async fn append(&self, entry: ProjectionEntry) -> Result<(), ProjectionError>;
}

/// In-memory journal for testing
///
/// Keeps every append, duplicates included, so tests can count deliveries.
#[derive(Default)]
pub struct InMemoryJournal {
    entries: RwLock<Vec<ProjectionEntry>>,
    append_calls: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryJournal {
    /// Create a new in-memory journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every append fail, as during a journal outage
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of the recorded entries
    pub fn entries(&self) -> Vec<ProjectionEntry> {
        self.entries.read().clone()
    }

    /// Number of append calls, failed ones included
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Projection for InMemoryJournal {
    async fn append(&self, entry: ProjectionEntry) -> Result<(), ProjectionError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(ProjectionError::Unavailable(
                "journal is failing".to_string(),
            ));
        }

        self.entries.write().push(entry);
        Ok(())
    }
}
