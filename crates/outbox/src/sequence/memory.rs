//! In-memory implementation of SequenceAllocator for testing

use async_trait::async_trait;
use dashmap::DashMap;

use super::allocator::{validate_key, Allocation, SequenceAllocator, SequenceError};

/// In-memory implementation of SequenceAllocator
///
/// Each key's counter is incremented while holding the map shard's write
/// lock, which gives the same single-step upsert-increment semantics as the
/// PostgreSQL implementation.
///
/// # Example
///
/// ```
/// use fleetops_outbox::sequence::InMemorySequenceAllocator;
///
/// let allocator = InMemorySequenceAllocator::new();
/// ```
#[derive(Debug, Default)]
pub struct InMemorySequenceAllocator {
    counters: DashMap<(String, i32), i64>,
}

impl InMemorySequenceAllocator {
    /// Create a new in-memory allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter, as if `last_value` had already been allocated
    pub fn seed(&self, tenant_id: &str, year: i32, last_value: i64) {
        self.counters
            .insert((tenant_id.to_string(), year), last_value);
    }

    /// Get the last allocated value for a key
    pub fn last_value(&self, tenant_id: &str, year: i32) -> Option<i64> {
        self.counters
            .get(&(tenant_id.to_string(), year))
            .map(|v| *v)
    }
}

#[async_trait]
impl SequenceAllocator for InMemorySequenceAllocator {
    async fn allocate_next(&self, tenant_id: &str, year: i32) -> Result<Allocation, SequenceError> {
        validate_key(tenant_id, year)?;

        let mut counter = self
            .counters
            .entry((tenant_id.to_string(), year))
            .or_insert(0);

        let next = counter
            .checked_add(1)
            .ok_or_else(|| SequenceError::Exhausted {
                tenant_id: tenant_id.to_string(),
                year,
            })?;
        *counter = next;

        Ok(Allocation {
            tenant_id: tenant_id.to_string(),
            year,
            sequence: next,
        })
    }
}
