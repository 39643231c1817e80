//! PostgreSQL implementation of SequenceAllocator

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

use super::allocator::{validate_key, Allocation, SequenceAllocator, SequenceError};

/// SQLSTATE for `numeric_value_out_of_range`
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// PostgreSQL implementation of SequenceAllocator
///
/// Allocation is a single `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`
/// statement. The row lock taken by the conflicting update serializes
/// concurrent callers on the same key, so no read-then-write race exists at
/// any isolation level.
///
/// # Example
///
/// ```ignore
/// use fleetops_outbox::sequence::{DocumentNumberFormat, PostgresSequenceAllocator};
///
/// let allocator = PostgresSequenceAllocator::new(pool);
/// let allocation = allocator.allocate_next("company-1", 2026).await?;
/// let number = allocation.format(DocumentNumberFormat::Invoice);
/// ```
#[derive(Clone)]
pub struct PostgresSequenceAllocator {
    pool: PgPool,
}

impl PostgresSequenceAllocator {
    /// Create a new allocator with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SequenceAllocator for PostgresSequenceAllocator {
    #[instrument(skip(self))]
    async fn allocate_next(&self, tenant_id: &str, year: i32) -> Result<Allocation, SequenceError> {
        validate_key(tenant_id, year)?;

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequence_counters (tenant_id, year, last_value, updated_at)
            VALUES ($1, $2, 1, NOW())
            ON CONFLICT (tenant_id, year)
            DO UPDATE SET last_value = sequence_counters.last_value + 1,
                          updated_at = NOW()
            RETURNING last_value
            "#,
        )
        .bind(tenant_id)
        .bind(year)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_out_of_range(&e) {
                return SequenceError::Exhausted {
                    tenant_id: tenant_id.to_string(),
                    year,
                };
            }
            error!("Failed to allocate sequence: {}", e);
            SequenceError::StoreUnavailable(e.to_string())
        })?;

        debug!(tenant_id, year, sequence, "allocated sequence");
        Ok(Allocation {
            tenant_id: tenant_id.to_string(),
            year,
            sequence,
        })
    }
}

fn is_out_of_range(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE),
        _ => false,
    }
}
