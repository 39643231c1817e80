//! PostgreSQL implementation of OutboxStore
//!
//! Production persistence using PostgreSQL with:
//! - Batch claiming with `FOR UPDATE SKIP LOCKED` and a lease on `available_at`
//! - Enqueue inside the caller's business transaction
//! - Partial unique index for deduplication keys

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;

const EVENT_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, payload, status, \
     attempts, available_at, last_error, deduplication_key, created_at, processed_at";

/// Apply the bundled schema migrations
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        error!("Failed to run outbox migrations: {}", e);
        StoreError::Database(e.to_string())
    })
}

/// PostgreSQL implementation of OutboxStore
///
/// Uses a connection pool for efficient database access. Any number of
/// processes may claim from the same table concurrently.
///
/// # Example
///
/// ```ignore
/// use fleetops_outbox::persistence::PostgresOutboxStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/fleetops").await?;
/// let store = PostgresOutboxStore::new(pool);
/// ```
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Enqueue an event inside the caller's transaction
    ///
    /// The event becomes visible to processors only if the business write it
    /// accompanies commits.
    #[instrument(skip(tx, event), fields(event_type = %event.event_type))]
    pub async fn enqueue_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        event: NewOutboxEvent,
    ) -> Result<Uuid, StoreError> {
        insert_event(&mut **tx, event).await
    }

    /// Run a single-row transition guarded on `status = 'pending'`
    ///
    /// Zero affected rows means the event is missing or already terminal.
    /// Only the former is an error.
    async fn transition(
        &self,
        id: Uuid,
        query: sqlx::query::Query<'_, Postgres, PgArguments>,
    ) -> Result<(), StoreError> {
        let result = query.execute(&self.pool).await.map_err(|e| {
            error!(%id, "Failed to update outbox event: {}", e);
            StoreError::Database(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            match self.get(id).await? {
                Some(event) => {
                    debug!(%id, status = %event.status, "event already terminal, transition skipped");
                }
                None => return Err(StoreError::EventNotFound(id)),
            }
        }
        Ok(())
    }
}

async fn insert_event(conn: &mut PgConnection, event: NewOutboxEvent) -> Result<Uuid, StoreError> {
    let id = Uuid::now_v7();

    let inserted: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO outbox_events (
            id, aggregate_type, aggregate_id, event_type, payload,
            status, attempts, available_at, deduplication_key, created_at
        )
        VALUES ($1, $2, $3, $4, $5, 'pending', 0, NOW(), $6, NOW())
        ON CONFLICT (deduplication_key) WHERE deduplication_key IS NOT NULL
        DO NOTHING
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(&event.aggregate_type)
    .bind(&event.aggregate_id)
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(&event.deduplication_key)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        error!("Failed to enqueue outbox event: {}", e);
        StoreError::Database(e.to_string())
    })?;

    match (inserted, event.deduplication_key) {
        (Some(id), _) => {
            debug!(%id, event_type = %event.event_type, "enqueued outbox event");
            Ok(id)
        }
        (None, Some(key)) => {
            let existing_id: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM outbox_events WHERE deduplication_key = $1")
                    .bind(&key)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| StoreError::Database(e.to_string()))?;

            debug!(%key, ?existing_id, "duplicate outbox event ignored");
            Err(StoreError::DuplicateEvent { key, existing_id })
        }
        (None, None) => Err(StoreError::Database(
            "insert returned no row without a deduplication key".to_string(),
        )),
    }
}

fn row_to_event(row: &PgRow) -> Result<OutboxEvent, StoreError> {
    let status: String = row.get("status");
    let attempts: i32 = row.get("attempts");

    Ok(OutboxEvent {
        id: row.get("id"),
        aggregate_type: row.get("aggregate_type"),
        aggregate_id: row.get("aggregate_id"),
        event_type: row.get("event_type"),
        payload: row.get("payload"),
        status: status.parse()?,
        attempts: attempts.max(0) as u32,
        available_at: row.get("available_at"),
        last_error: row.get("last_error"),
        deduplication_key: row.get("deduplication_key"),
        created_at: row.get("created_at"),
        processed_at: row.get("processed_at"),
    })
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    async fn enqueue(&self, event: NewOutboxEvent) -> Result<Uuid, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!("Failed to acquire connection: {}", e);
            StoreError::Database(e.to_string())
        })?;

        insert_event(&mut conn, event).await
    }

    #[instrument(skip(self))]
    async fn claim_batch(&self, limit: usize, lease: Duration) -> Result<Vec<Uuid>, StoreError> {
        // Select and lease in one statement:
        // 1. Finds pending events whose available_at has passed
        // 2. Orders oldest first
        // 3. SKIP LOCKED leaves rows held by concurrent claimers alone
        // 4. Pushes available_at past the lease so later claims skip them too
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            WITH claimable AS (
                SELECT id
                FROM outbox_events
                WHERE status = 'pending'
                  AND available_at <= NOW()
                ORDER BY created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox_events e
            SET available_at = NOW() + ($2::bigint * INTERVAL '1 millisecond')
            FROM claimable c
            WHERE e.id = c.id
            RETURNING e.id
            "#,
        )
        .bind(limit as i64)
        .bind(millis(lease))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::ClaimUnavailable(e.to_string()))?;

        if !ids.is_empty() {
            debug!(count = ids.len(), "claimed outbox events");
        }
        Ok(ids)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn load(&self, ids: &[Uuid]) -> Result<Vec<OutboxEvent>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM outbox_events WHERE id = ANY($1) ORDER BY created_at, id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load outbox events: {}", e);
            StoreError::Database(e.to_string())
        })?;

        rows.iter().map(row_to_event).collect()
    }

    #[instrument(skip(self))]
    async fn find_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM outbox_events
            WHERE status = 'pending'
              AND available_at <= NOW()
            ORDER BY created_at
            LIMIT $1
            "#
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to find pending outbox events: {}", e);
            StoreError::Database(e.to_string())
        })?;

        rows.iter().map(row_to_event).collect()
    }

    #[instrument(skip(self))]
    async fn mark_processed(&self, id: Uuid) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'processed',
                processed_at = NOW(),
                last_error = NULL
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id);

        self.transition(id, query).await?;
        debug!(%id, "marked outbox event processed");
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn schedule_retry(
        &self,
        id: Uuid,
        error: &str,
        delay: Duration,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempts = attempts + 1,
                last_error = $2,
                available_at = NOW() + ($3::bigint * INTERVAL '1 millisecond')
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(millis(delay));

        self.transition(id, query).await?;
        debug!(%id, delay_ms = millis(delay), "scheduled outbox retry");
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn mark_dead(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'failed',
                attempts = attempts + 1,
                last_error = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(error);

        self.transition(id, query).await?;
        debug!(%id, "outbox event dead-lettered");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<OutboxEvent>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM outbox_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get outbox event: {}", e);
            StoreError::Database(e.to_string())
        })?;

        row.as_ref().map(row_to_event).transpose()
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<OutboxStats, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM outbox_events GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to count outbox events: {}", e);
                StoreError::Database(e.to_string())
            })?;

        let mut stats = OutboxStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count = row.get::<i64, _>("count").max(0) as u64;
            match status.parse()? {
                OutboxStatus::Pending => stats.pending = count,
                OutboxStatus::Processed => stats.processed = count,
                OutboxStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }
}
