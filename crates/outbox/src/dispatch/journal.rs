//! PostgreSQL journal projection

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::projection::{Projection, ProjectionEntry, ProjectionError};

/// Human-readable journal stored in `journal_entries`
///
/// A repeated `(source_event_id, kind)` is ignored, so re-delivery of an
/// event never produces a second visible line.
#[derive(Clone)]
pub struct PostgresJournal {
    pool: PgPool,
}

impl PostgresJournal {
    /// Create a journal with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Projection for PostgresJournal {
    #[instrument(skip(self, entry), fields(kind = %entry.kind, source_event_id = %entry.source_event_id))]
    async fn append(&self, entry: ProjectionEntry) -> Result<(), ProjectionError> {
        let result = sqlx::query(
            r#"
            INSERT INTO journal_entries (
                id, source_event_id, kind, aggregate_type, aggregate_id,
                summary, fields, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_event_id, kind) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(entry.source_event_id)
        .bind(&entry.kind)
        .bind(&entry.aggregate_type)
        .bind(&entry.aggregate_id)
        .bind(&entry.summary)
        .bind(serde_json::Value::Object(entry.fields.clone()))
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to append journal entry: {}", e);
            let code = e.as_database_error().and_then(|db| db.code());
            if is_rejection(code.as_deref()) {
                ProjectionError::Rejected(e.to_string())
            } else {
                ProjectionError::Unavailable(e.to_string())
            }
        })?;

        if result.rows_affected() == 0 {
            debug!("journal entry already recorded");
        }
        Ok(())
    }
}

/// Data exceptions (22) and integrity violations (23) fail the same way on
/// every retry; anything else may be transient
fn is_rejection(sqlstate: Option<&str>) -> bool {
    matches!(sqlstate, Some(code) if code.starts_with("22") || code.starts_with("23"))
}
