//! SequenceAllocator trait definition

use async_trait::async_trait;

use super::format::DocumentNumberFormat;

/// Error type for sequence allocation
///
/// Callers must treat every variant as a failure of the business operation
/// that needed the number. A number is never fabricated on error.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// Tenant id empty or year outside 1000..=9999
    #[error("invalid sequence key: {0}")]
    InvalidKey(String),

    /// The atomic increment could not complete
    #[error("sequence store unavailable: {0}")]
    StoreUnavailable(String),

    /// The counter cannot be incremented without overflowing
    #[error("sequence exhausted for tenant {tenant_id} in {year}")]
    Exhausted { tenant_id: String, year: i32 },
}

/// A freshly allocated sequence value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub tenant_id: String,
    pub year: i32,
    pub sequence: i64,
}

impl Allocation {
    /// Render this allocation as a human-facing document number
    pub fn format(&self, format: DocumentNumberFormat) -> String {
        format.render(self.year, self.sequence)
    }
}

/// Atomic counter keyed by `(tenant_id, year)`
///
/// The first allocation for a key returns 1, each later one returns the
/// previous value plus one. No two callers ever observe the same value for
/// the same key, however many allocate concurrently.
#[async_trait]
pub trait SequenceAllocator: Send + Sync + 'static {
    /// Allocate the next value for `(tenant_id, year)`
    async fn allocate_next(&self, tenant_id: &str, year: i32) -> Result<Allocation, SequenceError>;
}

/// Reject keys that would never be valid document-number scopes
pub(crate) fn validate_key(tenant_id: &str, year: i32) -> Result<(), SequenceError> {
    if tenant_id.trim().is_empty() {
        return Err(SequenceError::InvalidKey("tenant id is empty".to_string()));
    }
    if !(1000..=9999).contains(&year) {
        return Err(SequenceError::InvalidKey(format!(
            "year {year} is not a 4-digit year"
        )));
    }
    Ok(())
}
