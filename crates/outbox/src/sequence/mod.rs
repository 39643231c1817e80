//! Atomic per-tenant sequence allocation
//!
//! This module provides:
//! - [`SequenceAllocator`] trait for `(tenant, year)` counters
//! - [`InMemorySequenceAllocator`] for testing
//! - [`PostgresSequenceAllocator`] backed by a single upsert-increment statement
//! - [`DocumentNumberFormat`] for rendering invoice and booking numbers

mod allocator;
mod format;
mod memory;
mod postgres;

pub use allocator::{Allocation, SequenceAllocator, SequenceError};
pub use format::{year_in_timezone, DocumentNumberFormat};
pub use memory::InMemorySequenceAllocator;
pub use postgres::PostgresSequenceAllocator;
