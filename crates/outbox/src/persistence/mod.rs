//! Persistence layer for the outbox
//!
//! This module provides:
//! - [`OutboxStore`] trait for event persistence and exclusive claiming
//! - [`InMemoryOutboxStore`] for testing
//! - [`PostgresOutboxStore`] for production
//! - [`migrate`] to apply the bundled schema

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryOutboxStore;
pub use postgres::{migrate, PostgresOutboxStore};
pub use store::{NewOutboxEvent, OutboxEvent, OutboxStats, OutboxStatus, OutboxStore, StoreError};
