//! # Transactional Outbox Engine
//!
//! Reliable, at-least-once delivery of internal domain events for the fleet
//! operations backend, plus the atomic per-tenant counter used to mint invoice
//! and booking numbers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Domain services (booking, invoice, ...)           │
//! │      enqueue(NewOutboxEvent) inside the business write       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       OutboxStore                            │
//! │   (PostgreSQL: outbox_events, SKIP LOCKED claim + lease)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     OutboxProcessor                          │
//! │  (tick: claim batch, dispatch, processed / retry / dead)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Dispatcher + EventRegistry                      │
//! │     (eventType -> typed event -> projection append)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fleetops_outbox::prelude::*;
//!
//! let store = Arc::new(PostgresOutboxStore::new(pool.clone()));
//! let journal = Arc::new(PostgresJournal::new(pool));
//! let dispatcher = Dispatcher::new(EventRegistry::with_default_events(), journal);
//!
//! let processor = Arc::new(OutboxProcessor::new(
//!     store,
//!     Arc::new(dispatcher),
//!     ProcessorConfig::from_env(),
//! ));
//!
//! let scheduler = spawn_scheduler(processor, Duration::from_secs(2));
//! // ...
//! scheduler.shutdown().await;
//! ```

pub mod dispatch;
pub mod persistence;
pub mod processor;
pub mod reliability;
pub mod sequence;

/// Prelude for common imports
pub mod prelude {
    pub use crate::dispatch::{
        Delivery, DispatchError, Dispatcher, EventDispatcher, EventRegistry, InMemoryJournal,
        PostgresJournal, ProjectedEvent, Projection, ProjectionEntry, ProjectionError,
    };
    pub use crate::persistence::{
        InMemoryOutboxStore, NewOutboxEvent, OutboxEvent, OutboxStats, OutboxStatus, OutboxStore,
        PostgresOutboxStore, StoreError,
    };
    pub use crate::processor::{
        spawn_scheduler, OutboxProcessor, ProcessorConfig, ProcessorError, SchedulerHandle,
        TickReport,
    };
    pub use crate::reliability::BackoffPolicy;
    pub use crate::sequence::{
        DocumentNumberFormat, InMemorySequenceAllocator, PostgresSequenceAllocator,
        SequenceAllocator, SequenceError,
    };
}

// Re-export key types at crate root
pub use dispatch::{Dispatcher, EventDispatcher, EventRegistry, Projection};
pub use persistence::{NewOutboxEvent, OutboxEvent, OutboxStatus, OutboxStore, StoreError};
pub use processor::{OutboxProcessor, ProcessorConfig, TickReport};
pub use reliability::BackoffPolicy;
pub use sequence::{SequenceAllocator, SequenceError};
