//! Event dispatch into read-model projections
//!
//! This module provides:
//! - [`ProjectedEvent`] - Strongly-typed payload of one recognized event type
//! - [`EventRegistry`] - `event_type -> typed projector`, built at startup
//! - [`Dispatcher`] - Routes an outbox event to a [`Projection`] append
//! - [`InMemoryJournal`] / [`PostgresJournal`] - Journal projections
//!
//! The dispatcher never decides retry policy. It returns `Ok` or a
//! [`DispatchError`] and the processor interprets the outcome.

mod dispatcher;
mod event;
pub mod events;
mod journal;
mod projection;
mod registry;

pub use dispatcher::{DispatchError, Dispatcher, EventDispatcher};
pub use event::{Delivery, ProjectedEvent};
pub use journal::PostgresJournal;
pub use projection::{InMemoryJournal, Projection, ProjectionEntry, ProjectionError};
pub use registry::{EventRegistry, Projected, RegistryError, Route};
