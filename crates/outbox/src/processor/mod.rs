//! Outbox processing loop
//!
//! - [`ProcessorConfig`]: environment-driven settings with clamped bounds
//! - [`OutboxProcessor`]: the per-tick claim, dispatch and record cycle
//! - [`spawn_scheduler`]: fixed-period driver with graceful shutdown

mod config;
mod runner;
mod scheduler;

pub use config::ProcessorConfig;
pub use runner::{
    EventOutcome, EventReport, OutboxProcessor, ProcessorError, SkipReason, TickReport,
};
pub use scheduler::{spawn_scheduler, SchedulerHandle};
