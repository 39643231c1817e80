//! Outbox processor
//!
//! One [`OutboxProcessor::tick`] claims a batch of due events, dispatches
//! them one after another and records each outcome:
//!
//! ```text
//! PENDING --(dispatch ok)--------------------------> PROCESSED
//! PENDING --(dispatch failed, attempt < max)-------> PENDING (available_at = now + backoff)
//! PENDING --(dispatch failed, attempt >= max)------> FAILED
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::config::ProcessorConfig;
use crate::dispatch::EventDispatcher;
use crate::persistence::{OutboxEvent, OutboxStore, StoreError};

/// Why a tick did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Processor disabled by configuration
    Disabled,
    /// Another tick is in flight on this processor
    AlreadyRunning,
    /// The previous tick finished less than `interval` ago
    Throttled,
}

/// What happened to one event during a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Dispatched and marked processed
    Processed,
    /// Dispatch failed, retry scheduled
    Retried { attempt: u32, delay: Duration },
    /// Dispatch failed for the last allowed time
    Dead { attempt: u32 },
    /// The outcome could not be written back to the store
    Unrecorded,
}

/// Per-event entry of a [`TickReport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub event_id: Uuid,
    pub event_type: String,
    pub outcome: EventOutcome,
}

/// Result of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Set when the tick returned without looking at the store
    pub skipped: Option<SkipReason>,
    /// Events came from the non-exclusive pending lookup
    pub used_fallback: bool,
    /// Outcome per handled event, in handling order
    pub events: Vec<EventReport>,
}

impl TickReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Check if the tick was skipped
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// Number of events marked processed
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, EventOutcome::Processed))
    }

    /// Number of events rescheduled
    pub fn retried(&self) -> usize {
        self.count(|o| matches!(o, EventOutcome::Retried { .. }))
    }

    /// Number of events dead-lettered
    pub fn dead(&self) -> usize {
        self.count(|o| matches!(o, EventOutcome::Dead { .. }))
    }

    fn count(&self, f: impl Fn(&EventOutcome) -> bool) -> usize {
        self.events.iter().filter(|e| f(&e.outcome)).count()
    }
}

/// Processor errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Neither the claim nor the pending lookup could read the store
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Drives outbox events to a terminal state
///
/// Holds its own reentrancy guard and throttle, so several processors in one
/// process never interfere with each other.
pub struct OutboxProcessor {
    store: Arc<dyn OutboxStore>,
    dispatcher: Arc<dyn EventDispatcher>,
    config: ProcessorConfig,
    running: AtomicBool,
    last_run_at: Mutex<Option<Instant>>,
}

/// Clears the running flag when a tick ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OutboxProcessor {
    /// Create a new processor
    ///
    /// The configuration is normalized, so out-of-range values are clamped.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        dispatcher: Arc<dyn EventDispatcher>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config: config.normalized(),
            running: AtomicBool::new(false),
            last_run_at: Mutex::new(None),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Check if a tick is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one unit of work
    ///
    /// Returns a skipped report instead of an error when disabled, already
    /// running or throttled. Dispatch failures never fail the tick.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport, ProcessorError> {
        if !self.config.enabled {
            return Ok(TickReport::skipped(SkipReason::Disabled));
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("tick already in flight, skipping");
            return Ok(TickReport::skipped(SkipReason::AlreadyRunning));
        }
        let _guard = RunningGuard(&self.running);

        if let Some(last) = *self.last_run_at.lock() {
            if last.elapsed() < self.config.interval {
                return Ok(TickReport::skipped(SkipReason::Throttled));
            }
        }

        let result = self.run_batch().await;
        *self.last_run_at.lock() = Some(Instant::now());
        result
    }

    async fn run_batch(&self) -> Result<TickReport, ProcessorError> {
        let mut report = TickReport::default();
        let (events, used_fallback) = self.fetch_batch().await?;
        report.used_fallback = used_fallback;

        for event in &events {
            let outcome = self.handle_event(event).await;
            report.events.push(EventReport {
                event_id: event.id,
                event_type: event.event_type.clone(),
                outcome,
            });
        }

        if !report.events.is_empty() {
            debug!(
                handled = report.events.len(),
                processed = report.processed(),
                retried = report.retried(),
                dead = report.dead(),
                used_fallback,
                "tick completed"
            );
        }
        Ok(report)
    }

    /// Claim due events, falling back to a non-exclusive lookup
    async fn fetch_batch(&self) -> Result<(Vec<OutboxEvent>, bool), ProcessorError> {
        let batch_size = self.config.batch_size;

        match self.store.claim_batch(batch_size, self.config.lease).await {
            Ok(ids) if ids.is_empty() => Ok((Vec::new(), false)),
            Ok(ids) => Ok((self.store.load(&ids).await?, false)),
            Err(e) => {
                info!(error = %e, "claim unavailable, using unleased pending lookup");
                let events = self.store.find_pending(batch_size).await?;
                Ok((events, true))
            }
        }
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    async fn handle_event(&self, event: &OutboxEvent) -> EventOutcome {
        let failure = match self.dispatcher.dispatch(event).await {
            Ok(()) => {
                return match self.store.mark_processed(event.id).await {
                    Ok(()) => EventOutcome::Processed,
                    Err(e) => {
                        error!(error = %e, "failed to mark event processed");
                        EventOutcome::Unrecorded
                    }
                };
            }
            Err(e) => e.to_string(),
        };

        let backoff = self.config.backoff();
        let attempt = event.attempts.saturating_add(1);

        if backoff.is_exhausted(attempt) {
            error!(
                attempt,
                max_attempts = backoff.max_attempts,
                error = %failure,
                "dispatch failed, retries exhausted, dead-lettering event"
            );
            return match self.store.mark_dead(event.id, &failure).await {
                Ok(()) => EventOutcome::Dead { attempt },
                Err(e) => {
                    error!(error = %e, "failed to dead-letter event");
                    EventOutcome::Unrecorded
                }
            };
        }

        let delay = backoff.delay_for_attempt(attempt);
        warn!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %failure,
            "dispatch failed, scheduling retry"
        );
        match self.store.schedule_retry(event.id, &failure, delay).await {
            Ok(()) => EventOutcome::Retried { attempt, delay },
            Err(e) => {
                error!(error = %e, "failed to schedule retry");
                EventOutcome::Unrecorded
            }
        }
    }
}
